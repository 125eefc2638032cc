//! Duel game server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin duel-server
//! cargo run --bin duel-server -- --config duel.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use duel::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "duel-server")]
#[command(about = "Realtime two-player game rooms over WebSocket", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), DuelError> {
    init_logging();
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    let games = builtin_registry();
    let store = Arc::new(config.seeded_store(&games));

    let server = DuelServerBuilder::new()
        .config(config)
        .store(store)
        .games(games)
        .build()
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
}
