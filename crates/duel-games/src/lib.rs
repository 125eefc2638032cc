//! Built-in games for Duel.
//!
//! Each game implements [`duel_room::Game`]. [`builtin_registry`] returns
//! a [`GameRegistry`] with all of them registered under the game-type
//! strings stored on room records.

mod nim;
mod tictactoe;

use duel_room::GameRegistry;

pub use nim::{NIM_STICKS, Nim};
pub use tictactoe::{Mark, TicTacToe};

/// Game type of [`TicTacToe`].
pub const TIC_TAC_TOE: &str = "tic-tac-toe";

/// Game type of [`Nim`].
pub const NIM: &str = "nim";

/// A registry holding every built-in game.
pub fn builtin_registry() -> GameRegistry {
    let mut games = GameRegistry::new();
    games
        .register(TIC_TAC_TOE, 2, || Box::new(TicTacToe::new()))
        .register(NIM, 2, || Box::new(Nim::new()));
    games
}
