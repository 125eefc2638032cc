//! Display names: generation, validation, and registration.
//!
//! Every live connection has a display name that is unique among live
//! connections. Uniqueness is enforced by the [`ConnectionStore`], not
//! here: we generate a candidate, try to register it, and try again on
//! a collision, up to a fixed number of attempts.

use std::time::Duration;

use duel_store::{ConnectionStore, with_timeout};
use rand::Rng;

use crate::SessionError;

/// Pool the generated names are drawn from.
pub const NAME_PREFIXES: [&str; 2] = ["Alice", "Bob"];

/// Longest display name a client may choose, in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 24;

/// Generates a candidate guest name such as `Alice#4821`.
///
/// 2 prefixes × 9000 suffixes gives 18 000 names, so collisions are rare
/// at realistic concurrency but not impossible.
pub fn generate_display_name() -> String {
    let mut rng = rand::rng();
    let prefix = NAME_PREFIXES[rng.random_range(0..NAME_PREFIXES.len())];
    let suffix: u16 = rng.random_range(1000..10000);
    format!("{prefix}#{suffix}")
}

/// Trims a client-chosen name and checks it is usable.
///
/// # Errors
/// [`SessionError::InvalidName`] when the trimmed name is empty, longer
/// than [`MAX_DISPLAY_NAME_CHARS`], or contains control characters.
pub fn normalize_display_name(raw: &str) -> Result<String, SessionError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_DISPLAY_NAME_CHARS || name.chars().any(char::is_control) {
        return Err(SessionError::InvalidName {
            max: MAX_DISPLAY_NAME_CHARS,
        });
    }
    Ok(name.to_string())
}

/// Generates and registers a fresh display name.
///
/// Retries on uniqueness violations up to `attempts` times. Any other
/// store error aborts immediately.
pub async fn register_display_name<S: ConnectionStore>(
    store: &S,
    timeout: Duration,
    attempts: usize,
) -> Result<String, SessionError> {
    register_with(store, timeout, attempts, generate_display_name).await
}

/// [`register_display_name`] with a caller-supplied name generator.
pub async fn register_with<S, G>(
    store: &S,
    timeout: Duration,
    attempts: usize,
    mut generate: G,
) -> Result<String, SessionError>
where
    S: ConnectionStore,
    G: FnMut() -> String + Send,
{
    for attempt in 1..=attempts {
        let name = generate();
        match with_timeout(timeout, store.create_connection(&name)).await {
            Ok(_) => return Ok(name),
            Err(e) if e.is_unique_violation() => {
                tracing::debug!(%name, attempt, "display name taken, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(SessionError::NamesExhausted { attempts })
}

/// Validates `requested` and renames the registered connection `current`.
///
/// Returns the normalized new name. Renaming to the current name is a
/// no-op.
///
/// # Errors
/// [`SessionError::InvalidName`], [`SessionError::NameTaken`], or the
/// store's own error.
pub async fn rename_display_name<S: ConnectionStore>(
    store: &S,
    timeout: Duration,
    current: &str,
    requested: &str,
) -> Result<String, SessionError> {
    let name = normalize_display_name(requested)?;
    if name == current {
        return Ok(name);
    }
    match with_timeout(timeout, store.rename_connection(current, &name)).await {
        Ok(_) => Ok(name),
        Err(e) if e.is_unique_violation() => Err(SessionError::NameTaken),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use duel_store::MemoryStore;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_generated_names_use_the_pool() {
        for _ in 0..100 {
            let name = generate_display_name();
            let (prefix, suffix) = name.split_once('#').expect("has #");
            assert!(NAME_PREFIXES.contains(&prefix), "bad prefix in {name}");
            let n: u16 = suffix.parse().expect("numeric suffix");
            assert!((1000..10000).contains(&n));
        }
    }

    #[test]
    fn test_normalize_trims_and_limits() {
        assert_eq!(normalize_display_name("  Zed  ").expect("ok"), "Zed");
        assert!(normalize_display_name("   ").is_err());
        assert!(normalize_display_name(&"x".repeat(25)).is_err());
        assert!(normalize_display_name("tab\there").is_err());
        assert!(normalize_display_name(&"é".repeat(24)).is_ok());
    }

    #[tokio::test]
    async fn test_register_retries_past_collisions() {
        let store = MemoryStore::new();
        store.create_connection("Alice#1000").await.expect("seed");

        let mut candidates = vec!["Bob#2000", "Alice#1000"];
        let name = register_with(&store, TIMEOUT, 5, || {
            candidates.pop().unwrap_or("unused").to_string()
        })
        .await
        .expect("should register");

        assert_eq!(name, "Bob#2000");
    }

    #[tokio::test]
    async fn test_register_gives_up_after_attempts() {
        let store = MemoryStore::new();
        store.create_connection("Alice#1000").await.expect("seed");

        let mut calls = 0;
        let err = register_with(&store, TIMEOUT, 5, || {
            calls += 1;
            "Alice#1000".to_string()
        })
        .await
        .expect_err("should exhaust");

        assert!(matches!(err, SessionError::NamesExhausted { attempts: 5 }));
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn test_register_stops_on_other_store_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let mut calls = 0;
        let err = register_with(&store, TIMEOUT, 5, || {
            calls += 1;
            generate_display_name()
        })
        .await
        .expect_err("store down");

        assert!(matches!(err, SessionError::Store(_)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_rename_to_taken_name() {
        let store = MemoryStore::new();
        store.create_connection("Alice#1000").await.expect("a");
        store.create_connection("Bob#2000").await.expect("b");

        let err = rename_display_name(&store, TIMEOUT, "Alice#1000", "Bob#2000")
            .await
            .expect_err("taken");
        assert!(matches!(err, SessionError::NameTaken));
        assert_eq!(err.to_string(), "Display name already taken.");
    }

    #[tokio::test]
    async fn test_rename_normalizes() {
        let store = MemoryStore::new();
        store.create_connection("Alice#1000").await.expect("a");

        let name = rename_display_name(&store, TIMEOUT, "Alice#1000", "  Ada ")
            .await
            .expect("rename");
        assert_eq!(name, "Ada");
        assert!(store.get_connection("Ada").await.is_ok());
    }
}
