//! Error types for the session layer.

use duel_store::StoreError;

/// Errors that can occur while registering or renaming a connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every generated display name collided with a live one.
    #[error("no free display name after {attempts} attempts")]
    NamesExhausted {
        /// How many names were tried.
        attempts: usize,
    },

    /// A requested display name failed validation.
    #[error("Display name must be 1-{max} characters.")]
    InvalidName {
        /// Maximum length in characters.
        max: usize,
    },

    /// The requested display name belongs to another live connection.
    #[error("Display name already taken.")]
    NameTaken,

    /// The store failed for a reason other than a name collision.
    #[error(transparent)]
    Store(#[from] StoreError),
}
