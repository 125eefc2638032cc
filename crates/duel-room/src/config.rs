//! Tunables for the Manager, its Rooms, and chat moderation.
//!
//! These are plain structs with defaults; the server crate fills them in
//! from its TOML configuration.

use std::time::Duration;

// ---------------------------------------------------------------------------
// ChatConfig
// ---------------------------------------------------------------------------

/// Limits applied to chat messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Longest accepted message, in characters.
    pub max_length: usize,

    /// Messages a connection may send within one `window`.
    pub max_per_window: usize,

    /// Length of the sliding rate-limit window.
    pub window: Duration,

    /// How often stale rate-limit history is pruned. Values below one
    /// millisecond are treated as one millisecond.
    pub prune_interval: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_length: 500,
            max_per_window: 5,
            window: Duration::from_secs(10),
            prune_interval: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// ManagerConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Manager`](crate::Manager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Capacity of each connection's outbound queue, in frames. A frame
    /// sent to a full queue is dropped for that connection.
    pub outbound_queue: usize,

    /// Upper bound on every store call.
    pub store_timeout: Duration,

    /// Display-name candidates tried before an accept fails.
    pub name_retries: usize,

    /// How often zero-member rooms are swept from the registry. Values
    /// below one millisecond are treated as one millisecond.
    pub sweep_interval: Duration,

    /// Chat moderation limits.
    pub chat: ChatConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            store_timeout: Duration::from_secs(5),
            name_retries: 5,
            sweep_interval: Duration::from_secs(300),
            chat: ChatConfig::default(),
        }
    }
}
