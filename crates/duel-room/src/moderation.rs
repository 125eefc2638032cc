//! Chat moderation: length cap, per-connection rate limit, profanity
//! censoring.
//!
//! Checks run in a fixed order: emptiness, length, rate limit, then
//! censoring. Only messages that pass the first three count against the
//! sender's rate limit. Profanity never rejects a message; offending
//! words are starred out and the message goes through.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use duel_protocol::ConnectionId;
use rustrict::{Censor, Type};
use tokio::time::Instant;

use crate::ChatConfig;

/// Why a chat message was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatRejection {
    /// Nothing but whitespace. Dropped without telling the sender.
    #[error("Message cannot be empty")]
    Empty,

    /// Longer than the configured cap.
    #[error("Message too long (max {max} characters)")]
    TooLong {
        /// The cap, in characters.
        max: usize,
    },

    /// The sender exhausted its sliding window.
    #[error("You're sending messages too quickly. Please slow down.")]
    RateLimited,
}

/// Sliding-window rate limiter plus profanity filter, shared by all rooms.
///
/// History is keyed by connection, so switching rooms does not reset a
/// sender's window.
#[derive(Debug)]
pub struct ChatModerator {
    config: ChatConfig,
    history: Mutex<HashMap<ConnectionId, VecDeque<Instant>>>,
}

impl ChatModerator {
    /// Creates a moderator with the given limits.
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// The limits in effect.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Checks one message from `sender`.
    ///
    /// Returns the text to broadcast (censored if needed).
    pub fn validate(&self, sender: ConnectionId, text: &str) -> Result<String, ChatRejection> {
        if text.trim().is_empty() {
            return Err(ChatRejection::Empty);
        }
        if text.chars().count() > self.config.max_length {
            return Err(ChatRejection::TooLong {
                max: self.config.max_length,
            });
        }
        if !self.allow(sender, Instant::now()) {
            return Err(ChatRejection::RateLimited);
        }
        Ok(censor(text))
    }

    fn allow(&self, sender: ConnectionId, now: Instant) -> bool {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let stamps = history.entry(sender).or_default();
        while stamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.config.window)
        {
            stamps.pop_front();
        }
        if stamps.len() >= self.config.max_per_window {
            return false;
        }
        stamps.push_back(now);
        true
    }

    /// Drops history older than twice the window and forgets senders with
    /// none left. Returns the number of senders still tracked.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let horizon = self.config.window * 2;
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.retain(|_, stamps| {
            stamps.retain(|t| now.duration_since(*t) < horizon);
            !stamps.is_empty()
        });
        history.len()
    }

    /// Forgets a sender entirely, e.g. when its connection closes.
    pub fn forget(&self, sender: ConnectionId) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&sender);
    }
}

// ---------------------------------------------------------------------------
// Profanity
// ---------------------------------------------------------------------------

/// Stars out inappropriate words, first letter included. Everything
/// else is returned as written.
pub fn censor(text: &str) -> String {
    Censor::from_str(text)
        .with_censor_threshold(Type::INAPPROPRIATE)
        .with_censor_first_character_threshold(Type::INAPPROPRIATE)
        .with_censor_replacement('*')
        .censor()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn moderator() -> ChatModerator {
        ChatModerator::new(ChatConfig::default())
    }

    #[test]
    fn test_censor_stars_out_profanity_and_keeps_the_rest() {
        let out = censor("what the fuck, again");
        assert!(out.starts_with("what the "), "got {out:?}");
        assert!(out.ends_with(", again"), "got {out:?}");
        assert!(!out.contains("fuck"));
        assert!(out.contains('*'));
    }

    #[test]
    fn test_censor_ignores_case() {
        let out = censor("FUCK this");
        assert!(!out.to_lowercase().contains("fuck"), "got {out:?}");
        assert!(out.ends_with(" this"));
    }

    #[test]
    fn test_censor_leaves_clean_text() {
        assert_eq!(censor("good game!"), "good game!");
        assert_eq!(censor("see you in the next round"), "see you in the next round");
    }

    #[tokio::test]
    async fn test_empty_and_whitespace_are_empty() {
        let m = moderator();
        let id = ConnectionId::new_v4();
        assert_eq!(m.validate(id, ""), Err(ChatRejection::Empty));
        assert_eq!(m.validate(id, "   "), Err(ChatRejection::Empty));
    }

    #[tokio::test]
    async fn test_length_is_counted_in_characters() {
        let m = moderator();
        let id = ConnectionId::new_v4();
        assert!(m.validate(id, &"é".repeat(500)).is_ok());
        assert_eq!(
            m.validate(id, &"a".repeat(501)),
            Err(ChatRejection::TooLong { max: 500 })
        );
        assert_eq!(
            ChatRejection::TooLong { max: 500 }.to_string(),
            "Message too long (max 500 characters)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_message_in_window_is_rate_limited() {
        let m = moderator();
        let id = ConnectionId::new_v4();
        for i in 0..5 {
            assert!(m.validate(id, &format!("msg {i}")).is_ok());
        }
        assert_eq!(m.validate(id, "one too many"), Err(ChatRejection::RateLimited));

        // Another sender is unaffected.
        assert!(m.validate(ConnectionId::new_v4(), "hi").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let m = moderator();
        let id = ConnectionId::new_v4();
        for _ in 0..5 {
            m.validate(id, "x").expect("within limit");
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(m.validate(id, "fresh window").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_messages_do_not_count() {
        let m = moderator();
        let id = ConnectionId::new_v4();
        for _ in 0..10 {
            let _ = m.validate(id, &"a".repeat(600));
        }
        assert!(m.validate(id, "ok").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_and_forget() {
        let m = moderator();
        let a = ConnectionId::new_v4();
        let b = ConnectionId::new_v4();
        m.validate(a, "x").expect("ok");
        tokio::time::advance(Duration::from_secs(15)).await;
        m.validate(b, "y").expect("ok");
        tokio::time::advance(Duration::from_secs(6)).await;

        // a's stamp is 21s old (> 2 windows), b's is 6s old.
        assert_eq!(m.prune(), 1);

        m.forget(b);
        assert_eq!(m.prune(), 0);
    }
}
