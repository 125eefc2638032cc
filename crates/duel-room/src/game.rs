//! The `Game` trait, the extension point for rule engines.
//!
//! A Room owns exactly one boxed [`Game`] and never looks inside it: it
//! forwards moves, asks whether the game is over, and broadcasts whatever
//! [`Game::state`] returns. Concrete games live in their own crate and are
//! made available through a [`GameRegistry`] filled in at startup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::RoomError;

/// Number of seats in every room.
pub const SEATS: usize = 2;

/// How a finished game ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A game-specific identifier of the winner, e.g. `"X"` or `"P2"`.
    Winner(String),
    /// Nobody won.
    Draw,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Winner(id) => f.write_str(id),
            Self::Draw => f.write_str("draw"),
        }
    }
}

/// Why a game rejected a move.
///
/// The `Display` text is sent to the mover verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// The game already has an outcome.
    #[error("game is already over")]
    GameOver,

    /// The mover's seat is not the one to move.
    #[error("it's not your turn")]
    NotYourTurn,

    /// The move failed game-specific validation.
    #[error("{0}")]
    Invalid(String),
}

impl MoveError {
    /// Shorthand for [`MoveError::Invalid`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

/// A turn-based rule engine for one match.
///
/// Implementations must reject every move once [`Game::winner`] returns
/// `Some`, and [`Game::reset`] must restore exactly the state of a freshly
/// constructed game.
pub trait Game: Send + Sync + 'static {
    /// Applies a move for the player in `seat` (0 or 1).
    ///
    /// On error the game state must be unchanged.
    fn apply_move(&mut self, seat: usize, mv: &Value) -> Result<(), MoveError>;

    /// Serializable snapshot for broadcast.
    fn state(&self) -> Value;

    /// The outcome, or `None` while the game is running.
    fn winner(&self) -> Option<Outcome>;

    /// `true` once the game has an outcome.
    fn is_finished(&self) -> bool {
        self.winner().is_some()
    }

    /// Returns to the initial state, for a rematch.
    fn reset(&mut self);
}

/// Builds a fresh game instance.
pub type GameFactory = Arc<dyn Fn() -> Box<dyn Game> + Send + Sync>;

#[derive(Clone)]
struct GameEntry {
    max_players: usize,
    factory: GameFactory,
}

/// Maps game-type strings (as stored on room records) to factories.
#[derive(Clone, Default)]
pub struct GameRegistry {
    entries: HashMap<String, GameEntry>,
}

impl GameRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a game type. `max_players` is capped at [`SEATS`].
    ///
    /// Registering the same type twice replaces the earlier factory.
    pub fn register<F>(&mut self, game_type: &str, max_players: usize, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Game> + Send + Sync + 'static,
    {
        self.entries.insert(
            game_type.to_string(),
            GameEntry {
                max_players: max_players.clamp(1, SEATS),
                factory: Arc::new(factory),
            },
        );
        self
    }

    /// Instantiates a game and returns it with its seat count.
    ///
    /// # Errors
    /// [`RoomError::UnsupportedGame`] for an unregistered type.
    pub fn create(&self, game_type: &str) -> Result<(Box<dyn Game>, usize), RoomError> {
        let entry = self
            .entries
            .get(game_type)
            .ok_or_else(|| RoomError::UnsupportedGame(game_type.to_string()))?;
        Ok(((entry.factory)(), entry.max_players))
    }

    /// `true` if the type is registered.
    pub fn supports(&self, game_type: &str) -> bool {
        self.entries.contains_key(game_type)
    }

    /// Registered game types, sorted.
    pub fn game_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.entries.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl fmt::Debug for GameRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameRegistry")
            .field("game_types", &self.game_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Coin {
        flipped: Option<usize>,
    }

    impl Game for Coin {
        fn apply_move(&mut self, seat: usize, _mv: &Value) -> Result<(), MoveError> {
            if self.flipped.is_some() {
                return Err(MoveError::GameOver);
            }
            self.flipped = Some(seat);
            Ok(())
        }

        fn state(&self) -> Value {
            json!({ "flipped": self.flipped })
        }

        fn winner(&self) -> Option<Outcome> {
            self.flipped.map(|s| Outcome::Winner(format!("seat{s}")))
        }

        fn reset(&mut self) {
            self.flipped = None;
        }
    }

    fn registry() -> GameRegistry {
        let mut r = GameRegistry::new();
        r.register("coin", 2, || Box::new(Coin { flipped: None }));
        r
    }

    #[test]
    fn test_create_known_type() {
        let (game, max) = registry().create("coin").expect("registered");
        assert_eq!(max, 2);
        assert!(!game.is_finished());
    }

    #[test]
    fn test_create_unknown_type() {
        let err = registry().create("chess").err().expect("unsupported");
        assert_eq!(
            err.to_string(),
            "Error creating game instance: unsupported game type 'chess'"
        );
    }

    #[test]
    fn test_max_players_capped_at_seats() {
        let mut r = GameRegistry::new();
        r.register("party", 8, || Box::new(Coin { flipped: None }));
        assert_eq!(r.create("party").expect("ok").1, SEATS);
    }

    #[test]
    fn test_default_is_finished_follows_winner() {
        let (mut game, _) = registry().create("coin").expect("ok");
        game.apply_move(1, &Value::Null).expect("move");
        assert!(game.is_finished());
        assert_eq!(game.winner(), Some(Outcome::Winner("seat1".into())));
        assert_eq!(game.apply_move(0, &Value::Null), Err(MoveError::GameOver));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Draw.to_string(), "draw");
        assert_eq!(Outcome::Winner("O".into()).to_string(), "O");
    }
}
