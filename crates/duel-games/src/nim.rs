use duel_room::{Game, MoveError, Outcome};
use serde_json::{Value, json};

/// Sticks on the table at the start of a game.
pub const NIM_STICKS: u32 = 21;

/// Misère Nim with a single pile: players alternately take one to three
/// sticks, and whoever takes the last stick loses.
///
/// Moves are `{"sticks": 1..=3}`. State is `{sticks, currentTurn, winner}`
/// with `winner` `"P1"` (seat 0), `"P2"` (seat 1), or `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nim {
    sticks: u32,
    current_turn: usize,
    winner: Option<usize>,
}

impl Nim {
    pub fn new() -> Self {
        Self { sticks: NIM_STICKS, current_turn: 0, winner: None }
    }

    /// Sticks left on the table.
    pub fn sticks(&self) -> u32 {
        self.sticks
    }

    fn label(seat: usize) -> String {
        format!("P{}", seat + 1)
    }
}

impl Default for Nim {
    fn default() -> Self {
        Self::new()
    }
}

impl Game for Nim {
    fn apply_move(&mut self, seat: usize, mv: &Value) -> Result<(), MoveError> {
        if self.winner.is_some() {
            return Err(MoveError::GameOver);
        }
        if seat != self.current_turn {
            return Err(MoveError::NotYourTurn);
        }
        let take = mv
            .get("sticks")
            .and_then(Value::as_f64)
            .ok_or_else(|| MoveError::invalid("sticks must be a number"))?
            .trunc();
        if !(1.0..=3.0).contains(&take) {
            return Err(MoveError::invalid("you can only take 1, 2, or 3 sticks"));
        }
        let take = take as u32;
        if take > self.sticks {
            return Err(MoveError::invalid("not enough sticks remaining"));
        }

        self.sticks -= take;
        if self.sticks == 0 {
            // Taking the last stick loses.
            self.winner = Some(1 - seat);
        } else {
            self.current_turn = 1 - self.current_turn;
        }
        Ok(())
    }

    fn state(&self) -> Value {
        json!({
            "sticks": self.sticks,
            "currentTurn": self.current_turn,
            "winner": self.winner.map(Self::label),
        })
    }

    fn winner(&self) -> Option<Outcome> {
        self.winner.map(|seat| Outcome::Winner(Self::label(seat)))
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}
