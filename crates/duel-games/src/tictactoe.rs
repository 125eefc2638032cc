use duel_room::{Game, MoveError, Outcome};
use serde::Serialize;
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A player's mark. Seat 0 plays X and always opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mark { X, O }

impl Mark {
    fn for_seat(seat: usize) -> Self {
        if seat == 0 { Self::X } else { Self::O }
    }

    fn as_str(self) -> &'static str {
        match self { Self::X => "X", Self::O => "O" }
    }
}

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2], [3, 4, 5], [6, 7, 8], // rows
    [0, 3, 6], [1, 4, 7], [2, 5, 8], // cols
    [0, 4, 8], [2, 4, 6],            // diagonals
];

/// Classic 3x3 tic-tac-toe.
///
/// Moves are `{"cellIndex": 0..=8}`, cells numbered row by row. State is
/// `{board, currentTurn, winner}` with `winner` one of `"X"`, `"O"`,
/// `"draw"`, or `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicTacToe {
    board: [Option<Mark>; 9],
    current_turn: usize,
    winner: Option<Outcome>,
}

impl TicTacToe {
    pub fn new() -> Self {
        Self { board: [None; 9], current_turn: 0, winner: None }
    }

    /// The mark in `cell`, if any.
    pub fn cell(&self, cell: usize) -> Option<Mark> {
        self.board.get(cell).copied().flatten()
    }

    fn is_line(&self, mark: Mark) -> bool {
        LINES.iter().any(|line| line.iter().all(|&i| self.board[i] == Some(mark)))
    }
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

impl Game for TicTacToe {
    fn apply_move(&mut self, seat: usize, mv: &Value) -> Result<(), MoveError> {
        if self.winner.is_some() {
            return Err(MoveError::GameOver);
        }
        if seat != self.current_turn {
            return Err(MoveError::NotYourTurn);
        }
        let index = mv
            .get("cellIndex")
            .and_then(Value::as_f64)
            .ok_or_else(|| MoveError::invalid("cellIndex must be a number"))?
            .trunc();
        if !(0.0..9.0).contains(&index) {
            return Err(MoveError::invalid("cell index out of bounds"));
        }
        let cell = index as usize;
        if self.board[cell].is_some() {
            return Err(MoveError::invalid("cell is already occupied"));
        }

        let mark = Mark::for_seat(seat);
        self.board[cell] = Some(mark);

        if self.is_line(mark) {
            self.winner = Some(Outcome::Winner(mark.as_str().to_string()));
        } else if self.board.iter().all(Option::is_some) {
            self.winner = Some(Outcome::Draw);
        }
        self.current_turn = 1 - self.current_turn;
        Ok(())
    }

    fn state(&self) -> Value {
        json!({
            "board": self.board,
            "currentTurn": self.current_turn,
            "winner": self.winner.as_ref().map(ToString::to_string),
        })
    }

    fn winner(&self) -> Option<Outcome> {
        self.winner.clone()
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(game: &mut TicTacToe, cells: &[usize]) {
        for (i, &cell) in cells.iter().enumerate() {
            game.apply_move(i % 2, &json!({ "cellIndex": cell }))
                .unwrap_or_else(|e| panic!("move {i} ({cell}) rejected: {e}"));
        }
    }

    #[test]
    fn test_x_wins_top_row() {
        let mut g = TicTacToe::new();
        play(&mut g, &[0, 3, 1, 4, 2]);
        assert_eq!(g.winner(), Some(Outcome::Winner("X".into())));
        assert_eq!(g.state()["winner"], "X");
        assert_eq!(g.state()["board"][0], "X");
        assert_eq!(g.state()["board"][5], Value::Null);
    }

    #[test]
    fn test_o_wins_anti_diagonal() {
        let mut g = TicTacToe::new();
        play(&mut g, &[0, 2, 1, 4, 8, 6]);
        assert_eq!(g.winner(), Some(Outcome::Winner("O".into())));
    }

    #[test]
    fn test_full_board_is_a_draw() {
        // X | O | X
        // X | O | X
        // O | X | O
        let mut g = TicTacToe::new();
        play(&mut g, &[0, 1, 2, 4, 3, 6, 5, 8, 7]);
        assert_eq!(g.winner(), Some(Outcome::Draw));
        assert_eq!(g.state()["winner"], "draw");
    }

    #[test]
    fn test_win_on_last_cell_beats_draw() {
        // X | O | X
        // O | X | O
        // O | X | X   (X completes the main diagonal with the ninth move)
        let mut g = TicTacToe::new();
        play(&mut g, &[0, 1, 2, 3, 4, 5, 7, 6, 8]);
        assert_eq!(g.winner(), Some(Outcome::Winner("X".into())));
    }

    #[test]
    fn test_every_line_wins() {
        for line in LINES {
            let mut g = TicTacToe::new();
            g.board = [None; 9];
            for i in line {
                g.board[i] = Some(Mark::O);
            }
            assert!(g.is_line(Mark::O), "{line:?}");
            assert!(!g.is_line(Mark::X));
        }
    }

    #[test]
    fn test_rejections_leave_state_unchanged() {
        let mut g = TicTacToe::new();
        play(&mut g, &[4]);
        let before = g.clone();

        let cases = [
            (0, json!({ "cellIndex": 0 }), "it's not your turn"),
            (1, json!({ "cellIndex": "4" }), "cellIndex must be a number"),
            (1, json!({}), "cellIndex must be a number"),
            (1, json!({ "cellIndex": 9 }), "cell index out of bounds"),
            (1, json!({ "cellIndex": -1 }), "cell index out of bounds"),
            (1, json!({ "cellIndex": 4 }), "cell is already occupied"),
        ];
        for (seat, mv, expected) in cases {
            let err = g.apply_move(seat, &mv).expect_err("rejected");
            assert_eq!(err.to_string(), expected);
            assert_eq!(g, before);
        }
    }

    #[test]
    fn test_moves_rejected_after_game_over() {
        let mut g = TicTacToe::new();
        play(&mut g, &[0, 3, 1, 4, 2]);
        assert_eq!(
            g.apply_move(1, &json!({ "cellIndex": 8 })),
            Err(MoveError::GameOver)
        );
    }

    #[test]
    fn test_reset_matches_fresh_game() {
        let mut g = TicTacToe::new();
        play(&mut g, &[0, 3, 1, 4, 2]);
        g.reset();
        assert!(!g.is_finished());
        assert_eq!(g.state(), TicTacToe::new().state());
        assert_eq!(g.state()["currentTurn"], 0);
    }
}
