//! Chess position wrapper over the `shakmaty` rules library.
//!
//! The game server never decides legality or termination itself: everything
//! goes through [`Board`], which keeps the current position together with the
//! bookkeeping the rules library does not track (start position, move history
//! and repetition counts).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};

use crate::error::DomainError;
use crate::outcome::{GameResult, Outcome, Termination};

/// FEN of the standard chess starting position.
pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Side to move / player colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Self::White,
            Color::Black => Self::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A move in long algebraic (UCI) notation, e.g. `e2e4` or `e7e8q`.
///
/// Parsing only checks the notation; whether the move is legal depends on a
/// [`Board`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChessMove(Uci);

impl ChessMove {
    fn from_move(m: &Move) -> Self {
        Self(m.to_uci(CastlingMode::Standard))
    }
}

impl FromStr for ChessMove {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Uci>()
            .map(Self)
            .map_err(|_| DomainError::invalid_move(s))
    }
}

impl fmt::Display for ChessMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current game position plus the history needed for draw rules.
#[derive(Debug, Clone)]
pub struct Board {
    position: Chess,
    start_fen: String,
    history: Vec<ChessMove>,
    repetitions: HashMap<String, u32>,
}

impl Board {
    /// Board at the standard starting position.
    pub fn new() -> Self {
        Self::from_position(Chess::default())
    }

    /// Board starting from an arbitrary FEN.
    pub fn from_fen(fen: &str) -> Result<Self, DomainError> {
        let parsed: Fen = fen
            .trim()
            .parse()
            .map_err(|e| DomainError::invalid_position(format!("{fen}: {e}")))?;
        let position: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| DomainError::invalid_position(format!("{fen}: {e}")))?;
        Ok(Self::from_position(position))
    }

    fn from_position(position: Chess) -> Self {
        let mut board = Self {
            start_fen: String::new(),
            position,
            history: Vec::new(),
            repetitions: HashMap::new(),
        };
        board.start_fen = board.fen();
        board.count_repetition();
        board
    }

    /// FEN serialization of the current position.
    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    pub fn start_fen(&self) -> &str {
        &self.start_fen
    }

    pub fn is_standard_start(&self) -> bool {
        self.start_fen == STANDARD_START_FEN
    }

    /// Moves applied since the start position, oldest first.
    pub fn history(&self) -> &[ChessMove] {
        &self.history
    }

    pub fn turn(&self) -> Side {
        self.position.turn().into()
    }

    pub fn fullmove_number(&self) -> u32 {
        self.position.fullmoves().get()
    }

    pub fn legal_moves(&self) -> Vec<ChessMove> {
        self.position
            .legal_moves()
            .iter()
            .map(ChessMove::from_move)
            .collect()
    }

    pub fn is_legal(&self, mv: &ChessMove) -> bool {
        self.resolve(mv).is_some()
    }

    /// Standard algebraic notation of `mv` in the current position, with a
    /// `+`/`#` suffix when it gives check or mate.
    pub fn san(&self, mv: &ChessMove) -> Result<String, DomainError> {
        let m = self
            .resolve(mv)
            .ok_or_else(|| DomainError::illegal_move(mv.to_string()))?;
        let san = San::from_move(&self.position, &m);

        let mut after = self.position.clone();
        after.play_unchecked(&m);
        let suffix = if after.is_checkmate() {
            "#"
        } else if after.is_check() {
            "+"
        } else {
            ""
        };
        Ok(format!("{san}{suffix}"))
    }

    /// Play `mv`. The board is untouched when the move is not legal.
    pub fn apply(&mut self, mv: &ChessMove) -> Result<(), DomainError> {
        let m = self
            .resolve(mv)
            .ok_or_else(|| DomainError::illegal_move(mv.to_string()))?;
        self.position.play_unchecked(&m);
        self.history.push(mv.clone());
        self.count_repetition();
        Ok(())
    }

    /// Classify the position. Automatic endings always apply; the fifty-move
    /// rule and threefold repetition only when `claim_draw` is set.
    pub fn outcome(&self, claim_draw: bool) -> Option<Outcome> {
        let pos = &self.position;
        let reason = if pos.is_checkmate() {
            let winner = self.turn().opponent();
            return Some(Outcome::new(GameResult::win_for(winner), Termination::Checkmate));
        } else if pos.is_insufficient_material() {
            Termination::InsufficientMaterial
        } else if pos.is_stalemate() {
            Termination::Stalemate
        } else if pos.halfmoves() >= 150 {
            Termination::SeventyFiveMoves
        } else if self.current_repetitions() >= 5 {
            Termination::FivefoldRepetition
        } else if claim_draw && self.can_claim_fifty_moves() {
            Termination::FiftyMoves
        } else if claim_draw && self.can_claim_threefold_repetition() {
            Termination::ThreefoldRepetition
        } else {
            return None;
        };
        Some(Outcome::new(GameResult::Draw, reason))
    }

    // The side to move may claim when the clock has run out, or when it can
    // run out with one more non-zeroing move.
    fn can_claim_fifty_moves(&self) -> bool {
        match self.position.halfmoves() {
            n if n >= 100 => true,
            99 => self
                .position
                .legal_moves()
                .iter()
                .any(|m| !m.is_zeroing()),
            _ => false,
        }
    }

    // Claimable when the position has occurred three times, or when one
    // legal move reaches a position that has already occurred twice.
    fn can_claim_threefold_repetition(&self) -> bool {
        if self.current_repetitions() >= 3 {
            return true;
        }
        self.position.legal_moves().iter().any(|m| {
            let mut after = self.position.clone();
            after.play_unchecked(m);
            self.repetitions
                .get(&repetition_key(&after))
                .is_some_and(|&seen| seen >= 2)
        })
    }

    fn resolve(&self, mv: &ChessMove) -> Option<Move> {
        self.position
            .legal_moves()
            .into_iter()
            .find(|m| m.to_uci(CastlingMode::Standard) == mv.0)
    }

    fn current_repetitions(&self) -> u32 {
        self.repetitions
            .get(&repetition_key(&self.position))
            .copied()
            .unwrap_or(0)
    }

    fn count_repetition(&mut self) {
        *self
            .repetitions
            .entry(repetition_key(&self.position))
            .or_insert(0) += 1;
    }
}

// Placement, side to move, castling rights and en passant square; move
// counters are not part of position identity.
fn repetition_key(position: &Chess) -> String {
    Fen::from_position(position.clone(), EnPassantMode::Legal)
        .to_string()
        .split(' ')
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(s: &str) -> ChessMove {
        s.parse().unwrap()
    }

    fn play(board: &mut Board, moves: &[&str]) {
        for m in moves {
            board.apply(&mv(m)).unwrap();
        }
    }

    #[test]
    fn new_board_is_standard_start() {
        let board = Board::new();
        assert_eq!(board.fen(), STANDARD_START_FEN);
        assert!(board.is_standard_start());
        assert_eq!(board.turn(), Side::White);
        assert_eq!(board.legal_moves().len(), 20);
    }

    #[test]
    fn legal_moves_use_uci_notation() {
        let moves: Vec<String> = Board::new()
            .legal_moves()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(moves.contains(&"e2e4".to_string()));
        assert!(moves.contains(&"g1f3".to_string()));
    }

    #[test]
    fn malformed_move_text_is_invalid_move() {
        let err = "hello".parse::<ChessMove>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidMove(_)));
    }

    #[test]
    fn illegal_move_leaves_board_unchanged() {
        let mut board = Board::new();
        let before = board.fen();

        let err = board.apply(&mv("e2e5")).unwrap_err();

        assert!(matches!(err, DomainError::IllegalMove(_)));
        assert_eq!(board.fen(), before);
        assert!(board.history().is_empty());
    }

    #[test]
    fn apply_updates_position_and_history() {
        let mut board = Board::new();
        play(&mut board, &["e2e4"]);
        assert_eq!(
            board.fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
        assert_eq!(board.turn(), Side::Black);
        assert_eq!(board.history(), &[mv("e2e4")]);
    }

    #[test]
    fn castling_accepts_king_two_squares() {
        let mut board = Board::new();
        play(&mut board, &["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6"]);
        assert!(board.is_legal(&mv("e1g1")));
        assert_eq!(board.san(&mv("e1g1")).unwrap(), "O-O");
    }

    #[test]
    fn fools_mate_is_black_win() {
        let mut board = Board::new();
        play(&mut board, &["f2f3", "e7e5", "g2g4"]);
        assert!(board.outcome(false).is_none());
        assert_eq!(board.san(&mv("d8h4")).unwrap(), "Qh4#");

        play(&mut board, &["d8h4"]);
        let outcome = board.outcome(false).unwrap();
        assert_eq!(outcome.result, GameResult::BlackWins);
        assert_eq!(outcome.reason, Termination::Checkmate);
        assert!(board.legal_moves().is_empty());
    }

    #[test]
    fn stalemate_is_draw() {
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        let outcome = board.outcome(false).unwrap();
        assert_eq!(outcome.result, GameResult::Draw);
        assert_eq!(outcome.reason, Termination::Stalemate);
    }

    #[test]
    fn bare_kings_are_insufficient_material() {
        let board = Board::from_fen("8/8/4k3/8/8/4K3/8/8 w - - 0 1").unwrap();
        assert_eq!(
            board.outcome(false).unwrap().reason,
            Termination::InsufficientMaterial
        );
    }

    #[test]
    fn threefold_repetition_needs_a_claim() {
        let mut board = Board::new();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        play(&mut board, &shuffle);
        play(&mut board, &shuffle);

        assert!(board.outcome(false).is_none());
        let outcome = board.outcome(true).unwrap();
        assert_eq!(outcome.result, GameResult::Draw);
        assert_eq!(outcome.reason, Termination::ThreefoldRepetition);
    }

    #[test]
    fn fifty_move_rule_needs_a_claim() {
        let board = Board::from_fen("8/8/4k3/8/8/4K3/4R3/8 w - - 100 80").unwrap();
        assert!(board.outcome(false).is_none());
        assert_eq!(board.outcome(true).unwrap().reason, Termination::FiftyMoves);
    }

    #[test]
    fn threefold_repetition_is_claimable_one_move_ahead() {
        let mut board = Board::new();
        play(
            &mut board,
            &["g1f3", "g8f6", "b1c3", "f6g8", "c3b1", "b8c6", "b1c3", "c6b8"],
        );
        // c3b1 would reach the position after 3. Nb1 a third time
        assert!(board.outcome(false).is_none());
        let outcome = board.outcome(true).unwrap();
        assert_eq!(outcome.result, GameResult::Draw);
        assert_eq!(outcome.reason, Termination::ThreefoldRepetition);
    }

    #[test]
    fn fifty_move_rule_is_claimable_one_move_ahead() {
        let board = Board::from_fen("8/8/4k3/8/8/4K3/4R3/8 w - - 99 80").unwrap();
        assert!(board.outcome(false).is_none());
        assert_eq!(board.outcome(true).unwrap().reason, Termination::FiftyMoves);
    }

    #[test]
    fn fifty_move_claim_needs_a_non_zeroing_move() {
        // Kxa7 is the only legal move and it resets the clock
        let board = Board::from_fen("k7/P1K5/8/8/8/8/8/8 b - - 99 80").unwrap();
        assert_eq!(board.legal_moves(), vec![mv("a8a7")]);
        assert!(board.outcome(true).is_none());
    }

    #[test]
    fn seventy_five_move_rule_is_automatic() {
        let board = Board::from_fen("8/8/4k3/8/8/4K3/4R3/8 w - - 150 100").unwrap();
        assert_eq!(
            board.outcome(false).unwrap().reason,
            Termination::SeventyFiveMoves
        );
    }

    #[test]
    fn invalid_fen_is_rejected() {
        let err = Board::from_fen("not a fen").unwrap_err();
        assert!(matches!(err, DomainError::InvalidPosition(_)));
    }

    #[test]
    fn custom_start_is_not_standard() {
        let board = Board::from_fen("8/8/4k3/8/8/4K3/4R3/8 w - - 0 1").unwrap();
        assert!(!board.is_standard_start());
        assert_eq!(board.start_fen(), "8/8/4k3/8/8/4K3/4R3/8 w - - 0 1");
    }
}
