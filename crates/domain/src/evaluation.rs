//! Scored candidate lines returned by an analysis engine and the policy the
//! computer opponent uses to pick among them.

use crate::board::ChessMove;

/// Magnitude used for forced-mate scores when comparing lines.
pub const MATE_SCORE_CAP: i32 = 100_000;

/// Engine score from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Material-style evaluation in hundredths of a pawn.
    Centipawns(i32),
    /// Mate in N moves; negative when the side to move is getting mated.
    Mate(i32),
}

impl Score {
    /// Collapse the score onto a single numeric scale, mapping mates to
    /// `±mate_score` minus the distance to mate.
    pub fn capped(self, mate_score: i32) -> i32 {
        match self {
            Self::Centipawns(cp) => cp,
            Self::Mate(moves) if moves > 0 => mate_score.saturating_sub(moves),
            Self::Mate(moves) => mate_score.saturating_neg().saturating_sub(moves),
        }
    }
}

/// One principal variation with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLine {
    pub continuation: Vec<ChessMove>,
    pub score: Score,
}

impl CandidateLine {
    pub fn new(continuation: Vec<ChessMove>, score: Score) -> Self {
        Self {
            continuation,
            score,
        }
    }

    pub fn first_move(&self) -> Option<&ChessMove> {
        self.continuation.first()
    }

    fn deviation(&self) -> u32 {
        self.score.capped(MATE_SCORE_CAP).unsigned_abs()
    }
}

/// Pick the line that keeps the game closest to equal: smallest absolute
/// capped score, first one wins on ties. Lines without moves are skipped.
pub fn select_closest(candidates: &[CandidateLine]) -> Option<&CandidateLine> {
    candidates
        .iter()
        .filter(|line| line.first_move().is_some())
        .min_by_key(|line| line.deviation())
}
