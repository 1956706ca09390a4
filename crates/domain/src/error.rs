//! Unified error types for the domain layer
//!
//! Every rules, evaluation and transcript operation reports failures through
//! [`DomainError`], so the engine crate can classify them without inspecting
//! strings.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Move text is not valid long algebraic (UCI) notation
    #[error("Invalid move notation: {0}")]
    InvalidMove(String),

    /// Move is well-formed but not legal in the current position
    #[error("Illegal move: {0}")]
    IllegalMove(String),

    /// Position text could not be parsed or describes an impossible position
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Header is written by finalization only
    #[error("Tag {0} is reserved for game finalization")]
    ReservedTag(&'static str),

    /// Transcript was already finalized
    #[error("Transcript already finalized")]
    TranscriptFinalized,
}

impl DomainError {
    /// Create an invalid move notation error
    pub fn invalid_move(msg: impl Into<String>) -> Self {
        Self::InvalidMove(msg.into())
    }

    /// Create an illegal move error
    pub fn illegal_move(msg: impl Into<String>) -> Self {
        Self::IllegalMove(msg.into())
    }

    /// Create an invalid position error
    pub fn invalid_position(msg: impl Into<String>) -> Self {
        Self::InvalidPosition(msg.into())
    }
}
