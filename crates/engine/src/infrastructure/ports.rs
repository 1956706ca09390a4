//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - Position analysis (a UCI engine subprocess in production)
//! - Clock (for testing)

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use kibitz_domain::{Board, CandidateLine, ChessMove};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine process could not be launched or failed its handshake
    #[error("Engine startup failed: {0}")]
    Startup(String),
    /// Reading from or writing to the engine failed, or it went silent
    #[error("Engine I/O failed: {0}")]
    Io(String),
    /// The engine answered with something unusable
    #[error("Engine protocol error: {0}")]
    Protocol(String),
}

// =============================================================================
// Analysis
// =============================================================================

/// Everything the engine needs to analyse the current position of a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// FEN the game started from
    pub start_fen: String,
    /// Moves played since `start_fen`, oldest first
    pub moves: Vec<ChessMove>,
    /// Think time for this request
    pub time_budget: Duration,
    /// Number of principal variations to return
    pub variations: u32,
}

impl AnalysisRequest {
    pub fn for_board(board: &Board, time_budget: Duration, variations: u32) -> Self {
        Self {
            start_fen: board.start_fen().to_string(),
            moves: board.history().to_vec(),
            time_budget,
            variations,
        }
    }
}

/// One running engine instance, owned by exactly one game session.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Scored candidate lines for the request's final position, in the order
    /// the engine ranked them.
    async fn analyse(&mut self, request: &AnalysisRequest)
        -> Result<Vec<CandidateLine>, EngineError>;

    /// Ask the engine to terminate. Returns immediately; safe to call more
    /// than once.
    fn stop(&mut self);
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisEngineFactory: Send + Sync {
    async fn start(&self) -> Result<Box<dyn AnalysisEngine>, EngineError>;
}

// =============================================================================
// Testability Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
