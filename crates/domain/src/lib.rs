//! Chess domain for the kibitz server: positions and move legality, game
//! outcomes, the computer's move-selection policy and the PGN transcript.
//!
//! Nothing in here touches I/O. The engine crate wires these types to the
//! analysis engine process and to WebSocket clients.

pub mod board;
pub mod error;
pub mod evaluation;
pub mod ids;
pub mod outcome;
pub mod transcript;

pub use board::{Board, ChessMove, Side, STANDARD_START_FEN};
pub use error::DomainError;
pub use evaluation::{select_closest, CandidateLine, Score, MATE_SCORE_CAP};
pub use ids::SessionId;
pub use outcome::{GameResult, Outcome, Termination};
pub use transcript::{parse_tags, TagKey, TranscriptRecorder};
