//! Use cases - game orchestration over domain types and ports.

pub mod game_session;

pub use game_session::{GameSession, OutboundFrame, SessionEnd, SessionError, SessionState};
