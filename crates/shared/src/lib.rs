//! Kibitz Protocol - wire types shared by the server and its clients
//!
//! - WebSocket message types (`ClientMessage`, `ServerMessage`)
//! - HTTP response bodies
//!
//! Pure data types and serialization; no I/O.

pub mod messages;
pub mod responses;

pub use messages::{ClientMessage, PlayerColor, ServerEvent, ServerMessage};
pub use responses::StatusResponse;
