//! WebSocket message types for client-server communication
//!
//! The client drives the game with JSON-RPC style requests
//! (`{"method": "move", "params": {"move": "e2e4"}}`); the server answers
//! with event messages that always carry the current position and the legal
//! moves for the side to move.

use serde::{Deserialize, Serialize};

use kibitz_domain::{Board, GameResult, Side};

/// Colour assigned to the human player.
pub type PlayerColor = Side;

// =============================================================================
// Client Messages (client → server)
// =============================================================================

/// Requests from the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Play a move in long algebraic notation
    Move {
        #[serde(rename = "move")]
        mv: String,
    },
}

// =============================================================================
// Server Messages (server → client)
// =============================================================================

/// Event-specific payload of a [`ServerMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Session is ready for the first move
    Ready { player_color: PlayerColor },
    /// The last move was not legal; the position is unchanged
    RejectMove,
    /// The player's move was applied
    AcceptMove { lastmove: String },
    /// The computer replied
    ComputerMoved { lastmove: String },
    /// Full game transcript in PGN
    Pgn { pgn: String },
    /// The game is over
    GameOver { result: GameResult },
}

/// Message from the server: an event plus a snapshot of the position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(flatten)]
    pub event: ServerEvent,
    /// FEN of the current position
    pub board: String,
    /// Legal moves for the side to move, in long algebraic notation
    pub legalmoves: Vec<String>,
}

impl ServerMessage {
    /// Attach `board`'s current position to `event`.
    pub fn snapshot(event: ServerEvent, board: &Board) -> Self {
        Self {
            event,
            board: board.fen(),
            legalmoves: board.legal_moves().iter().map(ToString::to_string).collect(),
        }
    }

    /// Short name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self.event {
            ServerEvent::Ready { .. } => "ready",
            ServerEvent::RejectMove => "reject_move",
            ServerEvent::AcceptMove { .. } => "accept_move",
            ServerEvent::ComputerMoved { .. } => "computer_moved",
            ServerEvent::Pgn { .. } => "pgn",
            ServerEvent::GameOver { .. } => "game_over",
        }
    }
}
