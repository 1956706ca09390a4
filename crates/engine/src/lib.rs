//! Kibitz Engine library.
//!
//! Server side of the kibitz chess server: a human plays the computer over a
//! WebSocket, one engine process per game.
//!
//! ## Structure
//!
//! - `use_cases/` - The game session state machine
//! - `infrastructure/` - Ports, configuration and the UCI engine adapter
//! - `api/` - HTTP and WebSocket entry points, session registry
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
