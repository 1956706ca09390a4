//! Application state and composition.

use std::sync::Arc;

use crate::api::SessionRegistry;
use crate::infrastructure::config::GameConfig;
use crate::infrastructure::ports::{AnalysisEngineFactory, ClockPort};

/// Main application state.
///
/// Passed to HTTP/WebSocket handlers via Axum state.
pub struct App {
    pub game: Arc<GameConfig>,
    pub registry: Arc<SessionRegistry>,
    pub engines: Arc<dyn AnalysisEngineFactory>,
    pub clock: Arc<dyn ClockPort>,
}

impl App {
    pub fn new(
        game: GameConfig,
        engines: Arc<dyn AnalysisEngineFactory>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            game: Arc::new(game),
            registry: Arc::new(SessionRegistry::new()),
            engines,
            clock,
        }
    }
}
