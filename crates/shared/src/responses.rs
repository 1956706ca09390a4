//! HTTP response bodies

use serde::{Deserialize, Serialize};

/// Body of `GET /status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Sessions currently registered
    pub games: usize,
    /// Tasks alive on the async runtime
    pub all_tasks: usize,
    /// Games started since the process came up
    pub total_recent_games: u64,
}
