//! Application configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Interface to listen on
    pub server_host: String,
    /// HTTP/WebSocket port
    pub server_port: u16,

    /// Analysis engine process settings
    pub engine: EngineConfig,

    /// Per-game settings
    pub game: GameConfig,
}

/// How to launch and talk to the UCI engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Executable name or path
    pub path: String,
    /// Extra command-line arguments
    pub args: Vec<String>,
    /// Limit for the `uci`/`isready` handshake
    pub startup_timeout: Duration,
    /// Extra time on top of the think time before a silent engine counts as failed
    pub analysis_grace: Duration,
    /// Time a stopped engine gets to exit before it is killed
    pub quit_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "stockfish".to_string(),
            args: Vec::new(),
            startup_timeout: Duration::from_secs(10),
            analysis_grace: Duration::from_secs(5),
            quit_grace: Duration::from_secs(2),
        }
    }
}

/// Game rules and transcript headers
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Think time for each computer move
    pub think_time: Duration,
    /// Candidate lines requested from the engine per move
    pub variations: u32,
    /// Event header
    pub event: String,
    /// Site header
    pub site: String,
    /// Name recorded for the human player
    pub human_name: String,
    /// Name recorded for the computer
    pub computer_name: String,
    /// How long a message may wait for room in a connection's outbound
    /// queue before the peer is treated as gone
    pub send_timeout: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            think_time: Duration::from_secs(1),
            variations: 100,
            event: "Casual game".to_string(),
            site: "?".to_string(),
            human_name: "Player".to_string(),
            computer_name: "Stockfish".to_string(),
            send_timeout: Duration::from_secs(2),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let engine_defaults = EngineConfig::default();
        let game_defaults = GameConfig::default();

        Ok(Self {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_or(&lookup, "PORT", 3000)
                .context("PORT must be a valid port number")?,

            engine: EngineConfig {
                path: lookup("ENGINE_PATH").unwrap_or(engine_defaults.path),
                args: lookup("ENGINE_ARGS")
                    .map(|s| s.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                startup_timeout: Duration::from_millis(
                    parse_or(&lookup, "ENGINE_STARTUP_TIMEOUT_MS", 10_000)
                        .context("ENGINE_STARTUP_TIMEOUT_MS must be a number of milliseconds")?,
                ),
                ..engine_defaults
            },

            game: GameConfig {
                think_time: Duration::from_millis(
                    parse_or(&lookup, "ENGINE_THINK_TIME_MS", 1_000)
                        .context("ENGINE_THINK_TIME_MS must be a number of milliseconds")?,
                ),
                variations: parse_or(&lookup, "ENGINE_MULTIPV", 100)
                    .context("ENGINE_MULTIPV must be a positive integer")?,
                event: lookup("GAME_EVENT").unwrap_or(game_defaults.event),
                site: lookup("GAME_SITE").unwrap_or(game_defaults.site),
                human_name: lookup("HUMAN_PLAYER_NAME").unwrap_or(game_defaults.human_name),
                computer_name: lookup("COMPUTER_PLAYER_NAME")
                    .unwrap_or(game_defaults.computer_name),
                ..game_defaults
            },
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => Ok(raw.trim().parse()?),
        None => Ok(default),
    }
}
