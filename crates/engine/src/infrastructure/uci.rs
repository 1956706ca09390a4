//! UCI analysis engine running as a child process.
//!
//! One process per game session. Commands go to the engine's stdin, replies
//! are read line by line from its stdout.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use kibitz_domain::{CandidateLine, ChessMove, Score, STANDARD_START_FEN};

use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::ports::{
    AnalysisEngine, AnalysisEngineFactory, AnalysisRequest, EngineError,
};

/// Launches a fresh [`UciEngine`] for every game.
pub struct UciEngineFactory {
    config: EngineConfig,
}

impl UciEngineFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AnalysisEngineFactory for UciEngineFactory {
    async fn start(&self) -> Result<Box<dyn AnalysisEngine>, EngineError> {
        let engine = UciEngine::spawn(&self.config).await?;
        Ok(Box::new(engine))
    }
}

pub struct UciEngine {
    // None once stop() has handed the process to the reaper task
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    analysis_grace: Duration,
    quit_grace: Duration,
}

impl UciEngine {
    /// Launch the engine and complete the UCI handshake.
    pub async fn spawn(config: &EngineConfig) -> Result<Self, EngineError> {
        tracing::debug!(path = %config.path, args = ?config.args, "Starting analysis engine");

        let mut child = Command::new(&config.path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Startup(format!("{}: {e}", config.path)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Startup("engine stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Startup("engine stdout not captured".to_string()))?;

        let mut engine = Self {
            child: Some(child),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            analysis_grace: config.analysis_grace,
            quit_grace: config.quit_grace,
        };

        match tokio::time::timeout(config.startup_timeout, engine.handshake()).await {
            Ok(Ok(())) => {
                tracing::debug!(path = %config.path, "Analysis engine ready");
                Ok(engine)
            }
            Ok(Err(e)) => {
                engine.stop();
                Err(EngineError::Startup(e.to_string()))
            }
            Err(_) => {
                engine.stop();
                Err(EngineError::Startup(format!(
                    "no handshake within {}ms",
                    config.startup_timeout.as_millis()
                )))
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), EngineError> {
        self.send("uci").await?;
        self.wait_for("uciok").await?;
        self.send("ucinewgame").await?;
        self.send("isready").await?;
        self.wait_for("readyok").await
    }

    async fn send(&mut self, command: &str) -> Result<(), EngineError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EngineError::Io("engine already stopped".to_string()))?;
        tracing::trace!(command, "uci >");
        stdin
            .write_all(format!("{command}\n").as_bytes())
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| EngineError::Io(e.to_string()))
    }

    async fn read_line(&mut self) -> Result<String, EngineError> {
        match self.stdout.next_line().await {
            Ok(Some(line)) => {
                tracing::trace!(line = %line, "uci <");
                Ok(line)
            }
            Ok(None) => Err(EngineError::Io("engine closed its output".to_string())),
            Err(e) => Err(EngineError::Io(e.to_string())),
        }
    }

    async fn wait_for(&mut self, token: &str) -> Result<(), EngineError> {
        loop {
            if self.read_line().await?.trim() == token {
                return Ok(());
            }
        }
    }

    /// Latest info line per variation until the engine reports `bestmove`.
    async fn collect_lines(&mut self) -> Result<Vec<CandidateLine>, EngineError> {
        let mut lines = BTreeMap::new();
        loop {
            let line = self.read_line().await?;
            if line.starts_with("bestmove") {
                return Ok(lines.into_values().collect());
            }
            if let Some((rank, candidate)) = parse_info(&line) {
                lines.insert(rank, candidate);
            }
        }
    }
}

#[async_trait]
impl AnalysisEngine for UciEngine {
    async fn analyse(
        &mut self,
        request: &AnalysisRequest,
    ) -> Result<Vec<CandidateLine>, EngineError> {
        self.send(&format!(
            "setoption name MultiPV value {}",
            request.variations.max(1)
        ))
        .await?;
        self.send(&position_command(request)).await?;
        self.send(&format!("go movetime {}", request.time_budget.as_millis()))
            .await?;

        let limit = request.time_budget + self.analysis_grace;
        match tokio::time::timeout(limit, self.collect_lines()).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Io(format!(
                "no bestmove within {}ms",
                limit.as_millis()
            ))),
        }
    }

    fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let stdin = self.stdin.take();
        let grace = self.quit_grace;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let _ = child.start_kill();
            return;
        };
        runtime.spawn(async move {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(b"quit\n").await;
                let _ = stdin.flush().await;
            }
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "Analysis engine exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Failed to reap analysis engine"),
                Err(_) => {
                    tracing::warn!("Analysis engine ignored quit, killing it");
                    let _ = child.kill().await;
                }
            }
        });
    }
}

fn position_command(request: &AnalysisRequest) -> String {
    let mut command = if request.start_fen == STANDARD_START_FEN {
        "position startpos".to_string()
    } else {
        format!("position fen {}", request.start_fen)
    };
    if !request.moves.is_empty() {
        command.push_str(" moves");
        for mv in &request.moves {
            command.push(' ');
            command.push_str(&mv.to_string());
        }
    }
    command
}

/// Parse an `info` line carrying a scored principal variation. Returns the
/// variation rank (1 when the engine does not report one) and the line.
fn parse_info(line: &str) -> Option<(u32, CandidateLine)> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "info" {
        return None;
    }

    let mut rank = 1;
    let mut score = None;
    let mut continuation = Vec::new();
    while let Some(token) = tokens.next() {
        match token {
            "string" => return None,
            "multipv" => rank = tokens.next()?.parse().ok()?,
            "score" => {
                score = match (tokens.next()?, tokens.next()?.parse::<i32>().ok()?) {
                    ("cp", value) => Some(Score::Centipawns(value)),
                    ("mate", value) => Some(Score::Mate(value)),
                    _ => return None,
                };
            }
            "pv" => {
                continuation = tokens
                    .by_ref()
                    .map_while(|t| t.parse::<ChessMove>().ok())
                    .collect();
            }
            _ => {}
        }
    }

    match (score, continuation.is_empty()) {
        (Some(score), false) => Some((rank, CandidateLine::new(continuation, score))),
        _ => None,
    }
}
