//! One game between a connected player and the computer.
//!
//! A [`GameSession`] exclusively owns its board, transcript and engine
//! process. The session task feeds it inbound text frames in receipt order
//! and it answers through the outbound channel; nothing else touches the
//! game state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kibitz_domain::{
    select_closest, Board, ChessMove, DomainError, Outcome, SessionId, Side, TagKey,
    TranscriptRecorder,
};
use kibitz_shared::{ClientMessage, ServerEvent, ServerMessage};

use crate::api::sessions::RegistryError;
use crate::infrastructure::config::GameConfig;
use crate::infrastructure::ports::{
    AnalysisEngine, AnalysisEngineFactory, AnalysisRequest, ClockPort, EngineError,
};

/// WebSocket close codes used when a session ends.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Termination reason written to the transcript when a game concludes.
const TERMINATION_NORMAL: &str = "normal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    AwaitingPlayerMove,
    ComputerThinking,
    GameOver,
    Closed,
}

/// What the session wants written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Message(ServerMessage),
    Close { code: u16, reason: String },
}

/// Why a session stopped running.
#[derive(Debug)]
pub enum SessionEnd {
    GameOver(Outcome),
    PeerGone,
    Shutdown,
    Failed(SessionError),
}

impl SessionEnd {
    /// Close frame to send, if the peer is still there to receive one.
    pub fn close_frame(&self) -> Option<OutboundFrame> {
        let (code, reason) = match self {
            Self::GameOver(_) => (close_code::NORMAL, "Game over"),
            Self::Shutdown => (close_code::GOING_AWAY, "Server shutdown"),
            Self::Failed(_) => (close_code::INTERNAL_ERROR, "Internal error"),
            Self::PeerGone => return None,
        };
        Some(OutboundFrame::Close {
            code,
            reason: reason.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Peer connection is gone")]
    PeerGone,
}

pub struct GameSession {
    id: SessionId,
    state: SessionState,
    player_color: Side,
    board: Board,
    transcript: TranscriptRecorder,
    engine: Option<Box<dyn AnalysisEngine>>,
    outbound: mpsc::Sender<OutboundFrame>,
    config: Arc<GameConfig>,
}

impl GameSession {
    /// Start the engine and prepare a new game. The session is not yet
    /// visible to the player; call [`GameSession::open`] next.
    pub async fn start(
        id: SessionId,
        config: Arc<GameConfig>,
        engines: &dyn AnalysisEngineFactory,
        clock: &dyn ClockPort,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Result<Self, SessionError> {
        let engine = engines.start().await?;

        let board = Board::new();
        let player_color = Side::White;
        let mut transcript = TranscriptRecorder::for_board(&board);
        transcript.add_header(TagKey::Event, config.event.as_str())?;
        transcript.add_header(TagKey::Site, config.site.as_str())?;
        transcript.record_start_time(clock.now())?;
        transcript.add_header(TagKey::Mode, "ICS")?;
        transcript.add_header(TagKey::Round, "-")?;
        let (white, black) = match player_color {
            Side::White => (&config.human_name, &config.computer_name),
            Side::Black => (&config.computer_name, &config.human_name),
        };
        transcript.add_header(TagKey::White, white.as_str())?;
        transcript.add_header(TagKey::Black, black.as_str())?;

        tracing::info!(session_id = %id, "Game session started");

        Ok(Self {
            id,
            state: SessionState::Initializing,
            player_color,
            board,
            transcript,
            engine: Some(engine),
            outbound,
            config,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn transcript(&self) -> &TranscriptRecorder {
        &self.transcript
    }

    /// Tell the player the game is on.
    pub async fn open(&mut self) -> Result<(), SessionError> {
        self.send(ServerEvent::Ready {
            player_color: self.player_color,
        })
        .await?;
        self.state = SessionState::AwaitingPlayerMove;
        Ok(())
    }

    /// Process inbound frames until the game ends, the peer leaves or a
    /// shutdown is requested.
    pub async fn run(
        &mut self,
        mut inbound: mpsc::Receiver<String>,
        shutdown: CancellationToken,
        peer_gone: CancellationToken,
    ) -> SessionEnd {
        loop {
            let text = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return self.interrupt().await,
                text = inbound.recv() => match text {
                    Some(text) => text,
                    None => return SessionEnd::PeerGone,
                },
            };

            match self.handle_text(&text, &shutdown, &peer_gone).await {
                Ok(None) => {}
                Ok(Some(end)) => return end,
                Err(SessionError::PeerGone) => return SessionEnd::PeerGone,
                Err(e) => return SessionEnd::Failed(e),
            }
        }
    }

    /// Tear the session down: say goodbye if the peer is still there and
    /// stop the engine. Does not wait for the engine process to exit.
    pub async fn close(&mut self, end: &SessionEnd) {
        if self.state == SessionState::Closed {
            return;
        }
        match end {
            SessionEnd::Failed(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Game session failed")
            }
            _ => tracing::info!(session_id = %self.id, end = ?end, "Game session closing"),
        }

        if let Some(frame) = end.close_frame() {
            let _ = self.deliver(frame).await;
        }
        self.stop_engine();
        self.state = SessionState::Closed;
    }

    async fn handle_text(
        &mut self,
        text: &str,
        shutdown: &CancellationToken,
        peer_gone: &CancellationToken,
    ) -> Result<Option<SessionEnd>, SessionError> {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Move { mv }) => self.handle_move(&mv, shutdown, peer_gone).await,
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Ignoring malformed message");
                Ok(None)
            }
        }
    }

    async fn handle_move(
        &mut self,
        text: &str,
        shutdown: &CancellationToken,
        peer_gone: &CancellationToken,
    ) -> Result<Option<SessionEnd>, SessionError> {
        if self.state != SessionState::AwaitingPlayerMove {
            tracing::debug!(session_id = %self.id, state = ?self.state, "Move outside player turn");
            self.send(ServerEvent::RejectMove).await?;
            return Ok(None);
        }

        let mv = match text.parse::<ChessMove>() {
            Ok(mv) if self.board.is_legal(&mv) => mv,
            _ => {
                tracing::debug!(session_id = %self.id, mv = %text, "Move rejected");
                self.send(ServerEvent::RejectMove).await?;
                return Ok(None);
            }
        };

        self.play(&mv)?;
        tracing::debug!(session_id = %self.id, mv = %mv, "Move accepted");
        self.send(ServerEvent::AcceptMove {
            lastmove: mv.to_string(),
        })
        .await?;

        if let Some(outcome) = self.board.outcome(false) {
            return self.finish(outcome).await.map(Some);
        }
        self.computer_turn(shutdown, peer_gone).await
    }

    async fn computer_turn(
        &mut self,
        shutdown: &CancellationToken,
        peer_gone: &CancellationToken,
    ) -> Result<Option<SessionEnd>, SessionError> {
        self.state = SessionState::ComputerThinking;
        let request =
            AnalysisRequest::for_board(&self.board, self.config.think_time, self.config.variations);

        let analysed = {
            let engine = self
                .engine
                .as_mut()
                .ok_or_else(|| EngineError::Io("engine already stopped".to_string()))?;
            tokio::select! {
                result = engine.analyse(&request) => Ok(result),
                _ = shutdown.cancelled() => Err(SessionEnd::Shutdown),
                _ = peer_gone.cancelled() => Err(SessionEnd::PeerGone),
            }
        };
        let lines = match analysed {
            Ok(result) => result?,
            Err(SessionEnd::Shutdown) => return Ok(Some(self.interrupt().await)),
            Err(end) => return Ok(Some(end)),
        };

        let reply = select_closest(&lines)
            .and_then(|line| line.first_move())
            .cloned()
            .ok_or_else(|| EngineError::Protocol("no candidate moves returned".to_string()))?;

        self.play(&reply)?;
        tracing::debug!(
            session_id = %self.id,
            mv = %reply,
            candidates = lines.len(),
            "Computer moved"
        );
        self.send(ServerEvent::ComputerMoved {
            lastmove: reply.to_string(),
        })
        .await?;

        if let Some(outcome) = self.board.outcome(true) {
            return self.finish(outcome).await.map(Some);
        }
        self.state = SessionState::AwaitingPlayerMove;
        Ok(None)
    }

    // Transcript first: SAN needs the position before the move, and an
    // illegal move fails there without touching either.
    fn play(&mut self, mv: &ChessMove) -> Result<(), DomainError> {
        self.transcript.add_move(&self.board, mv)?;
        self.board.apply(mv)
    }

    async fn finish(&mut self, outcome: Outcome) -> Result<SessionEnd, SessionError> {
        self.state = SessionState::GameOver;
        self.transcript.finalize(outcome.result, TERMINATION_NORMAL)?;
        tracing::info!(
            session_id = %self.id,
            result = %outcome.result,
            reason = %outcome.reason,
            moves = self.transcript.len(),
            "Game over"
        );

        self.send(ServerEvent::Pgn {
            pgn: self.transcript.render(),
        })
        .await?;
        self.send(ServerEvent::GameOver {
            result: outcome.result,
        })
        .await?;
        Ok(SessionEnd::GameOver(outcome))
    }

    /// Shutdown notice: hand the player the game so far.
    async fn interrupt(&mut self) -> SessionEnd {
        if matches!(
            self.state,
            SessionState::AwaitingPlayerMove | SessionState::ComputerThinking
        ) {
            let pgn = self.transcript.render();
            if self.send(ServerEvent::Pgn { pgn }).await.is_err() {
                return SessionEnd::PeerGone;
            }
        }
        SessionEnd::Shutdown
    }

    async fn send(&self, event: ServerEvent) -> Result<(), SessionError> {
        let message = ServerMessage::snapshot(event, &self.board);
        tracing::trace!(session_id = %self.id, event = message.kind(), "Sending");
        self.deliver(OutboundFrame::Message(message)).await
    }

    // A peer that stops reading eventually fills the queue; past the send
    // timeout it counts as gone.
    async fn deliver(&self, frame: OutboundFrame) -> Result<(), SessionError> {
        match tokio::time::timeout(self.config.send_timeout, self.outbound.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SessionError::PeerGone),
            Err(_) => {
                tracing::warn!(session_id = %self.id, "Peer is not reading, dropping connection");
                Err(SessionError::PeerGone)
            }
        }
    }

    fn stop_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
            tracing::debug!(session_id = %self.id, "Analysis engine stop requested");
        }
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.stop_engine();
    }
}
