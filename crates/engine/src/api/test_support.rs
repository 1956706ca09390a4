//! Shared fakes and WebSocket helpers for engine tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use kibitz_domain::{Board, CandidateLine, ChessMove, Score};
use kibitz_shared::ServerMessage;

use crate::app::App;
use crate::infrastructure::clock::FixedClock;
use crate::infrastructure::config::GameConfig;
use crate::infrastructure::ports::{
    AnalysisEngine, AnalysisEngineFactory, AnalysisRequest, EngineError,
};

pub(crate) type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub(crate) fn line(moves: &[&str], score: Score) -> CandidateLine {
    CandidateLine::new(moves.iter().map(|m| m.parse().unwrap()).collect(), score)
}

// =============================================================================
// Fake analysis engine
// =============================================================================

/// Scripted answer to one analysis request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Lines(Vec<CandidateLine>),
    Fail,
    /// Never answers
    Hang,
}

#[derive(Default)]
struct ProbeState {
    started: usize,
    stopped: usize,
    requests: Vec<AnalysisRequest>,
}

/// Shared record of what the fake engines were asked to do.
#[derive(Clone, Default)]
pub(crate) struct EngineProbe(Arc<Mutex<ProbeState>>);

impl EngineProbe {
    pub(crate) fn started(&self) -> usize {
        self.0.lock().started
    }

    pub(crate) fn stopped(&self) -> usize {
        self.0.lock().stopped
    }

    pub(crate) fn requests(&self) -> Vec<AnalysisRequest> {
        self.0.lock().requests.clone()
    }
}

/// Hands out engines that answer from a shared script. Once the script runs
/// out they play the first legal move.
#[derive(Clone, Default)]
pub(crate) struct FakeEngineFactory {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    probe: EngineProbe,
}

impl FakeEngineFactory {
    pub(crate) fn with_replies(replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            probe: EngineProbe::default(),
        }
    }

    pub(crate) fn probe(&self) -> EngineProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl AnalysisEngineFactory for FakeEngineFactory {
    async fn start(&self) -> Result<Box<dyn AnalysisEngine>, EngineError> {
        self.probe.0.lock().started += 1;
        Ok(Box::new(FakeEngine {
            replies: self.replies.clone(),
            probe: self.probe.clone(),
            stopped: false,
        }))
    }
}

struct FakeEngine {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    probe: EngineProbe,
    stopped: bool,
}

#[async_trait]
impl AnalysisEngine for FakeEngine {
    async fn analyse(
        &mut self,
        request: &AnalysisRequest,
    ) -> Result<Vec<CandidateLine>, EngineError> {
        self.probe.0.lock().requests.push(request.clone());
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Lines(lines)) => Ok(lines),
            Some(Reply::Fail) => Err(EngineError::Io("engine crashed".to_string())),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(first_legal(request)),
        }
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.probe.0.lock().stopped += 1;
        }
    }
}

fn first_legal(request: &AnalysisRequest) -> Vec<CandidateLine> {
    let mut board = Board::from_fen(&request.start_fen).unwrap();
    for mv in &request.moves {
        board.apply(mv).unwrap();
    }
    board
        .legal_moves()
        .into_iter()
        .take(1)
        .map(|mv: ChessMove| CandidateLine::new(vec![mv], Score::Centipawns(0)))
        .collect()
}

// =============================================================================
// Server + client helpers
// =============================================================================

pub(crate) fn test_app(engines: FakeEngineFactory) -> Arc<App> {
    Arc::new(App::new(
        GameConfig::default(),
        Arc::new(engines),
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())),
    ))
}

pub(crate) async fn spawn_ws_server(app: Arc<App>) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let router = super::router(app);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, handle)
}

pub(crate) async fn ws_connect(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{}/socket", addr);
    let (ws, _resp) = connect_async(url).await.unwrap();
    ws
}

pub(crate) async fn ws_send_move(ws: &mut WsClient, mv: &str) {
    let json = serde_json::json!({"method": "move", "params": {"move": mv}}).to_string();
    ws.send(WsMessage::Text(json.into())).await.unwrap();
}

pub(crate) async fn ws_send_raw(ws: &mut WsClient, text: &str) {
    ws.send(WsMessage::Text(text.to_string().into())).await.unwrap();
}

/// Next frame from the server: a decoded message, or the close code.
pub(crate) async fn ws_recv_server(ws: &mut WsClient) -> Result<ServerMessage, Option<u16>> {
    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return Ok(serde_json::from_str::<ServerMessage>(&text).unwrap());
            }
            Some(Ok(WsMessage::Close(frame))) => return Err(frame.map(|f| u16::from(f.code))),
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return Err(None),
        }
    }
}

pub(crate) async fn ws_expect_message(ws: &mut WsClient, timeout: Duration) -> ServerMessage {
    tokio::time::timeout(timeout, ws_recv_server(ws))
        .await
        .unwrap()
        .unwrap()
}

pub(crate) async fn ws_expect_close(ws: &mut WsClient, timeout: Duration) -> Option<u16> {
    tokio::time::timeout(timeout, ws_recv_server(ws))
        .await
        .unwrap()
        .unwrap_err()
}
