#![allow(dead_code)]

use anyhow::anyhow;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use ayursutra_realtime::app::dispatcher::EventDispatcher;
use ayursutra_realtime::config::RealtimeConfig;
use ayursutra_realtime::domain::events::{Envelope, JOIN};
use ayursutra_realtime::domain::notification::NotificationRecord;
use ayursutra_realtime::infra::presenter::{NoopPresenter, Permission, Presenter};
use ayursutra_realtime::infra::socket::{Connector, TransportError, TransportLink};
use ayursutra_realtime::RealtimeCore;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Default timings with jitter off so reconnect delays are exact.
pub fn test_config() -> RealtimeConfig {
    let mut config = RealtimeConfig::new(Url::parse("ws://127.0.0.1:5000/ws").unwrap());
    config.reconnect.jitter = 0.0;
    config
}

pub fn memory_core(server: &MemoryServer) -> RealtimeCore {
    RealtimeCore::new(test_config(), server.connector(), Arc::new(NoopPresenter))
}

// ---------------------------------------------------------------------------
// In-memory server + connector
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryServer {
    inner: Arc<Mutex<ServerState>>,
}

#[derive(Default)]
struct ServerState {
    refusing: bool,
    stalling: bool,
    dials: usize,
    links: Vec<ServerLink>,
    received: Vec<Envelope>,
}

struct ServerLink {
    to_client: Option<mpsc::UnboundedSender<Envelope>>,
    from_client: mpsc::UnboundedReceiver<Envelope>,
}

struct MemoryConnector {
    server: MemoryServer,
}

impl Connector for MemoryConnector {
    fn connect(&self, _endpoint: &Url) -> BoxFuture<'static, anyhow::Result<TransportLink>> {
        let mut state = self.server.inner.lock().unwrap();
        state.dials += 1;

        if state.stalling {
            return Box::pin(futures::future::pending());
        }
        if state.refusing {
            return Box::pin(async { Err(anyhow!(TransportError::refused("memory server offline"))) });
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        state.links.push(ServerLink {
            to_client: Some(to_client),
            from_client,
        });
        Box::pin(async move { Ok(TransportLink { outbound, inbound }) })
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            server: self.clone(),
        })
    }

    pub fn set_refusing(&self, refusing: bool) {
        self.inner.lock().unwrap().refusing = refusing;
    }

    pub fn set_stalling(&self, stalling: bool) {
        self.inner.lock().unwrap().stalling = stalling;
    }

    pub fn dials(&self) -> usize {
        self.inner.lock().unwrap().dials
    }

    /// Links whose client side is still reading.
    pub fn live_links(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|link| matches!(&link.to_client, Some(tx) if !tx.is_closed()))
            .count()
    }

    /// Sends to the newest live link.
    pub fn push(&self, event: &str, data: Value) -> bool {
        let state = self.inner.lock().unwrap();
        state
            .links
            .iter()
            .rev()
            .filter_map(|link| link.to_client.as_ref())
            .find(|tx| !tx.is_closed())
            .map(|tx| tx.send(Envelope::new(event, data)).is_ok())
            .unwrap_or(false)
    }

    /// Simulates the server dropping every open link.
    pub fn drop_links(&self) {
        for link in self.inner.lock().unwrap().links.iter_mut() {
            link.to_client = None;
        }
    }

    /// Everything clients have sent so far, in arrival order per link.
    pub fn received(&self) -> Vec<Envelope> {
        let mut state = self.inner.lock().unwrap();
        let mut drained = Vec::new();
        for link in state.links.iter_mut() {
            while let Ok(envelope) = link.from_client.try_recv() {
                drained.push(envelope);
            }
        }
        state.received.extend(drained);
        state.received.clone()
    }

    pub fn joins(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|envelope| envelope.event == JOIN)
            .filter_map(|envelope| envelope.data.as_str().map(str::to_string))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Presenter double
// ---------------------------------------------------------------------------

pub struct RecordingPresenter {
    answer: Permission,
    pub requests: AtomicUsize,
    pub presented: Mutex<Vec<NotificationRecord>>,
}

impl RecordingPresenter {
    pub fn new(answer: Permission) -> Arc<Self> {
        Arc::new(Self {
            answer,
            requests: AtomicUsize::new(0),
            presented: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn presented_titles(&self) -> Vec<String> {
        self.presented
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.title.clone())
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn request_permission(&self) -> BoxFuture<'static, Permission> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer;
        Box::pin(async move { answer })
    }

    fn present(&self, record: &NotificationRecord) -> anyhow::Result<()> {
        self.presented.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Counts how many times `event` fires on the dispatcher.
pub fn count_events(dispatcher: &EventDispatcher, event: &str) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = counter.clone();
    dispatcher.on(event, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    counter
}

/// Records the payload of every `event` emission.
pub fn capture_events(dispatcher: &EventDispatcher, event: &str) -> Arc<Mutex<Vec<Value>>> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    dispatcher.on(event, move |data| {
        sink.lock().unwrap().push(data.clone());
        Ok(())
    });
    captured
}

/// Polls `condition` every 10ms until it holds or `limit` elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ---------------------------------------------------------------------------
// WebSocket relay server
// ---------------------------------------------------------------------------

pub const REMINDER_TITLE: &str = "Session Reminder";
pub const REMINDER_MESSAGE: &str = "Your session starts in 10 min";

#[derive(Clone, Default)]
struct RelayState {
    joins: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<Envelope>>>,
}

/// Answers every `join` with an unknown event followed by a reminder
/// notification, and records everything else it receives.
pub struct RelayServer {
    pub addr: SocketAddr,
    state: RelayState,
    handle: tokio::task::JoinHandle<()>,
}

impl RelayServer {
    pub async fn start() -> Self {
        let state = RelayState::default();
        let app = Router::new()
            .route("/ws", get(relay_upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind relay listener");
        let addr = listener.local_addr().expect("relay listener has no address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("relay server failed");
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn config(&self) -> RealtimeConfig {
        let mut config = RealtimeConfig::new(
            Url::parse(&format!("ws://{}/ws", self.addr)).expect("valid relay url"),
        );
        config.reconnect.jitter = 0.0;
        config
    }

    pub fn joins(&self) -> Vec<String> {
        self.state.joins.lock().unwrap().clone()
    }

    pub fn received(&self) -> Vec<Envelope> {
        self.state.received.lock().unwrap().clone()
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn relay_upgrade(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay_socket(socket, state))
}

async fn relay_socket(mut socket: WebSocket, state: RelayState) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else {
            continue;
        };

        if envelope.event != JOIN {
            state.received.lock().unwrap().push(envelope);
            continue;
        }

        let user_id = envelope.data.as_str().unwrap_or_default().to_string();
        state.joins.lock().unwrap().push(user_id);

        let replies = [
            json!({ "event": "presence", "data": { "online": 1 } }),
            json!({
                "event": "notification",
                "data": {
                    "title": REMINDER_TITLE,
                    "message": REMINDER_MESSAGE,
                    "type": "booking",
                    "data": { "bookingId": "bk-1001" }
                }
            }),
        ];
        for reply in replies {
            if socket.send(Message::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
    }
}
