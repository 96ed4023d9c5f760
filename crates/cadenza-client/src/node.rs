//! One persistent control connection to one audio node.
//!
//! A `Node` owns its socket exclusively: the handle never leaves this
//! module. Commands are fire-and-forget; while disconnected they accumulate
//! in an ordered backlog that is flushed once per successful connect.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use cadenza_proto::{codec, Inbound, Outbound, Stats, CLOSE_NORMAL};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, Result};
use crate::events::ManagerEvent;
use crate::manager::Shared;
use crate::rest::RestClient;

/// Identity and connection parameters for one node. Immutable after
/// construction.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Registry key; falls back to `host` when absent.
    pub identifier: Option<String>,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub secure: bool,
    /// Fixed delay between a close/error and the next connect attempt.
    pub retry_delay: Duration,
    /// Node-side resume key; sent as a header on connect and configured
    /// after the handshake.
    pub resume_key: Option<String>,
    /// Seconds the node keeps a dropped session alive for resumption.
    pub resume_timeout: u64,
    /// Whether the REST helper follows HTTP redirects.
    pub follow_redirects: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identifier: None,
            host: "localhost".to_string(),
            port: 2333,
            password: "youshallnotpass".to_string(),
            secure: false,
            retry_delay: Duration::from_secs(5),
            resume_key: None,
            resume_timeout: 60,
            follow_redirects: false,
        }
    }
}

impl NodeConfig {
    /// The key this node is registered under: id if present, host otherwise.
    pub fn key(&self) -> String {
        self.identifier.clone().unwrap_or_else(|| self.host.clone())
    }

    fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }
}

/// Connection lifecycle. `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Reconnecting,
    Destroyed,
}

/// Outcome of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    /// Transmitted on the live connection.
    Dispatched,
    /// Buffered while disconnected; carries the new backlog length.
    Queued(usize),
}

pub struct Node {
    config: NodeConfig,
    /// Registration order, used as the stable tie-breaker in selection.
    pub(crate) seq: usize,
    shared: Weak<Shared>,
    state: RwLock<NodeState>,
    stats: RwLock<Option<Stats>>,
    /// Recomputed only when a stats payload arrives; stale otherwise.
    penalty: AtomicI32,
    ws_tx: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    backlog: Mutex<VecDeque<String>>,
    reconnect_handle: Mutex<Option<JoinHandle<()>>>,
    /// Bumped per connect attempt so a superseded reader cannot clobber the
    /// state of its replacement.
    conn_epoch: AtomicU64,
    rest: RestClient,
}

impl Node {
    pub(crate) fn new(config: NodeConfig, seq: usize, shared: Weak<Shared>) -> Result<Self> {
        let rest = RestClient::new(&config)?;
        Ok(Self {
            config,
            seq,
            shared,
            state: RwLock::new(NodeState::Disconnected),
            stats: RwLock::new(None),
            penalty: AtomicI32::new(0),
            ws_tx: Mutex::new(None),
            backlog: Mutex::new(VecDeque::new()),
            reconnect_handle: Mutex::new(None),
            conn_epoch: AtomicU64::new(0),
            rest,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn key(&self) -> String {
        self.config.key()
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn connected(&self) -> bool {
        *self.state.read() == NodeState::Connected
    }

    /// Load-balancing penalty from the last stats snapshot; zero until the
    /// node has reported stats.
    pub fn penalty(&self) -> i32 {
        self.penalty.load(Ordering::Relaxed)
    }

    /// Per-core CPU load percentage from the last stats snapshot, zero when
    /// none has arrived yet.
    pub fn cpu_load(&self) -> f64 {
        self.stats.read().as_ref().map(Stats::cpu_load).unwrap_or(0.0)
    }

    pub fn stats(&self) -> Option<Stats> {
        self.stats.read().clone()
    }

    /// REST helper bound to this node's host and credential.
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Start (or restart) the control connection. Any live connection is
    /// closed first, so calling this twice is safe.
    pub fn connect(self: &Arc<Self>) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            node.run_connection().await;
        });
    }

    /// Serialize and transmit a command, or buffer it while disconnected.
    /// Transmission failures are reported here, never thrown from the
    /// connection tasks.
    pub fn send(&self, message: &Outbound) -> Result<Sent> {
        let text = codec::encode(message)?;
        self.send_raw(text)
    }

    fn send_raw(&self, text: String) -> Result<Sent> {
        let guard = self.ws_tx.lock();
        if let (Some(tx), true) = (guard.as_ref(), self.connected()) {
            return tx
                .send(WsMessage::Text(text))
                .map(|_| Sent::Dispatched)
                .map_err(|e| ClientError::SendFailed(e.to_string()));
        }
        drop(guard);

        let mut backlog = self.backlog.lock();
        backlog.push_back(text);
        let len = backlog.len();
        if len % 64 == 0 {
            warn!(node = %self.key(), queued = len, "backlog growing while disconnected");
        }
        Ok(Sent::Queued(len))
    }

    /// Close with the normal-closure code and remove this node from the
    /// registry. Terminal; a destroyed node never reconnects.
    pub fn destroy(&self, reason: &str) {
        {
            let mut state = self.state.write();
            if *state == NodeState::Destroyed {
                return;
            }
            *state = NodeState::Closing;
        }

        // Invalidate any connect attempt still in its handshake; a stale
        // task must not install a socket for a node that no longer exists.
        self.conn_epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.reconnect_handle.lock().take() {
            handle.abort();
        }
        if let Some(tx) = self.ws_tx.lock().take() {
            let _ = tx.send(WsMessage::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: reason.to_string().into(),
            })));
        }
        *self.state.write() = NodeState::Destroyed;

        if let Some(shared) = self.shared.upgrade() {
            shared.nodes.remove_if(&self.key(), |_, node| node.seq == self.seq);
        }
        info!(node = %self.key(), reason, "node destroyed");
    }

    async fn run_connection(self: Arc<Self>) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if *self.state.read() == NodeState::Destroyed {
            return;
        }

        self.drop_connection();
        *self.state.write() = NodeState::Connecting;
        let epoch = self.conn_epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let request = match self.build_request(&shared) {
            Ok(request) => request,
            Err(e) => {
                error!(node = %self.key(), error = %e, "invalid connection parameters");
                shared.emit(ManagerEvent::NodeError {
                    node: self.key(),
                    error: e.to_string(),
                });
                return;
            }
        };

        debug!(node = %self.key(), url = %self.config.ws_url(), "connecting");
        let (stream, _response) = match connect_async(request).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(node = %self.key(), error = %e, "connect failed");
                shared.emit(ManagerEvent::NodeError {
                    node: self.key(),
                    error: e.to_string(),
                });
                self.schedule_reconnect();
                return;
            }
        };

        if self.conn_epoch.load(Ordering::SeqCst) != epoch {
            // A newer connect superseded this one while the handshake ran.
            return;
        }

        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = write.send(message).await {
                    warn!(error = %e, "socket write failed");
                    break;
                }
            }
        });

        // Open: cancel the pending reconnect timer, mark connected,
        // configure resumption, tell the selector, then flush the backlog
        // in order.
        if let Some(handle) = self.reconnect_handle.lock().take() {
            handle.abort();
        }
        *self.ws_tx.lock() = Some(tx.clone());
        if !self.mark_connected() {
            self.drop_connection();
            return;
        }
        if let Some(resume_key) = &self.config.resume_key {
            match codec::encode(&Outbound::ConfigureResuming {
                key: resume_key.clone(),
                timeout: self.config.resume_timeout,
            }) {
                Ok(text) => {
                    let _ = tx.send(WsMessage::Text(text));
                }
                Err(e) => error!(node = %self.key(), error = %e, "resume config encode failed"),
            }
        }
        info!(node = %self.key(), "connected");
        shared.emit(ManagerEvent::NodeConnect { node: self.key() });
        self.flush_backlog();

        let mut reconnect = true;
        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Text(text)) => self.handle_payload(&shared, &text),
                Ok(WsMessage::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((CLOSE_NORMAL, String::new()));
                    info!(node = %self.key(), code, %reason, "socket closed");
                    shared.emit(ManagerEvent::NodeClose {
                        node: self.key(),
                        code,
                        reason,
                    });
                    reconnect = code != CLOSE_NORMAL;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(node = %self.key(), error = %e, "socket error");
                    shared.emit(ManagerEvent::NodeError {
                        node: self.key(),
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }

        if self.conn_epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        self.ws_tx.lock().take();
        {
            let mut state = self.state.write();
            if *state != NodeState::Destroyed {
                *state = NodeState::Disconnected;
            } else {
                return;
            }
        }
        if reconnect {
            self.schedule_reconnect();
        }
    }

    fn build_request(
        &self,
        shared: &Shared,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut request = self
            .config
            .ws_url()
            .into_client_request()
            .map_err(|e| ClientError::SendFailed(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&self.config.password)
                .map_err(|e| ClientError::SendFailed(e.to_string()))?,
        );
        let bot_id = shared.bot_id.read().clone().unwrap_or_default();
        headers.insert(
            "User-Id",
            HeaderValue::from_str(&bot_id).map_err(|e| ClientError::SendFailed(e.to_string()))?,
        );
        headers.insert(
            "Client-Name",
            HeaderValue::from_str(&shared.client_name)
                .map_err(|e| ClientError::SendFailed(e.to_string()))?,
        );
        headers.insert("Num-Shards", HeaderValue::from(shared.shard_count));
        if let Some(resume_key) = &self.config.resume_key {
            headers.insert(
                "Resume-Key",
                HeaderValue::from_str(resume_key)
                    .map_err(|e| ClientError::SendFailed(e.to_string()))?,
            );
        }
        Ok(request)
    }

    /// Idempotent: a previously pending timer is kept, never duplicated,
    /// so close and error firing together schedule one reconnect.
    fn schedule_reconnect(self: &Arc<Self>) {
        if *self.state.read() == NodeState::Destroyed {
            return;
        }
        let mut slot = self.reconnect_handle.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        *self.state.write() = NodeState::Reconnecting;
        let node = Arc::clone(self);
        let delay = self.config.retry_delay;
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if *node.state.read() == NodeState::Destroyed {
                return;
            }
            node.drop_connection();
            *node.state.write() = NodeState::Disconnected;
            if let Some(shared) = node.shared.upgrade() {
                shared.emit(ManagerEvent::NodeReconnect { node: node.key() });
            }
            node.connect();
        }));
    }

    /// Transition to Connected unless destroy() won the race since the
    /// epoch check; its state write is the authority. Returns whether the
    /// node went live.
    fn mark_connected(&self) -> bool {
        let mut state = self.state.write();
        if *state == NodeState::Destroyed {
            return false;
        }
        *state = NodeState::Connected;
        true
    }

    fn drop_connection(&self) {
        if let Some(tx) = self.ws_tx.lock().take() {
            let _ = tx.send(WsMessage::Close(None));
        }
    }

    /// Flush the backlog in FIFO order onto the live connection. Each
    /// message is sent at most once; anything drained is never re-queued.
    fn flush_backlog(&self) {
        let guard = self.ws_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return;
        };
        let drained: Vec<String> = self.backlog.lock().drain(..).collect();
        if drained.is_empty() {
            return;
        }
        debug!(node = %self.key(), count = drained.len(), "flushing backlog");
        for text in drained {
            if tx.send(WsMessage::Text(text)).is_err() {
                warn!(node = %self.key(), "connection dropped mid-flush");
                break;
            }
        }
    }

    pub(crate) fn handle_payload(&self, shared: &Shared, text: &str) {
        shared.emit(ManagerEvent::Raw {
            node: self.key(),
            payload: text.to_string(),
        });

        match codec::decode(text) {
            Ok(Inbound::Stats(stats)) => {
                self.penalty.store(stats.penalty(), Ordering::Relaxed);
                *self.stats.write() = Some(stats);
            }
            Ok(Inbound::PlayerUpdate { guild_id, state }) => {
                match shared.players.get(&guild_id) {
                    Some(player) => player.update_state(state),
                    None => debug!(%guild_id, "playerUpdate for unknown guild"),
                }
            }
            Ok(Inbound::Event(event)) => {
                let player = shared.players.get(&event.guild_id).map(|p| p.value().clone());
                match player {
                    Some(player) => {
                        if let Err(e) = player.handle_event(event) {
                            error!(node = %self.key(), error = %e, "event handling failed");
                            shared.emit(ManagerEvent::Debug {
                                message: format!("event handling failed: {e}"),
                            });
                        }
                    }
                    None => debug!(guild_id = %event.guild_id, "event for unknown guild"),
                }
            }
            Err(e) => {
                // Out-of-contract payload; report it rather than guessing.
                error!(node = %self.key(), error = %e, "undecodable payload");
                shared.emit(ManagerEvent::Debug {
                    message: format!("undecodable payload from {}: {e}", self.key()),
                });
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn test_set_state(&self, state: NodeState) {
        *self.state.write() = state;
    }

    #[cfg(test)]
    pub(crate) fn test_backlog(&self) -> Vec<serde_json::Value> {
        self.backlog
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).expect("backlog holds JSON"))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn test_clear_backlog(&self) {
        self.backlog.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn test_epoch(&self) -> u64 {
        self.conn_epoch.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn test_set_stats(&self, stats: Stats) {
        self.penalty.store(stats.penalty(), Ordering::Relaxed);
        *self.stats.write() = Some(stats);
    }

    #[cfg(test)]
    pub(crate) fn test_attach_writer(&self) -> mpsc::UnboundedReceiver<WsMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.ws_tx.lock() = Some(tx);
        rx
    }
}
