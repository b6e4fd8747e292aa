//! Live connection hub for build status clients.
//!
//! The hub owns the set of connected websocket clients and turns build
//! events into protocol [`Message`]s:
//!
//! - `done` caches a JSON projection of the stats, then on the next tick
//!   broadcasts `hash` followed by `issues` or `ok`
//! - `invalid` clears the cache and broadcasts `invalid`
//! - progress is broadcast only when the percentage increases
//!
//! A client connecting after the cached stats were announced receives
//! `hash` and `issues`/`ok` immediately. One connecting before the
//! announcement gets them from the broadcast only.

pub mod message;
pub mod options;
mod plugins;

pub use message::{Message, StatsJson};
pub use options::HotOptions;

use crate::build::{BuildListener, BuildResult, Compiler, ProgressReport, TickQueue};
use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::http::{Request, header, request::Parts};
use axum::response::{IntoResponse, Response};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Lifecycle of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Close handshake in progress; no more broadcasts
    Closing,
}

#[derive(Debug)]
struct Connection {
    sender: mpsc::UnboundedSender<String>,
    state: ConnectionState,
}

/// Stats of the last build and whether clients were told about them.
struct Cached {
    stats: Arc<StatsJson>,
    announced: bool,
}

struct Inner {
    options: HotOptions,
    ticks: Arc<TickQueue>,
    connections: RwLock<HashMap<usize, Connection>>,
    next_id: AtomicUsize,
    stats: RwLock<Option<Cached>>,
    /// Last broadcast progress, `-1.0` before the first report of a build
    percentage: Mutex<f64>,
}

/// Broadcasts build status to every connected client.
///
/// Cloning shares the same connection set.
#[derive(Clone)]
pub struct ConnectionHub {
    inner: Arc<Inner>,
}

impl ConnectionHub {
    /// Create a hub for `compiler`, injecting the client plugins into it.
    pub fn new(compiler: &dyn Compiler, options: HotOptions, ticks: Arc<TickQueue>) -> Self {
        let options = options.normalized();
        plugins::apply(compiler, &options);

        Self {
            inner: Arc::new(Inner {
                options,
                ticks,
                connections: RwLock::new(HashMap::new()),
                next_id: AtomicUsize::new(0),
                stats: RwLock::new(None),
                percentage: Mutex::new(-1.0),
            }),
        }
    }

    pub fn options(&self) -> &HotOptions {
        &self.inner.options
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.read().len()
    }

    /// Add a connection and return its id and outgoing frame receiver.
    ///
    /// If an announced build is cached, its status is queued for this
    /// connection only.
    pub fn register(&self) -> (usize, mpsc::UnboundedReceiver<String>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut connections = self.inner.connections.write();
        if let Some(cached) = self.inner.stats.read().as_ref().filter(|c| c.announced) {
            for message in cached.stats.messages() {
                if let Some(frame) = encode(&message) {
                    let _ = sender.send(frame);
                }
            }
        }
        connections.insert(
            id,
            Connection {
                sender,
                state: ConnectionState::Open,
            },
        );
        drop(connections);

        tracing::info!(connection = id, "client connected");
        (id, receiver)
    }

    /// Stop broadcasting to a connection that is closing.
    pub fn mark_closing(&self, id: usize) {
        if let Some(connection) = self.inner.connections.write().get_mut(&id) {
            connection.state = ConnectionState::Closing;
        }
    }

    pub fn unregister(&self, id: usize) {
        if self.inner.connections.write().remove(&id).is_some() {
            tracing::info!(connection = id, "client disconnected");
        }
    }

    /// Drop every connection. Their sockets close once drained.
    pub fn close_all(&self) {
        let closed = std::mem::take(&mut *self.inner.connections.write());
        if !closed.is_empty() {
            tracing::debug!(count = closed.len(), "closing live connections");
        }
    }

    /// Send `message` to every open connection.
    ///
    /// Best effort: a failed send drops that connection and nothing else.
    pub fn broadcast(&self, message: &Message) {
        let Some(frame) = encode(message) else {
            return;
        };

        let mut failed = Vec::new();
        for (id, connection) in self.inner.connections.read().iter() {
            if connection.state != ConnectionState::Open {
                continue;
            }
            if connection.sender.send(frame.clone()).is_err() {
                failed.push(*id);
            }
        }

        if !failed.is_empty() {
            let mut connections = self.inner.connections.write();
            for id in failed {
                connections.remove(&id);
                tracing::warn!(connection = id, "dropping connection after failed send");
            }
        }
    }

    /// Whether `parts` is a websocket upgrade for the socket path.
    pub fn is_upgrade_request(&self, parts: &Parts) -> bool {
        let upgrade = parts
            .headers
            .get(header::UPGRADE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("websocket"));

        upgrade && parts.uri.path() == self.inner.options.path
    }

    /// Take over `request` if it is an upgrade for the socket path.
    ///
    /// Hands the request back unchanged otherwise.
    pub async fn upgrade(&self, request: Request<Body>) -> Result<Response, Request<Body>> {
        let (mut parts, body) = request.into_parts();
        if !self.is_upgrade_request(&parts) {
            return Err(Request::from_parts(parts, body));
        }

        match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => {
                let hub = self.clone();
                Ok(upgrade.on_upgrade(move |socket| hub.serve(socket)))
            }
            Err(rejection) => {
                tracing::warn!("rejected websocket handshake: {}", rejection);
                Ok(rejection.into_response())
            }
        }
    }

    /// Pump frames to one upgraded socket until either side closes.
    pub async fn serve(self, mut socket: WebSocket) {
        let (id, mut frames) = self.register();

        loop {
            tokio::select! {
                incoming = socket.recv() => {
                    match incoming {
                        Some(Ok(ws::Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::error!(connection = id, "socket error: {}", e);
                            break;
                        }
                        _ => {}
                    }
                }
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = socket.send(ws::Message::Text(frame.into())).await {
                        tracing::error!(connection = id, "socket error: {}", e);
                        break;
                    }
                }
            }
        }

        self.mark_closing(id);
        self.unregister(id);
    }

    /// Cached stats of the last completed build, if still current.
    pub fn stats(&self) -> Option<Arc<StatsJson>> {
        self.inner
            .stats
            .read()
            .as_ref()
            .map(|cached| Arc::clone(&cached.stats))
    }

    /// Broadcast `stats` once, if they are still the cached generation.
    ///
    /// The connection set stays locked from marking the stats announced
    /// until every frame is queued, so a concurrent `register` sees either
    /// the replay or the broadcast, never both.
    fn announce(&self, stats: &Arc<StatsJson>) {
        let frames: Vec<String> = stats.messages().iter().filter_map(encode).collect();

        let connections = self.inner.connections.read();
        match self.inner.stats.write().as_mut() {
            Some(cached) if Arc::ptr_eq(&cached.stats, stats) && !cached.announced => {
                cached.announced = true;
            }
            _ => return,
        }

        let mut failed = Vec::new();
        for (id, connection) in connections.iter() {
            if connection.state != ConnectionState::Open {
                continue;
            }
            if frames
                .iter()
                .any(|frame| connection.sender.send(frame.clone()).is_err())
            {
                failed.push(*id);
            }
        }
        drop(connections);

        if !failed.is_empty() {
            let mut connections = self.inner.connections.write();
            for id in failed {
                connections.remove(&id);
                tracing::warn!(connection = id, "dropping connection after failed send");
            }
        }
    }
}

impl BuildListener for ConnectionHub {
    fn on_invalid(&self, path: Option<&str>, timestamp: i64) {
        *self.inner.stats.write() = None;
        *self.inner.percentage.lock() = -1.0;

        self.broadcast(&Message::Invalid {
            path: path.map(str::to_string),
            timestamp,
        });
    }

    fn on_done(&self, result: &Arc<BuildResult>) {
        let stats = Arc::new(StatsJson::from_result(result));
        *self.inner.stats.write() = Some(Cached {
            stats: Arc::clone(&stats),
            announced: false,
        });

        let hub = self.clone();
        self.inner.ticks.defer(move || hub.announce(&stats));
    }

    fn on_progress(&self, report: &ProgressReport) {
        if !self.inner.options.progress {
            return;
        }

        {
            let mut last = self.inner.percentage.lock();
            if report.percentage <= *last {
                return;
            }
            *last = report.percentage;
        }

        self.broadcast(&Message::Progress {
            status: report.status.clone(),
            messages: report.messages.clone(),
            percentage: report.percentage,
        });
    }
}

impl std::fmt::Debug for ConnectionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHub")
            .field("options", &self.inner.options)
            .field("connections", &self.connection_count())
            .finish()
    }
}

fn encode(message: &Message) -> Option<String> {
    match message.to_json() {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!("failed to encode status message: {}", e);
            None
        }
    }
}
