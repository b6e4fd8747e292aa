//! Build lifecycle state machine.

use super::tick::TickQueue;
use super::{BuildEvent, BuildResult, EmittedAsset, ProgressReport, StatsPreset};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Invoked once with the stats of the next completed build.
pub type ReadyCallback = Box<dyn FnOnce(Arc<BuildResult>) + Send>;

/// Invoked on every completed build that survives its tick.
///
/// Receives the configured stats preset override, if any.
pub type DoneHook = Arc<dyn Fn(&BuildResult, Option<StatsPreset>) + Send + Sync>;

/// Observer of build events, called synchronously as they are dispatched.
///
/// Listeners run outside the tracker's lock and may call back into it.
pub trait BuildListener: Send + Sync {
    fn on_invalid(&self, _path: Option<&str>, _timestamp: i64) {}

    fn on_done(&self, _result: &Arc<BuildResult>) {}

    fn on_progress(&self, _report: &ProgressReport) {}

    fn on_asset_emitted(&self, _asset: &EmittedAsset) {}
}

#[derive(Default)]
struct State {
    /// `None` while a build is in flight or before the first build
    stats: Option<Arc<BuildResult>>,
    callbacks: Vec<ReadyCallback>,
}

struct Inner {
    state: Mutex<State>,
    listeners: RwLock<Vec<Arc<dyn BuildListener>>>,
    ticks: Arc<TickQueue>,
    stats_preset: Option<StatsPreset>,
    done_hook: DoneHook,
}

/// Tracks whether a usable build exists and releases waiters when one does.
///
/// `done` does not release waiters directly: the release is deferred to the
/// next tick and skipped if an `invalid` arrived in between, so a build that
/// was already stale when it finished is never handed out.
///
/// Cloning shares the same state.
#[derive(Clone)]
pub struct BuildStatusTracker {
    inner: Arc<Inner>,
}

/// Logs the build summary at `info` level; silent when the summary is empty.
pub fn log_summary(result: &BuildResult, preset: Option<StatsPreset>) {
    let summary = result.summary(preset);
    if !summary.is_empty() {
        tracing::info!("build stats:\n{}", summary);
    }
}

impl BuildStatusTracker {
    pub fn new(ticks: Arc<TickQueue>) -> Self {
        Self::with_hook(ticks, None, Arc::new(log_summary))
    }

    /// Create a tracker with a custom done hook and stats preset override.
    pub fn with_hook(
        ticks: Arc<TickQueue>,
        stats_preset: Option<StatsPreset>,
        done_hook: DoneHook,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                listeners: RwLock::new(Vec::new()),
                ticks,
                stats_preset,
                done_hook,
            }),
        }
    }

    pub fn ticks(&self) -> &Arc<TickQueue> {
        &self.inner.ticks
    }

    pub fn subscribe(&self, listener: Arc<dyn BuildListener>) {
        self.inner.listeners.write().push(listener);
    }

    /// Whether a completed build is currently available.
    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().stats.is_some()
    }

    /// Stats of the current build generation, if it has completed.
    pub fn current(&self) -> Option<Arc<BuildResult>> {
        self.inner.state.lock().stats.clone()
    }

    /// Run `callback` once a build is available.
    ///
    /// Always deferred to a tick, even when a build is available now.
    /// Callbacks queued during a build stay queued across invalidations.
    pub fn ready(&self, callback: impl FnOnce(Arc<BuildResult>) + Send + 'static) {
        self.enqueue(Box::new(callback));
    }

    /// Wait for a build to be available.
    ///
    /// Returns `None` if the tracker shuts down first.
    pub async fn wait_ready(&self) -> Option<Arc<BuildResult>> {
        let (tx, rx) = oneshot::channel();
        self.ready(move |stats| {
            let _ = tx.send(stats);
        });
        rx.await.ok()
    }

    /// Dispatch one build event.
    pub fn handle(&self, event: BuildEvent) {
        match event {
            BuildEvent::Invalid { path, timestamp } => {
                self.inner.state.lock().stats = None;
                tracing::info!("compilation starting...");

                for listener in self.listeners() {
                    listener.on_invalid(path.as_deref(), timestamp);
                }
            }
            BuildEvent::Done(result) => {
                self.inner.state.lock().stats = Some(Arc::clone(&result));

                for listener in self.listeners() {
                    listener.on_done(&result);
                }

                let inner = Arc::clone(&self.inner);
                self.inner.ticks.defer(move || inner.flush());
            }
            BuildEvent::Progress(report) => {
                for listener in self.listeners() {
                    listener.on_progress(&report);
                }
            }
            BuildEvent::AssetEmitted(asset) => {
                for listener in self.listeners() {
                    listener.on_asset_emitted(&asset);
                }
            }
        }
    }

    /// Drive the tracker from a compiler's event channel.
    ///
    /// Every event already queued is dispatched before deferred work runs.
    /// Returns when the channel closes.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<BuildEvent>) {
        let ticks = Arc::clone(&self.inner.ticks);

        loop {
            tokio::select! {
                biased;
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle(event);
                    while let Ok(event) = events.try_recv() {
                        self.handle(event);
                    }
                }
                _ = ticks.notified() => {}
            }

            ticks.run_pending();
        }

        ticks.run_pending();
        tracing::debug!("build event channel closed");
    }

    fn listeners(&self) -> Vec<Arc<dyn BuildListener>> {
        self.inner.listeners.read().clone()
    }

    fn enqueue(&self, callback: ReadyCallback) {
        let mut state = self.inner.state.lock();
        if state.stats.is_some() {
            drop(state);
            let tracker = self.clone();
            self.inner.ticks.defer(move || tracker.deliver(callback));
        } else {
            state.callbacks.push(callback);
        }
    }

    /// Deliver a callback deferred by `ready`, or requeue it if a rebuild
    /// started in the meantime.
    fn deliver(&self, callback: ReadyCallback) {
        let mut state = self.inner.state.lock();
        match state.stats.clone() {
            Some(stats) => {
                drop(state);
                callback(stats);
            }
            None => state.callbacks.push(callback),
        }
    }
}

impl Inner {
    fn flush(&self) {
        let (stats, callbacks) = {
            let mut state = self.state.lock();
            let Some(stats) = state.stats.clone() else {
                return;
            };
            (stats, std::mem::take(&mut state.callbacks))
        };

        (self.done_hook)(&stats, self.stats_preset);

        for callback in callbacks {
            callback(Arc::clone(&stats));
        }

        tracing::info!("compilation finished");
    }
}

impl std::fmt::Debug for BuildStatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BuildStatusTracker")
            .field("ready", &state.stats.is_some())
            .field("pending_callbacks", &state.callbacks.len())
            .finish()
    }
}
