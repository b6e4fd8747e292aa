//! Dev server facade.
//!
//! [`DevServer`] owns everything belonging to one server/compiler pairing:
//! the output filesystem, the build status tracker, the output router and
//! the connection hub. It starts the compiler's watch loop on construction
//! and exposes the control surface (ready, invalidate, close).

use crate::build::{
    BuildResult, BuildStatusTracker, Compiler, DiskWriter, DoneHook, TickQueue, WriteFilter,
    WriteToDisk, log_summary,
};
use crate::config::DevServerConfig;
use crate::error::{Error, Result};
use crate::fs::{MemoryFs, OutputFileSystem};
use crate::hot::ConnectionHub;
use crate::middleware;
use crate::router::OutputRouter;
use crate::service::{Headers, IgnoreFn, ServiceOptions};
use axum::Router;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Options for [`DevServer::new`].
///
/// Function-valued options override their data counterparts in `config`.
#[derive(Default)]
pub struct DevServerOptions {
    pub config: DevServerConfig,
    /// Filesystem the compiler emits into; in-memory when unset
    pub fs: Option<Arc<dyn OutputFileSystem>>,
    pub ignore: Option<IgnoreFn>,
    /// Replaces `config.headers`
    pub headers: Option<Headers>,
    /// Replaces `config.write_to_disk`
    pub write_to_disk: Option<WriteFilter>,
    /// Replaces the default stats logging
    pub on_compilation_done: Option<DoneHook>,
}

impl DevServerOptions {
    pub fn new(config: DevServerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn OutputFileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_ignore(mut self, ignore: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.ignore = Some(Arc::new(ignore));
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_write_filter(
        mut self,
        filter: impl Fn(&Path) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.write_to_disk = Some(Arc::new(filter));
        self
    }

    pub fn on_compilation_done(
        mut self,
        hook: impl Fn(&BuildResult, Option<crate::build::StatsPreset>) + Send + Sync + 'static,
    ) -> Self {
        self.on_compilation_done = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for DevServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServerOptions")
            .field("config", &self.config)
            .field("fs", &self.fs)
            .field("ignore", &self.ignore.is_some())
            .field("headers", &self.headers)
            .field("write_to_disk", &self.write_to_disk.is_some())
            .field("on_compilation_done", &self.on_compilation_done.is_some())
            .finish()
    }
}

struct Inner {
    compiler: Arc<dyn Compiler>,
    fs: Arc<dyn OutputFileSystem>,
    tracker: BuildStatusTracker,
    router: Arc<OutputRouter>,
    hub: Option<ConnectionHub>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Development server for one compiler.
///
/// Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct DevServer {
    inner: Arc<Inner>,
}

impl DevServer {
    /// Wire up a dev server and start watching.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured headers are invalid, if there is
    /// no runtime, or if the compiler fails to start watching.
    pub fn new(compiler: Arc<dyn Compiler>, options: DevServerOptions) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Server(format!("Dev server requires a tokio runtime: {e}")))?;
        let DevServerOptions {
            config,
            fs,
            ignore,
            headers,
            write_to_disk,
            on_compilation_done,
        } = options;

        let fs: Arc<dyn OutputFileSystem> = fs.unwrap_or_else(|| Arc::new(MemoryFs::new()));
        compiler.set_output_file_system(Arc::clone(&fs));

        let ticks = Arc::new(TickQueue::new());
        let tracker = BuildStatusTracker::with_hook(
            Arc::clone(&ticks),
            config.stats,
            on_compilation_done.unwrap_or_else(|| Arc::new(log_summary)),
        );

        let headers = match headers {
            Some(headers) => Some(headers),
            None if !config.headers.is_empty() => Some(Headers::Static(config.header_map()?)),
            None => None,
        };
        let mut service = ServiceOptions::new(Arc::clone(&fs));
        service.etag = config.etag;
        service.accept_ranges = config.accept_ranges;
        service.last_modified = config.last_modified;
        service.ignore = ignore;
        service.headers = headers;

        let router = Arc::new(OutputRouter::new(service));
        tracker.subscribe(router.clone());

        let write = match write_to_disk {
            Some(filter) => WriteToDisk::Filter(filter),
            None => WriteToDisk::from(config.write_to_disk),
        };
        if write.is_enabled() {
            tracker.subscribe(Arc::new(DiskWriter::new(compiler.targets(), write)));
        }

        let hub = config.hot.map(|options| {
            let hub = ConnectionHub::new(compiler.as_ref(), options, Arc::clone(&ticks));
            tracker.subscribe(Arc::new(hub.clone()));
            hub
        });

        let (sink, events) = mpsc::unbounded_channel();
        compiler.watch(sink)?;
        let driver = runtime.spawn(tracker.clone().run(events));

        Ok(Self {
            inner: Arc::new(Inner {
                compiler,
                fs,
                tracker,
                router,
                hub,
                driver: Mutex::new(Some(driver)),
            }),
        })
    }

    /// Install the dev server middleware on `router`.
    ///
    /// Add routes and a fallback before calling this; the middleware only
    /// wraps what the router already has.
    pub fn layer<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let router = router.layer(axum::middleware::from_fn_with_state(
            self.clone(),
            middleware::dev,
        ));

        match &self.inner.hub {
            Some(hub) => router.layer(axum::middleware::from_fn_with_state(
                hub.clone(),
                middleware::hot,
            )),
            None => router,
        }
    }

    /// Whether a completed build is available.
    pub fn is_ready(&self) -> bool {
        self.inner.tracker.is_ready()
    }

    /// Run `callback` once a build is available.
    pub fn ready(&self, callback: impl FnOnce(Arc<BuildResult>) + Send + 'static) {
        self.inner.tracker.ready(callback);
    }

    /// Wait until a build is available.
    pub async fn wait_ready(&self) -> Option<Arc<BuildResult>> {
        self.inner.tracker.wait_ready().await
    }

    /// Ask the compiler to rebuild.
    pub fn invalidate(&self) {
        self.inner.compiler.invalidate();
    }

    /// Stop watching and disconnect every live client.
    pub fn close(&self) {
        self.inner.compiler.close();
        if let Some(hub) = &self.inner.hub {
            hub.close_all();
        }
        if let Some(driver) = self.inner.driver.lock().take() {
            driver.abort();
        }
        tracing::debug!("dev server closed");
    }

    pub fn tracker(&self) -> &BuildStatusTracker {
        &self.inner.tracker
    }

    pub fn router(&self) -> &OutputRouter {
        &self.inner.router
    }

    pub fn hub(&self) -> Option<&ConnectionHub> {
        self.inner.hub.as_ref()
    }

    pub fn fs(&self) -> &Arc<dyn OutputFileSystem> {
        &self.inner.fs
    }
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer")
            .field("tracker", &self.inner.tracker)
            .field("hub", &self.inner.hub)
            .finish()
    }
}
