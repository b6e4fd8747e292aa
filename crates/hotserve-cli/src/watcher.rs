//! A directory standing in for a watching bundler.
//!
//! [`DirectoryCompiler`] implements the `hotserve` build watcher contract
//! over a directory that some other tool writes build output into. A change
//! anywhere below the root reports `invalid`; once the directory has been
//! quiet for the debounce window a `done` follows, carrying a content hash
//! of the directory listing.

use hotserve::build::{BuildEvent, BuildPlugin, EventSink};
use hotserve::{BuildResult, Compiler, OutputFileSystem, Stats, TargetConfig};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Why a rebuild was requested.
#[derive(Debug, Clone)]
enum Trigger {
    Changed(PathBuf),
    Invalidated,
}

struct Running {
    _watcher: RecommendedWatcher,
    triggers: mpsc::UnboundedSender<Trigger>,
    task: JoinHandle<()>,
}

/// Build watcher over a directory of prebuilt output.
pub struct DirectoryCompiler {
    target: TargetConfig,
    debounce: Duration,
    running: Mutex<Option<Running>>,
}

impl DirectoryCompiler {
    pub fn new(target: TargetConfig, debounce: Duration) -> Self {
        Self {
            target,
            debounce,
            running: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.target.output.path
    }
}

impl Compiler for DirectoryCompiler {
    fn targets(&self) -> Vec<TargetConfig> {
        vec![self.target.clone()]
    }

    fn set_output_file_system(&self, fs: Arc<dyn OutputFileSystem>) {
        // Output is produced outside this process and read from disk
        tracing::debug!(?fs, "output filesystem set");
    }

    fn apply_plugin(&self, target: Option<usize>, plugin: BuildPlugin) {
        match plugin {
            BuildPlugin::Entry { request, .. } => {
                tracing::info!("add the client entry to your bundle: {}", request);
            }
            other => tracing::debug!(?target, plugin = ?other, "plugin requested"),
        }
    }

    fn watch(&self, sink: EventSink) -> hotserve::Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| hotserve::Error::Server(format!("watcher requires a tokio runtime: {e}")))?;

        let (triggers, rx) = mpsc::unbounded_channel();
        let root = self.root().to_path_buf();

        let changes = triggers.clone();
        let filter_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            for path in event.paths {
                if !should_ignore(&path, &filter_root) {
                    let _ = changes.send(Trigger::Changed(path));
                }
            }
        })
        .map_err(|e| hotserve::Error::Server(format!("unable to create watcher: {e}")))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| hotserve::Error::Server(format!("unable to watch {}: {e}", root.display())))?;

        let task = runtime.spawn(run(self.target.clone(), self.debounce, rx, sink));

        let previous = self.running.lock().replace(Running {
            _watcher: watcher,
            triggers,
            task,
        });
        if let Some(previous) = previous {
            previous.task.abort();
        }

        Ok(())
    }

    fn invalidate(&self) {
        if let Some(running) = self.running.lock().as_ref() {
            let _ = running.triggers.send(Trigger::Invalidated);
        }
    }

    fn close(&self) {
        if let Some(running) = self.running.lock().take() {
            running.task.abort();
            tracing::debug!(root = %self.root().display(), "stopped watching");
        }
    }
}

/// Report an initial build, then one rebuild per burst of changes.
async fn run(
    target: TargetConfig,
    debounce: Duration,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
    sink: EventSink,
) {
    if !report_build(&target, &sink).await {
        return;
    }

    while let Some(trigger) = triggers.recv().await {
        let path = match trigger {
            Trigger::Changed(path) => Some(path.display().to_string()),
            Trigger::Invalidated => None,
        };
        if sink.send(BuildEvent::invalid(path)).is_err() {
            return;
        }

        // Wait for the directory to go quiet
        loop {
            match tokio::time::timeout(debounce, triggers.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if !report_build(&target, &sink).await {
            return;
        }
    }
}

/// Hash the directory and send `done`. Returns false once nobody listens.
async fn report_build(target: &TargetConfig, sink: &EventSink) -> bool {
    let started = Instant::now();
    let root = target.output.path.clone();

    let hash = match tokio::task::spawn_blocking(move || content_hash(&root)).await {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("unable to hash output directory: {}", e);
            return true;
        }
    };

    let stats = Stats {
        target: target.clone(),
        hash,
        built_at: Some(chrono::Utc::now().timestamp_millis()),
        time: Some(started.elapsed().as_millis() as u64),
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    sink.send(BuildEvent::Done(Arc::new(BuildResult::Single(stats))))
        .is_ok()
}

/// Hash of every file below `root`: relative path, size and mtime.
///
/// Unreadable entries are skipped.
pub fn content_hash(root: &Path) -> String {
    let mut hasher = blake3::Hasher::new();

    let entries = walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !should_ignore(entry.path(), root));

    for entry in entries {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |elapsed| elapsed.as_nanos());

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(&metadata.len().to_le_bytes());
        hasher.update(&modified.to_le_bytes());
    }

    hasher.finalize().to_hex()[..20].to_string()
}

/// Hidden files and anything outside the root never trigger a rebuild.
fn should_ignore(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };

    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_ignore() {
        let root = PathBuf::from("/project/dist");
        assert!(!should_ignore(&root.join("app.js"), &root));
        assert!(should_ignore(&root.join(".cache/x.js"), &root));
        assert!(should_ignore(&root.join("assets/.DS_Store"), &root));
        assert!(should_ignore(Path::new("/elsewhere/app.js"), &root));
    }

    #[test]
    fn test_content_hash_tracks_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "one").unwrap();
        let first = content_hash(dir.path());
        assert_eq!(first.len(), 20);
        assert_eq!(content_hash(dir.path()), first);

        std::fs::write(dir.path().join("other.js"), "two").unwrap();
        assert_ne!(content_hash(dir.path()), first);
    }

    #[test]
    fn test_hidden_files_do_not_change_hash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "one").unwrap();
        let before = content_hash(dir.path());

        std::fs::write(dir.path().join(".swp"), "scratch").unwrap();
        assert_eq!(content_hash(dir.path()), before);
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<BuildEvent>) -> BuildEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_reports_initial_build() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "one").unwrap();

        let compiler = DirectoryCompiler::new(
            TargetConfig::new(dir.path()),
            Duration::from_millis(10),
        );
        let (sink, mut events) = mpsc::unbounded_channel();
        compiler.watch(sink).unwrap();

        match next_event(&mut events).await {
            BuildEvent::Done(result) => assert_eq!(result.hash(), content_hash(dir.path())),
            other => panic!("expected done, got {other:?}"),
        }

        compiler.close();
    }

    #[tokio::test]
    async fn test_invalidate_reports_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = DirectoryCompiler::new(
            TargetConfig::new(dir.path()),
            Duration::from_millis(10),
        );
        let (sink, mut events) = mpsc::unbounded_channel();
        compiler.watch(sink).unwrap();

        assert!(matches!(next_event(&mut events).await, BuildEvent::Done(_)));
        compiler.invalidate();
        assert!(matches!(
            next_event(&mut events).await,
            BuildEvent::Invalid { path: None, .. }
        ));
        assert!(matches!(next_event(&mut events).await, BuildEvent::Done(_)));

        compiler.close();
    }
}
