//! Build watcher contract.
//!
//! The bundler itself is an external collaborator. This module defines the
//! narrow interface the dev server consumes from it:
//!
//! - [`Compiler`] - per-target configuration, plugin injection and a watch
//!   loop that reports [`BuildEvent`]s through an [`EventSink`]
//! - [`BuildResult`] - the outcome of one build generation, either a single
//!   target or an aggregate of several
//! - [`BuildStatusTracker`] - the lifecycle state machine driven by those
//!   events

mod disk;
pub mod tick;
mod tracker;

pub use disk::{DiskWriter, WriteFilter, WriteToDisk};
pub use tick::TickQueue;
pub use tracker::{BuildListener, BuildStatusTracker, DoneHook, ReadyCallback, log_summary};

use crate::error::{ConfigError, Result};
use crate::fs::OutputFileSystem;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Output settings of one build target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    /// Absolute directory the target emits into
    pub path: PathBuf,
    /// URL prefix the output is served under (`"auto"` means `/`)
    pub public_path: Option<String>,
}

/// How much of a build's stats the default done hook prints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatsPreset {
    /// Print nothing
    None,
    /// Only errors
    ErrorsOnly,
    /// Hash and issue counts
    Minimal,
    /// Hash, timing and issues
    #[default]
    Normal,
    /// Everything, including warnings in full
    Verbose,
}

impl FromStr for StatsPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" | "false" => Ok(Self::None),
            "errors-only" => Ok(Self::ErrorsOnly),
            "minimal" => Ok(Self::Minimal),
            "normal" | "true" => Ok(Self::Normal),
            "verbose" => Ok(Self::Verbose),
            other => Err(ConfigError::InvalidValue {
                field: "stats".to_string(),
                value: other.to_string(),
                hint: "Use one of: none, errors-only, minimal, normal, verbose".to_string(),
            }),
        }
    }
}

/// Configuration of one build target as exposed by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Target name, used in log prefixes and the client entry
    pub name: Option<String>,
    /// Base directory entries are resolved from
    pub context: PathBuf,
    pub output: OutputOptions,
    /// Stats preset configured on the target
    pub stats: StatsPreset,
}

impl TargetConfig {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        let path = output_path.into();
        Self {
            name: None,
            context: path.clone(),
            output: OutputOptions {
                path,
                public_path: None,
            },
            stats: StatsPreset::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.output.public_path = Some(public_path.into());
        self
    }

    /// `compiler "<name>": ` prefix for log lines, empty for unnamed targets.
    pub fn log_prefix(&self) -> String {
        match &self.name {
            Some(name) => format!("compiler \"{name}\": "),
            None => String::new(),
        }
    }
}

/// One error or warning reported by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsIssue {
    pub message: String,
    /// Module the issue originates from, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
}

impl StatsIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            module_name: None,
        }
    }
}

/// Stats of one completed target build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub target: TargetConfig,
    /// Content hash of the build output
    pub hash: String,
    /// Completion time (ms since epoch)
    pub built_at: Option<i64>,
    /// Build duration (ms)
    pub time: Option<u64>,
    pub errors: Vec<StatsIssue>,
    pub warnings: Vec<StatsIssue>,
}

impl Stats {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Render a textual summary at the given detail level.
    ///
    /// Empty for [`StatsPreset::None`], and for
    /// [`StatsPreset::ErrorsOnly`] when there are no errors.
    pub fn summary(&self, preset: StatsPreset) -> String {
        let mut out = String::new();
        let prefix = self.target.log_prefix();

        match preset {
            StatsPreset::None => {}
            StatsPreset::ErrorsOnly => {
                for error in &self.errors {
                    let _ = writeln!(out, "{prefix}ERROR {}", error.message);
                }
            }
            StatsPreset::Minimal => {
                let _ = write!(
                    out,
                    "{prefix}{} errors, {} warnings",
                    self.errors.len(),
                    self.warnings.len()
                );
            }
            StatsPreset::Normal | StatsPreset::Verbose => {
                let _ = write!(out, "{prefix}hash {}", self.hash);
                if let Some(time) = self.time {
                    let _ = write!(out, ", built in {time} ms");
                }
                for error in &self.errors {
                    let _ = write!(out, "\nERROR {}", error.message);
                }
                if preset == StatsPreset::Verbose {
                    for warning in &self.warnings {
                        let _ = write!(out, "\nWARNING {}", warning.message);
                    }
                } else if self.has_warnings() {
                    let _ = write!(out, "\n{} warnings", self.warnings.len());
                }
            }
        }

        out.trim_end().to_string()
    }
}

/// Outcome of one build generation.
///
/// Whether a build is multi-target is decided once, by the compiler, when it
/// reports the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
    Single(Stats),
    Aggregate(Vec<Stats>),
}

impl BuildResult {
    /// Per-target stats in target declaration order.
    pub fn targets(&self) -> &[Stats] {
        match self {
            BuildResult::Single(stats) => std::slice::from_ref(stats),
            BuildResult::Aggregate(children) => children,
        }
    }

    /// Generation hash; aggregates concatenate their children's hashes.
    pub fn hash(&self) -> String {
        match self {
            BuildResult::Single(stats) => stats.hash.clone(),
            BuildResult::Aggregate(children) => {
                children.iter().map(|child| child.hash.as_str()).collect()
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        self.targets().iter().any(Stats::has_errors)
    }

    pub fn has_warnings(&self) -> bool {
        self.targets().iter().any(Stats::has_warnings)
    }

    /// Summary of every target, each at its own preset unless `preset`
    /// overrides it.
    pub fn summary(&self, preset: Option<StatsPreset>) -> String {
        self.targets()
            .iter()
            .map(|stats| stats.summary(preset.unwrap_or(stats.target.stats)))
            .filter(|summary| !summary.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Build progress as reported by the progress plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub status: String,
    pub messages: Vec<String>,
    /// Completion in `0.0..=1.0`
    pub percentage: f64,
}

/// An asset the compiler wrote to its output filesystem.
#[derive(Debug, Clone)]
pub struct EmittedAsset {
    /// Index of the emitting target in [`Compiler::targets`]
    pub target: usize,
    /// Absolute destination path
    pub target_path: PathBuf,
    pub content: Arc<[u8]>,
}

/// Lifecycle notification from the build watcher.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// A rebuild has started, triggered by a change to `path`
    Invalid {
        path: Option<String>,
        /// ms since epoch
        timestamp: i64,
    },
    /// A build generation completed
    Done(Arc<BuildResult>),
    Progress(ProgressReport),
    AssetEmitted(EmittedAsset),
}

impl BuildEvent {
    /// An invalidation stamped with the current time.
    pub fn invalid(path: Option<String>) -> Self {
        BuildEvent::Invalid {
            path,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Channel the compiler reports events through.
pub type EventSink = mpsc::UnboundedSender<BuildEvent>;

/// Plugins the dev server injects into compiler targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildPlugin {
    /// Enable hot module replacement
    HotModuleReplacement,
    /// Add an entry module, resolved from `context`
    Entry { context: PathBuf, request: String },
    /// Report [`BuildEvent::Progress`]
    Progress,
}

/// A watching bundler, single or multi-target.
pub trait Compiler: Send + Sync {
    /// Configuration of every target, in declaration order.
    fn targets(&self) -> Vec<TargetConfig>;

    /// Route all build output into `fs`.
    fn set_output_file_system(&self, fs: Arc<dyn OutputFileSystem>);

    /// Apply a plugin to one target, or to the root compiler for `None`.
    fn apply_plugin(&self, target: Option<usize>, plugin: BuildPlugin);

    /// Start watching. Events are reported on `sink` until [`close`](Self::close).
    fn watch(&self, sink: EventSink) -> Result<()>;

    /// Ask the watcher to rebuild.
    fn invalidate(&self);

    /// Stop watching.
    fn close(&self);
}
