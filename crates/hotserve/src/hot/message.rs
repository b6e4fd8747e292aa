//! Status socket wire protocol.
//!
//! Every frame is a JSON text message `{"action": ..., "payload": {...}}`.

use crate::build::{BuildResult, StatsIssue};
use serde::{Deserialize, Serialize};

/// One status event sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "lowercase")]
pub enum Message {
    /// A build finished with this hash
    Hash { hash: String, timestamp: i64 },
    /// The build finished with errors or warnings
    Issues {
        errors: Vec<StatsIssue>,
        warnings: Vec<StatsIssue>,
        timestamp: i64,
    },
    /// The build finished cleanly
    Ok { timestamp: i64 },
    /// A rebuild started
    Invalid {
        path: Option<String>,
        timestamp: i64,
    },
    Progress {
        status: String,
        messages: Vec<String>,
        percentage: f64,
    },
}

impl Message {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// JSON projection of a completed build, as cached by the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsJson {
    pub hash: String,
    pub built_at: i64,
    pub errors: Vec<StatsIssue>,
    pub warnings: Vec<StatsIssue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StatsJson>,
}

impl StatsJson {
    /// Project a build result.
    ///
    /// An aggregate has no completion time of its own: it takes the latest
    /// of its children's, or the current time if none reports one.
    pub fn from_result(result: &BuildResult) -> Self {
        match result {
            BuildResult::Single(stats) => Self {
                hash: stats.hash.clone(),
                built_at: stats.built_at.unwrap_or_else(now),
                errors: stats.errors.clone(),
                warnings: stats.warnings.clone(),
                children: Vec::new(),
            },
            BuildResult::Aggregate(children) => {
                let built_at = children
                    .iter()
                    .filter_map(|child| child.built_at)
                    .max()
                    .unwrap_or_else(now);

                Self {
                    hash: result.hash(),
                    built_at,
                    errors: children.iter().flat_map(|c| c.errors.clone()).collect(),
                    warnings: children.iter().flat_map(|c| c.warnings.clone()).collect(),
                    children: children
                        .iter()
                        .map(|child| Self::from_result(&BuildResult::Single(child.clone())))
                        .collect(),
                }
            }
        }
    }

    /// The `hash` message followed by `issues` or `ok`.
    pub fn messages(&self) -> [Message; 2] {
        let timestamp = self.built_at;
        let hash = Message::Hash {
            hash: self.hash.clone(),
            timestamp,
        };

        let status = if self.errors.is_empty() && self.warnings.is_empty() {
            Message::Ok { timestamp }
        } else {
            Message::Issues {
                errors: self.errors.clone(),
                warnings: self.warnings.clone(),
                timestamp,
            }
        };

        [hash, status]
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
