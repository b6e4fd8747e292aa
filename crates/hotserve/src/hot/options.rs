use serde::{Deserialize, Serialize};

/// Module request of the in-browser client injected into every target.
pub const DEFAULT_CLIENT_ENTRY: &str = "hotserve/client";

/// Live reload socket options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HotOptions {
    /// Apply updates in place instead of reloading
    pub hmr: bool,
    /// Socket path
    pub path: String,
    /// Tell the client to connect over `wss:`
    pub wss: bool,
    /// Reload the page when an update cannot be applied
    pub reload: bool,
    /// Show build errors in an overlay
    pub overlay: bool,
    /// Report build progress
    pub progress: bool,
    /// Client module injected as an extra entry
    pub client_entry: String,
}

impl Default for HotOptions {
    fn default() -> Self {
        Self {
            hmr: true,
            path: "/hot".to_string(),
            wss: false,
            reload: true,
            overlay: true,
            progress: true,
            client_entry: DEFAULT_CLIENT_ENTRY.to_string(),
        }
    }
}

impl HotOptions {
    /// Options with the socket path normalized.
    pub fn normalized(mut self) -> Self {
        self.path = normalize_path(&self.path);
        self
    }

    /// Client entry request carrying the connection parameters for the
    /// target called `name`.
    pub fn client_request(&self, name: Option<&str>) -> String {
        let flag = |value: bool| if value { "true" } else { "false" };

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("path", &self.path)
            .append_pair("name", name.unwrap_or("webpack"))
            .append_pair("hmr", flag(self.hmr))
            .append_pair("wss", flag(self.wss))
            .append_pair("reload", flag(self.reload))
            .append_pair("overlay", flag(self.overlay))
            .append_pair("progress", flag(self.progress))
            .finish();

        format!("{}?{}", self.client_entry, query)
    }
}

/// Normalize a socket path: leading slash, repeated separators collapsed,
/// `.` and `..` segments resolved.
///
/// ```
/// use hotserve::hot::options::normalize_path;
///
/// assert_eq!(normalize_path("a//b/./../c"), "/a/c");
/// assert_eq!(normalize_path("hot"), "/hot");
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(['/', '\\']).filter(|s| !s.is_empty()) {
        match segment {
            "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut normalized = format!("/{}", segments.join("/"));
    if path.ends_with(['/', '\\']) && normalized.len() > 1 {
        normalized.push('/');
    }
    normalized
}
