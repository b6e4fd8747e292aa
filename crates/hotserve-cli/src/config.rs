//! Layered configuration for the CLI.
//!
//! Priority: CLI flags > `HOTSERVE_` environment variables > config file >
//! defaults. The config file is `--config <FILE>` or, when present,
//! `./hotserve.json`.

use crate::cli::ServeArgs;
use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
};
use hotserve::{ConfigError, DevServerConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "hotserve.json";

/// Full CLI configuration.
///
/// ```json
/// {
///   "port": 8080,
///   "publicPath": "/assets/",
///   "server": { "writeToDisk": false, "hot": { "path": "/hot" } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HotserveConfig {
    pub host: String,
    pub port: u16,
    /// URL prefix the served directory answers under
    #[serde(alias = "public_path")]
    pub public_path: Option<String>,
    /// Quiet period after a change before the rebuild is reported
    #[serde(alias = "debounce_ms")]
    pub debounce_ms: u64,
    /// Everything the dev server itself consumes
    pub server: DevServerConfig,
}

impl Default for HotserveConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_path: None,
            debounce_ms: 100,
            server: DevServerConfig::default(),
        }
    }
}

/// Scalar flags merged over the file and environment layers.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlagOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debounce_ms: Option<u64>,
}

impl HotserveConfig {
    /// Load configuration from every source, flags last.
    pub fn load(args: &ServeArgs, config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = config_file(config_path) {
            tracing::debug!(path = %path.display(), "loading config file");
            figment = figment.merge(Json::file(path));
        }

        // HOTSERVE_PORT, HOTSERVE_SERVER__ETAG, ...
        figment = figment.merge(Env::prefixed("HOTSERVE_").split("__"));

        let overrides = FlagOverrides {
            host: args.host.clone(),
            port: args.port,
            public_path: args.public_path.clone(),
            debounce_ms: args.debounce_ms,
        };
        figment = figment.merge(Serialized::defaults(overrides));

        let mut config: Self = figment.extract().map_err(|e| ConfigError::InvalidValue {
            field: "configuration".to_string(),
            value: e.to_string(),
            hint: format!("Check {DEFAULT_CONFIG_FILE} syntax and field types"),
        })?;

        config.apply_switches(args);
        Ok(config)
    }

    /// Apply boolean and repeatable flags, which only ever narrow or extend
    /// what the other layers configured.
    fn apply_switches(&mut self, args: &ServeArgs) {
        let server = &mut self.server;

        if args.no_hot {
            server.hot = None;
        }
        if let Some(hot) = server.hot.as_mut() {
            if args.no_hmr {
                hot.hmr = false;
            }
            if args.no_progress {
                hot.progress = false;
            }
            if let Some(path) = &args.socket_path {
                hot.path = path.clone();
            }
        }

        if args.no_etag {
            server.etag = false;
        }
        if args.no_last_modified {
            server.last_modified = false;
        }
        if args.no_ranges {
            server.accept_ranges = false;
        }
        if args.stats.is_some() {
            server.stats = args.stats;
        }
        for (name, value) in &args.headers {
            server.headers.insert(name.clone(), value.clone());
        }
    }

    /// Address to bind.
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "host".to_string(),
                value: self.host.clone(),
                hint: "Use an IP address such as 127.0.0.1 or 0.0.0.0".to_string(),
            })
    }
}

fn config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(|| {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        default_path.exists().then(|| default_path.to_path_buf())
    })
}
