//! Serializable dev server configuration.
//!
//! Everything that can be expressed as data lives here; function-valued
//! options (ignore predicate, header hook, write filter, done hook) are set
//! on [`DevServerOptions`](crate::server::DevServerOptions).

use crate::build::StatsPreset;
use crate::error::ConfigError;
use crate::hot::HotOptions;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DevServerConfig {
    /// Live reload socket; `None` disables the socket entirely
    pub hot: Option<HotOptions>,
    pub etag: bool,
    pub accept_ranges: bool,
    pub last_modified: bool,
    /// Extra headers added to every served file
    pub headers: BTreeMap<String, String>,
    /// Mirror every emitted asset to disk
    pub write_to_disk: bool,
    /// Override the stats preset of every target
    pub stats: Option<StatsPreset>,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            hot: Some(HotOptions::default()),
            etag: true,
            accept_ranges: true,
            last_modified: true,
            headers: BTreeMap::new(),
            write_to_disk: false,
            stats: None,
        }
    }
}

impl DevServerConfig {
    /// The static headers as a header map.
    pub fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());

        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| ConfigError::InvalidValue {
                    field: "headers".to_string(),
                    value: name.clone(),
                    hint: "Header names may only contain token characters".to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidValue {
                    field: format!("headers.{name}"),
                    value: value.clone(),
                    hint: "Header values must be visible ASCII".to_string(),
                })?;
            map.insert(header_name, header_value);
        }

        Ok(map)
    }
}
