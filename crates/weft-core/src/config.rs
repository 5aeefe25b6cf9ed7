//! weft.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::policy::StaticPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Optional server configuration, merged under explicit CLI flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeftConfig {
    pub server: Option<ServerConfig>,
    pub serve: Option<ServeConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServeConfig {
    /// Static-file gate: "all", "html", or "none".
    pub static_files: Option<String>,
}

impl WeftConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn host(&self) -> Option<&str> {
        self.server.as_ref()?.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.server.as_ref()?.port
    }

    /// The configured static policy, if the `serve` section names one.
    /// Unknown values are treated as absent.
    pub fn static_policy(&self) -> Option<StaticPolicy> {
        match self.serve.as_ref()?.static_files.as_deref()? {
            "all" => Some(StaticPolicy::All),
            "html" => Some(StaticPolicy::HtmlOnly),
            "none" => Some(StaticPolicy::Disabled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8080

[serve]
static_files = "html"
"#;
        let config: WeftConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host(), Some("0.0.0.0"));
        assert_eq!(config.port(), Some(8080));
        assert_eq!(config.static_policy(), Some(StaticPolicy::HtmlOnly));
    }

    #[test]
    fn empty_config_has_no_opinions() {
        let config: WeftConfig = toml::from_str("").unwrap();
        assert_eq!(config.host(), None);
        assert_eq!(config.port(), None);
        assert_eq!(config.static_policy(), None);
    }

    #[test]
    fn unknown_static_gate_is_ignored() {
        let toml_str = r#"
[serve]
static_files = "sometimes"
"#;
        let config: WeftConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.static_policy(), None);
    }
}
