//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The config file is
//! optional when it is the implicit default; a path given with `--config` or
//! `CONFIG_PATH` must exist.

use counsel_gateway::{GatewayConfig, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "counsel.toml";

/// Root configuration
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Counsel API connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_timeout")]
    pub refresh_timeout_secs: u64,
    #[serde(default = "default_max_refresh_retries")]
    pub max_refresh_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            refresh_timeout_secs: default_timeout(),
            max_refresh_retries: default_max_refresh_retries(),
        }
    }
}

/// Where the token pair is persisted
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
    /// Keep the session in memory only; nothing survives the process.
    #[serde(default)]
    pub ephemeral: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
            ephemeral: false,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3001/api/v1".into()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_refresh_retries() -> u32 {
    1
}

fn default_session_path() -> PathBuf {
    PathBuf::from(".counsel/session.json")
}

/// Resolved config file location.
#[derive(Debug, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    /// Named by the user (flag or env var) rather than the built-in default
    pub explicit: bool,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// A missing file is an error only when the path was explicit.
    pub fn load(location: &ConfigPath) -> common::Result<Self> {
        let mut config = match std::fs::read_to_string(&location.path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !location.explicit => {
                Config::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Ok(url) = std::env::var("COUNSEL_API_BASE_URL") {
            config.api.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.api.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> ConfigPath {
        if let Some(p) = cli_path {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        ConfigPath {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
            explicit: false,
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.api.base_url.clone(),
            request_timeout: Duration::from_secs(self.api.timeout_secs),
            refresh_timeout: Some(Duration::from_secs(self.api.refresh_timeout_secs)),
            retry: RetryPolicy::new(self.api.max_refresh_retries),
        }
    }

    pub fn session_path(&self) -> Option<&Path> {
        (!self.session.ephemeral).then_some(self.session.path.as_path())
    }
}
