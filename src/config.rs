//! Gateway configuration, layered from built-in defaults, an optional TOML
//! file and `FLUXGATE__*` environment variables

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Default tracing filter
pub const RUST_LOG: &str = "info,actix_web=info";

/// Config file read when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "fluxgate.toml";

/// Public Replicate API
pub const REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";

/// Environment variable the provider's own SDKs read the token from
pub const REPLICATE_TOKEN_VAR: &str = "REPLICATE_API_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Tracing filter directives
    pub log: String,
    pub server: ServerSettings,
    pub replicate: ReplicateSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Everything the Replicate client needs, handed to it at construction
#[derive(Clone, Deserialize)]
pub struct ReplicateSettings {
    #[serde(default)]
    pub api_token: String,
    pub api_base: String,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl fmt::Debug for ReplicateSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.api_token.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("ReplicateSettings")
            .field("api_token", &token)
            .field("api_base", &self.api_base)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ReplicateSettings {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            api_base: REPLICATE_API_BASE.to_string(),
            poll_interval_ms: 500,
            poll_timeout_secs: 600,
            request_timeout_secs: 120,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Settings {
    /// Load settings. `path` is a TOML file which may be absent.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = Config::builder()
            .set_default("log", RUST_LOG)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("replicate.api_token", "")?
            .set_default("replicate.api_base", REPLICATE_API_BASE)?
            .set_default("replicate.poll_interval_ms", 500)?
            .set_default("replicate.poll_timeout_secs", 600)?
            .set_default("replicate.request_timeout_secs", 120)?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("FLUXGATE").separator("__"))
            .build()?
            .try_deserialize()?;

        if settings.replicate.api_token.is_empty() {
            if let Ok(token) = std::env::var(REPLICATE_TOKEN_VAR) {
                settings.replicate.api_token = token.trim().to_string();
            }
        }
        settings.replicate.api_base = settings
            .replicate
            .api_base
            .trim()
            .trim_end_matches('/')
            .to_string();

        Ok(settings)
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}
