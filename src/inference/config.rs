//! Client configuration.
//!
//! Built in code with [`ClientConfig::new`] and the `with_*` overrides, or
//! loaded from a YAML file whose string values may reference environment
//! variables (`${SAMBANOVA_API_KEY}`, `${VAR:-default}`).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::errors::ClientError;
use super::types::models;

/// Production endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.sambanova.ai/v1";

/// Model used when a call does not name one.
pub const DEFAULT_MODEL: &str = models::META_LLAMA_3_2_3B_INSTRUCT;

pub const DEFAULT_RETRY_COUNT: u32 = 3;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_TEMPERATURE: f32 = 0.1;

pub const DEFAULT_TOP_P: f32 = 0.1;

// ─── ClientConfig ────────────────────────────────────────────────────────────

/// Construction-time settings. Read-only once the client is built.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    /// Retries after the first attempt, for transport failures only.
    pub default_retry_count: u32,
    /// Base of the exponential backoff.
    pub default_retry_delay: Duration,
    /// Applied by the default transport; `None` disables it.
    pub connect_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Defaults for everything but the credential.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            default_retry_count: DEFAULT_RETRY_COUNT,
            default_retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.default_retry_count = count;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.default_retry_delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Parse YAML (after `${VAR}` interpolation).
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ClientError> {
        let interpolated = interpolate_env_vars(yaml);
        let file: ConfigFile =
            serde_yaml::from_str(&interpolated).map_err(|e| ClientError::ConfigError {
                reason: format!("failed to parse config: {e}"),
            })?;
        file.try_into()
    }

    /// Reject settings no request could succeed with.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.api_key.trim().is_empty() {
            return Err(ClientError::ConfigError {
                reason: "api_key is empty".into(),
            });
        }
        if self.base_url.trim().is_empty() {
            return Err(ClientError::ConfigError {
                reason: "base_url is empty".into(),
            });
        }
        if self.default_model.trim().is_empty() {
            return Err(ClientError::ConfigError {
                reason: "default_model is empty".into(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("default_retry_count", &self.default_retry_count)
            .field("default_retry_delay", &self.default_retry_delay)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

// ─── Per-call options ────────────────────────────────────────────────────────

/// Per-call overrides. Unset fields fall back to client defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub model: Option<String>,
    /// Defaults to 0.1.
    pub temperature: Option<f32>,
    /// Defaults to 0.1.
    pub top_p: Option<f32>,
    /// Unset means the server default.
    pub max_tokens: Option<u32>,
    /// Only meaningful for `chat`; the streaming entry points always stream.
    pub stream: Option<bool>,
    pub retry_count: Option<u32>,
    pub retry_delay: Option<Duration>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// On-disk shape of the config file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    api_key: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    default_model: Option<String>,
    #[serde(default)]
    default_retry_count: Option<u32>,
    #[serde(default)]
    default_retry_delay_ms: Option<u64>,
    /// `0` disables the connect timeout.
    #[serde(default)]
    connect_timeout_secs: Option<u64>,
}

impl TryFrom<ConfigFile> for ClientConfig {
    type Error = ClientError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let mut config = ClientConfig::new(file.api_key);
        if let Some(url) = file.base_url.filter(|u| !u.trim().is_empty()) {
            config.base_url = url;
        }
        if let Some(model) = file.default_model.filter(|m| !m.trim().is_empty()) {
            config.default_model = model;
        }
        if let Some(count) = file.default_retry_count {
            config.default_retry_count = count;
        }
        if let Some(ms) = file.default_retry_delay_ms {
            config.default_retry_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.connect_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }
}

/// Load and parse a YAML client config file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing.
pub fn load_client_config(path: &Path) -> Result<ClientConfig, ClientError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ClientError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let config = ClientConfig::from_yaml_str(&raw)?;
    tracing::debug!(
        path = %path.display(),
        base_url = %config.base_url,
        default_model = %config.default_model,
        "loaded client config"
    );
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${NAME}` and `${NAME:-fallback}` references from the
/// environment. An unterminated `${` is copied through unchanged.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(&lookup_var(&after[..end]));
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// `NAME` resolves to its value or `""`; `NAME:-fallback` to its value or
/// the tilde-expanded fallback.
fn lookup_var(reference: &str) -> String {
    match reference.split_once(":-") {
        Some((name, fallback)) => {
            std::env::var(name).unwrap_or_else(|_| expand_home(fallback))
        }
        None => std::env::var(reference).unwrap_or_default(),
    }
}

/// `~` or `~/...` becomes a path under the home directory.
fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(tail), Some(home)) => format!("{}{tail}", home.display()),
        _ => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
