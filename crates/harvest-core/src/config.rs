//! Client configuration.
//!
//! [`ClientConfig`] gathers everything the remote-call layer needs:
//! API location, credentials, proxy, timeout, TLS verification, backoff and
//! the logging toggle. It is resolved once (usually with
//! [`ClientConfig::from_env`]) and then handed to whatever performs the calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{HarvestError, Result};
use crate::retry::RetryConfig;

/// Default base URL of the data API.
pub const DEFAULT_API_URL: &str = "https://www.calcbench.com/api";

/// Default request timeout: twenty minutes, large result sets are slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Environment variable holding a bearer token.
pub const TOKEN_ENV: &str = "HARVEST_API_TOKEN";
/// Environment variable holding the account user name.
pub const USERNAME_ENV: &str = "HARVEST_USERNAME";
/// Environment variable holding the account password.
pub const PASSWORD_ENV: &str = "HARVEST_PASSWORD";

/// Credentials presented to the data API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Credentials {
    /// Opaque bearer token.
    Bearer {
        /// The token.
        token: String,
    },
    /// User name and password sent as HTTP basic auth.
    Basic {
        /// Account user name or e-mail.
        username: String,
        /// Account password.
        password: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[REDACTED]")
                .finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Settings for the remote-call layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL; endpoint names are appended after a `/`.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Credentials, if any.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Proxy URL applied to every request.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_timeout", with = "duration_millis")]
    pub timeout: Duration,

    /// Verify TLS certificates.
    #[serde(default = "default_true")]
    pub ssl_verify: bool,

    /// Backoff for failed calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Emit log output.
    #[serde(default = "default_true")]
    pub logging: bool,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            credentials: None,
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            ssl_verify: true,
            retry: RetryConfig::default(),
            logging: true,
        }
    }
}

impl ClientConfig {
    /// Resolves the configuration from `HARVEST_*` environment variables.
    ///
    /// | variable | field |
    /// |----------|-------|
    /// | `HARVEST_API_URL` | `api_url` |
    /// | `HARVEST_API_TOKEN` | bearer credentials |
    /// | `HARVEST_USERNAME` + `HARVEST_PASSWORD` | basic credentials |
    /// | `HARVEST_PROXY` | `proxy` |
    /// | `HARVEST_TIMEOUT_SECS` | `timeout` |
    /// | `HARVEST_SSL_VERIFY` | `ssl_verify` |
    /// | `HARVEST_BACKOFF` | `retry.enabled` |
    /// | `HARVEST_LOG` | `logging` |
    ///
    /// # Errors
    /// Returns [`HarvestError::Config`] for malformed values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns [`HarvestError::Config`] for malformed values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("HARVEST_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        config.credentials = match (get(TOKEN_ENV), get(USERNAME_ENV), get(PASSWORD_ENV)) {
            (Some(token), _, _) => Some(Credentials::Bearer { token }),
            (None, Some(username), Some(password)) => {
                Some(Credentials::Basic { username, password })
            }
            (None, Some(_), None) => {
                return Err(HarvestError::Config(format!(
                    "{USERNAME_ENV} is set but {PASSWORD_ENV} is not"
                )));
            }
            _ => None,
        };

        config.proxy = get("HARVEST_PROXY");

        if let Some(secs) = get("HARVEST_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                HarvestError::Config(format!("HARVEST_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(v) = get("HARVEST_SSL_VERIFY") {
            config.ssl_verify = parse_flag("HARVEST_SSL_VERIFY", &v)?;
        }
        if let Some(v) = get("HARVEST_BACKOFF") {
            config.retry.enabled = parse_flag("HARVEST_BACKOFF", &v)?;
        }
        if let Some(v) = get("HARVEST_LOG") {
            config.logging = parse_flag("HARVEST_LOG", &v)?;
        }

        Ok(config)
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the proxy URL.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Switches backoff on or off.
    #[must_use]
    pub fn with_backoff(mut self, enabled: bool) -> Self {
        self.retry.enabled = enabled;
        self
    }

    /// Builds the full URL of an endpoint.
    #[must_use]
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_url, endpoint.trim_start_matches('/'))
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(HarvestError::Config(format!(
            "{name} must be a boolean, got {other}"
        ))),
    }
}

/// Serde helpers storing a [`Duration`] as whole milliseconds.
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(crate) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
