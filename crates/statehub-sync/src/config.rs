//! Hub and Leaf configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use statehub_auth::BanPolicy;
use statehub_core::serde_helpers::duration_ms;

use crate::error::ConfigError;

/// Port both roles use unless configured otherwise.
pub const DEFAULT_PORT: u16 = 10002;

/// Configuration for a Hub.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Address to bind when the Hub opens its own listener.
    pub host: String,
    pub port: u16,
    /// Login to password. Hashed when the Hub starts.
    pub logins: BTreeMap<String, String>,
    pub ban: BanPolicy,
    /// How often expired ban records are evicted.
    #[serde(rename = "sweep_interval_ms", with = "duration_ms")]
    pub sweep_interval: Duration,
    /// A session that has not authenticated by then is closed.
    #[serde(rename = "auth_timeout_ms", with = "duration_ms")]
    pub auth_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            logins: BTreeMap::new(),
            ban: BanPolicy::default(),
            sweep_interval: Duration::from_secs(60),
            auth_timeout: Duration::from_secs(30),
        }
    }
}

impl HubConfig {
    pub fn with_login(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.logins.insert(login.into(), password.into());
        self
    }

    pub fn with_bind(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_ban_policy(mut self, ban: BanPolicy) -> Self {
        self.ban = ban;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Socket address string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("logins", &self.logins.keys().collect::<Vec<_>>())
            .field("ban", &self.ban)
            .field("sweep_interval", &self.sweep_interval)
            .field("auth_timeout", &self.auth_timeout)
            .finish()
    }
}

/// Configuration for a Leaf.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeafConfig {
    /// Hub host. An `https://` prefix selects a secure endpoint.
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    /// Delay between losing a session and the next connect attempt.
    #[serde(rename = "reconnect_interval_ms", with = "duration_ms")]
    pub reconnect_interval: Duration,
}

impl Default for LeafConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            login: String::new(),
            password: String::new(),
            reconnect_interval: Duration::from_secs(10),
        }
    }
}

impl LeafConfig {
    pub fn new(
        host: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            login: login.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Reject a config that can never connect.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.login.is_empty() {
            return Err(ConfigError::MissingField("login"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::MissingField("password"));
        }
        Ok(())
    }
}

impl fmt::Debug for LeafConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &"..")
            .field("reconnect_interval", &self.reconnect_interval)
            .finish()
    }
}
