//! Broker connection parameters.
//!
//! The queue manager never interprets these beyond building a connection URL;
//! extra options are handed to the backend untouched.
use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    constants::{DEFAULT_REDIS_CONNECTION_TIMEOUT_MS, DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT},
    queues::QueueBackendError,
};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Full connection URL. When set, host/port/credentials are ignored.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: Option<i64>,
    /// Milliseconds to wait for the initial broker connection.
    pub connection_timeout_ms: u64,
    /// Broker-specific options, passed through as-is.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            username: None,
            password: None,
            db: None,
            connection_timeout_ms: DEFAULT_REDIS_CONNECTION_TIMEOUT_MS,
            options: BTreeMap::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: Option<impl Into<String>>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.map(Into::into);
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Returns the connection URL, either the explicit one or one assembled
    /// from the individual fields. Credentials are percent-encoded.
    pub fn redis_url(&self) -> Result<String, QueueBackendError> {
        if let Some(url) = self.url.as_ref().filter(|u| !u.is_empty()) {
            return Ok(url.clone());
        }

        let invalid = |reason: &str| {
            QueueBackendError::ConfigError(format!(
                "Invalid redis connection {}:{}: {}",
                self.host, self.port, reason
            ))
        };

        let mut url = Url::parse(&format!("redis://{}:{}", self.host, self.port))
            .map_err(|e| invalid(&e.to_string()))?;
        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|_| invalid("username not allowed"))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| invalid("password not allowed"))?;
        }
        if let Some(db) = self.db {
            url.set_path(&format!("/{db}"));
        }

        Ok(url.to_string())
    }

    /// Connection target with credentials removed, suitable for logs.
    pub fn display_target(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => redact_url(url),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url.as_deref().map(redact_url))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("options", &self.options)
            .finish()
    }
}
