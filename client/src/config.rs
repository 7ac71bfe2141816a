//! Configuration management for the client.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

/// Client configuration.
///
/// Built once and shared by every component of a [`crate::Client`]; several
/// independently configured clients may coexist.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Application identifier sent with every request
    pub application_id: String,
    /// Server root, e.g. `https://api.example.com/parse`
    pub server_url: String,
    /// Client credential
    pub client_key: Option<String>,
    /// Elevated credential, only sent when a call asks for it
    pub master_key: Option<String>,
    /// Session token used when a call does not pass its own
    pub session_token: Option<String>,
    pub installation_id: Option<String>,
    /// Attach a request id to POST and PUT so the server can drop duplicates
    pub idempotency: bool,
    /// Total attempts per request, first one included
    pub request_attempt_limit: u32,
    /// Backoff unit for retries
    pub base_retry_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Static headers added to every request
    pub headers: BTreeMap<String, String>,
}

impl ClientConfig {
    pub const DEFAULT_ATTEMPT_LIMIT: u32 = 5;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

    pub fn new(application_id: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            server_url: server_url.into(),
            client_key: None,
            master_key: None,
            session_token: None,
            installation_id: None,
            idempotency: false,
            request_attempt_limit: Self::DEFAULT_ATTEMPT_LIMIT,
            base_retry_delay: Self::DEFAULT_RETRY_DELAY,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            headers: BTreeMap::new(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let application_id = env::var("PARSE_APPLICATION_ID")
            .map_err(|_| ConfigError::Missing("PARSE_APPLICATION_ID"))?;
        let server_url =
            env::var("PARSE_SERVER_URL").map_err(|_| ConfigError::Missing("PARSE_SERVER_URL"))?;

        let mut config = Self::new(application_id, server_url);
        config.client_key = env::var("PARSE_CLIENT_KEY").ok();
        config.master_key = env::var("PARSE_MASTER_KEY").ok();

        if let Ok(raw) = env::var("PARSE_IDEMPOTENCY") {
            config.idempotency = parse_bool(&raw).ok_or(ConfigError::Invalid {
                name: "PARSE_IDEMPOTENCY",
                value: raw,
            })?;
        }
        if let Ok(raw) = env::var("PARSE_REQUEST_ATTEMPT_LIMIT") {
            config.request_attempt_limit = raw
                .parse()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or(ConfigError::Invalid {
                    name: "PARSE_REQUEST_ATTEMPT_LIMIT",
                    value: raw,
                })?;
        }

        Ok(config)
    }

    pub fn with_client_key(mut self, key: impl Into<String>) -> Self {
        self.client_key = Some(key.into());
        self
    }

    pub fn with_master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_installation_id(mut self, id: impl Into<String>) -> Self {
        self.installation_id = Some(id.into());
        self
    }

    pub fn with_idempotency(mut self, enabled: bool) -> Self {
        self.idempotency = enabled;
        self
    }

    /// Values below one are treated as one.
    pub fn with_request_attempt_limit(mut self, limit: u32) -> Self {
        self.request_attempt_limit = limit.max(1);
        self
    }

    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Full URL for `path` under the server root.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.server_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid {name} value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("app", "https://api.example.com/parse");
        assert_eq!(config.request_attempt_limit, 5);
        assert_eq!(config.base_retry_delay, Duration::from_millis(250));
        assert!(!config.idempotency);
        assert!(config.client_key.is_none());
    }

    #[test]
    fn url_joining() {
        let config = ClientConfig::new("app", "https://api.example.com/parse/");
        assert_eq!(
            config.url_for("/classes/GameScore"),
            "https://api.example.com/parse/classes/GameScore"
        );
        assert_eq!(
            config.url_for("login"),
            "https://api.example.com/parse/login"
        );
    }

    #[test]
    fn builder_setters() {
        let config = ClientConfig::new("app", "http://localhost:1337/parse")
            .with_client_key("ck")
            .with_master_key("mk")
            .with_idempotency(true)
            .with_request_attempt_limit(0)
            .with_header("X-Custom", "1");
        assert_eq!(config.client_key.as_deref(), Some("ck"));
        assert_eq!(config.master_key.as_deref(), Some("mk"));
        assert!(config.idempotency);
        assert_eq!(config.request_attempt_limit, 1);
        assert_eq!(config.headers["X-Custom"], "1");
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
