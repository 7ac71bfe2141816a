//! Request dispatcher.
//!
//! Resolves URLs, composes authentication headers and resubmits failed
//! requests with exponential backoff. Holds no per-call state beyond the
//! shared configuration.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::transport::{HttpRequest, HttpTransport, Method};

pub const HEADER_APPLICATION_ID: &str = "X-Parse-Application-Id";
pub const HEADER_CLIENT_KEY: &str = "X-Parse-Client-Key";
pub const HEADER_MASTER_KEY: &str = "X-Parse-Master-Key";
pub const HEADER_SESSION_TOKEN: &str = "X-Parse-Session-Token";
pub const HEADER_INSTALLATION_ID: &str = "X-Parse-Installation-Id";
pub const HEADER_REQUEST_ID: &str = "X-Parse-Request-Id";

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Send the elevated credential instead of the client key
    pub use_master_key: bool,
    /// Overrides the configured default session token
    pub session_token: Option<String>,
    /// Overrides the configured installation id
    pub installation_id: Option<String>,
}

impl RequestOptions {
    pub fn master() -> Self {
        Self {
            use_master_key: true,
            ..Self::default()
        }
    }

    pub fn session(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
            ..Self::default()
        }
    }
}

/// Sends requests to the backend through an [`HttpTransport`].
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<ClientConfig>,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("server_url", &self.config.server_url)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(config: Arc<ClientConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Issue a request and return the decoded JSON body.
    ///
    /// Connectivity failures and 5xx responses are retried until the
    /// configured attempt limit is reached; the last error is returned.
    /// Every other failure surfaces on first response.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Json>,
        options: &RequestOptions,
    ) -> Result<Json> {
        // One id per logical request, shared by all of its attempts.
        let request_id = (self.config.idempotency && method.is_idempotency_candidate())
            .then(|| uuid::Uuid::new_v4().to_string());

        let request = HttpRequest {
            method,
            url: self.config.url_for(path),
            headers: self.build_headers(options, request_id.as_deref()),
            query: params.to_vec(),
            body,
        };

        let limit = self.config.request_attempt_limit.max(1);
        let mut attempt: u32 = 0;
        loop {
            tracing::debug!(method = %method, path = %path, attempt, "Dispatching request");

            let error = match self.transport.send(request.clone()).await {
                Ok(response) if response.is_success() => return decode_body(&response.body),
                Ok(response) => Error::from_response(response.status, &response.body),
                Err(e) => Error::from(e),
            };

            if !error.is_retryable() || attempt + 1 >= limit {
                return Err(error);
            }

            let delay = backoff_delay(self.config.base_retry_delay, attempt);
            tracing::warn!(
                method = %method,
                path = %path,
                attempt,
                status = ?error.status(),
                delay_ms = delay.as_millis() as u64,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub async fn get(&self, path: &str, params: &[(String, String)], options: &RequestOptions) -> Result<Json> {
        self.request(Method::Get, path, params, None, options).await
    }

    pub async fn post(&self, path: &str, body: Json, options: &RequestOptions) -> Result<Json> {
        self.request(Method::Post, path, &[], Some(body), options).await
    }

    pub async fn put(&self, path: &str, body: Json, options: &RequestOptions) -> Result<Json> {
        self.request(Method::Put, path, &[], Some(body), options).await
    }

    pub async fn delete(&self, path: &str, options: &RequestOptions) -> Result<Json> {
        self.request(Method::Delete, path, &[], None, options).await
    }

    /// Headers for one request.
    ///
    /// The master key replaces the client key when requested and configured.
    pub fn build_headers(
        &self,
        options: &RequestOptions,
        request_id: Option<&str>,
    ) -> Vec<(String, String)> {
        let config = &self.config;
        let mut headers = vec![(
            HEADER_APPLICATION_ID.to_owned(),
            config.application_id.clone(),
        )];

        match (&config.master_key, &config.client_key) {
            (Some(master), _) if options.use_master_key => {
                headers.push((HEADER_MASTER_KEY.to_owned(), master.clone()));
            }
            (_, Some(client_key)) => {
                headers.push((HEADER_CLIENT_KEY.to_owned(), client_key.clone()));
            }
            _ => {}
        }

        let session = options
            .session_token
            .as_ref()
            .or(config.session_token.as_ref());
        if let Some(token) = session {
            headers.push((HEADER_SESSION_TOKEN.to_owned(), token.clone()));
        }

        let installation = options
            .installation_id
            .as_ref()
            .or(config.installation_id.as_ref());
        if let Some(id) = installation {
            headers.push((HEADER_INSTALLATION_ID.to_owned(), id.clone()));
        }

        if let Some(id) = request_id {
            headers.push((HEADER_REQUEST_ID.to_owned(), id.to_owned()));
        }

        for (name, value) in &config.headers {
            headers.push((name.clone(), value.clone()));
        }
        headers
    }
}

/// Delay before the retry that follows failed attempt number `attempt`
/// (zero-based): `base * 2^attempt * (0.5 + 0.5 * attempt / 10)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2f64.powi(attempt.min(64) as i32) * (0.5 + 0.5 * f64::from(attempt) / 10.0);
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

fn decode_body(body: &[u8]) -> Result<Json> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Json::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| parsekit_engine::Error::InvalidJson(format!("response body: {e}")).into())
}
