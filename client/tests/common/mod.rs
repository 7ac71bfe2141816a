//! Shared test fixtures: a scripted HTTP transport and client builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parsekit_client::{
    Client, ClientConfig, HttpRequest, HttpResponse, HttpTransport, TransportError,
};
use serde_json::Value as Json;
use tokio::time::Instant;

// ============================================================================
// Mock Transport
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request: HttpRequest,
    pub at: Instant,
}

/// Replays scripted responses in order and records every request.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    recorded: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, body: Json) -> &Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::json(status, &body)));
        self
    }

    pub fn respond_raw(&self, status: u16, body: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    pub fn fail(&self, error: TransportError) -> &Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.request.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests().pop().expect("no request was sent")
    }

    /// Gaps between consecutive requests.
    pub fn gaps(&self) -> Vec<Duration> {
        let recorded = self.recorded.lock().unwrap();
        recorded.windows(2).map(|w| w[1].at - w[0].at).collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.recorded.lock().unwrap().push(RecordedRequest {
            request: request.clone(),
            at: Instant::now(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request: {} {}", request.method, request.url))
    }
}

// ============================================================================
// Client builders
// ============================================================================

pub const SERVER_URL: &str = "http://localhost:1337/parse";

pub fn test_config() -> ClientConfig {
    ClientConfig::new("test-app", SERVER_URL)
        .with_client_key("client-key")
        .with_base_retry_delay(Duration::from_millis(100))
        .with_request_attempt_limit(5)
}

pub fn client_with(config: ClientConfig, transport: &Arc<MockTransport>) -> Client {
    Client::with_transport(config, transport.clone()).unwrap()
}

pub fn test_client(transport: &Arc<MockTransport>) -> Client {
    client_with(test_config(), transport)
}

pub fn url(path: &str) -> String {
    format!("{SERVER_URL}/{path}")
}
