//! The client handle.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Entry point to a backend.
///
/// Cheap to clone; clones share configuration, transport and storage.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    dispatcher: Dispatcher,
    storage: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("application_id", &self.config.application_id)
            .field("server_url", &self.config.server_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client over the default HTTP transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        validate(&config)?;
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client from `PARSE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Build a client over a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        validate(&config)?;
        let config = Arc::new(config);
        Ok(Self {
            dispatcher: Dispatcher::new(Arc::clone(&config), transport),
            config,
            storage: Arc::new(MemoryStore::new()),
        })
    }

    /// Replace the store used to persist the current session.
    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = storage;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn storage(&self) -> &dyn KeyValueStore {
        self.storage.as_ref()
    }
}

fn validate(config: &ClientConfig) -> Result<()> {
    if config.application_id.trim().is_empty() {
        return Err(Error::NotInitialized("application id is not set".into()));
    }
    if config.server_url.trim().is_empty() {
        return Err(Error::NotInitialized("server url is not set".into()));
    }
    Ok(())
}
