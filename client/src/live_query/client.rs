//! Live query connection.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use parsekit_engine::{codes, Query};
use tokio::sync::mpsc;

use super::manager::SubscriptionManager;
use super::protocol::{ClientMessage, LiveQueryEvent, ServerMessage, SubscriptionQuery};
use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Duplex text-message stream, usually a WebSocket.
///
/// Methods take `&self` so that sending and receiving can overlap;
/// implementations synchronize internally.
#[async_trait]
pub trait MessageStream: Send + Sync {
    async fn connect(&self, url: &str) -> Result<()>;

    async fn send(&self, text: String) -> Result<()>;

    /// Next inbound message, or `None` once the stream has closed.
    async fn next(&self) -> Option<Result<String>>;

    async fn close(&self) -> Result<()>;
}

/// A connected live query session.
///
/// Inbound messages are only read while [`LiveQueryClient::run`] or
/// [`LiveQueryClient::process_next`] is being awaited; the client spawns no
/// tasks of its own.
pub struct LiveQueryClient {
    stream: Arc<dyn MessageStream>,
    manager: Arc<SubscriptionManager>,
    client_id: Option<String>,
    session_token: Option<String>,
}

impl std::fmt::Debug for LiveQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQueryClient")
            .field("client_id", &self.client_id)
            .field("subscriptions", &self.manager.subscription_count())
            .finish_non_exhaustive()
    }
}

impl LiveQueryClient {
    /// Open `stream` to `url` and complete the connect handshake.
    pub async fn connect(
        client: &Client,
        url: &str,
        stream: Arc<dyn MessageStream>,
    ) -> Result<Self> {
        let config = client.config();
        stream.connect(url).await?;
        stream
            .send(encode(&connect_message(config))?)
            .await?;

        let client_id = match read_message(stream.as_ref()).await? {
            Some(ServerMessage::Connected { client_id }) => client_id,
            Some(ServerMessage::Error { code, error, .. }) => {
                return Err(Error::LiveQuery(format!(
                    "connect rejected ({}): {error}",
                    code.unwrap_or(codes::OTHER_CAUSE)
                )))
            }
            Some(other) => {
                return Err(Error::LiveQuery(format!(
                    "unexpected message before connected: {other:?}"
                )))
            }
            None => return Err(Error::LiveQuery("stream closed during connect".into())),
        };

        tracing::info!(url = %url, client_id = ?client_id, "Live query connected");
        Ok(Self {
            stream,
            manager: SubscriptionManager::new_shared(),
            client_id,
            session_token: config.session_token.clone(),
        })
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn subscription_count(&self) -> usize {
        self.manager.subscription_count()
    }

    /// Subscribe to changes of objects matching `query`.
    pub async fn subscribe(&self, query: &Query) -> Result<Subscription> {
        self.subscribe_with_session(query, self.session_token.clone())
            .await
    }

    /// Subscribe as the owner of `session_token`.
    pub async fn subscribe_with_session(
        &self,
        query: &Query,
        session_token: Option<String>,
    ) -> Result<Subscription> {
        let subscription_query = SubscriptionQuery {
            class_name: query.class_name().to_owned(),
            where_clause: query.where_json()?,
            keys: query.selected_keys().to_vec(),
        };

        let (sender, events) = mpsc::unbounded_channel();
        let request_id = self.manager.register(query.class_name(), sender);
        let message = ClientMessage::Subscribe {
            request_id,
            query: subscription_query,
            session_token,
        };
        if let Err(e) = self.send(&message).await {
            self.manager.unregister(request_id);
            return Err(e);
        }

        Ok(Subscription {
            request_id,
            class_name: query.class_name().to_owned(),
            events,
        })
    }

    /// Ask the server to end a subscription. Its channel closes when the
    /// server confirms.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        self.send(&ClientMessage::Unsubscribe {
            request_id: subscription.request_id,
        })
        .await
    }

    /// Read and route one inbound message.
    ///
    /// Returns false once the stream has closed. Frames that are not valid
    /// protocol messages are logged and skipped.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(frame) = self.stream.next().await else {
            tracing::info!(client_id = ?self.client_id, "Live query stream closed");
            self.manager.clear();
            return Ok(false);
        };
        let text = frame?;
        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(message) => {
                self.manager.dispatch(message);
            }
            Err(e) => tracing::warn!(error = %e, "Undecodable live query frame"),
        }
        Ok(true)
    }

    /// Route inbound messages until the stream closes.
    pub async fn run(&self) -> Result<()> {
        while self.process_next().await? {}
        Ok(())
    }

    /// Close the stream and drop all subscriptions.
    pub async fn close(&self) -> Result<()> {
        self.manager.clear();
        self.stream.close().await?;
        tracing::info!(client_id = ?self.client_id, "Live query closed");
        Ok(())
    }

    async fn send(&self, message: &ClientMessage) -> Result<()> {
        self.stream.send(encode(message)?).await
    }
}

/// Receiving end of one subscription.
#[derive(Debug)]
pub struct Subscription {
    request_id: u64,
    class_name: String,
    events: mpsc::UnboundedReceiver<LiveQueryEvent>,
}

impl Subscription {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Next event, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<LiveQueryEvent> {
        self.events.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<LiveQueryEvent> {
        self.events.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = LiveQueryEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

fn connect_message(config: &ClientConfig) -> ClientMessage {
    ClientMessage::Connect {
        application_id: config.application_id.clone(),
        client_key: config.client_key.clone(),
        master_key: config.master_key.clone(),
        session_token: config.session_token.clone(),
        installation_id: config.installation_id.clone(),
    }
}

fn encode(message: &ClientMessage) -> Result<String> {
    serde_json::to_string(message).map_err(|e| Error::LiveQuery(e.to_string()))
}

async fn read_message(stream: &dyn MessageStream) -> Result<Option<ServerMessage>> {
    match stream.next().await {
        Some(frame) => {
            let text = frame?;
            serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| Error::LiveQuery(format!("invalid message: {e}")))
        }
        None => Ok(None),
    }
}
