//! Live query message protocol definitions.
//!
//! All messages are JSON objects tagged by `op`; field names are camelCase.

use parsekit_engine::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Open a session. Must be the first message on a connection.
    Connect {
        #[serde(rename = "applicationId")]
        application_id: String,
        #[serde(rename = "clientKey", skip_serializing_if = "Option::is_none")]
        client_key: Option<String>,
        #[serde(rename = "masterKey", skip_serializing_if = "Option::is_none")]
        master_key: Option<String>,
        #[serde(rename = "sessionToken", skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
        #[serde(rename = "installationId", skip_serializing_if = "Option::is_none")]
        installation_id: Option<String>,
    },

    /// Start receiving events for a query.
    Subscribe {
        #[serde(rename = "requestId")]
        request_id: u64,
        query: SubscriptionQuery,
        #[serde(rename = "sessionToken", skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
    },

    /// Stop a subscription.
    Unsubscribe {
        #[serde(rename = "requestId")]
        request_id: u64,
    },
}

/// Query part of a subscribe message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionQuery {
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(rename = "where")]
    pub where_clause: Json,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ServerMessage {
    Connected {
        #[serde(rename = "clientId", default)]
        client_id: Option<String>,
    },

    Subscribed {
        #[serde(rename = "requestId")]
        request_id: u64,
    },

    Unsubscribed {
        #[serde(rename = "requestId")]
        request_id: u64,
    },

    /// Without a request id the error concerns the whole connection.
    Error {
        #[serde(default)]
        code: Option<i32>,
        #[serde(default)]
        error: String,
        #[serde(default)]
        reconnect: bool,
        #[serde(rename = "requestId", default)]
        request_id: Option<u64>,
    },

    Create(ObjectMessage),
    Update(ObjectMessage),
    Delete(ObjectMessage),
    Enter(ObjectMessage),
    Leave(ObjectMessage),
}

/// Body of an object event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObjectMessage {
    #[serde(rename = "requestId")]
    pub request_id: u64,
    pub object: Json,
    /// Previous state, sent with update, enter and leave
    #[serde(default)]
    pub original: Option<Json>,
}

impl ServerMessage {
    /// Subscription this message is addressed to, if any.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::Connected { .. } => None,
            ServerMessage::Subscribed { request_id } | ServerMessage::Unsubscribed { request_id } => {
                Some(*request_id)
            }
            ServerMessage::Error { request_id, .. } => *request_id,
            ServerMessage::Create(m)
            | ServerMessage::Update(m)
            | ServerMessage::Delete(m)
            | ServerMessage::Enter(m)
            | ServerMessage::Leave(m) => Some(m.request_id),
        }
    }
}

/// What happened to an object relative to a subscribed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Created and matching
    Create,
    /// Updated, matched before and after
    Update,
    /// Deleted while matching
    Delete,
    /// Updated into the query
    Enter,
    /// Updated out of the query
    Leave,
}

/// Event delivered to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveQueryEvent {
    Subscribed,
    Object {
        kind: EventKind,
        object: Record,
        original: Option<Record>,
    },
    Error {
        code: i32,
        message: String,
    },
    Unsubscribed,
}
