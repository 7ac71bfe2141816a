//! Live query subscription manager.
//!
//! Tracks active subscriptions and routes inbound server messages to the
//! channel of the subscription they address.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parsekit_engine::{codes, Record};
use serde_json::Value as Json;
use tokio::sync::mpsc;

use super::protocol::{EventKind, LiveQueryEvent, ObjectMessage, ServerMessage};

/// Sender for subscription events.
pub type EventSender = mpsc::UnboundedSender<LiveQueryEvent>;

/// A single registered subscription.
#[derive(Debug)]
pub struct SubscriptionEntry {
    /// Request id chosen by the client
    pub request_id: u64,
    /// Class the subscription's query targets
    pub class_name: String,
    /// Channel to the subscriber
    pub sender: EventSender,
}

/// Manages active subscriptions.
///
/// Thread-safe and can be shared via `Arc`.
#[derive(Debug)]
pub struct SubscriptionManager {
    subscriptions: DashMap<u64, SubscriptionEntry>,
    next_request_id: AtomicU64,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a subscription.
    ///
    /// Returns the request id to send with the subscribe message.
    pub fn register(&self, class_name: impl Into<String>, sender: EventSender) -> u64 {
        self.prune_closed();
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let class_name = class_name.into();

        tracing::debug!(request_id, class = %class_name, "Subscription registered");
        self.subscriptions.insert(
            request_id,
            SubscriptionEntry {
                request_id,
                class_name,
                sender,
            },
        );
        request_id
    }

    /// Drop a subscription. Its channel closes once the entry is gone.
    pub fn unregister(&self, request_id: u64) -> bool {
        let removed = self.subscriptions.remove(&request_id).is_some();
        if removed {
            tracing::debug!(request_id, "Subscription unregistered");
        }
        removed
    }

    /// Route one server message.
    ///
    /// Returns false when no subscription received it.
    pub fn dispatch(&self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Connected { .. } => false,
            ServerMessage::Subscribed { request_id } => {
                self.send_to(request_id, LiveQueryEvent::Subscribed)
            }
            ServerMessage::Unsubscribed { request_id } => {
                let delivered = self.send_to(request_id, LiveQueryEvent::Unsubscribed);
                self.unregister(request_id);
                delivered
            }
            ServerMessage::Error {
                code,
                error,
                request_id,
                ..
            } => {
                let event = LiveQueryEvent::Error {
                    code: code.unwrap_or(codes::OTHER_CAUSE),
                    message: error,
                };
                match request_id {
                    Some(id) => self.send_to(id, event),
                    None => self.broadcast(event) > 0,
                }
            }
            ServerMessage::Create(body) => self.deliver(EventKind::Create, body),
            ServerMessage::Update(body) => self.deliver(EventKind::Update, body),
            ServerMessage::Delete(body) => self.deliver(EventKind::Delete, body),
            ServerMessage::Enter(body) => self.deliver(EventKind::Enter, body),
            ServerMessage::Leave(body) => self.deliver(EventKind::Leave, body),
        }
    }

    /// Send an event to one subscription.
    ///
    /// A subscription whose receiver is gone is dropped.
    pub fn send_to(&self, request_id: u64, event: LiveQueryEvent) -> bool {
        let Some(entry) = self.subscriptions.get(&request_id) else {
            tracing::debug!(request_id, "Event for unknown subscription dropped");
            return false;
        };
        let delivered = entry.sender.send(event).is_ok();
        drop(entry);

        if !delivered {
            self.unregister(request_id);
        }
        delivered
    }

    /// Send an event to every subscription, dropping those whose receiver
    /// is gone.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn broadcast(&self, event: LiveQueryEvent) -> usize {
        let mut sent_count = 0;
        self.subscriptions.retain(|request_id, entry| {
            let delivered = entry.sender.send(event.clone()).is_ok();
            if delivered {
                sent_count += 1;
            } else {
                tracing::debug!(request_id = *request_id, "Subscription receiver dropped");
            }
            delivered
        });
        sent_count
    }

    /// Remove subscriptions whose receiver has been dropped.
    pub fn prune_closed(&self) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|_, entry| !entry.sender.is_closed());
        before - self.subscriptions.len()
    }

    /// Drop every subscription, closing their channels.
    pub fn clear(&self) {
        self.subscriptions.clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn class_of(&self, request_id: u64) -> Option<String> {
        self.subscriptions
            .get(&request_id)
            .map(|entry| entry.class_name.clone())
    }

    fn deliver(&self, kind: EventKind, body: ObjectMessage) -> bool {
        let Some(class_name) = self.class_of(body.request_id) else {
            tracing::debug!(request_id = body.request_id, "Event for unknown subscription dropped");
            return false;
        };

        let object = match decode_object(&class_name, &body.object) {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!(request_id = body.request_id, error = %e, "Undecodable live query object");
                return false;
            }
        };
        let original = body
            .original
            .as_ref()
            .and_then(|json| decode_object(&class_name, json).ok());

        self.send_to(
            body.request_id,
            LiveQueryEvent::Object {
                kind,
                object,
                original,
            },
        )
    }
}

fn decode_object(class_name: &str, json: &Json) -> parsekit_engine::error::Result<Record> {
    Record::from_wire_format(Some(class_name), json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object_message(request_id: u64) -> ObjectMessage {
        ObjectMessage {
            request_id,
            object: json!({"className": "GameScore", "objectId": "g1", "score": 5}),
            original: None,
        }
    }

    #[test]
    fn test_register_unregister() {
        let manager = SubscriptionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = manager.register("GameScore", tx.clone());
        let second = manager.register("GameScore", tx);
        assert_ne!(first, second);
        assert_eq!(manager.subscription_count(), 2);

        assert!(manager.unregister(first));
        assert!(!manager.unregister(first));
        assert_eq!(manager.subscription_count(), 1);
    }

    #[test]
    fn test_routes_by_request_id() {
        let manager = SubscriptionManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let id1 = manager.register("GameScore", tx1);
        let _id2 = manager.register("GameScore", tx2);

        assert!(manager.dispatch(ServerMessage::Create(object_message(id1))));

        let Ok(LiveQueryEvent::Object { kind, object, .. }) = rx1.try_recv() else {
            panic!("expected an object event");
        };
        assert_eq!(kind, EventKind::Create);
        assert_eq!(object.object_id(), Some("g1"));
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_unknown_subscription_dropped() {
        let manager = SubscriptionManager::new();
        assert!(!manager.dispatch(ServerMessage::Delete(object_message(42))));
    }

    #[test]
    fn test_connection_error_broadcast() {
        let manager = SubscriptionManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.register("A", tx1);
        manager.register("B", tx2);

        manager.dispatch(ServerMessage::Error {
            code: Some(1),
            error: "server shutting down".into(),
            reconnect: true,
            request_id: None,
        });
        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(
                rx.try_recv().unwrap(),
                LiveQueryEvent::Error {
                    code: 1,
                    message: "server shutting down".into()
                }
            );
        }
    }

    #[test]
    fn test_unsubscribed_removes_entry() {
        let manager = SubscriptionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = manager.register("GameScore", tx);

        assert!(manager.dispatch(ServerMessage::Unsubscribed { request_id: id }));
        assert_eq!(rx.try_recv().unwrap(), LiveQueryEvent::Unsubscribed);
        assert_eq!(manager.subscription_count(), 0);
        // Sender dropped with the entry
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_dropped_receiver_removed_on_send() {
        let manager = SubscriptionManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = manager.register("GameScore", tx);
        drop(rx);

        assert!(!manager.dispatch(ServerMessage::Subscribed { request_id: id }));
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_removed_on_broadcast() {
        let manager = SubscriptionManager::new();
        let (kept_tx, mut kept_rx) = mpsc::unbounded_channel();
        let (gone_tx, gone_rx) = mpsc::unbounded_channel();
        manager.register("A", kept_tx);
        manager.register("B", gone_tx);
        drop(gone_rx);

        let sent = manager.broadcast(LiveQueryEvent::Error {
            code: 1,
            message: "restarting".into(),
        });

        assert_eq!(sent, 1);
        assert_eq!(manager.subscription_count(), 1);
        assert!(kept_rx.try_recv().is_ok());
    }

    #[test]
    fn test_register_prunes_closed_subscriptions() {
        let manager = SubscriptionManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.register("A", tx);
        drop(rx);

        let (tx, _rx) = mpsc::unbounded_channel();
        manager.register("B", tx);
        assert_eq!(manager.subscription_count(), 1);
    }
}
