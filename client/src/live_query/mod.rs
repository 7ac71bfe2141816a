//! Live query subscriptions.
//!
//! A [`LiveQueryClient`] holds one duplex stream to the live query server.
//! Subscribing to a query yields a [`Subscription`] that receives an event
//! whenever a matching object is created, updated, deleted, or moves into or
//! out of the query.

mod client;
mod manager;
mod protocol;

pub use client::{LiveQueryClient, MessageStream, Subscription};
pub use manager::SubscriptionManager;
pub use protocol::*;
