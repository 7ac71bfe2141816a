//! # parsekit Client
//!
//! Async client for Parse-compatible REST backends, built on
//! [`parsekit_engine`].
//!
//! The engine owns the object model; this crate moves it over the network:
//! saving, fetching and deleting records, running queries, user sessions,
//! files, cloud functions and live query subscriptions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parsekit_client::{Client, ClientConfig, QueryExt, RecordExt};
//! use parsekit_engine::{Query, Record};
//!
//! # async fn demo() -> parsekit_client::Result<()> {
//! let client = Client::new(
//!     ClientConfig::new("myAppId", "https://api.example.com/parse").with_client_key("key"),
//! )?;
//!
//! let mut score = Record::new("GameScore");
//! score.set("score", 1337)?;
//! score.save(&client).await?;
//!
//! let top = Query::new("GameScore")
//!     .order_by_descending("score")
//!     .limit(10)
//!     .find(&client)
//!     .await?;
//! # let _ = top;
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries
//!
//! Requests that get no response, or a 5xx, are resubmitted with exponential
//! backoff up to [`ClientConfig::request_attempt_limit`] attempts in total.
//! Other failures surface immediately.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod file;
pub mod function;
pub mod live_query;
pub mod object;
pub mod query;
pub mod schema;
pub mod storage;
pub mod transport;
pub mod user;

pub use client::Client;
pub use config::{ClientConfig, ConfigError};
pub use dispatcher::{backoff_delay, Dispatcher, RequestOptions};
pub use error::{Error, Result};
pub use live_query::{LiveQueryClient, LiveQueryEvent, MessageStream, Subscription};
pub use object::RecordExt;
pub use query::QueryExt;
pub use schema::delete_all;
pub use storage::{KeyValueStore, MemoryStore};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError};
pub use user::User;
