//! # parsekit Engine
//!
//! The object model behind the parsekit client.
//!
//! This crate holds everything about remote objects that does not need a
//! network: the record entity with its change tracking, field operations, the
//! JSON wire codec, access control lists and the query builder.
//!
//! ## Design Principles
//!
//! - **No IO**: request dispatch lives in `parsekit-client`
//! - **Closed values**: fields hold a [`Value`], never an untyped blob
//! - **Pure merges**: collapsing pending edits is a plain function over
//!   [`FieldOp`] pairs
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] keeps the last server-confirmed values apart from local
//! edits. Reads see local edits first; a successful save folds them into the
//! confirmed state.
//!
//! ### Field operations
//!
//! Edits are queued per field as a [`FieldOp`]:
//! - [`FieldOp::Set`] / [`FieldOp::Unset`]
//! - [`FieldOp::Increment`]
//! - [`FieldOp::AddItems`], [`FieldOp::AddUniqueItems`], [`FieldOp::RemoveItems`]
//! - [`FieldOp::RelationEdit`]
//!
//! ### Wire codec
//!
//! [`codec::encode`] and [`codec::decode`] translate between [`Value`] and the
//! backend's JSON, including the `__type`-tagged special types.
//!
//! ## Quick Start
//!
//! ```rust
//! use parsekit_engine::{Acl, Query, Record, Value};
//! use serde_json::json;
//!
//! let mut score = Record::new("GameScore");
//! score.set("player", "Sean Plott").unwrap();
//! score.increment("score", 1337).unwrap();
//!
//! let mut acl = Acl::new();
//! acl.set_public_read_access(true);
//! score.set_acl(acl);
//!
//! assert_eq!(score.get("score"), Some(Value::from(1337)));
//! assert_eq!(
//!     score.save_payload().unwrap(),
//!     json!({"ACL": {"*": {"read": true}}, "player": "Sean Plott", "score": 1337})
//! );
//!
//! let query = Query::new("GameScore")
//!     .where_greater_than("score", 1000)
//!     .order_by_descending("score")
//!     .limit(10);
//! assert_eq!(query.to_params().unwrap().len(), 3);
//! ```

pub mod acl;
pub mod codec;
pub mod error;
pub mod operation;
pub mod query;
pub mod record;
pub mod relation;
pub mod value;

// Re-export main types at crate root
pub use acl::{Acl, Permissions};
pub use error::{codes, Error};
pub use operation::{FieldOp, RelationEdit};
pub use query::Query;
pub use record::Record;
pub use relation::Relation;
pub use value::{FileRef, FromValue, GeoPoint, Number, Pointer, RelationRef, Value};

/// Type aliases for clarity
pub type ClassName = String;
pub type ObjectId = String;
