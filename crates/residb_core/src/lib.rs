//! # ResiDB Core
//!
//! Memory-resident object store with automatic per-property indexes.
//!
//! This crate provides:
//! - An object table holding every record in memory, keyed by identity
//! - Index strategies chosen by declared property kind (text, numeric,
//!   temporal, boolean, fallback) answering exact, range, pattern and
//!   calendar queries
//! - Single-property and composite uniqueness constraints, checked before
//!   any mutation
//! - Debounced background snapshots of each record type to a blob store
//! - Typed collections over hand-written schemas
//!
//! ## Example
//!
//! ```
//! use residb_codec::PropertyKind;
//! use residb_core::{PropertyDef, Record, Store, TypeSchema, UniqueConstraint};
//!
//! let store = Store::open_in_memory().unwrap();
//! store
//!     .register(
//!         TypeSchema::new("User")
//!             .property(PropertyDef::new("username", PropertyKind::Text))
//!             .property(PropertyDef::new("age", PropertyKind::Numeric))
//!             .unique(UniqueConstraint::new("username")),
//!     )
//!     .unwrap();
//!
//! store.insert("User", Record::new().with("username", "a").with("age", 25)).unwrap();
//! store.insert("User", Record::new().with("username", "b").with("age", 30)).unwrap();
//!
//! let young = store.range("User", "age", 20, 27).unwrap();
//! assert_eq!(young.len(), 1);
//!
//! let dup = store.insert("User", Record::new().with("username", "a").with("age", 40));
//! assert!(dup.unwrap_err().is_constraint_violation());
//! # store.close().unwrap();
//! ```
//!
//! ## Concurrency
//!
//! Writes to one record type are serialized by a per-type lock; different
//! types never contend. Reads take no type lock. Only the flush threads
//! perform blocking I/O, and never while a type lock is held.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod error;
mod identity;
pub mod index;
pub mod persistence;
mod query;
mod record;
mod registry;
mod schema;
mod stats;
mod store;
mod table;
mod types;
mod unique;

pub use collection::{Collection, Entity};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use identity::IdentityAllocator;
pub use index::{CalendarBucket, IndexStats};
pub use persistence::PersistenceState;
pub use query::{Predicate, Query};
pub use record::Record;
pub use schema::{CompositeUnique, PropertyDef, TypeSchema, UniqueConstraint};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::Store;
pub use table::ObjectTable;
pub use types::{IdSet, RecordId};
pub use unique::UniquenessManager;

pub use residb_codec::{PropertyKind, Value};
