//! # ResiDB Storage
//!
//! Blob store trait and implementations for ResiDB.
//!
//! This crate provides the lowest-level durable storage abstraction for ResiDB.
//! Blob stores are **opaque named byte stores** - they do not interpret
//! the data they hold.
//!
//! ## Design Principles
//!
//! - One blob per name, always replaced as a whole
//! - No knowledge of record formats or JSON
//! - Must be `Send + Sync` so flush workers can share a store
//! - ResiDB owns all format interpretation
//!
//! ## Available Stores
//!
//! - [`InMemoryBlobStore`] - For testing and ephemeral storage
//! - [`FileBlobStore`] - One file per blob inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use residb_storage::{BlobStore, InMemoryBlobStore};
//!
//! let store = InMemoryBlobStore::new();
//! store.write("users.json", b"[]").unwrap();
//! assert_eq!(store.read("users.json").unwrap(), Some(b"[]".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_blob_name, BlobStore};
pub use error::{StorageError, StorageResult};
pub use file::FileBlobStore;
pub use memory::InMemoryBlobStore;
