//! # Outbox Storage
//!
//! Durable key-value persistence grouped into named partitions.
//!
//! This crate is the lowest layer of the offline outbox. Stores are
//! **opaque byte stores** - they do not interpret the records they hold.
//! The operation log and the offline repository own all encoding.
//!
//! ## Design Principles
//!
//! - A store is a set of partitions, each a map from string key to bytes
//! - `put_record` replaces the previous value for a key atomically
//! - Must be `Send + Sync` so one store can back several components
//! - Errors are reported, never panicked on; callers decide whether they are fatal
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral queues
//! - [`FileStore`] - Directory-per-partition, file-per-key persistence
//!
//! ## Example
//!
//! ```rust
//! use outbox_storage::{DurableStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.put_record("tickets", "t-1", b"{\"type\":\"single\"}").unwrap();
//! let records = store.get_all_records("tickets").unwrap();
//! assert_eq!(records.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{validate_name, DurableStore};
