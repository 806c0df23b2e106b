//! # kvdex Storage
//!
//! The key-value store contract behind kvdex secondary indexes, plus its
//! implementations.
//!
//! A store holds four kinds of structures, all addressed by string keys
//! (see [`keys`] for the exact formats):
//!
//! - **index buckets**: ordered sets of primary keys scored by a sort value
//! - **reverse mappings**: the set of index keys a primary key belongs to
//! - **data hashes**: field values used to resolve ORDER BY / GROUP BY
//! - **deletion markers**: short-lived tombstones applied by a cleanup sweep
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and single-process use
//! - [`CommandStore`] - Redis-style commands over any [`CommandClient`]
//!
//! ## Example
//!
//! ```rust
//! use kvdex_storage::{keys, InMemoryStore, KeyValueStore};
//!
//! let store = InMemoryStore::new();
//! let bucket = keys::index_key("orders", "status", "OPEN");
//! store.add_index_record(&bucket, "42", 0.0).unwrap();
//! store.add_primary_key_to_index_mapping("orders", "42", &bucket).unwrap();
//! assert!(store.get_primary_key_mappings("orders", "42").unwrap().contains(&bucket));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod error;
mod glob;
pub mod keys;
mod keyspace;
mod memory;
mod store;
mod ttl;

pub use command::{Command, CommandClient, CommandStore, LoopbackClient, Reply};
pub use error::{StoreError, StoreResult};
pub use glob::KeyPattern;
pub use keys::MarkedEntry;
pub use keyspace::Keyspace;
pub use memory::InMemoryStore;
pub use store::KeyValueStore;
pub use ttl::DeletionTtl;
