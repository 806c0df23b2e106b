//! # kvdex Sync Engine
//!
//! Background reconciliation that repairs drift between the source tables
//! and the index store.
//!
//! This crate provides:
//! - [`SourceTable`], read access to the authoritative tables, and
//!   [`MemorySource`] for tests
//! - [`SyncEngine`] with incremental, full and cleanup runs
//! - [`SyncScheduler`], which drives the engine on Tokio intervals
//! - Retry with exponential backoff for transient failures
//!
//! ## Runs
//!
//! - **Incremental**: rows whose last-modified column is newer than the
//!   table's high-water mark are re-indexed in batches. The mark then
//!   advances to the current time.
//! - **Full**: primary keys in the source and in the store are compared.
//!   Missing keys are indexed; keys the source no longer has are
//!   soft-deleted.
//! - **Cleanup**: expired deletion markers are applied.
//!
//! A failure in one table is logged and recorded in [`SyncStats`]; other
//! tables in the same run still sync.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod scheduler;
mod source;

pub use config::{RetryConfig, SyncConfig};
pub use engine::{Drift, RunSummary, SyncEngine, SyncMode, SyncReport, SyncStats};
pub use error::{SourceError, SourceResult, SyncError, SyncResult};
pub use scheduler::SyncScheduler;
pub use source::{Comparison, MemorySource, SourceTable};
