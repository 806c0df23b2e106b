//! # kvdex Testkit
//!
//! Test utilities for kvdex.
//!
//! This crate provides:
//! - The `tm_case_main` fixture schema, rows and a wired-up [`TestIndex`]
//! - Property-based test generators using proptest
//! - Invariant checkers over the store contract
//!
//! ## Usage
//!
//! ```rust
//! use kvdex_testkit::prelude::*;
//!
//! let index = scenarios::populated_index(4);
//! check_reverse_mapping(&*index.store, CASE_TABLE).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod invariants;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::invariants::*;
}

pub use fixtures::*;
pub use generators::*;
pub use invariants::*;
