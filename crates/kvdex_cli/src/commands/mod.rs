//! CLI command implementations.

pub mod inspect;
pub mod query;
pub mod sync;
