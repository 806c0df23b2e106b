//! # kvdex Core
//!
//! Secondary-index maintenance and query planning over a key-value store.
//!
//! This crate provides:
//! - [`IndexSchema`] / [`SchemaRegistry`] describing which fields are indexed
//! - [`QueryPlanner`] turning equality predicates into ordered primary keys
//! - [`Indexer`] keeping the index in step with INSERT, UPDATE and DELETE
//! - [`KeyRestriction`] rendering planner output for the SQL layer
//!
//! ## Example
//!
//! ```rust
//! use kvdex_core::{
//!     Expr, IndexDefinition, IndexSchema, Indexer, InsertStatement, Predicate, QueryPlanner,
//!     SchemaRegistry, SelectQuery,
//! };
//! use kvdex_storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! let schema = IndexSchema::new("orders", "id")
//!     .with_index(IndexDefinition::new("status_idx", ["status"]));
//! let registry = Arc::new(SchemaRegistry::with_schemas(vec![schema]).unwrap());
//! let store = Arc::new(InMemoryStore::new());
//!
//! let indexer = Indexer::new(store.clone(), registry.clone());
//! indexer.insert(&InsertStatement::new(
//!     "orders",
//!     ["id", "jpa_version", "status"],
//!     vec![Expr::lit("42"), Expr::lit(1), Expr::lit("OPEN")],
//! ));
//!
//! let planner = QueryPlanner::new(store, registry);
//! let query = SelectQuery::new("orders").filter(Predicate::eq("status", "OPEN"));
//! assert_eq!(planner.primary_keys(&query), Some(vec!["42".to_string()]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod indexer;
mod lookup;
mod planner;
mod rewrite;
mod schema;
mod statement;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use indexer::{index_entries, score, Indexer};
pub use lookup::Lookup;
pub use planner::{compare_values, IndexPlan, PlanDecision, QueryPlanner};
pub use rewrite::KeyRestriction;
pub use schema::{IndexDefinition, IndexSchema, SchemaRegistry, SchemaSnapshot};
pub use statement::{
    column_name, Assignment, DeleteStatement, Direction, Expr, InsertStatement, Literal, OrderBy,
    Predicate, Row, SelectQuery, UpdateStatement,
};
