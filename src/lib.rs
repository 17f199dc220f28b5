//! # sqlbridge: Demand-Driven SQL-to-Property-Graph Bridge
//!
//! Exposes a relational database as an on-demand, schema-derived property
//! graph. Nothing is bulk-imported: table structure is discovered lazily,
//! and only the rows a caller actually asks for are materialized into
//! content-addressed graph atoms.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `SqlClient`/`Connector` is the contract between the
//!    bridge and any database driver
//! 2. **Content-addressed atoms**: structurally identical requests collapse
//!    to one `AtomId`, which is the mechanism that makes joins discoverable
//! 3. **Pool is the only lock over SQL**: pool size bounds in-flight
//!    statements; the graph store handles its own concurrency
//! 4. **Everything blocking**: one query, one thread, one pooled connection
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sqlbridge::{GraphStore, SqlBridge, MemoryDb};
//!
//! # fn example() -> sqlbridge::Result<()> {
//! let db = Arc::new(MemoryDb::new());
//! db.define_table("genes", &[("id", "int4"), ("symbol", "varchar")]);
//! db.insert_row("genes", &[Some("7"), Some("BRCA1")]);
//!
//! let store = Arc::new(GraphStore::new());
//! let bridge = SqlBridge::with_memory(store.clone(), db)?;
//! bridge.open()?;
//!
//! // Load every table's schema, then every row of `genes`.
//! let tables = bridge.list_tables()?;
//! bridge.resolve_incoming(tables[0])?;
//! # Ok(())
//! # }
//! ```
//!
//! ## SQL Clients
//!
//! | Client | Feature | Description |
//! |--------|---------|-------------|
//! | `MemoryDb` | (default) | In-memory tables for testing/embedding |
//! | `PgConnector` | `postgres` | Live Postgres via the `postgres` crate |

// ============================================================================
// Modules
// ============================================================================

pub mod graph;
pub mod client;
pub mod bridge;

// ============================================================================
// Re-exports: Graph model
// ============================================================================

pub use graph::{Atom, AtomId, GraphStore, ValueKind};

// ============================================================================
// Re-exports: Client seam
// ============================================================================

pub use client::{Connector, Param, RowSet, SqlClient};
pub use client::memory::{MemoryConnector, MemoryDb};
#[cfg(feature = "postgres")]
pub use client::pg::PgConnector;

// ============================================================================
// Re-exports: Bridge
// ============================================================================

pub use bridge::{BridgeConfig, BridgeStats, SqlBridge};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation attempted before a successful `open()`.
    #[error("store is not open")]
    NotOpen,

    /// The connection URI does not start with a supported scheme.
    #[error("malformed URI '{0}': valid URIs start with 'postgres://'")]
    MalformedUri(String),

    /// Pool could not be filled, or the connectivity probe failed.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// Schema discovery found no usable columns for a table.
    #[error("no usable table description for '{0}'")]
    SchemaNotFound(String),

    /// A SELECT was requested against a signature with an empty manifest.
    #[error("signature for '{0}' has no columns")]
    EmptySignature(String),

    /// Result cursor and signature manifest disagree on column order.
    #[error("column mismatch: cursor returned '{got}', manifest expects '{expected}'")]
    ColumnMismatch { expected: String, got: String },

    /// The resolver was handed an atom kind it cannot classify.
    #[error("unsupported query target: {0}")]
    UnsupportedQueryTarget(String),

    /// A table or column name failed the identifier allow-list.
    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    /// The underlying SQL client reported an execution error.
    #[error("SQL error: {0}")]
    Sql(String),
}

pub type Result<T> = std::result::Result<T, Error>;
