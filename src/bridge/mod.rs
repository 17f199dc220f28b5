//! # The Bridge
//!
//! `SqlBridge` is the primary entry point: it owns the connection pool,
//! the session counters, and the Closed/Open state machine, and hosts the
//! discovery, synthesis, materialization, and resolution operations
//! (implemented across this module's submodules).
//!
//! ## State machine
//!
//! Closed ⇄ Open. `open()` fills the pool and probes the server; it is
//! idempotent, so repeat calls after success are no-ops. `close()` drains
//! the pool. Every materializing operation requires Open and fails with
//! `Error::NotOpen` otherwise.

pub mod materialize;
pub mod pool;
pub mod resolve;
pub mod schema;
pub mod sql;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::memory::{MemoryConnector, MemoryDb};
use crate::client::{Connector, Param, RowSet, SqlClient, Uri};
use crate::graph::GraphStore;
use crate::{Error, Result};
use pool::Pool;

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for one bridge instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Number of pooled connections; bounds in-flight statements.
    pub pool_size: usize,
    /// Only tables in this schema are enumerated by `list_tables()`.
    pub schema: String,
    /// Default hop bound for `resolve_incoming` on a value.
    pub max_hops: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            schema: "public".to_string(),
            max_hops: 1,
        }
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Snapshot of the session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    pub queries_issued: u64,
    pub tables_loaded: u64,
    pub rows_loaded: u64,
}

impl std::fmt::Display for BridgeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "queries: {} tables: {} rows: {}",
            self.queries_issued, self.tables_loaded, self.rows_loaded
        )
    }
}

// ============================================================================
// SqlBridge
// ============================================================================

/// A relational database exposed as an on-demand property graph.
pub struct SqlBridge<C: Connector> {
    store: Arc<GraphStore>,
    uri: Uri,
    connector: C,
    config: BridgeConfig,
    /// `None` = Closed. The Arc lets `close()` detach the pool while
    /// outstanding guards still hold it.
    pool: Mutex<Option<Arc<Pool<C::Client>>>>,
    server_version: AtomicU32,
    queries_issued: AtomicU64,
    tables_loaded: AtomicU64,
    rows_loaded: AtomicU64,
}

impl SqlBridge<MemoryConnector> {
    /// Bridge over an in-memory database, for testing and embedding.
    pub fn with_memory(store: Arc<GraphStore>, db: Arc<MemoryDb>) -> Result<Self> {
        Self::new(
            store,
            "postgres://memory/test",
            MemoryConnector::new(db),
            BridgeConfig::default(),
        )
    }
}

#[cfg(feature = "postgres")]
impl SqlBridge<crate::client::pg::PgConnector> {
    /// Bridge over a live Postgres at `uri`
    /// (`postgres://host/dbase?user=foo&passwd=bar`).
    pub fn postgres(store: Arc<GraphStore>, uri: &str) -> Result<Self> {
        let parsed = Uri::parse(uri)?;
        let connector = crate::client::pg::PgConnector::new(&parsed);
        Self::new(store, uri, connector, BridgeConfig::default())
    }
}

impl<C: Connector> SqlBridge<C> {
    /// Construct a Closed bridge. The URI is validated here; everything
    /// else waits for `open()`.
    pub fn new(
        store: Arc<GraphStore>,
        uri: &str,
        connector: C,
        config: BridgeConfig,
    ) -> Result<Self> {
        let uri = Uri::parse(uri)?;
        Ok(Self {
            store,
            uri,
            connector,
            config,
            pool: Mutex::new(None),
            server_version: AtomicU32::new(0),
            queries_issued: AtomicU64::new(0),
            tables_loaded: AtomicU64::new(0),
            rows_loaded: AtomicU64::new(0),
        })
    }

    /// The graph store rows materialize into.
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closed → Open. Fills the pool, probes connectivity and the server
    /// version, and resets the session counters. No-op when already Open.
    ///
    /// A connection failure leaves the bridge Closed.
    pub fn open(&self) -> Result<()> {
        let mut slot = self.pool.lock();
        if slot.is_some() {
            return Ok(());
        }

        let mut connections = Vec::with_capacity(self.config.pool_size);
        for _ in 0..self.config.pool_size.max(1) {
            let conn = self.connector.connect().map_err(|e| match e {
                Error::ConnectionFailure(_) => e,
                other => Error::ConnectionFailure(other.to_string()),
            })?;
            connections.push(conn);
        }
        let pool = Arc::new(Pool::new(connections));

        {
            let mut probe = pool.acquire();
            if !probe.connected() {
                return Err(Error::ConnectionFailure(format!(
                    "failed to connect to {}",
                    self.uri.raw
                )));
            }
        }

        *slot = Some(Arc::clone(&pool));
        drop(slot);

        let version = self
            .exec("SHOW server_version_num;", &[])?
            .scalar()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        self.server_version.store(version, Ordering::Relaxed);
        self.clear_stats();

        info!(uri = %self.uri.raw, version, "bridge open");
        Ok(())
    }

    /// Open → Closed. Drains pooled connections. Connections borrowed at
    /// the time of the call are not reclaimed; callers must release
    /// before close for deterministic cleanup.
    pub fn close(&self) {
        if let Some(pool) = self.pool.lock().take() {
            let drained = pool.drain();
            info!(drained, "bridge closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.pool.lock().is_some()
    }

    /// Probe one pooled connection and round-trip it. Under
    /// single-connection contention this can itself block.
    pub fn connected(&self) -> bool {
        let Some(pool) = self.pool.lock().clone() else {
            return false;
        };
        pool.acquire().connected()
    }

    /// Write-ordering fence. The materialization path is read-only, so
    /// there is nothing to drain yet; placeholder for a write path.
    pub fn barrier(&self) {}

    // ========================================================================
    // Query execution
    // ========================================================================

    /// Run one statement on a pooled connection, counting it.
    pub(crate) fn exec(&self, sql: &str, params: &[Param]) -> Result<RowSet> {
        let pool = self.pool.lock().clone().ok_or(Error::NotOpen)?;
        let mut conn = pool.acquire();
        self.queries_issued.fetch_add(1, Ordering::Relaxed);
        conn.query(sql, params)
    }

    // ========================================================================
    // Stats & monitoring
    // ========================================================================

    pub(crate) fn note_table_loaded(&self) {
        self.tables_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_rows_loaded(&self, n: u64) {
        self.rows_loaded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            queries_issued: self.queries_issued.load(Ordering::Relaxed),
            tables_loaded: self.tables_loaded.load(Ordering::Relaxed),
            rows_loaded: self.rows_loaded.load(Ordering::Relaxed),
        }
    }

    pub fn clear_stats(&self) {
        self.queries_issued.store(0, Ordering::Relaxed);
        self.tables_loaded.store(0, Ordering::Relaxed);
        self.rows_loaded.store(0, Ordering::Relaxed);
    }

    /// Human-readable status block.
    pub fn monitor(&self) -> String {
        if !self.is_open() {
            return format!("No connection to DB `{}`\n", self.uri.raw);
        }
        let stats = self.stats();
        let mut out = String::new();
        out.push_str(&format!("Connected to: {}\n", self.uri.raw));
        out.push_str(&format!(
            "Postgres server version: {}\n",
            self.server_version.load(Ordering::Relaxed)
        ));
        out.push_str(&format!("Number of queries issued: {}\n", stats.queries_issued));
        out.push_str(&format!("Number of loaded tables: {}\n", stats.tables_loaded));
        out.push_str(&format!("Number of rows loaded: {}\n", stats.rows_loaded));
        out
    }
}

impl<C: Connector> Drop for SqlBridge<C> {
    fn drop(&mut self) {
        self.close();
    }
}
