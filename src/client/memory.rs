//! In-memory SQL client.
//!
//! This is the reference implementation of [`SqlClient`], playing the role
//! a throwaway Postgres instance would in integration tests. It interprets
//! exactly the statement shapes the bridge synthesizes:
//!
//! - `SHOW server_version_num`
//! - `SELECT tablename FROM pg_tables WHERE schemaname = $1`
//! - `SELECT column_name, udt_name FROM information_schema.columns
//!    WHERE table_name = $1`
//! - `SELECT c1, c2, ... FROM t` with an optional `WHERE c = $1`
//!
//! Anything else fails with `Error::Sql`. It is not a SQL engine.
//!
//! Tables are defined programmatically; every cell is textual, matching
//! the libpq-style cursor the bridge consumes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::{Connector, Param, RowSet, SqlClient};
use crate::{Error, Result};

// ============================================================================
// MemoryDb
// ============================================================================

/// Shared in-memory database: table definitions plus rows.
pub struct MemoryDb {
    /// BTreeMap so table enumeration order is deterministic.
    tables: RwLock<BTreeMap<String, MemoryTable>>,
    server_version: u32,
    /// Per-query artificial latency, for contention tests.
    query_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct MemoryTable {
    /// (column name, native type name) in declaration order.
    columns: Vec<(String, String)>,
    rows: Vec<Vec<Option<String>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            server_version: 160002,
            query_delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Define (or redefine) a table. Columns are (name, native type name),
    /// e.g. `("id", "int4")`.
    pub fn define_table(&self, name: &str, columns: &[(&str, &str)]) {
        self.tables.write().insert(
            name.to_string(),
            MemoryTable {
                columns: columns
                    .iter()
                    .map(|(c, t)| (c.to_string(), t.to_string()))
                    .collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Append one row; values align positionally with the declared columns.
    ///
    /// Panics if the table is undefined or the arity is wrong; these are
    /// test-fixture mistakes, not runtime conditions.
    pub fn insert_row(&self, name: &str, values: &[Option<&str>]) {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(name)
            .unwrap_or_else(|| panic!("no such table '{name}'"));
        assert_eq!(
            values.len(),
            table.columns.len(),
            "row arity does not match '{name}' columns"
        );
        table
            .rows
            .push(values.iter().map(|v| v.map(str::to_string)).collect());
    }

    /// Delay every query by `delay`. Used to widen contention windows in
    /// pool tests.
    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock() = Some(delay);
    }

    /// High-water mark of simultaneously executing queries.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn execute(&self, sql: &str, params: &[Param]) -> Result<RowSet> {
        let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(n, Ordering::SeqCst);
        let delay = *self.query_delay.lock();
        if let Some(d) = delay {
            std::thread::sleep(d);
        }
        let result = self.dispatch(sql, params);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn dispatch(&self, sql: &str, params: &[Param]) -> Result<RowSet> {
        let sql = sql.trim().trim_end_matches(';');

        if sql.eq_ignore_ascii_case("SHOW server_version_num") {
            return Ok(RowSet {
                columns: vec!["server_version_num".into()],
                rows: vec![vec![Some(self.server_version.to_string())]],
            });
        }

        if sql.starts_with("SELECT tablename FROM pg_tables") {
            let schema = params.first().map(Param::as_str).unwrap_or("");
            let rows = if schema == "public" {
                self.tables
                    .read()
                    .keys()
                    .map(|n| vec![Some(n.clone())])
                    .collect()
            } else {
                Vec::new()
            };
            return Ok(RowSet { columns: vec!["tablename".into()], rows });
        }

        if sql.starts_with("SELECT column_name, udt_name FROM information_schema.columns") {
            let table = params.first().map(Param::as_str).unwrap_or("");
            let tables = self.tables.read();
            let rows = tables
                .get(table)
                .map(|t| {
                    t.columns
                        .iter()
                        .map(|(c, ty)| vec![Some(c.clone()), Some(ty.clone())])
                        .collect()
                })
                .unwrap_or_default();
            return Ok(RowSet {
                columns: vec!["column_name".into(), "udt_name".into()],
                rows,
            });
        }

        self.plain_select(sql, params)
    }

    /// `SELECT c1, c2 FROM t [WHERE c = $1[::numeric]]`
    fn plain_select(&self, sql: &str, params: &[Param]) -> Result<RowSet> {
        let body = sql
            .strip_prefix("SELECT ")
            .ok_or_else(|| Error::Sql(format!("unrecognized statement: {sql}")))?;
        let (col_list, rest) = body
            .split_once(" FROM ")
            .ok_or_else(|| Error::Sql(format!("unrecognized statement: {sql}")))?;

        let (table_name, filter) = match rest.split_once(" WHERE ") {
            Some((t, w)) => (t.trim(), Some(w.trim())),
            None => (rest.trim(), None),
        };

        let wanted: Vec<&str> = col_list.split(", ").collect();

        let tables = self.tables.read();
        let table = tables
            .get(table_name)
            .ok_or_else(|| Error::Sql(format!("relation '{table_name}' does not exist")))?;

        // Positions of the requested columns within the stored rows.
        let mut positions = Vec::with_capacity(wanted.len());
        for w in &wanted {
            let pos = table
                .columns
                .iter()
                .position(|(c, _)| c == w)
                .ok_or_else(|| Error::Sql(format!("column '{w}' does not exist")))?;
            positions.push(pos);
        }

        let predicate = filter
            .map(|w| Predicate::parse(w, &table.columns, params))
            .transpose()?;

        let rows = table
            .rows
            .iter()
            .filter(|row| predicate.as_ref().map_or(true, |p| p.matches(row)))
            .map(|row| positions.iter().map(|p| row[*p].clone()).collect())
            .collect();

        Ok(RowSet {
            columns: wanted.iter().map(|s| s.to_string()).collect(),
            rows,
        })
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

/// One parsed `col = $1` filter.
struct Predicate {
    position: usize,
    operand: Param,
}

impl Predicate {
    fn parse(
        filter: &str,
        columns: &[(String, String)],
        params: &[Param],
    ) -> Result<Self> {
        let (col, placeholder) = filter
            .split_once(" = ")
            .ok_or_else(|| Error::Sql(format!("unsupported WHERE clause: {filter}")))?;
        if placeholder != "$1" && placeholder != "$1::numeric" {
            return Err(Error::Sql(format!("unsupported WHERE operand: {placeholder}")));
        }
        let position = columns
            .iter()
            .position(|(c, _)| c == col)
            .ok_or_else(|| Error::Sql(format!("column '{col}' does not exist")))?;
        let operand = params
            .first()
            .cloned()
            .ok_or_else(|| Error::Sql("missing bind parameter $1".into()))?;
        Ok(Self { position, operand })
    }

    fn matches(&self, row: &[Option<String>]) -> bool {
        let Some(cell) = row.get(self.position).and_then(|c| c.as_deref()) else {
            // NULL never equals anything.
            return false;
        };
        match &self.operand {
            Param::Text(s) => cell == s,
            Param::Numeric(s) => match (cell.parse::<f64>(), s.parse::<f64>()) {
                (Ok(a), Ok(b)) => a == b,
                _ => cell == s,
            },
        }
    }
}

// ============================================================================
// MemoryConnector / MemoryClient
// ============================================================================

/// Hands out clients that share one `MemoryDb`.
pub struct MemoryConnector {
    db: Arc<MemoryDb>,
    refuse: AtomicBool,
}

impl MemoryConnector {
    pub fn new(db: Arc<MemoryDb>) -> Self {
        Self { db, refuse: AtomicBool::new(false) }
    }

    /// Make every subsequent `connect()` fail, for open-failure tests.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Connector for MemoryConnector {
    type Client = MemoryClient;

    fn connect(&self) -> Result<MemoryClient> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::ConnectionFailure("connection refused".into()));
        }
        Ok(MemoryClient { db: self.db.clone() })
    }
}

/// One "connection" to a `MemoryDb`.
pub struct MemoryClient {
    db: Arc<MemoryDb>,
}

impl SqlClient for MemoryClient {
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<RowSet> {
        self.db.execute(sql, params)
    }

    fn connected(&mut self) -> bool {
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> Arc<MemoryDb> {
        let db = Arc::new(MemoryDb::new());
        db.define_table("genes", &[("id", "int4"), ("symbol", "varchar")]);
        db.insert_row("genes", &[Some("7"), Some("BRCA1")]);
        db.insert_row("genes", &[Some("8"), Some("TP53")]);
        db
    }

    fn client(db: &Arc<MemoryDb>) -> MemoryClient {
        MemoryConnector::new(db.clone()).connect().unwrap()
    }

    #[test]
    fn test_version_probe() {
        let db = fixture();
        let rs = client(&db).query("SHOW server_version_num;", &[]).unwrap();
        assert_eq!(rs.scalar(), Some("160002"));
    }

    #[test]
    fn test_catalog_queries() {
        let db = fixture();
        let mut c = client(&db);

        let rs = c
            .query(
                "SELECT tablename FROM pg_tables WHERE schemaname = $1;",
                &[Param::Text("public".into())],
            )
            .unwrap();
        assert_eq!(rs.rows, vec![vec![Some("genes".to_string())]]);

        let rs = c
            .query(
                "SELECT column_name, udt_name FROM information_schema.columns WHERE table_name = $1;",
                &[Param::Text("genes".into())],
            )
            .unwrap();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows[0], vec![Some("id".to_string()), Some("int4".to_string())]);
    }

    #[test]
    fn test_select_with_where() {
        let db = fixture();
        let rs = client(&db)
            .query(
                "SELECT id, symbol FROM genes WHERE id = $1::numeric;",
                &[Param::Numeric("7".into())],
            )
            .unwrap();
        assert_eq!(rs.rows, vec![vec![Some("7".to_string()), Some("BRCA1".to_string())]]);
    }

    #[test]
    fn test_null_never_matches() {
        let db = fixture();
        db.define_table("alleles", &[("gene_id", "int4"), ("name", "varchar")]);
        db.insert_row("alleles", &[None, Some("orphan")]);

        let rs = client(&db)
            .query(
                "SELECT gene_id, name FROM alleles WHERE gene_id = $1::numeric;",
                &[Param::Numeric("7".into())],
            )
            .unwrap();
        assert!(rs.is_empty());
    }

    #[test]
    fn test_unknown_statement_fails() {
        let db = fixture();
        assert!(matches!(
            client(&db).query("DROP TABLE genes;", &[]),
            Err(Error::Sql(_))
        ));
    }

    #[test]
    fn test_refused_connection() {
        let conn = MemoryConnector::new(Arc::new(MemoryDb::new()));
        conn.refuse_connections(true);
        assert!(matches!(conn.connect(), Err(Error::ConnectionFailure(_))));
    }
}
