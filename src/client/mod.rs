//! # SQL Client Seam
//!
//! This is THE contract between the bridge and any database driver.
//! A client executes one blocking statement at a time and hands back a
//! textual row/column cursor; a connector manufactures clients for the
//! pool.
//!
//! ## Implementations
//!
//! | Client | Module | Description |
//! |--------|--------|-------------|
//! | `MemoryDb` | `memory` | In-memory tables for testing/embedding |
//! | `PgConnector` | `pg` (feature `postgres`) | Live Postgres |

pub mod memory;
#[cfg(feature = "postgres")]
pub mod pg;

use crate::{Error, Result};

// ============================================================================
// Statement parameters
// ============================================================================

/// A bound statement parameter.
///
/// Literals are never spliced into SQL text; they travel out-of-band as
/// parameters. The kind decides how the synthesizer writes the placeholder
/// (`$1` vs `$1::numeric`) and how a driver binds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(String),
    Numeric(String),
}

impl Param {
    pub fn as_str(&self) -> &str {
        match self {
            Param::Text(s) | Param::Numeric(s) => s,
        }
    }
}

// ============================================================================
// Result cursor
// ============================================================================

/// Materialized result of one statement: column names plus rows of
/// textual cell values. `None` is SQL NULL.
///
/// `columns` may be empty when the driver cannot name columns for an
/// empty result; consumers only match names positionally against rows
/// that exist.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First cell of the first row, for single-value probes.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// One live database connection. All execution is blocking on the calling
/// thread.
pub trait SqlClient: Send {
    /// Execute `sql` with `params` bound positionally ($1, $2, ...).
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<RowSet>;

    /// Cheap liveness probe.
    fn connected(&mut self) -> bool;
}

/// Manufactures clients for the connection pool.
pub trait Connector: Send + Sync + 'static {
    type Client: SqlClient;

    fn connect(&self) -> Result<Self::Client>;
}

// ============================================================================
// URI
// ============================================================================

/// Parsed connection URI of the form
/// `postgres://host/dbase?user=foo&passwd=bar`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub raw: String,
    pub host: String,
    pub dbname: String,
    /// Query-string options in order of appearance (`user`, `passwd`, ...).
    pub options: Vec<(String, String)>,
}

const SCHEME: &str = "postgres://";

impl Uri {
    /// Parse and validate. Anything not starting with `postgres://` is
    /// rejected outright.
    pub fn parse(raw: &str) -> Result<Self> {
        let rest = raw
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::MalformedUri(raw.to_string()))?;

        let (host, tail) = match rest.split_once('/') {
            Some((h, t)) => (h, t),
            None => (rest, ""),
        };
        if host.is_empty() {
            return Err(Error::MalformedUri(raw.to_string()));
        }

        let (dbname, query) = match tail.split_once('?') {
            Some((d, q)) => (d, q),
            None => (tail, ""),
        };

        let mut options = Vec::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| Error::MalformedUri(raw.to_string()))?;
            options.push((k.to_string(), v.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            host: host.to_string(),
            dbname: dbname.to_string(),
            options,
        })
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_uri_full_form() {
        let uri = Uri::parse("postgres://example.com/flybase?user=foo&passwd=bar").unwrap();
        assert_eq!(uri.host, "example.com");
        assert_eq!(uri.dbname, "flybase");
        assert_eq!(uri.option("user"), Some("foo"));
        assert_eq!(uri.option("passwd"), Some("bar"));
        assert_eq!(uri.option("port"), None);
    }

    #[test]
    fn test_uri_host_only() {
        let uri = Uri::parse("postgres://localhost").unwrap();
        assert_eq!(uri.host, "localhost");
        assert_eq!(uri.dbname, "");
        assert!(uri.options.is_empty());
    }

    #[test]
    fn test_uri_wrong_scheme() {
        assert!(matches!(
            Uri::parse("mysql://localhost/db"),
            Err(Error::MalformedUri(_))
        ));
        assert!(matches!(Uri::parse(""), Err(Error::MalformedUri(_))));
    }

    #[test]
    fn test_uri_empty_host() {
        assert!(matches!(
            Uri::parse("postgres:///db"),
            Err(Error::MalformedUri(_))
        ));
    }
}
