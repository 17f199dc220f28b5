//! Postgres client, behind the `postgres` cargo feature.
//!
//! Wraps the blocking `postgres` crate. Cell values come back typed; this
//! module renders them to the textual cursor the bridge consumes, matching
//! libpq's text-format conventions (`t`/`f` for bool). Columns of types
//! the bridge does not map are rendered as NULL, which the materializer
//! treats as unreadable.

use std::time::Duration;

use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls, Row};

use super::{Connector, Param, RowSet, SqlClient, Uri};
use crate::{Error, Result};

// ============================================================================
// PgConnector
// ============================================================================

/// Builds one `postgres` connection per `connect()` call, from a
/// `postgres://host/dbase?user=foo&passwd=bar` URI.
pub struct PgConnector {
    config: postgres::Config,
}

impl PgConnector {
    pub fn new(uri: &Uri) -> Self {
        let mut config = postgres::Config::new();
        config
            .host(&uri.host)
            .connect_timeout(Duration::from_secs(10));
        if !uri.dbname.is_empty() {
            config.dbname(&uri.dbname);
        }
        if let Some(user) = uri.option("user") {
            config.user(user);
        }
        if let Some(passwd) = uri.option("passwd") {
            config.password(passwd);
        }
        Self { config }
    }
}

impl Connector for PgConnector {
    type Client = PgClient;

    fn connect(&self) -> Result<PgClient> {
        let client = self
            .config
            .connect(NoTls)
            .map_err(|e| Error::ConnectionFailure(e.to_string()))?;
        Ok(PgClient { client })
    }
}

// ============================================================================
// PgClient
// ============================================================================

pub struct PgClient {
    client: Client,
}

impl SqlClient for PgClient {
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<RowSet> {
        // All parameters are bound as text; numeric placeholders carry an
        // explicit cast in the SQL, so the server coerces server-side.
        let text: Vec<&str> = params.iter().map(Param::as_str).collect();
        let bound: Vec<&(dyn ToSql + Sync)> =
            text.iter().map(|s| s as &(dyn ToSql + Sync)).collect();

        let rows = self
            .client
            .query(sql, &bound)
            .map_err(|e| Error::Sql(e.to_string()))?;

        to_row_set(&rows)
    }

    fn connected(&mut self) -> bool {
        !self.client.is_closed() && self.client.simple_query("").is_ok()
    }
}

fn to_row_set(rows: &[Row]) -> Result<RowSet> {
    let mut out = RowSet::default();
    if let Some(first) = rows.first() {
        out.columns = first.columns().iter().map(|c| c.name().to_string()).collect();
    }
    for row in rows {
        let mut cells = Vec::with_capacity(row.columns().len());
        for idx in 0..row.columns().len() {
            cells.push(cell_to_text(row, idx)?);
        }
        out.rows.push(cells);
    }
    Ok(out)
}

/// Render one typed cell as text, libpq-style. Unknown types become NULL.
fn cell_to_text(row: &Row, idx: usize) -> Result<Option<String>> {
    let ty = row.columns()[idx].type_();
    let rendered = match *ty {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|v| v.to_string())),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|v| v.to_string())),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .map(|v| v.map(|v| v.to_string())),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|v| v.to_string())),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .map(|v| v.map(|v| v.to_string())),
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map(|v| v.map(|v| if v { "t".to_string() } else { "f".to_string() })),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)
        }
        _ => return Ok(None),
    };
    rendered.map_err(|e| Error::Sql(e.to_string()))
}
