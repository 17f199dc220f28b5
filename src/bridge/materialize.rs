//! Row materialization: SQL results → tuple and row atoms.
//!
//! Each result row becomes an ordered tuple of value atoms (one per
//! manifest column) plus a row edge linking the table identity to the
//! tuple. Content addressing does the deduplication: re-materializing
//! unchanged data creates nothing.

use tracing::debug;

use crate::client::{Connector, Param};
use crate::graph::{Atom, AtomId};
use crate::{Error, Result};

use super::SqlBridge;

impl<C: Connector> SqlBridge<C> {
    /// Execute `sql` and link each result row to `table`. Returns the
    /// number of row edges that did not previously exist.
    ///
    /// The result cursor must agree with the signature's manifest
    /// positionally: column `i` of the cursor must carry the name of
    /// manifest descriptor `i`, or materialization aborts with
    /// `ColumnMismatch`.
    pub(crate) fn materialize(
        &self,
        table: AtomId,
        signature: AtomId,
        sql: &str,
        params: &[Param],
    ) -> Result<usize> {
        let (_, table_name, entries) = self.manifest_entries(signature)?;
        let rs = self.exec(sql, params)?;

        // Positional cursor/manifest agreement, checked once up front.
        if !rs.rows.is_empty() {
            if rs.columns.len() != entries.len() {
                return Err(Error::ColumnMismatch {
                    expected: format!("{} columns", entries.len()),
                    got: format!("{} columns", rs.columns.len()),
                });
            }
            for (got, entry) in rs.columns.iter().zip(&entries) {
                if got != &entry.column {
                    return Err(Error::ColumnMismatch {
                        expected: entry.column.clone(),
                        got: got.clone(),
                    });
                }
            }
        }

        let store = self.store();
        let mut added = 0usize;
        for row in &rs.rows {
            let mut values = Vec::with_capacity(entries.len());
            let mut readable = 0usize;
            for (i, entry) in entries.iter().enumerate() {
                // SQL NULL renders as the empty literal of the column's
                // kind, preserving tuple/manifest positional alignment.
                let literal = match row.get(i).and_then(|c| c.as_deref()) {
                    Some(cell) => {
                        readable += 1;
                        cell.to_string()
                    }
                    None => String::new(),
                };
                values.push(store.add(Atom::Value { kind: entry.kind, literal }));
            }

            // A row with no readable values at all is dropped: it would
            // be a tuple of nothing but placeholders.
            if readable == 0 {
                continue;
            }

            let tuple = store.add(Atom::Tuple(values));
            let (_, new) = store.intern(Atom::Row { table, tuple });
            if new {
                added += 1;
            }
        }

        self.note_rows_loaded(added as u64);
        debug!(table = %table_name, rows = rs.len(), added, "materialized");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{MemoryConnector, MemoryDb};
    use crate::graph::{GraphStore, ValueKind};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn bridge_with(
        rows: &[[Option<&str>; 2]],
    ) -> (SqlBridge<MemoryConnector>, Arc<GraphStore>) {
        let db = Arc::new(MemoryDb::new());
        db.define_table("genes", &[("id", "int4"), ("symbol", "varchar")]);
        for row in rows {
            db.insert_row("genes", row);
        }
        let store = Arc::new(GraphStore::new());
        let bridge = SqlBridge::with_memory(store.clone(), db).unwrap();
        bridge.open().unwrap();
        (bridge, store)
    }

    #[test]
    fn test_materialize_builds_tuples_and_rows() {
        let (b, store) = bridge_with(&[[Some("7"), Some("BRCA1")], [Some("8"), Some("TP53")]]);
        let sig = b.discover_signature("genes").unwrap();
        let table = store.find(&Atom::Table("genes".into())).unwrap();

        let sql = b.build_select(sig).unwrap();
        let added = b.materialize(table, sig, &sql, &[]).unwrap();
        assert_eq!(added, 2);

        let seven = store.find(&Atom::value(ValueKind::Numeric, "7")).unwrap();
        let tuples = store.incoming(seven);
        assert_eq!(tuples.len(), 1);
        let rows = store.incoming(tuples[0]);
        assert_eq!(rows.len(), 1);
        assert!(matches!(store.get(rows[0]), Some(Atom::Row { table: t, .. }) if t == table));
    }

    #[test]
    fn test_rematerialize_is_a_no_op() {
        let (b, store) = bridge_with(&[[Some("7"), Some("BRCA1")]]);
        let sig = b.discover_signature("genes").unwrap();
        let table = store.find(&Atom::Table("genes".into())).unwrap();
        let sql = b.build_select(sig).unwrap();

        assert_eq!(b.materialize(table, sig, &sql, &[]).unwrap(), 1);
        let count = store.atom_count();
        assert_eq!(b.materialize(table, sig, &sql, &[]).unwrap(), 0);
        assert_eq!(store.atom_count(), count);
    }

    #[test]
    fn test_null_cell_becomes_empty_literal() {
        let (b, store) = bridge_with(&[[Some("7"), None]]);
        let sig = b.discover_signature("genes").unwrap();
        let table = store.find(&Atom::Table("genes".into())).unwrap();
        let sql = b.build_select(sig).unwrap();

        assert_eq!(b.materialize(table, sig, &sql, &[]).unwrap(), 1);
        assert!(store.find(&Atom::value(ValueKind::Text, "")).is_some());
    }

    #[test]
    fn test_all_null_row_is_dropped() {
        let (b, store) = bridge_with(&[[None, None]]);
        let sig = b.discover_signature("genes").unwrap();
        let table = store.find(&Atom::Table("genes".into())).unwrap();
        let sql = b.build_select(sig).unwrap();

        assert_eq!(b.materialize(table, sig, &sql, &[]).unwrap(), 0);
        assert!(store.incoming(table).len() <= 1); // only the signature
    }

    #[test]
    fn test_cursor_manifest_mismatch_is_fatal() {
        let (b, store) = bridge_with(&[[Some("7"), Some("BRCA1")]]);
        let sig = b.discover_signature("genes").unwrap();
        let table = store.find(&Atom::Table("genes".into())).unwrap();

        // Hand-built SELECT with the columns swapped.
        let err = b
            .materialize(table, sig, "SELECT symbol, id FROM genes", &[])
            .unwrap_err();
        assert!(matches!(err, Error::ColumnMismatch { .. }));
    }
}
