//! Demand-driven resolution: the join-closure traversal engine.
//!
//! `resolve_incoming` answers "give me everything reachable from this
//! atom" by classifying the atom and loading the corresponding rows:
//!
//! 1. a **table** identity loads the whole table;
//! 2. a **column** name loads every table having a column of that name;
//! 3. a **value** runs the closure walk: find every table whose manifest
//!    shares the value's column descriptor, and load the rows where that
//!    column equals the value. The value is treated as a candidate
//!    primary/foreign key, with no foreign-key metadata consulted.
//!
//! The walk is one hop per call: it loads directly-joined rows but does
//! not chase the new values' own joins. Unbounded transitive closure
//! over a real schema risks loading the entire database, so multi-hop is
//! an explicit opt-in via `resolve_closure` with a hop bound.

use hashbrown::HashSet;
use tracing::debug;

use crate::client::Connector;
use crate::graph::{Atom, AtomId};
use crate::{Error, Result};

use super::SqlBridge;

impl<C: Connector> SqlBridge<C> {
    /// Classify `atom` and materialize everything one hop around it.
    pub fn resolve_incoming(&self, atom: AtomId) -> Result<()> {
        self.resolve_closure(atom, self.config().max_hops)
    }

    /// Like `resolve_incoming`, but for value atoms the closure walk
    /// repeats over newly discovered values up to `max_hops` times.
    pub fn resolve_closure(&self, atom: AtomId, max_hops: usize) -> Result<()> {
        // Checked up front: some dispatch arms have nothing to load and
        // would otherwise succeed without ever touching the pool.
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        match self.store().get(atom) {
            Some(Atom::Table(_)) => self.load_table_data(atom),
            Some(Atom::Column(_)) => self.load_column(atom),
            Some(Atom::Value { .. }) => self.load_joined_rows(atom, max_hops),
            Some(other) => Err(Error::UnsupportedQueryTarget(format!(
                "{} atom; try a table, column, or value",
                other.kind_name()
            ))),
            None => Err(Error::UnsupportedQueryTarget(format!(
                "unknown atom id {atom}"
            ))),
        }
    }

    /// Load rows of one table matching `value` in `column`, and return
    /// the row edges now present for that (table, value) pair.
    ///
    /// The user-facing restricted variant of the closure walk: same
    /// WHERE-select machinery, but pinned to a single table and column.
    pub fn load_rows(
        &self,
        table: AtomId,
        column: AtomId,
        value: AtomId,
    ) -> Result<Vec<AtomId>> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        let store = self.store();
        let Some(Atom::Table(table_name)) = store.get(table) else {
            return Err(Error::UnsupportedQueryTarget(
                "load_rows expects a table identity".to_string(),
            ));
        };
        if !matches!(store.get(column), Some(Atom::Column(_))) {
            return Err(Error::UnsupportedQueryTarget(
                "load_rows expects a column name atom".to_string(),
            ));
        }
        if !matches!(store.get(value), Some(Atom::Value { .. })) {
            return Err(Error::UnsupportedQueryTarget(
                "load_rows expects a value atom".to_string(),
            ));
        }

        let signature = match store.signature_of(table) {
            Some(sig) => sig,
            None => self.discover_signature(&table_name)?,
        };

        // Descriptors wrapping this column that belong to this table.
        let wrapping: HashSet<AtomId> = store
            .incoming_atoms(column)
            .into_iter()
            .filter(|(_, a)| matches!(a, Atom::Descriptor { column: c, .. } if *c == column))
            .map(|(id, _)| id)
            .collect();

        let (_, _, entries) = self.manifest_entries(signature)?;
        for entry in entries.iter().filter(|e| wrapping.contains(&e.descriptor)) {
            let (sql, params) = self.build_select_where(signature, entry.descriptor, value)?;
            self.materialize(table, signature, &sql, &params)?;
        }

        // Return what was found, so the caller need not walk the store.
        let mut found = Vec::new();
        for tuple in self.tuples_containing(value) {
            for (row_id, row) in store.incoming_atoms(tuple) {
                if matches!(row, Atom::Row { table: t, .. } if t == table) {
                    found.push(row_id);
                }
            }
        }
        Ok(found)
    }

    // ========================================================================
    // Table and column loads
    // ========================================================================

    /// Load every row of one table, discovering its signature on demand.
    fn load_table_data(&self, table: AtomId) -> Result<()> {
        let store = self.store();
        let Some(Atom::Table(name)) = store.get(table) else {
            return Err(Error::UnsupportedQueryTarget("not a table atom".to_string()));
        };
        let signature = match store.signature_of(table) {
            Some(sig) => sig,
            None => self.discover_signature(&name)?,
        };
        let sql = self.build_select(signature)?;
        self.materialize(table, signature, &sql, &[])?;
        Ok(())
    }

    /// Load every table that has a column of this name: column →
    /// descriptors → manifests → signatures → full-table loads.
    fn load_column(&self, column: AtomId) -> Result<()> {
        let store = self.store();
        for (desc, atom) in store.incoming_atoms(column) {
            if !matches!(atom, Atom::Descriptor { .. }) {
                continue;
            }
            for (signature, table) in self.signatures_containing(desc) {
                let sql = self.build_select(signature)?;
                self.materialize(table, signature, &sql, &[])?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // The closure walk
    // ========================================================================

    /// Join-closure over a value, `max_hops` levels deep.
    fn load_joined_rows(&self, value: AtomId, max_hops: usize) -> Result<()> {
        let store = self.store();
        let mut visited: HashSet<AtomId> = HashSet::new();
        let mut frontier = vec![value];
        visited.insert(value);

        for hop in 0..max_hops.max(1) {
            let watermark = store.atom_count();
            for v in frontier.drain(..) {
                self.join_one_hop(v)?;
            }

            // Values materialized during this hop feed the next one.
            // Empty literals are NULL placeholders; NULL joins to nothing.
            frontier = store
                .atoms_since(watermark)
                .into_iter()
                .filter(|(id, a)| {
                    matches!(a, Atom::Value { literal, .. } if !literal.is_empty())
                        && visited.insert(*id)
                })
                .map(|(id, _)| id)
                .collect();

            debug!(hop, discovered = frontier.len(), "closure hop complete");
            if frontier.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// One level of the walk for one value:
    ///
    /// tuple(s) containing the value → owning row edge(s) → table
    /// signature → positional match of the value's index against the
    /// manifest → WHERE-load every table sharing that descriptor.
    fn join_one_hop(&self, value: AtomId) -> Result<()> {
        let store = self.store();
        // A NULL placeholder is not a key; a WHERE against it would be
        // rejected server-side for numeric columns anyway.
        if matches!(store.get(value), Some(Atom::Value { literal, .. }) if literal.is_empty()) {
            return Ok(());
        }
        for tuple in self.tuples_containing(value) {
            let Some(Atom::Tuple(cells)) = store.get(tuple) else {
                continue;
            };
            for (_, row) in store.incoming_atoms(tuple) {
                let Atom::Row { table, .. } = row else {
                    continue;
                };
                // Rows are only ever created under a signed table.
                let Some(signature) = store.signature_of(table) else {
                    continue;
                };
                let (_, _, entries) = self.manifest_entries(signature)?;
                for (i, cell) in cells.iter().enumerate() {
                    if *cell == value {
                        if let Some(entry) = entries.get(i) {
                            self.load_join(value, entry.descriptor)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Load matching rows from every table whose manifest shares this
    /// column descriptor. The value is joined as if the column were a
    /// key, the source table included (self-joins surface sibling rows).
    fn load_join(&self, value: AtomId, descriptor: AtomId) -> Result<()> {
        for (signature, table) in self.signatures_containing(descriptor) {
            let (sql, params) = self.build_select_where(signature, descriptor, value)?;
            self.materialize(table, signature, &sql, &params)?;
        }
        Ok(())
    }

    // ========================================================================
    // Traversal helpers
    // ========================================================================

    /// Tuples whose cells include `value`.
    fn tuples_containing(&self, value: AtomId) -> Vec<AtomId> {
        self.store()
            .incoming_atoms(value)
            .into_iter()
            .filter(|(_, a)| matches!(a, Atom::Tuple(_)))
            .map(|(id, _)| id)
            .collect()
    }

    /// (signature, table) pairs whose manifest contains `descriptor`.
    fn signatures_containing(&self, descriptor: AtomId) -> Vec<(AtomId, AtomId)> {
        let store = self.store();
        let mut out = Vec::new();
        for (manifest, atom) in store.incoming_atoms(descriptor) {
            if !matches!(atom, Atom::Manifest(_)) {
                continue;
            }
            for (signature, sig_atom) in store.incoming_atoms(manifest) {
                if let Atom::Signature { table, .. } = sig_atom {
                    out.push((signature, table));
                }
            }
        }
        out
    }
}
