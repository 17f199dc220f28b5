//! Content-addressed atom storage.
//!
//! This is the reference graph store the bridge materializes into.
//! It uses an interning map plus an incoming-set index, both behind one
//! RwLock.
//!
//! ## Guarantees
//!
//! - **Idempotent insert**: `add()` of a structurally identical atom
//!   returns the existing id and changes nothing.
//! - **Monotonic**: atoms are never mutated or deleted. The graph is a
//!   strict superset cache that only grows.
//! - **Thread-safe**: concurrent `add()`/`incoming()` from any number of
//!   threads; no external locking needed.

use hashbrown::HashMap;
use parking_lot::RwLock;

use super::{Atom, AtomId};

// ============================================================================
// GraphStore
// ============================================================================

/// Deduplicating, append-only atom store.
pub struct GraphStore {
    inner: RwLock<StoreInner>,
}

struct StoreInner {
    /// AtomId.0 indexes into this.
    atoms: Vec<Atom>,
    /// Structural interning: atom → id.
    index: HashMap<Atom, AtomId>,
    /// child id → ids of atoms referencing it.
    incoming: HashMap<AtomId, Vec<AtomId>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                atoms: Vec::new(),
                index: HashMap::new(),
                incoming: HashMap::new(),
            }),
        }
    }

    /// Insert an atom, returning its id. Idempotent: a structurally
    /// identical atom maps to the existing id.
    ///
    /// Child ids referenced by the atom must already exist in this store.
    pub fn add(&self, atom: Atom) -> AtomId {
        self.intern(atom).0
    }

    /// Like [`add`](Self::add), but also reports whether the atom was
    /// newly inserted. The check and the insert happen under one lock,
    /// so concurrent callers agree on which one created it.
    pub fn intern(&self, atom: Atom) -> (AtomId, bool) {
        // Fast path: already interned.
        if let Some(id) = self.inner.read().index.get(&atom) {
            return (*id, false);
        }

        let mut inner = self.inner.write();
        // Re-check under the write lock; another thread may have won.
        if let Some(id) = inner.index.get(&atom) {
            return (*id, false);
        }

        let id = AtomId(inner.atoms.len() as u64);
        for child in atom.children() {
            debug_assert!((child.0 as usize) < inner.atoms.len());
            inner.incoming.entry(child).or_default().push(id);
        }
        inner.atoms.push(atom.clone());
        inner.index.insert(atom, id);
        (id, true)
    }

    /// Look up an atom by structure without inserting.
    pub fn find(&self, atom: &Atom) -> Option<AtomId> {
        self.inner.read().index.get(atom).copied()
    }

    /// Fetch a copy of the atom behind an id.
    pub fn get(&self, id: AtomId) -> Option<Atom> {
        self.inner.read().atoms.get(id.0 as usize).cloned()
    }

    /// Ids of all atoms referencing `id`, in insertion order.
    pub fn incoming(&self, id: AtomId) -> Vec<AtomId> {
        self.inner
            .read()
            .incoming
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Incoming set with atoms resolved, for callers that filter by kind.
    pub fn incoming_atoms(&self, id: AtomId) -> Vec<(AtomId, Atom)> {
        let inner = self.inner.read();
        inner
            .incoming
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .map(|i| (*i, inner.atoms[i.0 as usize].clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The signature attached to a table identity, if discovery has run.
    ///
    /// At most one signature per table is ever created; this returns the
    /// first (and only) match.
    pub fn signature_of(&self, table: AtomId) -> Option<AtomId> {
        let inner = self.inner.read();
        inner.incoming.get(&table).and_then(|ids| {
            ids.iter()
                .find(|i| {
                    matches!(
                        inner.atoms[i.0 as usize],
                        Atom::Signature { table: t, .. } if t == table
                    )
                })
                .copied()
        })
    }

    /// Total number of atoms.
    pub fn atom_count(&self) -> usize {
        self.inner.read().atoms.len()
    }

    /// Atoms inserted at or after position `start` (ids are dense and
    /// monotonically assigned, so this is "everything newer than the
    /// watermark"). Lets callers diff the store across an operation.
    pub fn atoms_since(&self, start: usize) -> Vec<(AtomId, Atom)> {
        let inner = self.inner.read();
        inner
            .atoms
            .iter()
            .enumerate()
            .skip(start)
            .map(|(i, a)| (AtomId(i as u64), a.clone()))
            .collect()
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ValueKind;

    #[test]
    fn test_add_is_idempotent() {
        let store = GraphStore::new();
        let a = store.add(Atom::Table("genes".into()));
        let b = store.add(Atom::Table("genes".into()));
        assert_eq!(a, b);
        assert_eq!(store.atom_count(), 1);
    }

    #[test]
    fn test_incoming_index() {
        let store = GraphStore::new();
        let col = store.add(Atom::Column("id".into()));
        let desc = store.add(Atom::Descriptor { column: col, kind: ValueKind::Numeric });

        assert_eq!(store.incoming(col), vec![desc]);
        assert!(store.incoming(desc).is_empty());
    }

    #[test]
    fn test_shared_descriptor_across_tables() {
        // Same column name + kind in two manifests: one descriptor atom,
        // two incoming manifests. This is the join-discovery mechanism.
        let store = GraphStore::new();
        let col = store.add(Atom::Column("id".into()));
        let desc = store.add(Atom::Descriptor { column: col, kind: ValueKind::Numeric });
        let m1 = store.add(Atom::Manifest(vec![desc]));
        let sym = store.add(Atom::Column("symbol".into()));
        let sdesc = store.add(Atom::Descriptor { column: sym, kind: ValueKind::Text });
        let m2 = store.add(Atom::Manifest(vec![desc, sdesc]));

        assert_eq!(store.incoming(desc), vec![m1, m2]);
    }

    #[test]
    fn test_signature_of() {
        let store = GraphStore::new();
        let table = store.add(Atom::Table("genes".into()));
        assert_eq!(store.signature_of(table), None);

        let col = store.add(Atom::Column("id".into()));
        let desc = store.add(Atom::Descriptor { column: col, kind: ValueKind::Numeric });
        let manifest = store.add(Atom::Manifest(vec![desc]));
        let sig = store.add(Atom::Signature { table, manifest });

        assert_eq!(store.signature_of(table), Some(sig));
    }

    #[test]
    fn test_concurrent_interning() {
        use std::sync::Arc;

        let store = Arc::new(GraphStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    store.add(Atom::value(ValueKind::Numeric, i.to_string()));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.atom_count(), 100);
    }
}
