//! # Graph Model
//!
//! Typed atoms for the schema-derived property graph. These types cross
//! every boundary: discovery ↔ materialization ↔ resolution ↔ user.
//!
//! Design rule: NO SQL types here. This module is pure data: no I/O,
//! no connections, no statements.
//!
//! An [`Atom`] is identified purely by its structure. The [`GraphStore`]
//! interns atoms, so two inserts of the same table name, the same column
//! descriptor, or the same literal value yield the same [`AtomId`]. That
//! collapse is what powers join discovery: a foreign-key value appearing
//! in two tables is *one* value atom, and its incoming set reaches both.

pub mod store;

pub use store::GraphStore;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque atom identifier, valid within one `GraphStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomId(pub u64);

impl std::fmt::Display for AtomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value kinds
// ============================================================================

/// Graph-side kind of a column value.
///
/// Only two kinds survive type mapping; columns of any other native type
/// are dropped from the signature during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// text, varchar
    Text,
    /// int2/int4/int8, float4/float8, bool
    Numeric,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Text => "Text",
            ValueKind::Numeric => "Numeric",
        }
    }
}

// ============================================================================
// Atoms
// ============================================================================

/// One node or edge of the schema-derived graph.
///
/// | Variant | Meaning |
/// |---------|---------|
/// | `Table` | identity of one database table |
/// | `Column` | a column name, shared across tables |
/// | `Value` | one cell value; identity is (kind, literal) |
/// | `Descriptor` | column name + value kind (a typed variable) |
/// | `Manifest` | ordered descriptor list for one table |
/// | `Signature` | table ↔ manifest link; at most one per table |
/// | `Tuple` | ordered value list for one materialized row |
/// | `Row` | table ↔ tuple link: "this tuple is a row of this table" |
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Atom {
    Table(String),
    Column(String),
    Value { kind: ValueKind, literal: String },
    Descriptor { column: AtomId, kind: ValueKind },
    Manifest(Vec<AtomId>),
    Signature { table: AtomId, manifest: AtomId },
    Tuple(Vec<AtomId>),
    Row { table: AtomId, tuple: AtomId },
}

impl Atom {
    pub fn value(kind: ValueKind, literal: impl Into<String>) -> Self {
        Atom::Value { kind, literal: literal.into() }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Atom::Table(_) => "Table",
            Atom::Column(_) => "Column",
            Atom::Value { .. } => "Value",
            Atom::Descriptor { .. } => "Descriptor",
            Atom::Manifest(_) => "Manifest",
            Atom::Signature { .. } => "Signature",
            Atom::Tuple(_) => "Tuple",
            Atom::Row { .. } => "Row",
        }
    }

    /// Atoms this atom references. Incoming sets are the reverse of this.
    pub fn children(&self) -> SmallVec<[AtomId; 4]> {
        match self {
            Atom::Table(_) | Atom::Column(_) | Atom::Value { .. } => SmallVec::new(),
            Atom::Descriptor { column, .. } => SmallVec::from_slice(&[*column]),
            Atom::Manifest(ids) | Atom::Tuple(ids) => SmallVec::from_slice(ids),
            Atom::Signature { table, manifest } => SmallVec::from_slice(&[*table, *manifest]),
            Atom::Row { table, tuple } => SmallVec::from_slice(&[*table, *tuple]),
        }
    }

    /// Table or column name, if this atom carries one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Atom::Table(n) | Atom::Column(n) => Some(n),
            Atom::Value { literal, .. } => Some(literal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_identity_is_kind_and_literal() {
        let a = Atom::value(ValueKind::Numeric, "42");
        let b = Atom::value(ValueKind::Numeric, "42");
        let c = Atom::value(ValueKind::Text, "42");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_children() {
        let desc = Atom::Descriptor { column: AtomId(3), kind: ValueKind::Text };
        assert_eq!(desc.children().as_slice(), &[AtomId(3)]);

        let sig = Atom::Signature { table: AtomId(1), manifest: AtomId(2) };
        assert_eq!(sig.children().as_slice(), &[AtomId(1), AtomId(2)]);

        assert!(Atom::Table("genes".into()).children().is_empty());
    }
}
