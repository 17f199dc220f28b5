//! Type mapping and schema signature discovery.
//!
//! Discovery is lazy and idempotent: the first request for a table's
//! schema issues one catalog query and records a signature atom; later
//! requests return the existing signature without touching the database.

use tracing::{debug, warn};

use crate::client::{Connector, Param};
use crate::graph::{Atom, AtomId, ValueKind};
use crate::{Error, Result};

use super::SqlBridge;

// udt_name is better than data_type; user-defined types will still
// come through raw.
const CATALOG_COLUMNS: &str =
    "SELECT column_name, udt_name FROM information_schema.columns WHERE table_name = $1;";

// pg_tables rather than information_schema.tables: views are excluded.
const CATALOG_TABLES: &str =
    "SELECT tablename FROM pg_tables WHERE schemaname = $1;";

// ============================================================================
// Type mapper
// ============================================================================

/// Outcome of mapping a native column type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedType {
    Supported(ValueKind),
    /// Recognized but deliberately not bridged (timestamps, blobs, ...).
    Ignored,
    /// Never seen before. Treated like `Ignored`, but logged louder.
    Unknown,
}

/// Map a native column type name to a graph value kind.
///
/// Lossy by design: anything unmapped is excluded from the signature
/// rather than aborting discovery.
pub fn map_native_type(native: &str) -> MappedType {
    match native {
        "text" | "varchar" => MappedType::Supported(ValueKind::Text),
        "int2" | "int4" | "int8" | "float4" | "float8" | "bool" => {
            MappedType::Supported(ValueKind::Numeric)
        }
        // bpchar shows up as binary flags and hex digests; jsonb and
        // bytea are structured blobs. None map onto plain graph values.
        "timestamp" | "timestamptz" | "date" | "bpchar" | "jsonb" | "bytea" => {
            MappedType::Ignored
        }
        _ => MappedType::Unknown,
    }
}

// ============================================================================
// Signature discovery
// ============================================================================

impl<C: Connector> SqlBridge<C> {
    /// Discover (or fetch) the signature for `table_name`.
    ///
    /// Get-or-create: if the table identity already carries a signature,
    /// it is returned and no SQL is issued. Otherwise one catalog query
    /// runs; columns of unsupported types are skipped; zero usable
    /// columns is `SchemaNotFound` and the table gets no signature.
    pub fn discover_signature(&self, table_name: &str) -> Result<AtomId> {
        super::sql::validate_identifier(table_name)?;

        let store = self.store();
        let table = store.add(Atom::Table(table_name.to_string()));
        if let Some(sig) = store.signature_of(table) {
            return Ok(sig);
        }

        let rs = self.exec(CATALOG_COLUMNS, &[Param::Text(table_name.to_string())])?;

        let mut descriptors = Vec::new();
        for row in &rs.rows {
            let (Some(column), Some(native)) = (
                row.first().and_then(|c| c.as_deref()),
                row.get(1).and_then(|c| c.as_deref()),
            ) else {
                continue;
            };
            match map_native_type(native) {
                MappedType::Supported(kind) => {
                    let col = store.add(Atom::Column(column.to_string()));
                    descriptors.push(store.add(Atom::Descriptor { column: col, kind }));
                }
                MappedType::Ignored => {
                    debug!(table = table_name, column, native, "column type ignored");
                }
                MappedType::Unknown => {
                    warn!(table = table_name, column, native, "unknown column type, skipping");
                }
            }
        }

        if descriptors.is_empty() {
            return Err(Error::SchemaNotFound(table_name.to_string()));
        }

        let manifest = store.add(Atom::Manifest(descriptors));
        let sig = store.add(Atom::Signature { table, manifest });
        self.note_table_loaded();
        debug!(table = table_name, "signature discovered");
        Ok(sig)
    }

    /// Enumerate base tables in the configured schema and discover each.
    ///
    /// Best-effort: a single table failing discovery (e.g. every column
    /// unsupported) is logged and skipped, not propagated. Returns the
    /// identities of tables that yielded a usable signature.
    pub fn list_tables(&self) -> Result<Vec<AtomId>> {
        let schema = self.config().schema.clone();
        let rs = self.exec(CATALOG_TABLES, &[Param::Text(schema)])?;

        let mut tables = Vec::new();
        for row in &rs.rows {
            let Some(name) = row.first().and_then(|c| c.as_deref()) else {
                continue;
            };
            match self.discover_signature(name) {
                Ok(sig) => {
                    if let Some(Atom::Signature { table, .. }) = self.store().get(sig) {
                        tables.push(table);
                    }
                }
                Err(e) => {
                    warn!(table = name, error = %e, "table skipped during enumeration");
                }
            }
        }
        Ok(tables)
    }

    /// Decode a signature into its table id, table name, and manifest
    /// entries (descriptor id, column name, kind) in manifest order.
    pub(crate) fn manifest_entries(
        &self,
        signature: AtomId,
    ) -> Result<(AtomId, String, Vec<ManifestEntry>)> {
        let store = self.store();
        let Some(Atom::Signature { table, manifest }) = store.get(signature) else {
            return Err(Error::UnsupportedQueryTarget(
                "expected a signature atom".to_string(),
            ));
        };
        let Some(Atom::Table(table_name)) = store.get(table) else {
            return Err(Error::UnsupportedQueryTarget(
                "signature does not link a table".to_string(),
            ));
        };
        let Some(Atom::Manifest(descs)) = store.get(manifest) else {
            return Err(Error::UnsupportedQueryTarget(
                "signature does not link a manifest".to_string(),
            ));
        };

        let mut entries = Vec::with_capacity(descs.len());
        for desc in descs {
            let Some(Atom::Descriptor { column, kind }) = store.get(desc) else {
                continue;
            };
            let Some(Atom::Column(name)) = store.get(column) else {
                continue;
            };
            entries.push(ManifestEntry { descriptor: desc, column: name, kind });
        }
        Ok((table, table_name, entries))
    }
}

/// One column of a decoded manifest.
#[derive(Debug, Clone)]
pub(crate) struct ManifestEntry {
    pub descriptor: AtomId,
    pub column: String,
    pub kind: ValueKind,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mapping_table() {
        assert_eq!(map_native_type("text"), MappedType::Supported(ValueKind::Text));
        assert_eq!(map_native_type("varchar"), MappedType::Supported(ValueKind::Text));
        for t in ["int2", "int4", "int8", "float4", "float8", "bool"] {
            assert_eq!(map_native_type(t), MappedType::Supported(ValueKind::Numeric));
        }
        for t in ["timestamp", "date", "bpchar", "jsonb", "bytea"] {
            assert_eq!(map_native_type(t), MappedType::Ignored);
        }
        assert_eq!(map_native_type("tsvector"), MappedType::Unknown);
    }

    proptest! {
        /// Unrecognized type names never map to a supported kind.
        #[test]
        fn prop_unknown_types_are_excluded(name in "[a-z_]{1,12}") {
            let known = [
                "text", "varchar", "int2", "int4", "int8", "float4",
                "float8", "bool", "timestamp", "timestamptz", "date",
                "bpchar", "jsonb", "bytea",
            ];
            prop_assume!(!known.contains(&name.as_str()));
            prop_assert_eq!(map_native_type(&name), MappedType::Unknown);
        }
    }
}
