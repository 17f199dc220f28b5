//! SELECT synthesis from discovered signatures.
//!
//! Statements reference exactly the columns a signature knows about, in
//! manifest order. Two safety rules hold everywhere:
//!
//! - **Identifiers are allow-listed.** Table and column names must match
//!   `[A-Za-z_][A-Za-z0-9_]*`; anything else is a hard
//!   `InvalidIdentifier` failure, never escaped on a best-effort basis.
//! - **Literals are parameters.** WHERE operands travel as `$1` bindings,
//!   never as spliced text. Numeric columns get an explicit cast so the
//!   server coerces the text parameter on its side.

use crate::client::{Connector, Param};
use crate::graph::{Atom, AtomId, ValueKind};
use crate::{Error, Result};

use super::SqlBridge;

// ============================================================================
// Identifier validation
// ============================================================================

/// Allow-list check for table and column name tokens.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

// ============================================================================
// Statement synthesis
// ============================================================================

impl<C: Connector> SqlBridge<C> {
    /// `SELECT c1, c2, ... FROM t` over the signature's manifest.
    pub(crate) fn build_select(&self, signature: AtomId) -> Result<String> {
        let (_, table_name, entries) = self.manifest_entries(signature)?;
        if entries.is_empty() {
            return Err(Error::EmptySignature(table_name));
        }
        validate_identifier(&table_name)?;

        let mut columns = Vec::with_capacity(entries.len());
        for entry in &entries {
            validate_identifier(&entry.column)?;
            columns.push(entry.column.as_str());
        }

        Ok(format!("SELECT {} FROM {}", columns.join(", "), table_name))
    }

    /// `SELECT ... FROM t WHERE col = $1`, with the literal bound as a
    /// parameter typed per the descriptor's kind.
    ///
    /// `descriptor` must belong to the signature's manifest; `value` must
    /// be a value atom resident in the store.
    pub(crate) fn build_select_where(
        &self,
        signature: AtomId,
        descriptor: AtomId,
        value: AtomId,
    ) -> Result<(String, Vec<Param>)> {
        let base = self.build_select(signature)?;
        let (_, table_name, entries) = self.manifest_entries(signature)?;

        let entry = entries
            .iter()
            .find(|e| e.descriptor == descriptor)
            .ok_or_else(|| {
                Error::UnsupportedQueryTarget(format!(
                    "descriptor not in signature of '{table_name}'"
                ))
            })?;

        let Some(Atom::Value { literal, .. }) = self.store().get(value) else {
            return Err(Error::UnsupportedQueryTarget(
                "WHERE operand must be a value atom".to_string(),
            ));
        };

        let (placeholder, param) = match entry.kind {
            ValueKind::Text => ("$1", Param::Text(literal)),
            ValueKind::Numeric => ("$1::numeric", Param::Numeric(literal)),
        };

        Ok((
            format!("{base} WHERE {} = {placeholder}", entry.column),
            vec![param],
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryDb;
    use crate::client::memory::MemoryConnector;
    use crate::graph::GraphStore;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn bridge() -> SqlBridge<MemoryConnector> {
        let db = Arc::new(MemoryDb::new());
        db.define_table("genes", &[("id", "int4"), ("symbol", "varchar")]);
        let bridge = SqlBridge::with_memory(Arc::new(GraphStore::new()), db).unwrap();
        bridge.open().unwrap();
        bridge
    }

    #[test]
    fn test_build_select_uses_manifest_order() {
        let b = bridge();
        let sig = b.discover_signature("genes").unwrap();
        assert_eq!(b.build_select(sig).unwrap(), "SELECT id, symbol FROM genes");
    }

    #[test]
    fn test_build_select_where_quotes_by_kind() {
        let b = bridge();
        let sig = b.discover_signature("genes").unwrap();
        let (_, _, entries) = b.manifest_entries(sig).unwrap();

        let store = b.store();
        let seven = store.add(Atom::value(ValueKind::Numeric, "7"));
        let (sql, params) = b
            .build_select_where(sig, entries[0].descriptor, seven)
            .unwrap();
        assert_eq!(sql, "SELECT id, symbol FROM genes WHERE id = $1::numeric");
        assert_eq!(params, vec![Param::Numeric("7".into())]);

        let name = store.add(Atom::value(ValueKind::Text, "BRCA1"));
        let (sql, params) = b
            .build_select_where(sig, entries[1].descriptor, name)
            .unwrap();
        assert_eq!(sql, "SELECT id, symbol FROM genes WHERE symbol = $1");
        assert_eq!(params, vec![Param::Text("BRCA1".into())]);
    }

    #[test]
    fn test_injection_shaped_table_name_is_rejected() {
        let b = bridge();
        assert!(matches!(
            b.discover_signature("genes; DROP TABLE genes"),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("genes").is_ok());
        assert!(validate_identifier("_audit_2024").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("7genes").is_err());
        assert!(validate_identifier("ge nes").is_err());
        assert!(validate_identifier("genes--").is_err());
    }

    proptest! {
        /// Valid identifiers round through; any SQL metacharacter fails.
        #[test]
        fn prop_identifier_allow_list(name in "\\PC{0,16}") {
            let ok = validate_identifier(&name).is_ok();
            let shape = !name.is_empty()
                && name.chars().next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            prop_assert_eq!(ok, shape);
        }
    }
}
