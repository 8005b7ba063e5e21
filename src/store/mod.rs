//! Per-namespace persistent state.
//!
//! One `sled::Db` per namespace, one `sled::Tree` per table. Grounded on
//! `knhk-workflow-engine/src/state/store.rs` (`StateStore` wrapping a single
//! `sled::Db`, key-prefix-per-entity convention) — generalized here from one
//! global tree per entity kind to one dedicated tree per entity kind, since
//! Monument's entities (tiles, actors, journal...) are homogeneous enough
//! that a tree-per-table split avoids the manual key-prefixing the teacher
//! needed when multiple entity kinds shared one tree.

mod namespace;
mod registry;

pub use namespace::{
    Actor, ActorHistoryRow, ChatRow, JournalEntry, Meta, NamespaceStore, Tile, TileHistoryRow,
};
pub use registry::{NamespaceHandle, NamespaceRegistry};

/// Schema version written at namespace creation and checked on every open.
/// A mismatch is fatal (no silent migration), per spec.
pub const SCHEMA_VERSION: u32 = 1;

/// `^[a-zA-Z0-9][a-zA-Z0-9_-]{0,63}$`, checked without a regex crate since
/// the grammar is simple enough to hand-verify directly (see
/// `validate_namespace`).
pub fn validate_namespace(namespace: &str) -> crate::error::MonumentResult<()> {
    let valid = {
        let mut chars = namespace.chars();
        let first_ok = chars
            .next()
            .map(|c| c.is_ascii_alphanumeric())
            .unwrap_or(false);
        let rest_ok = namespace.len() <= 64
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        first_ok && rest_ok && !namespace.is_empty()
    };

    if valid {
        Ok(())
    } else {
        Err(crate::error::MonumentError::NamespaceInvalid {
            namespace: namespace.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_namespaces() {
        assert!(validate_namespace("a").is_ok());
        assert!(validate_namespace("world-1").is_ok());
        assert!(validate_namespace("World_2").is_ok());
        assert!(validate_namespace(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn rejects_invalid_namespaces() {
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("-leading-dash").is_err());
        assert!(validate_namespace("has space").is_err());
        assert!(validate_namespace(&"a".repeat(65)).is_err());
        assert!(validate_namespace("slash/here").is_err());
    }
}
