//! # Graph Storage Contract
//!
//! This is THE contract between the query engine and any storage engine.
//! Every operation the engine needs from a graph store is defined here.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory reference store for testing/embedding |

pub mod memory;

use crate::model::{Node, NodeId, RelId, Relationship};
use crate::{Error, Result};

pub use memory::MemoryStore;

// ============================================================================
// Schema metadata
// ============================================================================

/// Metadata for an index known to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub index_type: String,
    pub labels_or_types: Vec<String>,
    pub properties: Vec<String>,
    pub state: String,
}

/// Metadata for a schema constraint known to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintInfo {
    pub name: String,
    pub constraint_type: String,
    pub entity_type: String,
    pub labels_or_types: Vec<String>,
    pub properties: Vec<String>,
}

// ============================================================================
// GraphStore Trait
// ============================================================================

/// The universal storage contract.
///
/// Any store that implements this trait can serve as the graph behind the
/// query engine. All read methods must be safe for concurrent callers; the
/// engine adds no locking of its own around storage access.
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Persist a node. The caller allocates the ID.
    fn create_node(&self, node: Node) -> Result<()>;

    /// Get a node by ID. Returns None if not found.
    fn get_node(&self, id: &NodeId) -> Result<Option<Node>>;

    /// Replace a node's labels and properties wholesale.
    fn update_node(&self, node: Node) -> Result<()>;

    /// Delete a node. Returns true if it existed.
    /// Fails with an integrity error if the node still has incident edges.
    fn delete_node(&self, id: &NodeId) -> Result<bool>;

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    /// Persist an edge. Both endpoints must exist.
    fn create_edge(&self, edge: Relationship) -> Result<()>;

    /// Get an edge by ID.
    fn get_edge(&self, id: &RelId) -> Result<Option<Relationship>>;

    /// Replace an edge's properties wholesale.
    fn update_edge(&self, edge: Relationship) -> Result<()>;

    /// Delete an edge. Returns true if it existed.
    fn delete_edge(&self, id: &RelId) -> Result<bool>;

    // ========================================================================
    // Scan
    // ========================================================================

    /// All nodes carrying the given label.
    fn nodes_by_label(&self, label: &str) -> Result<Vec<Node>>;

    /// All nodes, in storage order.
    fn all_nodes(&self) -> Result<Vec<Node>>;

    /// All edges, in storage order.
    fn all_edges(&self) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Adjacency
    // ========================================================================

    /// Edges whose source is the given node.
    fn outgoing_edges(&self, id: &NodeId) -> Result<Vec<Relationship>>;

    /// Edges whose destination is the given node.
    fn incoming_edges(&self, id: &NodeId) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Counts
    // ========================================================================

    fn node_count(&self) -> Result<u64>;
    fn edge_count(&self) -> Result<u64>;

    // ========================================================================
    // Transactions (optional)
    // ========================================================================

    /// Open a transaction scope. Defaults to "not supported".
    fn begin_transaction(&self) -> Result<()> {
        Err(Error::TxError("transactions not supported by this store".into()))
    }

    fn commit_transaction(&self) -> Result<()> {
        Err(Error::TxError("transactions not supported by this store".into()))
    }

    fn rollback_transaction(&self) -> Result<()> {
        Err(Error::TxError("transactions not supported by this store".into()))
    }

    // ========================================================================
    // Schema registry (optional)
    // ========================================================================

    /// Register an index. Defaults to "not supported".
    fn create_index(&self, _info: IndexInfo) -> Result<()> {
        Err(Error::StorageError("indexes not supported by this store".into()))
    }

    /// Drop an index by name. Returns true if it existed.
    fn drop_index(&self, _name: &str) -> Result<bool> {
        Err(Error::StorageError("indexes not supported by this store".into()))
    }

    fn create_constraint(&self, _info: ConstraintInfo) -> Result<()> {
        Err(Error::StorageError("constraints not supported by this store".into()))
    }

    fn drop_constraint(&self, _name: &str) -> Result<bool> {
        Err(Error::StorageError("constraints not supported by this store".into()))
    }

    /// Indexes known to the store. Empty unless the store exposes them.
    fn indexes(&self) -> Result<Vec<IndexInfo>> {
        Ok(Vec::new())
    }

    /// Constraints known to the store. Empty unless the store exposes them.
    fn constraints(&self) -> Result<Vec<ConstraintInfo>> {
        Ok(Vec::new())
    }
}

/// Label and relationship-type names must match `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_name() {
        assert!(valid_name("Person"));
        assert!(valid_name("_internal"));
        assert!(valid_name("KNOWS_2"));
        assert!(!valid_name("2fast"));
        assert!(!valid_name(""));
        assert!(!valid_name("has space"));
    }
}
