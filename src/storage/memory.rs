//! In-memory graph store.
//!
//! This is the reference implementation of `GraphStore`.
//! It uses insertion-ordered maps protected by a single RwLock.
//!
//! ## Limitations
//!
//! - **Snapshot transactions**: `begin_transaction()` clones the whole graph
//!   state; `rollback_transaction()` restores it. Cheap for test-sized
//!   graphs, not for large ones.
//! - **No property indexes**: `create_index()` records metadata only. All
//!   property lookups scan.
//!
//! Use this store for:
//! - Testing the parser and the execution backends
//! - Embedding the engine in applications that don't need persistence

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use super::{ConstraintInfo, GraphStore, IndexInfo, valid_name};
use crate::model::{Node, NodeId, RelId, Relationship};
use crate::{Error, Result};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory property graph storage.
pub struct MemoryStore {
    state: RwLock<GraphState>,
    /// Snapshot taken at BEGIN; present while a transaction is open.
    snapshot: Mutex<Option<GraphState>>,
}

#[derive(Clone, Default)]
struct GraphState {
    nodes: HashMap<NodeId, Node>,
    node_order: Vec<NodeId>,
    edges: HashMap<RelId, Relationship>,
    edge_order: Vec<RelId>,
    /// node id → outgoing edge ids, in creation order
    outgoing: HashMap<NodeId, Vec<RelId>>,
    /// node id → incoming edge ids, in creation order
    incoming: HashMap<NodeId, Vec<RelId>>,
    /// label → node ids, in creation order
    label_index: HashMap<String, Vec<NodeId>>,
    indexes: Vec<IndexInfo>,
    constraints: Vec<ConstraintInfo>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            snapshot: Mutex::new(None),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore for MemoryStore {
    // ========================================================================
    // Node CRUD
    // ========================================================================

    fn create_node(&self, node: Node) -> Result<()> {
        for label in &node.labels {
            if !valid_name(label) {
                return Err(Error::IntegrityError(format!("invalid label name '{label}'")));
            }
        }

        let mut state = self.state.write();
        if state.nodes.contains_key(&node.id) {
            return Err(Error::IntegrityError(format!("node {} already exists", node.id)));
        }
        for label in &node.labels {
            state.label_index.entry(label.clone()).or_default().push(node.id.clone());
        }
        state.node_order.push(node.id.clone());
        state.outgoing.entry(node.id.clone()).or_default();
        state.incoming.entry(node.id.clone()).or_default();
        state.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    fn get_node(&self, id: &NodeId) -> Result<Option<Node>> {
        Ok(self.state.read().nodes.get(id).cloned())
    }

    fn update_node(&self, node: Node) -> Result<()> {
        let mut state = self.state.write();
        let old = state
            .nodes
            .get(&node.id)
            .cloned()
            .ok_or_else(|| Error::StorageError(format!("node {} not found", node.id)))?;

        // Rebuild label index entries for labels that changed.
        for label in &old.labels {
            if !node.has_label(label) {
                if let Some(ids) = state.label_index.get_mut(label) {
                    ids.retain(|nid| *nid != node.id);
                }
            }
        }
        for label in &node.labels {
            if !old.has_label(label) {
                if !valid_name(label) {
                    return Err(Error::IntegrityError(format!("invalid label name '{label}'")));
                }
                state.label_index.entry(label.clone()).or_default().push(node.id.clone());
            }
        }

        state.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    fn delete_node(&self, id: &NodeId) -> Result<bool> {
        let mut state = self.state.write();
        let incident = state.outgoing.get(id).map_or(0, Vec::len)
            + state.incoming.get(id).map_or(0, Vec::len);
        if incident > 0 {
            return Err(Error::IntegrityError(format!(
                "cannot delete node {id} with {incident} incident edges"
            )));
        }

        let removed = state.nodes.remove(id);
        if let Some(node) = &removed {
            state.node_order.retain(|nid| nid != id);
            state.outgoing.remove(id);
            state.incoming.remove(id);
            for label in &node.labels {
                if let Some(ids) = state.label_index.get_mut(label) {
                    ids.retain(|nid| nid != id);
                }
            }
        }
        Ok(removed.is_some())
    }

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    fn create_edge(&self, edge: Relationship) -> Result<()> {
        if !valid_name(&edge.rel_type) {
            return Err(Error::IntegrityError(format!(
                "invalid relationship type '{}'",
                edge.rel_type
            )));
        }

        let mut state = self.state.write();
        if !state.nodes.contains_key(&edge.src) {
            return Err(Error::IntegrityError(format!(
                "edge {} references missing start node {}",
                edge.id, edge.src
            )));
        }
        if !state.nodes.contains_key(&edge.dst) {
            return Err(Error::IntegrityError(format!(
                "edge {} references missing end node {}",
                edge.id, edge.dst
            )));
        }
        if state.edges.contains_key(&edge.id) {
            return Err(Error::IntegrityError(format!("edge {} already exists", edge.id)));
        }

        state.outgoing.entry(edge.src.clone()).or_default().push(edge.id.clone());
        state.incoming.entry(edge.dst.clone()).or_default().push(edge.id.clone());
        state.edge_order.push(edge.id.clone());
        state.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    fn get_edge(&self, id: &RelId) -> Result<Option<Relationship>> {
        Ok(self.state.read().edges.get(id).cloned())
    }

    fn update_edge(&self, edge: Relationship) -> Result<()> {
        let mut state = self.state.write();
        if !state.edges.contains_key(&edge.id) {
            return Err(Error::StorageError(format!("edge {} not found", edge.id)));
        }
        state.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    fn delete_edge(&self, id: &RelId) -> Result<bool> {
        let mut state = self.state.write();
        let removed = state.edges.remove(id);
        if let Some(edge) = &removed {
            state.edge_order.retain(|rid| rid != id);
            if let Some(ids) = state.outgoing.get_mut(&edge.src) {
                ids.retain(|rid| rid != id);
            }
            if let Some(ids) = state.incoming.get_mut(&edge.dst) {
                ids.retain(|rid| rid != id);
            }
        }
        Ok(removed.is_some())
    }

    // ========================================================================
    // Scan
    // ========================================================================

    fn nodes_by_label(&self, label: &str) -> Result<Vec<Node>> {
        let state = self.state.read();
        let ids = state.label_index.get(label).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|id| state.nodes.get(id).cloned()).collect())
    }

    fn all_nodes(&self) -> Result<Vec<Node>> {
        let state = self.state.read();
        Ok(state
            .node_order
            .iter()
            .filter_map(|id| state.nodes.get(id).cloned())
            .collect())
    }

    fn all_edges(&self) -> Result<Vec<Relationship>> {
        let state = self.state.read();
        Ok(state
            .edge_order
            .iter()
            .filter_map(|id| state.edges.get(id).cloned())
            .collect())
    }

    // ========================================================================
    // Adjacency
    // ========================================================================

    fn outgoing_edges(&self, id: &NodeId) -> Result<Vec<Relationship>> {
        let state = self.state.read();
        let ids = state.outgoing.get(id).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|rid| state.edges.get(rid).cloned()).collect())
    }

    fn incoming_edges(&self, id: &NodeId) -> Result<Vec<Relationship>> {
        let state = self.state.read();
        let ids = state.incoming.get(id).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|rid| state.edges.get(rid).cloned()).collect())
    }

    // ========================================================================
    // Counts
    // ========================================================================

    fn node_count(&self) -> Result<u64> {
        Ok(self.state.read().nodes.len() as u64)
    }

    fn edge_count(&self) -> Result<u64> {
        Ok(self.state.read().edges.len() as u64)
    }

    // ========================================================================
    // Transactions (snapshot-based)
    // ========================================================================

    fn begin_transaction(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock();
        if snapshot.is_some() {
            return Err(Error::TxError("transaction already active".into()));
        }
        *snapshot = Some(self.state.read().clone());
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock();
        if snapshot.take().is_none() {
            return Err(Error::TxError("no active transaction to commit".into()));
        }
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock();
        match snapshot.take() {
            Some(saved) => {
                *self.state.write() = saved;
                Ok(())
            }
            None => Err(Error::TxError("no active transaction to roll back".into())),
        }
    }

    // ========================================================================
    // Schema registry
    // ========================================================================

    fn create_index(&self, info: IndexInfo) -> Result<()> {
        let mut state = self.state.write();
        if state.indexes.iter().any(|i| i.name == info.name) {
            return Err(Error::IntegrityError(format!("index '{}' already exists", info.name)));
        }
        state.indexes.push(info);
        Ok(())
    }

    fn drop_index(&self, name: &str) -> Result<bool> {
        let mut state = self.state.write();
        let before = state.indexes.len();
        state.indexes.retain(|i| i.name != name);
        Ok(state.indexes.len() < before)
    }

    fn create_constraint(&self, info: ConstraintInfo) -> Result<()> {
        let mut state = self.state.write();
        if state.constraints.iter().any(|c| c.name == info.name) {
            return Err(Error::IntegrityError(format!(
                "constraint '{}' already exists",
                info.name
            )));
        }
        state.constraints.push(info);
        Ok(())
    }

    fn drop_constraint(&self, name: &str) -> Result<bool> {
        let mut state = self.state.write();
        let before = state.constraints.len();
        state.constraints.retain(|c| c.name != name);
        Ok(state.constraints.len() < before)
    }

    fn indexes(&self) -> Result<Vec<IndexInfo>> {
        Ok(self.state.read().indexes.clone())
    }

    fn constraints(&self) -> Result<Vec<ConstraintInfo>> {
        Ok(self.state.read().constraints.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn person(id: &str, name: &str) -> Node {
        Node::new(id).with_labels(["Person"]).with_property("name", name)
    }

    #[test]
    fn test_create_and_get_node() {
        let db = MemoryStore::new();
        db.create_node(person("n1", "Ada")).unwrap();

        let node = db.get_node(&NodeId::from("n1")).unwrap().unwrap();
        assert!(node.has_label("Person"));
        assert_eq!(node.get("name"), Some(&Value::from("Ada")));
    }

    #[test]
    fn test_create_edge_requires_endpoints() {
        let db = MemoryStore::new();
        db.create_node(person("n1", "Ada")).unwrap();

        let edge = Relationship::new("r1", "n1", "missing", "KNOWS");
        let err = db.create_edge(edge).unwrap_err();
        assert!(matches!(err, Error::IntegrityError(_)));
    }

    #[test]
    fn test_cannot_delete_connected_node() {
        let db = MemoryStore::new();
        db.create_node(person("n1", "Ada")).unwrap();
        db.create_node(person("n2", "Bob")).unwrap();
        db.create_edge(Relationship::new("r1", "n1", "n2", "KNOWS")).unwrap();

        assert!(db.delete_node(&NodeId::from("n1")).is_err());
        // Incoming edges block deletion too.
        assert!(db.delete_node(&NodeId::from("n2")).is_err());

        db.delete_edge(&RelId::from("r1")).unwrap();
        assert!(db.delete_node(&NodeId::from("n1")).unwrap());
    }

    #[test]
    fn test_label_index_tracks_updates() {
        let db = MemoryStore::new();
        db.create_node(person("n1", "Ada")).unwrap();

        let mut node = db.get_node(&NodeId::from("n1")).unwrap().unwrap();
        node.labels = ["Employee".to_string()].into_iter().collect();
        db.update_node(node).unwrap();

        assert!(db.nodes_by_label("Person").unwrap().is_empty());
        assert_eq!(db.nodes_by_label("Employee").unwrap().len(), 1);
    }

    #[test]
    fn test_adjacency_directions() {
        let db = MemoryStore::new();
        db.create_node(person("n1", "Ada")).unwrap();
        db.create_node(person("n2", "Bob")).unwrap();
        db.create_edge(Relationship::new("r1", "n1", "n2", "KNOWS")).unwrap();

        assert_eq!(db.outgoing_edges(&NodeId::from("n1")).unwrap().len(), 1);
        assert_eq!(db.incoming_edges(&NodeId::from("n1")).unwrap().len(), 0);
        assert_eq!(db.incoming_edges(&NodeId::from("n2")).unwrap().len(), 1);
    }

    #[test]
    fn test_all_nodes_in_insertion_order() {
        let db = MemoryStore::new();
        db.create_node(person("n1", "Ada")).unwrap();
        db.create_node(person("n2", "Bob")).unwrap();
        db.create_node(person("n3", "Eve")).unwrap();

        let ids: Vec<String> =
            db.all_nodes().unwrap().into_iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn test_invalid_label_rejected() {
        let db = MemoryStore::new();
        let node = Node::new("n1").with_labels(["2bad"]);
        assert!(db.create_node(node).is_err());
    }

    #[test]
    fn test_snapshot_transaction_rollback() {
        let db = MemoryStore::new();
        db.create_node(person("n1", "Ada")).unwrap();

        db.begin_transaction().unwrap();
        db.create_node(person("n2", "Bob")).unwrap();
        assert_eq!(db.node_count().unwrap(), 2);

        db.rollback_transaction().unwrap();
        assert_eq!(db.node_count().unwrap(), 1);
    }

    #[test]
    fn test_nested_begin_fails() {
        let db = MemoryStore::new();
        db.begin_transaction().unwrap();
        assert!(db.begin_transaction().is_err());
        db.commit_transaction().unwrap();
        assert!(db.commit_transaction().is_err());
    }

    #[test]
    fn test_schema_registry() {
        let db = MemoryStore::new();
        db.create_index(IndexInfo {
            name: "idx_person_name".into(),
            index_type: "RANGE".into(),
            labels_or_types: vec!["Person".into()],
            properties: vec!["name".into()],
            state: "ONLINE".into(),
        })
        .unwrap();

        assert_eq!(db.indexes().unwrap().len(), 1);
        assert!(db.drop_index("idx_person_name").unwrap());
        assert!(!db.drop_index("idx_person_name").unwrap());
    }
}
