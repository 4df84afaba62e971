//! # Query Engine
//!
//! The `QueryEngine` contract, its three implementations, and the factory
//! that selects one from configuration.
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `TreeEngine` | `tree` | Full interpreter over the parsed syntax tree |
//! | `PatternEngine` | `pattern` | Regex-directed fast path for a common subset |
//! | `HybridEngine` | `hybrid` | Pattern path now, background CST memoization |
//!
//! The `harness` module wraps two engines for A/B equivalence runs.

pub mod cancel;
pub mod result;
pub mod tree;
pub mod pattern;
pub mod hybrid;
pub mod harness;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::model::{NodeId, PropertyMap, RelId};
use crate::storage::GraphStore;
use crate::{Error, Result};

pub use cancel::CancellationToken;
pub use harness::{BackendStatsSnapshot, ComparisonHarness, HarnessMode};
pub use hybrid::{HybridEngine, HybridStats, is_read_only};
pub use pattern::PatternEngine;
pub use result::{QueryResult, QueryStats};
pub use tree::TreeEngine;

// ============================================================================
// Collaborator contracts
// ============================================================================

/// Called after each node creation with the new node's ID.
pub type NodeCreatedHook = Arc<dyn Fn(&NodeId) + Send + Sync>;

/// Embedding client for vector procedures. Stored and forwarded by every
/// backend; only backends with vector support consume it.
pub trait QueryEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============================================================================
// QueryEngine contract
// ============================================================================

/// The one contract every execution backend implements.
///
/// A single instance is safe for concurrent `execute` calls; per-call state
/// lives on the stack of that call.
pub trait QueryEngine: Send + Sync {
    /// Execute a Cypher script against the store.
    fn execute(
        &self,
        ctx: &CancellationToken,
        source: &str,
        params: PropertyMap,
    ) -> Result<QueryResult>;

    /// Install a hook invoked after each node creation.
    fn set_node_created_hook(&self, hook: NodeCreatedHook);

    /// Store an embedding client for vector procedures.
    fn set_query_embedder(&self, embedder: Arc<dyn QueryEmbedder>);

    /// Shut down background workers, if any.
    fn close(&self);
}

// ============================================================================
// Configuration
// ============================================================================

/// Which execution backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    Pattern,
    Tree,
    #[default]
    Hybrid,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pattern" => Ok(BackendKind::Pattern),
            "tree" => Ok(BackendKind::Tree),
            "hybrid" => Ok(BackendKind::Hybrid),
            other => Err(Error::ConfigError(format!(
                "unknown backend selector '{other}' (expected pattern, tree, or hybrid)"
            ))),
        }
    }
}

/// Environment variable consulted by [`EngineConfig::from_env`].
pub const BACKEND_ENV: &str = "CYPHER_RS_BACKEND";

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Opt-in result cache for read-only queries (hybrid backend only).
    pub result_cache: bool,
    /// Background CST build workers (hybrid backend only).
    pub workers: usize,
    /// Capacity of the background build queue (hybrid backend only).
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            result_cache: false,
            workers: 2,
            queue_capacity: 1_000,
        }
    }
}

impl EngineConfig {
    /// Resolve the backend selector from `CYPHER_RS_BACKEND`, falling back
    /// to the default. An invalid selector fails fast.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(BACKEND_ENV) {
            config.backend = raw.parse()?;
        }
        Ok(config)
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Construct the configured backend over the given store.
pub fn open_engine(
    store: Arc<dyn GraphStore>,
    config: EngineConfig,
) -> Result<Arc<dyn QueryEngine>> {
    debug!(backend = ?config.backend, "opening query engine");
    match config.backend {
        BackendKind::Pattern => Ok(Arc::new(PatternEngine::new(store))),
        BackendKind::Tree => Ok(Arc::new(TreeEngine::new(store))),
        BackendKind::Hybrid => Ok(Arc::new(HybridEngine::new(store, &config))),
    }
}

// ============================================================================
// Entity ID allocation
// ============================================================================

// Process-wide wells so that every backend hands out non-colliding IDs.
static NODE_ID_SEQ: AtomicU64 = AtomicU64::new(1);
static REL_ID_SEQ: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_node_id() -> NodeId {
    NodeId(format!("n{}", NODE_ID_SEQ.fetch_add(1, Ordering::Relaxed)))
}

pub(crate) fn next_rel_id() -> RelId {
    RelId(format!("r{}", REL_ID_SEQ.fetch_add(1, Ordering::Relaxed)))
}

/// Reset the ID wells. Test hook; never call with live stores attached.
pub fn reset_id_allocator() {
    NODE_ID_SEQ.store(1, Ordering::SeqCst);
    REL_ID_SEQ.store(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("pattern".parse::<BackendKind>().unwrap(), BackendKind::Pattern);
        assert_eq!("TREE".parse::<BackendKind>().unwrap(), BackendKind::Tree);
        assert_eq!(" hybrid ".parse::<BackendKind>().unwrap(), BackendKind::Hybrid);
        assert!("turbo".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_id_allocation_is_unique() {
        let a = next_node_id();
        let b = next_node_id();
        assert_ne!(a, b);
    }
}
