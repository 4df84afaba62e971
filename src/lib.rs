//! # cypher-rs — Embedded Cypher Query Engine
//!
//! A pluggable Cypher execution core for property-graph storage. Queries go
//! in as text, tabular results and mutation statistics come out; the storage
//! engine stays behind the [`GraphStore`] trait.
//!
//! ## Design Principles
//!
//! 1. **One contract, three backends**: [`QueryEngine`] is implemented by a
//!    tree-walking interpreter, a pattern-directed fast path, and a hybrid
//!    orchestrator that combines them
//! 2. **Clean DTOs**: `Node`, `Relationship`, `Value` cross all boundaries
//! 3. **Parser owns nothing**: Cypher → CST is a pure function behind a
//!    shared bounded cache
//! 4. **Storage is a collaborator**: the engine never reaches around the
//!    `GraphStore` trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cypher_rs::{
//!     open_engine, CancellationToken, EngineConfig, MemoryStore, PropertyMap, QueryEngine,
//! };
//!
//! # fn example() -> cypher_rs::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = open_engine(store, EngineConfig::default())?;
//!
//! let ctx = CancellationToken::new();
//! engine.execute(&ctx, "CREATE (n:Person {name: 'Ada'})", PropertyMap::new())?;
//! let result = engine.execute(&ctx, "MATCH (n:Person) RETURN n.name", PropertyMap::new())?;
//!
//! for row in &result.rows {
//!     println!("{:?}", row[0]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution Backends
//!
//! | Backend | Selector | Description |
//! |---------|----------|-------------|
//! | Tree    | `tree`    | Full interpreter over the parsed syntax tree |
//! | Pattern | `pattern` | Regex-directed fast path for a common subset |
//! | Hybrid  | `hybrid`  | Pattern path now, background tree memoization |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod cypher;
pub mod storage;
pub mod engine;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Path, Value, PropertyMap,
    NodeId, RelId, Direction,
};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{GraphStore, MemoryStore, IndexInfo, ConstraintInfo};

// ============================================================================
// Re-exports: Engine
// ============================================================================

pub use engine::{
    QueryEngine, QueryResult, QueryStats, QueryEmbedder, NodeCreatedHook,
    EngineConfig, BackendKind, CancellationToken,
    open_engine,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Parse error at line {line}, column {column}: {message}")]
    ParseError { line: u32, column: u32, message: String },

    #[error("Cypher syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Empty query")]
    EmptyQuery,

    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Integrity error: {0}")]
    IntegrityError(String),

    #[error("Invalid property value at '{path}': nested maps cannot be stored")]
    InvalidProperty { path: String },

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Query cancelled: {0}")]
    Cancelled(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Wrap a storage-layer failure with the query it interrupted.
    pub(crate) fn storage_context(self, source_text: &str) -> Error {
        match self {
            Error::StorageError(msg) => {
                Error::StorageError(format!("{msg} (while executing: {source_text})"))
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
