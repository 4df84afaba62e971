//! # Cypher Language
//!
//! Lexer + recursive-descent parser producing a typed concrete syntax tree,
//! fronted by a process-wide bounded CST cache shared by every backend.
//!
//! Parsing is a pure function of the source text; the cache is the only
//! state here, keyed by the trimmed source.

pub mod ast;
pub mod lexer;
pub mod parser;

use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};

use lru::LruCache;
use parking_lot::RwLock;

use crate::Result;
use ast::Script;

/// Capacity of the process-wide CST cache.
pub const CST_CACHE_CAPACITY: usize = 1024;

fn cst_cache() -> &'static RwLock<LruCache<String, Arc<Script>>> {
    static CACHE: OnceLock<RwLock<LruCache<String, Arc<Script>>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        RwLock::new(LruCache::new(
            NonZeroUsize::new(CST_CACHE_CAPACITY).expect("capacity is non-zero"),
        ))
    })
}

/// Parse a Cypher script, going through the shared CST cache.
///
/// Readers proceed concurrently (`peek` does not touch recency); insertion
/// takes the write lock.
pub fn parse(source: &str) -> Result<Arc<Script>> {
    let key = source.trim();
    if key.is_empty() {
        return Err(crate::Error::EmptyQuery);
    }

    if let Some(cst) = cst_cache().read().peek(key) {
        return Ok(Arc::clone(cst));
    }

    let cst = Arc::new(parse_uncached(key)?);
    cst_cache().write().put(key.to_owned(), Arc::clone(&cst));
    Ok(cst)
}

/// Parse without consulting or populating the cache.
pub fn parse_uncached(source: &str) -> Result<Script> {
    let tokens = lexer::tokenize(source)?;
    parser::parse_script(source, &tokens)
}

/// Look up a cached CST without parsing. Never blocks on a parse.
pub fn cached(source: &str) -> Option<Arc<Script>> {
    cst_cache().read().peek(source.trim()).map(Arc::clone)
}

/// Drop every cached CST. Test reset hook and embedder escape hatch.
pub fn clear_cache() {
    cst_cache().write().clear();
}
