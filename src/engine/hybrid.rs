//! Hybrid orchestrator.
//!
//! Answers from the pattern-directed fast path immediately, while a small
//! pool of background workers memoizes parse trees for the queries it has
//! seen, so downstream tools can pick up a CST without paying for the parse
//! on the query path. Optionally caches results of read-only queries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cypher::{self, ast::Script};
use crate::model::PropertyMap;
use crate::storage::GraphStore;
use crate::Result;

use super::pattern::PatternEngine;
use super::{
    CancellationToken, EngineConfig, NodeCreatedHook, QueryEmbedder, QueryEngine, QueryResult,
};

/// Tokens whose whole-word presence classifies a query as mutating.
const MUTATING_KEYWORDS: &[&str] = &["CREATE", "DELETE", "SET", "REMOVE", "MERGE", "DETACH"];

// ============================================================================
// HybridEngine
// ============================================================================

/// Pattern-directed execution up front, CST construction in the background.
pub struct HybridEngine {
    pattern: PatternEngine,
    jobs: Sender<String>,
    shutdown: Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Present only when the result cache was enabled at construction.
    result_cache: Option<Mutex<HashMap<String, QueryResult>>>,
    stats: Arc<HybridCounters>,
}

#[derive(Default)]
struct HybridCounters {
    executions: AtomicU64,
    cst_cache_hits: AtomicU64,
    cst_cache_misses: AtomicU64,
    builds_queued: AtomicU64,
    builds_completed: AtomicU64,
    result_cache_hits: AtomicU64,
}

/// Snapshot of the orchestrator's monotonic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HybridStats {
    pub executions: u64,
    pub cst_cache_hits: u64,
    pub cst_cache_misses: u64,
    pub builds_queued: u64,
    pub builds_completed: u64,
    pub result_cache_hits: u64,
}

impl HybridEngine {
    pub fn new(store: Arc<dyn GraphStore>, config: &EngineConfig) -> Self {
        let (jobs_tx, jobs_rx) = bounded::<String>(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(config.workers.max(1));
        let stats = Arc::new(HybridCounters::default());

        let mut workers = Vec::new();
        for worker in 0..config.workers.max(1) {
            let jobs = jobs_rx.clone();
            let shutdown = shutdown_rx.clone();
            let counters = Arc::clone(&stats);
            workers.push(
                std::thread::Builder::new()
                    .name(format!("cst-builder-{worker}"))
                    .spawn(move || build_worker(jobs, shutdown, counters))
                    .expect("spawn CST build worker"),
            );
        }

        Self {
            pattern: PatternEngine::new(store),
            jobs: jobs_tx,
            shutdown: shutdown_tx,
            workers: Mutex::new(workers),
            result_cache: config.result_cache.then(|| Mutex::new(HashMap::new())),
            stats,
        }
    }

    /// Cached CST for this source, if one exists. Never blocks on a parse.
    pub fn cst_if_cached(&self, source: &str) -> Option<Arc<Script>> {
        self.cst_probe(source)
    }

    /// CST for this source; parses synchronously (and caches) on a miss.
    pub fn cst(&self, source: &str) -> Result<Arc<Script>> {
        cypher::parse(source)
    }

    /// Poll for a background-built CST until `timeout` elapses.
    pub fn wait_for_cst(&self, source: &str, timeout: Duration) -> Option<Arc<Script>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(cst) = self.cst_probe(source) {
                return Some(cst);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn cst_probe(&self, source: &str) -> Option<Arc<Script>> {
        cypher::cached(source)
    }

    pub fn stats(&self) -> HybridStats {
        HybridStats {
            executions: self.stats.executions.load(Ordering::Relaxed),
            cst_cache_hits: self.stats.cst_cache_hits.load(Ordering::Relaxed),
            cst_cache_misses: self.stats.cst_cache_misses.load(Ordering::Relaxed),
            builds_queued: self.stats.builds_queued.load(Ordering::Relaxed),
            builds_completed: self.stats.builds_completed.load(Ordering::Relaxed),
            result_cache_hits: self.stats.result_cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Drop the shared CST cache and this engine's result cache.
    pub fn clear_caches(&self) {
        cypher::clear_cache();
        if let Some(cache) = &self.result_cache {
            *cache.lock() = HashMap::new();
        }
    }

    /// Number of entries currently held by the result cache.
    pub fn result_cache_len(&self) -> usize {
        self.result_cache.as_ref().map_or(0, |cache| cache.lock().len())
    }
}

impl QueryEngine for HybridEngine {
    fn execute(
        &self,
        ctx: &CancellationToken,
        source: &str,
        params: PropertyMap,
    ) -> Result<QueryResult> {
        ctx.check()?;
        self.stats.executions.fetch_add(1, Ordering::Relaxed);

        let key = source.trim().to_owned();
        let read_only = is_read_only(&key);

        if read_only {
            if let Some(cache) = &self.result_cache {
                if let Some(hit) = cache.lock().get(&key) {
                    self.stats.result_cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(hit.clone());
                }
            }
        }

        let result = self.pattern.execute(ctx, source, params)?;

        // Opportunistic CST memoization; a full queue drops the request.
        if self.cst_probe(&key).is_some() {
            self.stats.cst_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.cst_cache_misses.fetch_add(1, Ordering::Relaxed);
            if self.jobs.try_send(key.clone()).is_ok() {
                self.stats.builds_queued.fetch_add(1, Ordering::Relaxed);
            }
        }

        if read_only {
            if let Some(cache) = &self.result_cache {
                cache.lock().insert(key, result.clone());
            }
        } else if let Some(cache) = &self.result_cache {
            // Any mutation invalidates the whole result cache.
            *cache.lock() = HashMap::new();
        }

        Ok(result)
    }

    fn set_node_created_hook(&self, hook: NodeCreatedHook) {
        self.pattern.set_node_created_hook(hook);
    }

    fn set_query_embedder(&self, embedder: Arc<dyn QueryEmbedder>) {
        self.pattern.set_query_embedder(embedder);
    }

    fn close(&self) {
        let mut workers = self.workers.lock();
        for _ in workers.iter() {
            let _ = self.shutdown.try_send(());
        }
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        debug!("hybrid engine closed");
    }
}

impl Drop for HybridEngine {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Background CST builder
// ============================================================================

fn build_worker(jobs: Receiver<String>, shutdown: Receiver<()>, counters: Arc<HybridCounters>) {
    loop {
        select! {
            recv(jobs) -> msg => {
                let Ok(source) = msg else { break };
                if cypher::cached(&source).is_some() {
                    continue;
                }
                match cypher::parse(&source) {
                    Ok(_) => {
                        counters.builds_completed.fetch_add(1, Ordering::Relaxed);
                    }
                    // Never surfaces to an Execute caller; the fast path
                    // already answered.
                    Err(err) => warn!(%err, "background CST build failed"),
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
}

// ============================================================================
// Read-only classification
// ============================================================================

/// A query is read-only iff no mutating keyword appears as a whole word
/// (neighbors are not alphanumeric or underscore), case-insensitively.
pub fn is_read_only(source: &str) -> bool {
    let upper = source.to_ascii_uppercase();
    !MUTATING_KEYWORDS.iter().any(|kw| contains_word(&upper, kw))
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(word) {
        let start = from + pos;
        let end = start + word.len();
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_classification() {
        assert!(is_read_only("MATCH (n) RETURN n"));
        assert!(!is_read_only("CREATE (n:Person)"));
        assert!(!is_read_only("match (n) detach delete n"));
        assert!(!is_read_only("MATCH (n) SET n.x = 1"));
    }

    #[test]
    fn test_read_only_requires_word_boundaries() {
        // Substrings of identifiers do not count.
        assert!(is_read_only("MATCH (reset_count) RETURN reset_count"));
        assert!(is_read_only("MATCH (n:Settlement) RETURN n"));
        assert!(is_read_only("MATCH (n:Creature) RETURN n"));
        // Punctuation is a boundary.
        assert!(!is_read_only("MATCH (n) SET(n.x)"));
    }
}
