//! A/B comparison harness.
//!
//! Wraps two engines for equivalence testing: route everything to the
//! active one, or run both and record timing and divergence. A diagnostic
//! aid, not the production path — statistics use lock-free atomics so the
//! harness never perturbs what it measures with contention.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::warn;

use crate::model::PropertyMap;
use crate::Result;

use super::{CancellationToken, NodeCreatedHook, QueryEmbedder, QueryEngine, QueryResult};

/// How the harness routes queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessMode {
    /// Route to the active backend only.
    Single,
    /// Run both backends; return the active one's result, record divergence.
    Compare,
}

// ============================================================================
// Per-backend statistics
// ============================================================================

#[derive(Default)]
pub struct BackendStats {
    queries: AtomicU64,
    errors: AtomicU64,
    total_latency_ns: AtomicU64,
    min_latency_ns: AtomicU64,
    max_latency_ns: AtomicU64,
}

/// Plain snapshot of one backend's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStatsSnapshot {
    pub queries: u64,
    pub errors: u64,
    pub total_latency_ns: u64,
    pub min_latency_ns: u64,
    pub max_latency_ns: u64,
    pub mean_latency_ns: u64,
}

impl BackendStats {
    fn record(&self, elapsed_ns: u64, is_error: bool) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ns.fetch_add(elapsed_ns, Ordering::Relaxed);
        self.min_latency_ns.fetch_min(elapsed_ns, Ordering::Relaxed);
        self.max_latency_ns.fetch_max(elapsed_ns, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BackendStatsSnapshot {
        let queries = self.queries.load(Ordering::Relaxed);
        let total = self.total_latency_ns.load(Ordering::Relaxed);
        let min = self.min_latency_ns.load(Ordering::Relaxed);
        BackendStatsSnapshot {
            queries,
            errors: self.errors.load(Ordering::Relaxed),
            total_latency_ns: total,
            min_latency_ns: if min == u64::MAX { 0 } else { min },
            max_latency_ns: self.max_latency_ns.load(Ordering::Relaxed),
            mean_latency_ns: if queries == 0 { 0 } else { total / queries },
        }
    }

    fn new() -> Self {
        Self {
            min_latency_ns: AtomicU64::new(u64::MAX),
            ..Default::default()
        }
    }
}

// ============================================================================
// ComparisonHarness
// ============================================================================

/// Runs an active backend, optionally shadowed by a reference backend.
pub struct ComparisonHarness {
    active: Arc<dyn QueryEngine>,
    reference: Arc<dyn QueryEngine>,
    mode: HarnessMode,
    active_stats: BackendStats,
    reference_stats: BackendStats,
    divergences: AtomicU64,
}

impl ComparisonHarness {
    pub fn new(
        active: Arc<dyn QueryEngine>,
        reference: Arc<dyn QueryEngine>,
        mode: HarnessMode,
    ) -> Self {
        Self {
            active,
            reference,
            mode,
            active_stats: BackendStats::new(),
            reference_stats: BackendStats::new(),
            divergences: AtomicU64::new(0),
        }
    }

    pub fn active_stats(&self) -> BackendStatsSnapshot {
        self.active_stats.snapshot()
    }

    pub fn reference_stats(&self) -> BackendStatsSnapshot {
        self.reference_stats.snapshot()
    }

    /// Queries where the two backends disagreed on row count or error shape.
    pub fn divergences(&self) -> u64 {
        self.divergences.load(Ordering::Relaxed)
    }

    fn timed(
        engine: &dyn QueryEngine,
        stats: &BackendStats,
        ctx: &CancellationToken,
        source: &str,
        params: PropertyMap,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let result = engine.execute(ctx, source, params);
        // Clamp to 1ns so min/max stay meaningful on coarse clocks.
        let elapsed = (started.elapsed().as_nanos() as u64).max(1);
        stats.record(elapsed, result.is_err());
        result
    }
}

impl QueryEngine for ComparisonHarness {
    fn execute(
        &self,
        ctx: &CancellationToken,
        source: &str,
        params: PropertyMap,
    ) -> Result<QueryResult> {
        match self.mode {
            HarnessMode::Single => {
                Self::timed(self.active.as_ref(), &self.active_stats, ctx, source, params)
            }
            HarnessMode::Compare => {
                let active = Self::timed(
                    self.active.as_ref(),
                    &self.active_stats,
                    ctx,
                    source,
                    params.clone(),
                );
                let reference = Self::timed(
                    self.reference.as_ref(),
                    &self.reference_stats,
                    ctx,
                    source,
                    params,
                );

                // Divergence check: row counts and error presence.
                let diverged = match (&active, &reference) {
                    (Ok(a), Ok(b)) => a.rows.len() != b.rows.len(),
                    (Ok(_), Err(_)) | (Err(_), Ok(_)) => true,
                    (Err(_), Err(_)) => false,
                };
                if diverged {
                    self.divergences.fetch_add(1, Ordering::Relaxed);
                    warn!(query = source, "backend divergence detected");
                }

                active
            }
        }
    }

    fn set_node_created_hook(&self, hook: NodeCreatedHook) {
        self.active.set_node_created_hook(hook.clone());
        self.reference.set_node_created_hook(hook);
    }

    fn set_query_embedder(&self, embedder: Arc<dyn QueryEmbedder>) {
        self.active.set_query_embedder(embedder.clone());
        self.reference.set_query_embedder(embedder);
    }

    fn close(&self) {
        self.active.close();
        self.reference.close();
    }
}
