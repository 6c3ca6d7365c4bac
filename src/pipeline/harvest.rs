// src/pipeline/harvest.rs

//! Chunked harvest orchestration.
//!
//! Units are split into fixed-size chunks. Each chunk runs through the
//! worker pool, its accepted records are merged into the corpus, and the
//! corpus is persisted before the next chunk starts. Concurrency exists only
//! inside a chunk.

use std::fmt;
use std::sync::Arc;

use super::filter::Filter;
use super::merge::MergeOutcome;
use super::pool::{UnitOutcome, WorkerPool};
use super::retry::RetryPolicy;
use crate::error::Result;
use crate::models::{Corpus, RecordKind, RemapTable};
use crate::services::UnitSource;
use crate::storage::{CorpusStore, SkipRecord};
use crate::utils::progress::{NoProgress, Progress};

/// Per-chunk counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkSummary {
    /// 1-based chunk number
    pub index: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

impl fmt::Display for ChunkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempted, {} succeeded, {} skipped, {} failed | {} inserted, {} updated, {} unchanged, {} rejected",
            self.attempted,
            self.succeeded,
            self.skipped,
            self.failed,
            self.inserted,
            self.updated,
            self.unchanged,
            self.rejected
        )
    }
}

/// Totals over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub dataset: &'static str,
    pub chunks: Vec<ChunkSummary>,
    /// Corpus size after the run
    pub corpus_size: usize,
}

impl HarvestSummary {
    fn new(dataset: &'static str) -> Self {
        Self {
            dataset,
            ..Self::default()
        }
    }

    fn total(&self, field: impl Fn(&ChunkSummary) -> usize) -> usize {
        self.chunks.iter().map(field).sum()
    }

    pub fn attempted(&self) -> usize {
        self.total(|c| c.attempted)
    }

    pub fn succeeded(&self) -> usize {
        self.total(|c| c.succeeded)
    }

    pub fn skipped(&self) -> usize {
        self.total(|c| c.skipped)
    }

    pub fn failed(&self) -> usize {
        self.total(|c| c.failed)
    }

    pub fn inserted(&self) -> usize {
        self.total(|c| c.inserted)
    }

    pub fn updated(&self) -> usize {
        self.total(|c| c.updated)
    }

    pub fn unchanged(&self) -> usize {
        self.total(|c| c.unchanged)
    }

    pub fn rejected(&self) -> usize {
        self.total(|c| c.rejected)
    }
}

impl fmt::Display for HarvestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} chunks, {} attempted, {} succeeded, {} skipped, {} failed | {} inserted, {} updated, {} unchanged, {} rejected | {} entries",
            self.dataset,
            self.chunks.len(),
            self.attempted(),
            self.succeeded(),
            self.skipped(),
            self.failed(),
            self.inserted(),
            self.updated(),
            self.unchanged(),
            self.rejected(),
            self.corpus_size
        )
    }
}

/// Drives one source over a list of units, chunk by chunk.
pub struct Harvester<'a, S: UnitSource> {
    source: Arc<S>,
    store: &'a dyn CorpusStore<S::Kind>,
    pool: WorkerPool,
    policy: RetryPolicy,
    chunk_size: usize,
    catalog: Option<Arc<RemapTable>>,
    progress: Arc<dyn Progress>,
}

impl<'a, S: UnitSource> Harvester<'a, S> {
    pub fn new(source: Arc<S>, store: &'a dyn CorpusStore<S::Kind>) -> Self {
        Self {
            source,
            store,
            pool: WorkerPool::new(4),
            policy: RetryPolicy::default(),
            chunk_size: 100,
            catalog: None,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        let progress = Arc::clone(&self.progress);
        self.pool = WorkerPool::new(limit).with_progress(progress);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Catalog snapshot for kinds with foreign references.
    pub fn catalog(mut self, catalog: Arc<RemapTable>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Reporter advanced by the worker pool as units finish.
    pub fn progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.pool = self.pool.with_progress(Arc::clone(&progress));
        self.progress = progress;
        self
    }

    /// Harvest `units` into `corpus`, persisting after every chunk.
    ///
    /// Unit failures are counted and logged; only storage errors abort the
    /// run, in which case every earlier chunk is already on disk.
    pub async fn run(
        &self,
        corpus: &mut Corpus<S::Kind>,
        units: Vec<S::Unit>,
    ) -> Result<HarvestSummary> {
        let kind = corpus.kind_arc();
        let dataset = kind.dataset();
        let mut summary = HarvestSummary::new(dataset);

        if units.is_empty() {
            log::info!("{dataset}: nothing to harvest");
            summary.corpus_size = corpus.len();
            return Ok(summary);
        }

        let mut filter = Filter::new(Arc::clone(&kind));
        if let Some(catalog) = &self.catalog {
            filter = filter.with_catalog(Arc::clone(catalog));
        }
        let filter = Arc::new(filter);

        let total_chunks = units.len().div_ceil(self.chunk_size);
        log::info!(
            "{}: {} units in {} chunk(s), {} concurrent, {} attempt(s) per unit",
            dataset,
            units.len(),
            total_chunks,
            self.pool.limit(),
            self.policy.max_attempts()
        );

        self.progress.start(units.len() as u64);
        let outcome = self.run_chunks(corpus, &filter, &units, &mut summary).await;
        self.progress.finish();
        outcome?;

        summary.corpus_size = corpus.len();
        Ok(summary)
    }

    async fn run_chunks(
        &self,
        corpus: &mut Corpus<S::Kind>,
        filter: &Arc<Filter<S::Kind>>,
        units: &[S::Unit],
        summary: &mut HarvestSummary,
    ) -> Result<()> {
        let total_chunks = units.len().div_ceil(self.chunk_size);
        let done_before = self.pool.completed();
        for (i, chunk) in units.chunks(self.chunk_size).enumerate() {
            let chunk_summary = self
                .run_chunk(i + 1, corpus, filter, chunk.to_vec())
                .await?;
            log::info!(
                "{}: chunk {}/{}: {} ({}/{} units done)",
                summary.dataset,
                chunk_summary.index,
                total_chunks,
                chunk_summary,
                self.pool.completed() - done_before,
                units.len()
            );
            summary.chunks.push(chunk_summary);
        }
        Ok(())
    }

    async fn run_chunk(
        &self,
        index: usize,
        corpus: &mut Corpus<S::Kind>,
        filter: &Arc<Filter<S::Kind>>,
        units: Vec<S::Unit>,
    ) -> Result<ChunkSummary> {
        let kind = corpus.kind_arc();
        let dataset = kind.dataset();
        let mut chunk = ChunkSummary {
            index,
            attempted: units.len(),
            ..ChunkSummary::default()
        };

        let mut rx = self.pool.spawn(
            Arc::clone(&self.source),
            Arc::clone(filter),
            self.policy,
            units,
        );

        let mut accepted = Vec::new();
        let mut skips = Vec::new();
        while let Some(report) = rx.recv().await {
            let unit = report.unit.to_string();

            match report.outcome {
                UnitOutcome::Fetched {
                    records, rejected, ..
                } => {
                    chunk.succeeded += 1;
                    chunk.rejected += rejected.len();
                    skips.extend(rejected.into_iter().map(|rejection| {
                        SkipRecord::new(
                            unit.clone(),
                            Some(rejection.key),
                            rejection.reason.to_string(),
                        )
                    }));
                    accepted.extend(records);
                }
                UnitOutcome::Skipped(error) => {
                    chunk.skipped += 1;
                    log::info!("{dataset}: {unit} skipped: {error}");
                    let key = self.source.requested_key(&report.unit);
                    skips.push(SkipRecord::new(unit, key, error.to_string()));
                }
                UnitOutcome::Failed { attempts, cause } => {
                    chunk.failed += 1;
                    log::warn!("{dataset}: {unit} failed after {attempts} attempt(s): {cause}");
                    let key = self.source.requested_key(&report.unit);
                    skips.push(SkipRecord::new(
                        unit,
                        key,
                        format!("failed after {attempts} attempt(s): {cause}"),
                    ));
                }
            }
        }

        // Completion order is arbitrary; merge in key order so surrogate
        // allocation is reproducible. Among duplicates the latest arrival wins.
        accepted.reverse();
        accepted.sort_by_key(|record| kind.natural_key(record));
        accepted.dedup_by_key(|record| kind.natural_key(record));

        for record in accepted {
            match corpus.merge(record) {
                MergeOutcome::Inserted(_) => chunk.inserted += 1,
                MergeOutcome::Updated(_) => chunk.updated += 1,
                MergeOutcome::Unchanged(_) => chunk.unchanged += 1,
            }
        }

        self.store.save_corpus(corpus).await?;
        self.store.append_skips(&kind, &skips).await?;

        Ok(chunk)
    }
}
