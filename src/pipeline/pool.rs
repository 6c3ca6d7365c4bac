// src/pipeline/pool.rs

//! Bounded worker pool.
//!
//! Every unit runs as its own task. A semaphore caps how many are in flight;
//! reports flow back over one channel in completion order and the channel
//! closes once every submitted unit has reported. Each finished unit bumps
//! the pool's counter and advances the progress reporter.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use super::filter::{Filter, Rejection};
use super::retry::RetryPolicy;
use crate::models::RecordKind;
use crate::services::{FetchError, UnitSource};
use crate::utils::progress::{NoProgress, Progress};

/// Record type produced by a source.
pub type SourceRecord<S> = <<S as UnitSource>::Kind as RecordKind>::Record;

/// What happened to one unit.
#[derive(Debug)]
pub enum UnitOutcome<R> {
    /// Fetched and filtered
    Fetched {
        records: Vec<R>,
        rejected: Vec<Rejection>,
        attempts: u8,
    },
    /// Terminal non-error outcome (not found, client error)
    Skipped(FetchError),
    /// Transient failures exhausted the retry bound
    Failed { attempts: u8, cause: String },
}

/// One unit and its outcome.
#[derive(Debug)]
pub struct UnitReport<U, R> {
    pub unit: U,
    pub outcome: UnitOutcome<R>,
}

/// Runs fetch units concurrently, at most `limit` at a time.
#[derive(Clone)]
pub struct WorkerPool {
    limit: usize,
    completed: Arc<AtomicUsize>,
    progress: Arc<dyn Progress>,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            completed: Arc::new(AtomicUsize::new(0)),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Units finished since the pool was created.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Start every unit and return the report channel.
    ///
    /// Fetch tasks never see the corpus; the receiver is the single
    /// consumer.
    pub fn spawn<S: UnitSource>(
        &self,
        source: Arc<S>,
        filter: Arc<Filter<S::Kind>>,
        policy: RetryPolicy,
        units: Vec<S::Unit>,
    ) -> mpsc::Receiver<UnitReport<S::Unit, SourceRecord<S>>> {
        let (tx, rx) = mpsc::channel(units.len().max(1));
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let completed = Arc::clone(&self.completed);
        let progress = Arc::clone(&self.progress);

        tokio::spawn(async move {
            let mut tasks = JoinSet::new();

            for unit in units {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let source = Arc::clone(&source);
                let filter = Arc::clone(&filter);
                let completed = Arc::clone(&completed);
                let progress = Arc::clone(&progress);
                let tx = tx.clone();

                tasks.spawn(async move {
                    let _permit = permit;
                    let outcome = AssertUnwindSafe(run_unit(&*source, &filter, policy, &unit))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| UnitOutcome::Failed {
                            attempts: 0,
                            cause: "worker panicked".to_string(),
                        });
                    completed.fetch_add(1, Ordering::SeqCst);
                    progress.advance();
                    let _ = tx.send(UnitReport { unit, outcome }).await;
                });
            }
            drop(tx);

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    log::error!("worker task aborted: {e}");
                }
            }
        });

        rx
    }
}

async fn run_unit<S: UnitSource>(
    source: &S,
    filter: &Filter<S::Kind>,
    policy: RetryPolicy,
    unit: &S::Unit,
) -> UnitOutcome<SourceRecord<S>> {
    let attempt = policy.run(move || source.fetch(unit)).await;

    match attempt.result {
        Ok(records) => {
            let filtered = filter.apply(source.requested_key(unit), records);
            UnitOutcome::Fetched {
                records: filtered.records,
                rejected: filtered.rejected,
                attempts: attempt.attempts,
            }
        }
        Err(error @ (FetchError::NotFound | FetchError::ClientError { .. })) => {
            UnitOutcome::Skipped(error)
        }
        Err(error) => UnitOutcome::Failed {
            attempts: attempt.attempts,
            cause: error.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::models::{Subject, SubjectKind};

    /// Tracks how many fetches overlap.
    #[derive(Default)]
    struct SlowSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl UnitSource for SlowSource {
        type Kind = SubjectKind;
        type Unit = u64;

        fn requested_key(&self, unit: &u64) -> Option<u64> {
            Some(*unit)
        }

        async fn fetch(&self, unit: &u64) -> Result<Vec<Subject>, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match unit % 5 {
                3 => Err(FetchError::NotFound),
                4 => Err(FetchError::Transient("HTTP 503".into())),
                _ => {
                    let mut subject = Subject {
                        id: *unit,
                        kind: 2,
                        ..Subject::default()
                    };
                    subject.rating.rank = 1;
                    Ok(vec![subject])
                }
            }
        }
    }

    #[tokio::test]
    async fn respects_limit_and_reports_every_unit() {
        let source = Arc::new(SlowSource::default());
        let filter = Arc::new(Filter::new(Arc::new(SubjectKind::new(2))));
        let pool = WorkerPool::new(3);

        let mut rx = pool.spawn(
            Arc::clone(&source),
            filter,
            RetryPolicy::no_retry(),
            (0..20).collect(),
        );

        let mut seen = Vec::new();
        let (mut fetched, mut skipped, mut failed) = (0, 0, 0);
        while let Some(report) = rx.recv().await {
            seen.push(report.unit);
            match report.outcome {
                UnitOutcome::Fetched { records, .. } => {
                    assert_eq!(records.len(), 1);
                    fetched += 1;
                }
                UnitOutcome::Skipped(FetchError::NotFound) => skipped += 1,
                UnitOutcome::Skipped(other) => panic!("unexpected {other}"),
                UnitOutcome::Failed { attempts, .. } => {
                    assert_eq!(attempts, 1);
                    failed += 1;
                }
            }
        }

        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert_eq!((fetched, skipped, failed), (12, 4, 4));
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.completed(), 20);
    }

    #[derive(Default)]
    struct CountingProgress(AtomicUsize);

    impl Progress for CountingProgress {
        fn advance(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn counter_and_progress_span_batches() {
        let progress = Arc::new(CountingProgress::default());
        let pool = WorkerPool::new(4).with_progress(progress.clone());
        let filter = Arc::new(Filter::new(Arc::new(SubjectKind::new(2))));

        for batch in [0..6u64, 6..10] {
            let mut rx = pool.spawn(
                Arc::new(SlowSource::default()),
                Arc::clone(&filter),
                RetryPolicy::no_retry(),
                batch.collect(),
            );
            while rx.recv().await.is_some() {}
        }

        assert_eq!(pool.completed(), 10);
        assert_eq!(progress.0.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn empty_batch_closes_immediately() {
        let pool = WorkerPool::new(2);
        let mut rx = pool.spawn(
            Arc::new(SlowSource::default()),
            Arc::new(Filter::new(Arc::new(SubjectKind::new(2)))),
            RetryPolicy::no_retry(),
            Vec::new(),
        );
        assert!(rx.recv().await.is_none());
    }
}
