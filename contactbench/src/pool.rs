//! A fixed-size worker pool that drains a bounded job queue.
//!
//! A phase enqueues `N` job indices from a single producer loop into a queue of
//! `workers * QUEUE_FACTOR` slots and closes it. Each worker owns its random source and statistics,
//! pulls jobs until the queue is closed and drained, and returns its statistics to the runner.
//! The runner returns once every worker has returned.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rand::rngs::SmallRng;

use crate::error::RequestError;
use crate::report::{PhaseReport, WorkerStats};
use crate::workload::{PhaseKind, SeedSequence};

/// Queue slots per worker, smoothing bursts between the producer and the workers.
pub const QUEUE_FACTOR: usize = 10;

/// The action performed for every job of a phase.
pub trait Phase: Send + Sync + 'static {
    /// Which phase this action belongs to.
    fn kind(&self) -> PhaseKind;

    /// Executes job `index` using the worker's random source.
    ///
    /// On success, returns the number of response bytes to account for.
    fn execute(
        &self,
        index: u64,
        rng: &mut SmallRng,
    ) -> impl Future<Output = Result<u64, RequestError>> + Send;
}

/// Sizing of a single phase run.
#[derive(Debug)]
pub struct PhaseOptions {
    /// Total number of jobs.
    pub count: u64,
    /// Requested number of concurrent workers, clamped into `1..=count`.
    pub workers: usize,
    /// Seeds of the per-worker random sources.
    pub seeds: SeedSequence,
    /// Progress indicator advanced once per finished job.
    pub progress: ProgressBar,
}

impl PhaseOptions {
    /// Creates options without a visible progress indicator.
    pub fn new(count: u64, workers: usize, seeds: SeedSequence) -> Self {
        Self {
            count,
            workers,
            seeds,
            progress: ProgressBar::hidden(),
        }
    }

    /// Returns the number of workers actually spawned.
    pub fn effective_workers(&self) -> usize {
        let max = usize::try_from(self.count).unwrap_or(usize::MAX).max(1);
        self.workers.clamp(1, max)
    }
}

/// Runs all jobs of a phase and waits for the pool to drain.
///
/// Individual request failures are logged and counted, they never abort the phase. The returned
/// report always accounts for exactly `options.count` attempted jobs. An error is only returned if
/// a worker panicked.
pub async fn run_phase<P: Phase>(phase: Arc<P>, options: PhaseOptions) -> Result<PhaseReport> {
    let kind = phase.kind();
    let workers = options.effective_workers();
    let mut report = PhaseReport::new(kind, workers);
    if options.count == 0 {
        return Ok(report);
    }

    tracing::info!(phase = %kind, count = options.count, workers, "starting phase");
    let seeds = options.seeds.for_phase(kind);
    let start = Instant::now();

    let (sender, receiver) = flume::bounded::<u64>(workers * QUEUE_FACTOR);

    let tasks: Vec<_> = (0..workers)
        .map(|worker| {
            let phase = Arc::clone(&phase);
            let receiver = receiver.clone();
            let progress = options.progress.clone();
            let rng = seeds.worker_rng(worker);
            tokio::spawn(run_worker(phase, receiver, rng, progress))
        })
        .collect();
    drop(receiver);

    for index in 0..options.count {
        // Sending only fails once every worker is gone, which means they panicked.
        if sender.send_async(index).await.is_err() {
            tracing::error!(phase = %kind, index, "all workers exited early");
            break;
        }
    }
    drop(sender);

    let finished = futures::future::join_all(tasks).await;
    report.elapsed = start.elapsed();
    options.progress.finish_and_clear();

    for task in finished {
        let stats = task.with_context(|| format!("{kind} worker panicked"))?;
        report.merge(stats)?;
    }

    tracing::info!(
        phase = %kind,
        attempted = report.attempted,
        failed = report.failed(),
        elapsed = ?report.elapsed,
        "finished phase"
    );

    Ok(report)
}

async fn run_worker<P: Phase>(
    phase: Arc<P>,
    jobs: flume::Receiver<u64>,
    mut rng: SmallRng,
    progress: ProgressBar,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    while let Ok(index) = jobs.recv_async().await {
        let start = Instant::now();
        match phase.execute(index, &mut rng).await {
            Ok(bytes) => stats.record_success(start.elapsed(), bytes),
            Err(err) => {
                tracing::warn!(
                    phase = %phase.kind(),
                    index,
                    kind = %err.kind(),
                    error = &err as &dyn std::error::Error,
                    "request failed"
                );
                stats.record_failure(err.kind());
            }
        }
        progress.inc(1);
    }

    stats
}
