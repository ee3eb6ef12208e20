//! Statistics of finished phases and their console rendering.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::error::FailureKind;
use crate::workload::PhaseKind;

/// Counters collected by a single worker, merged into a [`PhaseReport`] once the phase drained.
#[derive(Default)]
pub(crate) struct WorkerStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failures: BTreeMap<FailureKind, u64>,
    pub bytes_received: u64,
    pub timing: DDSketch,
}

impl WorkerStats {
    pub fn record_success(&mut self, elapsed: Duration, bytes: u64) {
        self.attempted += 1;
        self.succeeded += 1;
        self.bytes_received += bytes;
        self.timing.add(elapsed.as_secs_f64());
    }

    pub fn record_failure(&mut self, kind: FailureKind) {
        self.attempted += 1;
        *self.failures.entry(kind).or_default() += 1;
    }
}

/// The result of running all jobs of a phase.
pub struct PhaseReport {
    /// Which phase this report describes.
    pub kind: PhaseKind,
    /// Number of workers that drained the queue.
    pub workers: usize,
    /// Number of jobs executed, successful or not.
    pub attempted: u64,
    /// Number of jobs whose request succeeded.
    pub succeeded: u64,
    /// Number of failed jobs per category.
    pub failures: BTreeMap<FailureKind, u64>,
    /// Response body bytes received by successful requests.
    pub bytes_received: u64,
    /// Wall-clock time from the first enqueued job until all workers returned.
    pub elapsed: Duration,
    /// Latency of successful requests, in seconds.
    pub timing: DDSketch,
}

impl PhaseReport {
    pub(crate) fn new(kind: PhaseKind, workers: usize) -> Self {
        Self {
            kind,
            workers,
            attempted: 0,
            succeeded: 0,
            failures: BTreeMap::new(),
            bytes_received: 0,
            elapsed: Duration::ZERO,
            timing: DDSketch::default(),
        }
    }

    pub(crate) fn merge(&mut self, stats: WorkerStats) -> Result<()> {
        self.attempted += stats.attempted;
        self.succeeded += stats.succeeded;
        self.bytes_received += stats.bytes_received;
        for (kind, count) in stats.failures {
            *self.failures.entry(kind).or_default() += count;
        }
        self.timing
            .merge(&stats.timing)
            .map_err(|err| anyhow::anyhow!("failed to merge latency sketches: {err:?}"))?;
        Ok(())
    }

    /// Returns the total number of failed jobs.
    pub fn failed(&self) -> u64 {
        self.failures.values().sum()
    }

    /// Returns the number of failed jobs of the given category.
    pub fn failures_of(&self, kind: FailureKind) -> u64 {
        self.failures.get(&kind).copied().unwrap_or_default()
    }

    /// Attempted jobs per second of wall-clock phase duration.
    ///
    /// Empty phases report zero instead of dividing by a vanishing duration.
    pub fn requests_per_second(&self) -> f64 {
        if self.attempted == 0 || self.elapsed.is_zero() {
            return 0.0;
        }
        self.attempted as f64 / self.elapsed.as_secs_f64()
    }
}

impl fmt::Debug for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseReport")
            .field("kind", &self.kind)
            .field("workers", &self.workers)
            .field("attempted", &self.attempted)
            .field("succeeded", &self.succeeded)
            .field("failures", &self.failures)
            .field("bytes_received", &self.bytes_received)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

/// How a phase ended.
#[derive(Debug)]
pub enum PhaseOutcome {
    /// All jobs were executed.
    Completed(PhaseReport),
    /// The phase was not started because its precondition did not hold.
    Skipped {
        /// Which phase was skipped.
        kind: PhaseKind,
        /// Human readable reason.
        reason: &'static str,
    },
}

impl PhaseOutcome {
    /// Returns the report of a completed phase.
    pub fn report(&self) -> Option<&PhaseReport> {
        match self {
            PhaseOutcome::Completed(report) => Some(report),
            PhaseOutcome::Skipped { .. } => None,
        }
    }

    /// Returns `true` if the phase did not run.
    pub fn is_skipped(&self) -> bool {
        matches!(self, PhaseOutcome::Skipped { .. })
    }

    /// Attempted requests per second, zero for skipped phases.
    pub fn requests_per_second(&self) -> f64 {
        self.report()
            .map(PhaseReport::requests_per_second)
            .unwrap_or_default()
    }
}

/// The result of a full benchmark run.
#[derive(Debug)]
pub struct BenchReport {
    /// Outcome of the write phase.
    pub write: PhaseOutcome,
    /// Number of contacts available to the read phase.
    pub stored: usize,
    /// Outcome of the read phase.
    pub read: PhaseOutcome,
}

impl BenchReport {
    /// Returns `true` if any phase had to be skipped.
    pub fn is_degraded(&self) -> bool {
        self.write.is_skipped() || self.read.is_skipped()
    }
}

/// Prints the results of all phases to stdout.
pub fn print_report(report: &BenchReport) {
    print_outcome(&report.write);
    println!("  {} contacts stored", report.stored.bold());
    print_outcome(&report.read);
}

fn print_outcome(outcome: &PhaseOutcome) {
    println!();
    match outcome {
        PhaseOutcome::Completed(report) => print_phase(report),
        PhaseOutcome::Skipped { kind, reason } => {
            println!(
                "{} {}",
                format!("## {}", kind.as_str().to_uppercase()).bold(),
                "SKIPPED".bold().yellow()
            );
            println!("  {reason}");
            println!("  {:.2} requests/s", 0.0_f64.bold());
        }
    }
}

fn print_phase(report: &PhaseReport) {
    print!(
        "{} ({} ops, {} workers",
        format!("## {}", report.kind.as_str().to_uppercase()).bold(),
        report.attempted.bold(),
        report.workers.bold()
    );
    let failed = report.failed();
    if failed > 0 {
        let details: Vec<_> = FailureKind::ALL
            .into_iter()
            .filter_map(|kind| match report.failures_of(kind) {
                0 => None,
                n => Some(format!("{n} {kind}")),
            })
            .collect();
        print!(
            ", {}",
            format!("{failed} FAILURES: {}", details.join(", "))
                .bold()
                .red()
        );
    }
    println!(")");

    println!("  total time: {:.2?}", report.elapsed.bold());
    print!("  {:.2} requests/s", report.requests_per_second().bold());
    if report.bytes_received > 0 && !report.elapsed.is_zero() {
        let throughput = (report.bytes_received as f64 / report.elapsed.as_secs_f64()) as u64;
        print!(", {:.2}/s", ByteSize::b(throughput).bold());
    }
    println!();

    if report.timing.count() > 0 {
        print_percentiles(&report.timing);
    }
}

fn print_percentiles(sketch: &DDSketch) {
    let quantile = |q| {
        let value = sketch.quantile(q).ok().flatten().unwrap_or_default();
        Duration::from_secs_f64(value)
    };
    let avg = Duration::from_secs_f64(sketch.sum().unwrap_or_default() / sketch.count() as f64);
    println!(
        "  avg: {:.2?}; p50: {:.2?}; p90: {:.2?}; p99: {:.2?}",
        avg.bold(),
        quantile(0.5),
        quantile(0.9),
        quantile(0.99)
    );
}
