//! Configuration of a benchmark run.
//!
//! All options come from the command line, see `main.rs`. The defaults here match a full-size
//! run: one million writes and one million reads with 100 workers each.

use std::env;
use std::num::NonZeroUsize;
use std::thread::available_parallelism;
use std::time::Duration;

use anyhow::{Result, bail};
use indicatif::MultiProgress;

use crate::http::{DEFAULT_IDLE_TIMEOUT, DEFAULT_TIMEOUT};
use crate::workload::ReadMix;

/// Default root of the contacts service.
pub const DEFAULT_BASE_URL: &str = "http://python_aiohttp:8080";

/// Environment variable overriding the number of runtime worker threads.
const CPU_CORES_ENV: &str = "CPU_CORES";

/// Sizing of a single phase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PhaseConfig {
    /// Total number of requests.
    pub count: u64,
    /// Number of concurrent workers.
    pub workers: usize,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            count: 1_000_000,
            workers: 100,
        }
    }
}

/// Configuration of a full benchmark run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root URL of the contacts service.
    pub base_url: String,
    /// Sizing of the write phase.
    pub write: PhaseConfig,
    /// Sizing of the read phase.
    pub read: PhaseConfig,
    /// How read jobs are assigned to query shapes.
    pub read_mix: ReadMix,
    /// Base seed of all worker random sources. Random if not set.
    pub seed: Option<u64>,
    /// Timeout of every single request.
    pub request_timeout: Duration,
    /// How long idle connections are kept in the pool.
    pub idle_timeout: Duration,
    /// Display the phase progress bars are drawn on, or `None` to draw nothing.
    ///
    /// Logging goes through the same display so log lines do not tear the bars.
    pub progress: Option<MultiProgress>,
    /// Number of tokio worker threads.
    pub worker_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            write: PhaseConfig::default(),
            read: PhaseConfig::default(),
            read_mix: ReadMix::default(),
            seed: None,
            request_timeout: DEFAULT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            progress: None,
            worker_threads: default_worker_threads(),
        }
    }
}

impl Config {
    /// Checks that the configuration describes a runnable benchmark.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            bail!("base url `{}` must start with http:// or https://", self.base_url);
        }
        if self.write.workers == 0 || self.read.workers == 0 {
            bail!("worker counts must be at least 1");
        }
        if self.request_timeout.is_zero() {
            bail!("request timeout must be greater than zero");
        }
        Ok(())
    }

    /// Size of the idle connection pool, enough for every worker of both phases.
    pub fn pool_size(&self) -> usize {
        self.write.workers.saturating_add(self.read.workers)
    }
}

/// Reads the worker thread count from `CPU_CORES`, falling back to the available parallelism.
fn default_worker_threads() -> usize {
    env::var(CPU_CORES_ENV)
        .ok()
        .and_then(|value| value.parse::<NonZeroUsize>().ok())
        .or_else(|| available_parallelism().ok())
        .map_or(1, NonZeroUsize::get)
}
