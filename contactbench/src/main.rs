//! Benchmark binary driving a two-phase load test against a contacts service.
//!
//! The write phase creates `--post-count` contacts with `--post-workers` concurrent workers. The
//! read phase then issues `--get-count` lookups of those contacts with `--get-workers` workers.
//! If no contact could be created, the read phase is skipped and the process exits with a
//! non-zero status.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use indicatif::MultiProgress;
use yansi::Paint;

use contactbench::config::{Config, DEFAULT_BASE_URL, PhaseConfig};
use contactbench::http::HttpRemote;
use contactbench::observability;
use contactbench::report::print_report;
use contactbench::workload::ReadMix;

/// Load generator for contacts services
#[derive(Debug, FromArgs)]
struct Args {
    /// base URL of the contact service
    #[argh(option, default = "DEFAULT_BASE_URL.to_owned()")]
    base_url: String,

    /// total number of POST requests
    #[argh(option, default = "1_000_000")]
    post_count: u64,

    /// total number of GET requests
    #[argh(option, default = "1_000_000")]
    get_count: u64,

    /// number of concurrent POST workers
    #[argh(option, default = "100")]
    post_workers: usize,

    /// number of concurrent GET workers
    #[argh(option, default = "100")]
    get_workers: usize,

    /// how GET requests pick their query: `random` or `index`
    #[argh(option, default = "ReadMix::Random")]
    read_mix: ReadMix,

    /// base seed for reproducible workloads
    #[argh(option)]
    seed: Option<u64>,

    /// per-request timeout in seconds
    #[argh(option, default = "30")]
    timeout: u64,

    /// do not draw progress bars
    #[argh(switch)]
    no_progress: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            base_url: self.base_url,
            write: PhaseConfig {
                count: self.post_count,
                workers: self.post_workers,
            },
            read: PhaseConfig {
                count: self.get_count,
                workers: self.get_workers,
            },
            read_mix: self.read_mix,
            seed: self.seed,
            request_timeout: Duration::from_secs(self.timeout),
            progress: (!self.no_progress).then(MultiProgress::new),
            ..Config::default()
        }
    }
}

fn main() -> Result<ExitCode> {
    let args: Args = argh::from_env();
    let config = args.into_config();
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("bench-rt")
        .enable_all()
        .worker_threads(config.worker_threads)
        .build()
        .context("failed to build runtime")?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(config.progress.as_ref());
    tracing::debug!(?config);

    println!("{}", "Benchmark started with config:".bold());
    println!("  base url: {}", config.base_url.blue());
    println!(
        "  POST: {} ({} workers)",
        config.write.count.bold(),
        config.write.workers
    );
    println!(
        "  GET: {} ({} workers, {} mix)",
        config.read.count.bold(),
        config.read.workers,
        config.read_mix
    );
    println!("  CPU: {}", config.worker_threads);

    let remote = HttpRemote::builder(config.base_url.as_str())
        .pool_size(config.pool_size())
        .timeout(config.request_timeout)
        .idle_timeout(config.idle_timeout)
        .build()
        .context("failed to create HTTP client")?;

    let report = runtime.block_on(contactbench::run(remote, &config))?;
    print_report(&report);

    if report.is_degraded() {
        eprintln!("No contacts created, skipped GET requests");
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
