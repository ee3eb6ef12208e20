//! Runs the write phase and then the read phase against a remote contacts service.

use std::sync::Arc;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rand::rngs::SmallRng;

use crate::config::{Config, PhaseConfig};
use crate::error::RequestError;
use crate::http::HttpRemote;
use crate::pool::{Phase, PhaseOptions, run_phase};
use crate::report::{BenchReport, PhaseOutcome};
use crate::store::{ResultStore, Snapshot};
use crate::workload::{self, PhaseKind, QueryGenerator, SeedSequence};

/// Creates one random contact per job and stores every successfully created contact.
#[derive(Debug)]
pub struct WritePhase {
    remote: Arc<HttpRemote>,
    store: Arc<ResultStore>,
}

impl WritePhase {
    /// Creates the write phase, appending created contacts to `store`.
    pub fn new(remote: Arc<HttpRemote>, store: Arc<ResultStore>) -> Self {
        Self { remote, store }
    }
}

impl Phase for WritePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Write
    }

    async fn execute(&self, _index: u64, rng: &mut SmallRng) -> Result<u64, RequestError> {
        let contact = workload::new_contact(rng);
        let created = self.remote.create_contact(&contact).await?;
        self.store.push(created);
        Ok(0)
    }
}

/// Looks up previously created contacts, or random external ids.
#[derive(Debug)]
pub struct ReadPhase {
    remote: Arc<HttpRemote>,
    contacts: Snapshot,
    queries: QueryGenerator,
}

impl ReadPhase {
    /// Creates the read phase over a frozen set of contacts.
    ///
    /// Returns `None` if `contacts` is empty, since there is nothing to look up.
    pub fn new(
        remote: Arc<HttpRemote>,
        contacts: Snapshot,
        queries: QueryGenerator,
    ) -> Option<Self> {
        if contacts.is_empty() {
            return None;
        }
        Some(Self {
            remote,
            contacts,
            queries,
        })
    }
}

impl Phase for ReadPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Read
    }

    async fn execute(&self, index: u64, rng: &mut SmallRng) -> Result<u64, RequestError> {
        let query = self
            .queries
            .query_for(index, rng, &self.contacts)
            .ok_or(RequestError::NoContacts)?;
        self.remote.query_contacts(&query).await
    }
}

/// Runs a full benchmark: all writes, then all reads.
///
/// The read phase only starts once every write has finished, and only if at least one contact was
/// created. Otherwise it is reported as [`PhaseOutcome::Skipped`].
pub async fn run(remote: HttpRemote, config: &Config) -> Result<BenchReport> {
    let remote = Arc::new(remote);
    let seeds = config
        .seed
        .map(SeedSequence::new)
        .unwrap_or_else(SeedSequence::random);
    tracing::debug!(seed = seeds.base(), "seeded workload");

    let store = Arc::new(ResultStore::new());
    let write_phase = WritePhase::new(Arc::clone(&remote), Arc::clone(&store));
    let write_options = phase_options(
        &config.write,
        seeds,
        PhaseKind::Write,
        config.progress.as_ref(),
    )?;
    let write_report = run_phase(Arc::new(write_phase), write_options).await?;

    let contacts = ResultStore::try_freeze(store)
        .map_err(|_| anyhow::anyhow!("result store is still shared after the write phase"))?;
    let stored = contacts.len();
    tracing::info!(stored, "write phase stored contacts");

    let queries = QueryGenerator::new(config.read_mix, config.read.count)?;
    let read = match ReadPhase::new(remote, contacts, queries) {
        Some(read_phase) => {
            let read_options =
                phase_options(&config.read, seeds, PhaseKind::Read, config.progress.as_ref())?;
            PhaseOutcome::Completed(run_phase(Arc::new(read_phase), read_options).await?)
        }
        None => {
            tracing::error!("no contacts were created, skipping read phase");
            PhaseOutcome::Skipped {
                kind: PhaseKind::Read,
                reason: "no contacts were created",
            }
        }
    };

    Ok(BenchReport {
        write: PhaseOutcome::Completed(write_report),
        stored,
        read,
    })
}

fn phase_options(
    phase: &PhaseConfig,
    seeds: SeedSequence,
    kind: PhaseKind,
    progress: Option<&MultiProgress>,
) -> Result<PhaseOptions> {
    let mut options = PhaseOptions::new(phase.count, phase.workers, seeds);
    if let Some(progress) = progress {
        let bar = ProgressBar::new(phase.count)
            .with_style(ProgressStyle::with_template(
                "{msg} [{wide_bar}] {pos}/{len} ({per_sec}, eta {eta})",
            )?)
            .with_message(format!("{} requests", kind.as_str()));
        options.progress = progress.add(bar);
    }
    Ok(options)
}
