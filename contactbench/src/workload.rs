//! Generation of write payloads and read queries for the benchmark phases.
//!
//! Every worker owns its own [`SmallRng`], derived from a [`SeedSequence`]. Generation therefore
//! never contends on shared state, and a fixed base seed makes the generated workload
//! reproducible.

use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;

use crate::http::NewContact;
use crate::store::Snapshot;

/// Exclusive upper bound of generated external ids.
pub const MAX_EXTERNAL_ID: u64 = 1_000_000;
/// Prefix of every generated phone number.
pub const PHONE_PREFIX: &str = "+7999";
/// Exclusive upper bound of the phone number suffix, which is rendered with 7 digits.
pub const PHONE_SUFFIX_RANGE: u32 = 10_000_000;
/// Exclusive upper bound of external ids queried without an existence guarantee.
pub const RANDOM_EXTERNAL_ID_RANGE: u64 = 100_001;

/// Relative weights of phone, known external id and random external id queries.
const QUERY_WEIGHTS: [u32; 3] = [3, 6, 1];

/// The two phases of a benchmark run.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PhaseKind {
    /// Bulk creation of contacts.
    Write,
    /// Mixed lookups of previously created contacts.
    Read,
}

impl PhaseKind {
    /// Lowercase name of the phase.
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Write => "write",
            PhaseKind::Read => "read",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives independent per-worker random sources from a single base seed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SeedSequence(u64);

impl SeedSequence {
    /// Creates a sequence from an explicit base seed.
    pub fn new(base: u64) -> Self {
        Self(base)
    }

    /// Creates a sequence from a random base seed.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Returns the base seed, which can be passed back in to reproduce a run.
    pub fn base(&self) -> u64 {
        self.0
    }

    /// Returns the sequence used by workers of the given phase.
    ///
    /// Write and read workers with the same index do not share a seed.
    pub fn for_phase(&self, phase: PhaseKind) -> Self {
        let salt = match phase {
            PhaseKind::Write => 0x9e37_79b9_7f4a_7c15,
            PhaseKind::Read => 0xc2b2_ae3d_27d4_eb4f,
        };
        Self(self.0 ^ salt)
    }

    /// Creates the random source of the worker with the given index.
    pub fn worker_rng(&self, worker: usize) -> SmallRng {
        SmallRng::seed_from_u64(self.0.wrapping_add(worker as u64))
    }
}

/// Generates the payload of a single create request.
pub fn new_contact(rng: &mut impl Rng) -> NewContact {
    let external_id = rng.random_range(0..MAX_EXTERNAL_ID);
    let suffix = rng.random_range(0..PHONE_SUFFIX_RANGE);

    NewContact {
        external_id,
        phone_number: format!("{PHONE_PREFIX}{suffix:07}"),
    }
}

/// The shape of a read request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum QueryKind {
    /// Lookup by the phone number of an existing contact.
    PhoneNumber,
    /// Lookup by the external id of an existing contact.
    ExternalId,
    /// Lookup by an external id that may not exist.
    RandomExternalId,
}

impl QueryKind {
    const ALL: [QueryKind; 3] = [
        QueryKind::PhoneNumber,
        QueryKind::ExternalId,
        QueryKind::RandomExternalId,
    ];
}

/// A single read request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Query {
    /// `?phone_number=…` of an existing contact.
    PhoneNumber(String),
    /// `?external_id=…` of an existing contact.
    ExternalId(u64),
    /// `?external_id=…` drawn uniformly from `[0, RANDOM_EXTERNAL_ID_RANGE)`.
    RandomExternalId(u64),
}

impl Query {
    /// Returns the shape of this query.
    pub fn kind(&self) -> QueryKind {
        match self {
            Query::PhoneNumber(_) => QueryKind::PhoneNumber,
            Query::ExternalId(_) => QueryKind::ExternalId,
            Query::RandomExternalId(_) => QueryKind::RandomExternalId,
        }
    }

    /// Returns the query string parameter filtering the contacts.
    pub fn filter(&self) -> (&'static str, String) {
        match self {
            Query::PhoneNumber(phone) => ("phone_number", phone.clone()),
            Query::ExternalId(id) | Query::RandomExternalId(id) => ("external_id", id.to_string()),
        }
    }
}

/// How read jobs are assigned to query shapes.
///
/// Both variants yield 30% phone, 60% known external id and 10% random external id queries, but
/// they cluster differently over time: `Index` issues all phone queries first, then all known
/// external ids, then the random tail, while `Random` interleaves them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReadMix {
    /// An independent weighted draw per job.
    #[default]
    Random,
    /// Contiguous buckets of the job index: `[0, 0.3N)`, `[0.3N, 0.9N)`, `[0.9N, N)`.
    Index,
}

/// Generates the queries of one read phase.
#[derive(Clone, Debug)]
pub struct QueryGenerator {
    mix: ReadMix,
    total: u64,
    weights: WeightedIndex<u32>,
}

impl QueryGenerator {
    /// Creates a generator for a read phase of `total` jobs.
    pub fn new(mix: ReadMix, total: u64) -> anyhow::Result<Self> {
        let weights = WeightedIndex::new(QUERY_WEIGHTS).context("invalid query weights")?;
        Ok(Self {
            mix,
            total,
            weights,
        })
    }

    /// Selects the query shape of job `index`.
    pub fn kind_for(&self, index: u64, rng: &mut impl Rng) -> QueryKind {
        match self.mix {
            ReadMix::Random => QueryKind::ALL[self.weights.sample(rng)],
            ReadMix::Index => {
                let phone_end = self.total * 3 / 10;
                let external_end = self.total * 9 / 10;
                if index < phone_end {
                    QueryKind::PhoneNumber
                } else if index < external_end {
                    QueryKind::ExternalId
                } else {
                    QueryKind::RandomExternalId
                }
            }
        }
    }

    /// Generates the query of job `index`.
    ///
    /// Returns `None` if `contacts` is empty, since there is nothing to look up.
    pub fn query_for(&self, index: u64, rng: &mut impl Rng, contacts: &Snapshot) -> Option<Query> {
        if contacts.is_empty() {
            return None;
        }

        let query = match self.kind_for(index, rng) {
            QueryKind::PhoneNumber => {
                let contact = contacts.choose(rng)?;
                Query::PhoneNumber(contact.phone_number.clone())
            }
            QueryKind::ExternalId => {
                let contact = contacts.choose(rng)?;
                Query::ExternalId(contact.external_id)
            }
            QueryKind::RandomExternalId => {
                Query::RandomExternalId(rng.random_range(0..RANDOM_EXTERNAL_ID_RANGE))
            }
        };

        Some(query)
    }
}

impl FromStr for ReadMix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(ReadMix::Random),
            "index" => Ok(ReadMix::Index),
            other => Err(format!(
                "unknown read mix `{other}`, expected `random` or `index`"
            )),
        }
    }
}

impl fmt::Display for ReadMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadMix::Random => f.write_str("random"),
            ReadMix::Index => f.write_str("index"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::http::Contact;
    use crate::store::ResultStore;

    fn snapshot(count: u64) -> Snapshot {
        let store = ResultStore::new();
        for i in 0..count {
            store.push(Contact {
                id: i.to_string(),
                external_id: 500_000 + i,
                phone_number: format!("{PHONE_PREFIX}{i:07}"),
                date_created: None,
                date_updated: None,
            });
        }
        store.freeze()
    }

    #[test]
    fn new_contacts_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let contact = new_contact(&mut rng);
            assert!(contact.external_id < MAX_EXTERNAL_ID);

            let suffix = contact.phone_number.strip_prefix(PHONE_PREFIX).unwrap();
            assert_eq!(suffix.len(), 7);
            assert!(suffix.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn seeds_are_reproducible_and_decorrelated() {
        let seeds = SeedSequence::new(42);
        let write = seeds.for_phase(PhaseKind::Write);
        let read = seeds.for_phase(PhaseKind::Read);
        assert_ne!(write, read);

        let a = new_contact(&mut write.worker_rng(0));
        let b = new_contact(&mut write.worker_rng(0));
        assert_eq!(a, b);

        let first: Vec<_> = (0..16).map(|_| new_contact(&mut write.worker_rng(0))).collect();
        let mut rng = write.worker_rng(1);
        let second: Vec<_> = (0..16).map(|_| new_contact(&mut rng)).collect();
        assert_ne!(first, second);
    }

    #[test]
    fn index_mix_splits_small_runs_exactly() {
        let contacts = snapshot(10);
        let mut rng = SmallRng::seed_from_u64(1);

        let queries = QueryGenerator::new(ReadMix::Index, 10).unwrap();

        let kinds: Vec<_> = (0..10)
            .map(|i| queries.query_for(i, &mut rng, &contacts).unwrap().kind())
            .collect();

        assert_eq!(kinds[..3], [QueryKind::PhoneNumber; 3]);
        assert_eq!(kinds[3..9], [QueryKind::ExternalId; 6]);
        assert_eq!(kinds[9..], [QueryKind::RandomExternalId]);
    }

    #[test]
    fn random_mix_converges_to_weights() {
        const TOTAL: u64 = 100_000;
        let contacts = snapshot(100);
        let mut rng = SmallRng::seed_from_u64(1234);

        let queries = QueryGenerator::new(ReadMix::Random, TOTAL).unwrap();

        let mut counts = HashMap::new();
        for i in 0..TOTAL {
            let query = queries.query_for(i, &mut rng, &contacts).unwrap();
            *counts.entry(query.kind()).or_insert(0u64) += 1;
        }

        let share = |kind| counts[&kind] as f64 / TOTAL as f64;
        assert!((share(QueryKind::PhoneNumber) - 0.3).abs() < 0.01);
        assert!((share(QueryKind::ExternalId) - 0.6).abs() < 0.01);
        assert!((share(QueryKind::RandomExternalId) - 0.1).abs() < 0.01);
    }

    #[test]
    fn queries_reference_existing_contacts() {
        let contacts = snapshot(5);
        let mut rng = SmallRng::seed_from_u64(99);
        let queries = QueryGenerator::new(ReadMix::Random, 1_000).unwrap();

        for i in 0..1_000 {
            match queries.query_for(i, &mut rng, &contacts).unwrap() {
                Query::PhoneNumber(phone) => {
                    assert!(contacts.iter().any(|c| c.phone_number == phone))
                }
                Query::ExternalId(id) => assert!(contacts.iter().any(|c| c.external_id == id)),
                Query::RandomExternalId(id) => assert!(id < RANDOM_EXTERNAL_ID_RANGE),
            }
        }
    }

    #[test]
    fn empty_snapshot_yields_no_query() {
        let contacts = snapshot(0);
        let mut rng = SmallRng::seed_from_u64(0);
        let queries = QueryGenerator::new(ReadMix::Index, 10).unwrap();
        assert_eq!(queries.query_for(0, &mut rng, &contacts), None);
    }

    #[test]
    fn read_mix_parses() {
        assert_eq!("index".parse::<ReadMix>(), Ok(ReadMix::Index));
        assert_eq!("random".parse::<ReadMix>(), Ok(ReadMix::Random));
        assert!("zipf".parse::<ReadMix>().is_err());
    }
}
