use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::Arc;

use contactbench::bench::{ReadPhase, WritePhase};
use contactbench::config::{Config, PhaseConfig};
use contactbench::error::FailureKind;
use contactbench::http::{Contact, HttpRemote};
use contactbench::pool::{PhaseOptions, run_phase};
use contactbench::store::ResultStore;
use contactbench::workload::{QueryGenerator, ReadMix, SeedSequence};
use contactbench_test::server::{Behavior, TestServer};

fn config(base_url: String, writes: (u64, usize), reads: (u64, usize)) -> Config {
    Config {
        base_url,
        write: PhaseConfig {
            count: writes.0,
            workers: writes.1,
        },
        read: PhaseConfig {
            count: reads.0,
            workers: reads.1,
        },
        read_mix: ReadMix::Index,
        seed: Some(7),
        progress: None,
        ..Default::default()
    }
}

fn remote(config: &Config) -> HttpRemote {
    HttpRemote::builder(&config.base_url)
        .pool_size(config.pool_size())
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn small_run_writes_then_reads() {
    contactbench_test::tracing::init();
    let server = TestServer::new().await;
    let config = config(server.url("/"), (10, 2), (10, 2));

    let report = contactbench::run(remote(&config), &config).await.unwrap();

    assert!(!report.is_degraded());
    assert_eq!(report.stored, 10);
    assert_eq!(server.stored(), 10);

    let write = report.write.report().unwrap();
    assert_eq!(write.attempted, 10);
    assert_eq!(write.succeeded, 10);

    let read = report.read.report().unwrap();
    assert_eq!(read.attempted, 10);
    assert_eq!(read.succeeded, 10);
    assert!(read.bytes_received > 0);

    let stats = server.stats();
    assert_eq!(stats.creates, 10);
    assert_eq!(stats.queries(), 10);
    assert_eq!(stats.phone_queries, 3);
    // six lookups of known contacts plus one random external id
    assert_eq!(stats.external_id_queries, 7);
    assert_eq!(stats.unfiltered_queries, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stored_contacts_match_successes_for_any_worker_count() {
    contactbench_test::tracing::init();

    for workers in [1, 8, 50] {
        let server = TestServer::with_behavior(Behavior::FailEvery(4)).await;
        let config = config(server.url("/"), (200, workers), (0, 1));

        let report = contactbench::run(remote(&config), &config).await.unwrap();

        let write = report.write.report().unwrap();
        assert_eq!(write.attempted, 200);
        assert_eq!(write.succeeded, 150);
        assert_eq!(write.failures_of(FailureKind::Status), 50);
        assert_eq!(report.stored, 150);
        assert_eq!(server.stats().created, 150);

        let read = report.read.report().unwrap();
        assert_eq!(read.attempted, 0);
        assert_eq!(server.stats().queries(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_writes_skip_the_read_phase() {
    contactbench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::RejectAll).await;
    let config = config(server.url("/"), (25, 5), (100, 5));

    let report = contactbench::run(remote(&config), &config).await.unwrap();

    assert!(report.is_degraded());
    assert!(report.read.is_skipped());
    assert_eq!(report.read.requests_per_second(), 0.0);
    assert_eq!(report.stored, 0);

    let write = report.write.report().unwrap();
    assert_eq!(write.attempted, 25);
    assert_eq!(write.failures_of(FailureKind::Status), 25);

    let stats = server.stats();
    assert_eq!(stats.creates, 25);
    assert_eq!(stats.queries(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_queries_are_counted_as_failures() {
    contactbench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::RejectQueries).await;
    let config = config(server.url("/"), (10, 2), (20, 4));

    let report = contactbench::run(remote(&config), &config).await.unwrap();

    assert!(!report.is_degraded());
    assert_eq!(report.stored, 10);

    let read = report.read.report().unwrap();
    assert_eq!(read.attempted, 20);
    assert_eq!(read.succeeded, 0);
    assert_eq!(read.failed(), 20);
    assert_eq!(read.failures_of(FailureKind::Status), 20);

    let stats = server.stats();
    assert_eq!(stats.creates, 10);
    assert_eq!(stats.queries(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_responses_are_not_stored() {
    contactbench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::MalformedBody).await;
    let config = config(server.url("/"), (12, 3), (10, 2));

    let report = contactbench::run(remote(&config), &config).await.unwrap();

    let write = report.write.report().unwrap();
    assert_eq!(write.attempted, 12);
    assert_eq!(write.failures_of(FailureKind::Decode), 12);
    assert_eq!(write.failures_of(FailureKind::Transport), 0);
    assert_eq!(report.stored, 0);
    assert!(report.read.is_skipped());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_service_counts_transport_failures() {
    contactbench_test::tracing::init();

    // Grab a free port and release it again, so nothing is listening there.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = config(format!("http://127.0.0.1:{port}"), (8, 2), (8, 2));

    let report = contactbench::run(remote(&config), &config).await.unwrap();

    let write = report.write.report().unwrap();
    assert_eq!(write.attempted, 8);
    assert_eq!(write.failures_of(FailureKind::Transport), 8);
    assert!(report.read.is_skipped());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_service_fails_every_read() {
    contactbench_test::tracing::init();

    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let remote = HttpRemote::builder(format!("http://127.0.0.1:{port}"))
        .build()
        .unwrap();

    let store = ResultStore::new();
    store.push(Contact {
        id: "1".to_owned(),
        external_id: 42,
        phone_number: "+79990000042".to_owned(),
        date_created: None,
        date_updated: None,
    });
    let queries = QueryGenerator::new(ReadMix::Random, 20).unwrap();
    let phase = ReadPhase::new(Arc::new(remote), store.freeze(), queries).unwrap();

    let options = PhaseOptions::new(20, 4, SeedSequence::new(5));
    let report = run_phase(Arc::new(phase), options).await.unwrap();

    assert_eq!(report.attempted, 20);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failures_of(FailureKind::Transport), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_write_phases_do_not_share_results() {
    contactbench_test::tracing::init();
    let server = TestServer::new().await;
    let remote = Arc::new(
        HttpRemote::builder(server.url("/"))
            .pool_size(8)
            .build()
            .unwrap(),
    );

    let mut batches = Vec::new();
    for seed in [1, 2] {
        let store = Arc::new(ResultStore::new());
        let phase = WritePhase::new(Arc::clone(&remote), Arc::clone(&store));
        let options = PhaseOptions::new(40, 4, SeedSequence::new(seed));

        let report = run_phase(Arc::new(phase), options).await.unwrap();
        assert_eq!(report.succeeded, 40);

        let contacts = ResultStore::try_freeze(store).unwrap();
        assert_eq!(contacts.len(), 40);
        let ids: HashSet<_> = contacts.iter().map(|c| c.id.clone()).collect();
        batches.push(ids);
    }

    assert_eq!(batches[0].len(), 40);
    assert_eq!(batches[1].len(), 40);
    assert!(batches[0].is_disjoint(&batches[1]));
    assert_eq!(server.stored(), 80);
}
