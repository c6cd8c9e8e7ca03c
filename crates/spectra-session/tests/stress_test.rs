//! Concurrency stress tests
//!
//! The dedup race is the pipeline's hardest guarantee: N concurrent
//! submissions of one payload must produce exactly one registered trace,
//! with every other submission settling as a duplicate of it.

use std::sync::Arc;

use spectra_ingest::{IngestJob, JobStatus};
use spectra_ledger::MemorySink;
use spectra_session::{Session, SessionConfig};
use spectra_test_utils::{absorption_spectrum, encode_columns, ColumnTextDecoder};

fn make_session() -> Arc<Session> {
    Arc::new(Session::new(
        SessionConfig::default(),
        Arc::new(ColumnTextDecoder),
        Arc::new(MemorySink::new()),
    ))
}

fn payload(seed: usize) -> Vec<u8> {
    #[allow(clippy::cast_precision_loss)]
    let offset = seed as f64 * 100.0;
    let (w, f) = absorption_spectrum(
        500,
        400.0 + offset,
        500.0 + offset,
        &[(450.0 + offset, 2.0, 0.5)],
    );
    encode_columns(&w, &f, &[("wavelength_unit", "nm")])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_submissions_register_once() {
    let session = make_session();
    const SUBMISSIONS: usize = 16;

    let mut tasks = Vec::new();
    for _ in 0..SUBMISSIONS {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            let handle = session.pipeline().submit(IngestJob::upload(payload(0))).await;
            session.pipeline().wait(&handle).await.unwrap()
        }));
    }

    let mut done = Vec::new();
    let mut duplicates = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            JobStatus::Done { trace_id } => done.push(trace_id),
            JobStatus::Duplicate { trace_id } => duplicates.push(trace_id),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    assert_eq!(done.len(), 1);
    assert_eq!(duplicates.len(), SUBMISSIONS - 1);
    assert!(duplicates.iter().all(|id| *id == done[0]));
    assert_eq!(session.registry().len(), 1);
    assert_eq!(session.ledger().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_concurrent_load_registers_each_payload_once() {
    let session = make_session();
    const DISTINCT: usize = 4;
    const PER_PAYLOAD: usize = 8;

    let mut tasks = Vec::new();
    for seed in 0..DISTINCT {
        for _ in 0..PER_PAYLOAD {
            let session = Arc::clone(&session);
            tasks.push(tokio::spawn(async move {
                let handle = session
                    .pipeline()
                    .submit(IngestJob::upload(payload(seed)))
                    .await;
                session.pipeline().wait(&handle).await.unwrap()
            }));
        }
    }

    let mut done = 0;
    let mut duplicate = 0;
    for task in tasks {
        match task.await.unwrap() {
            JobStatus::Done { .. } => done += 1,
            JobStatus::Duplicate { .. } => duplicate += 1,
            other => panic!("unexpected status: {other:?}"),
        }
    }

    assert_eq!(done, DISTINCT);
    assert_eq!(duplicate, DISTINCT * (PER_PAYLOAD - 1));
    assert_eq!(session.registry().len(), DISTINCT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_during_ingest_stay_consistent() {
    let session = make_session();

    // Ingest a base trace, then hammer reads while more arrive.
    let base = session.pipeline().submit(IngestJob::upload(payload(0))).await;
    let base_id = session
        .pipeline()
        .wait(&base)
        .await
        .unwrap()
        .trace_id()
        .unwrap();

    let mut tasks = Vec::new();
    for seed in 1..4 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            let handle = session
                .pipeline()
                .submit(IngestJob::upload(payload(seed)))
                .await;
            session.pipeline().wait(&handle).await.unwrap();
        }));
    }
    for _ in 0..8 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                // Snapshot reads: either absent or fully formed.
                if let Some(trace) = session.registry().get(base_id) {
                    assert_eq!(trace.wavelength.len(), trace.flux.len());
                }
                let tier = session.registry().downsampled(base_id, 512).unwrap();
                assert_eq!(tier.wavelength.len(), tier.flux.len());
                tokio::task::yield_now().await;
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(session.registry().len(), 4);
}
