//! End-to-end session tests
//!
//! Drive the full pipeline through a session: ingest, dedup across
//! scopes, pending-parameter continuations, differential promotion,
//! cache invalidation, reset, and manifest export.

use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

use spectra_analysis::{AnalysisError, DiffOp, Metric, Normalization};
use spectra_ingest::{FetchFailureKind, FetchOutcome, Fetcher, IngestJob, JobStatus};
use spectra_ledger::{MemorySink, Sink};
use spectra_model::{FluxUnit, TraceKind};
use spectra_session::{Session, SessionConfig};
use spectra_test_utils::{absorption_spectrum, encode_columns, ColumnTextDecoder, DirSink, ScriptedFetcher};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn make_session(sink: Arc<dyn Sink>) -> Session {
    init_tracing();
    Session::new(SessionConfig::default(), Arc::new(ColumnTextDecoder), sink)
}

fn spectrum_payload(label: &str) -> Vec<u8> {
    let (w, f) = absorption_spectrum(200, 500.0, 520.0, &[(510.0, 0.5, 0.6)]);
    encode_columns(&w, &f, &[("wavelength_unit", "nm"), ("label", label)])
}

#[tokio::test]
async fn ingest_to_manifest_round_trip() {
    let session = make_session(Arc::new(MemorySink::new()));

    let handle = session
        .pipeline()
        .submit(IngestJob::upload(spectrum_payload("HD 189733")))
        .await;
    let status = session.pipeline().wait(&handle).await.unwrap();
    let trace_id = status.trace_id().expect("ingest succeeds");

    let trace = session.registry().get(trace_id).unwrap();
    assert_eq!(trace.label, "HD 189733");
    assert_eq!(trace.kind, TraceKind::Uploaded);
    let stage_names: Vec<_> = trace
        .provenance
        .stages()
        .iter()
        .map(|s| s.stage_name.as_str())
        .collect();
    assert_eq!(stage_names, ["decode", "normalize"]);

    let manifest = session.manifest();
    assert_eq!(manifest.entries.len(), 1);
    assert_eq!(manifest.entries[0].label, "HD 189733");
    assert_eq!(manifest.entries[0].point_count, 200);
}

#[tokio::test]
async fn manifest_export_writes_through_the_sink() {
    let sink = Arc::new(DirSink::new());
    let session = make_session(Arc::clone(&sink) as Arc<dyn Sink>);

    let handle = session
        .pipeline()
        .submit(IngestJob::upload(spectrum_payload("export me")))
        .await;
    session.pipeline().wait(&handle).await.unwrap();

    let exported = session.export_manifest().await.unwrap();
    let stored = sink
        .get(session.scope(), "manifest")
        .await
        .unwrap()
        .expect("manifest persisted");
    let decoded: spectra_session::Manifest = serde_json::from_slice(&stored).unwrap();
    assert_eq!(decoded, exported);
}

#[tokio::test]
async fn duplicate_in_scope_but_independent_across_sessions() {
    // Two sessions share one sink; scoping keeps their ledgers apart.
    let sink = Arc::new(MemorySink::new());
    let session_a = make_session(Arc::clone(&sink) as Arc<dyn Sink>);
    let session_b = make_session(Arc::clone(&sink) as Arc<dyn Sink>);

    let first = session_a
        .pipeline()
        .submit(IngestJob::upload(spectrum_payload("shared")))
        .await;
    let original = session_a
        .pipeline()
        .wait(&first)
        .await
        .unwrap()
        .trace_id()
        .unwrap();

    // Same payload again in the same scope: duplicate.
    let second = session_a
        .pipeline()
        .submit(IngestJob::upload(spectrum_payload("shared")))
        .await;
    match session_a.pipeline().wait(&second).await.unwrap() {
        JobStatus::Duplicate { trace_id } => assert_eq!(trace_id, original),
        other => panic!("expected Duplicate, got {other:?}"),
    }
    assert_eq!(session_a.registry().len(), 1);

    // Same payload in a different session: independent registration.
    let foreign = session_b
        .pipeline()
        .submit(IngestJob::upload(spectrum_payload("shared")))
        .await;
    let status = session_b.pipeline().wait(&foreign).await.unwrap();
    assert!(matches!(status, JobStatus::Done { .. }));
    assert_eq!(session_b.registry().len(), 1);
}

#[tokio::test]
async fn pending_parameter_continuation_records_parameters() {
    let session = make_session(Arc::new(MemorySink::new()));
    let (w, f) = absorption_spectrum(64, 1500.0, 1520.0, &[(1510.0, 0.4, 0.3)]);
    let payload = encode_columns(
        &w,
        &f,
        &[("wavelength_unit", "nm"), ("flux_unit", "absorption-pending")],
    );

    let handle = session.pipeline().submit(IngestJob::upload(payload)).await;
    let status = session.pipeline().wait(&handle).await.unwrap();
    let JobStatus::PendingParameter { missing } = status else {
        panic!("expected PendingParameter, got {status:?}");
    };
    assert_eq!(missing, ["path_length_cm", "mole_fraction"]);
    assert!(session.registry().is_empty());

    let mut params = BTreeMap::new();
    params.insert("path_length_cm".to_string(), "5".to_string());
    params.insert("mole_fraction".to_string(), "0.2".to_string());
    let resumed = session.pipeline().resume(handle.job_id, params).await.unwrap();

    let trace_id = session
        .pipeline()
        .wait(&resumed)
        .await
        .unwrap()
        .trace_id()
        .expect("resumed job registers");
    let trace = session.registry().get(trace_id).unwrap();
    assert_eq!(trace.flux_unit, FluxUnit::AbsorptionCoefficient);

    let normalize_stage = trace
        .provenance
        .stages()
        .iter()
        .find(|s| s.stage_name == "normalize")
        .unwrap();
    assert_eq!(normalize_stage.parameters.get("path_length_cm").unwrap(), "5");
    assert_eq!(normalize_stage.parameters.get("mole_fraction").unwrap(), "0.2");
}

#[tokio::test]
async fn differential_ratio_promotes_into_the_manifest() {
    let session = make_session(Arc::new(MemorySink::new()));

    let (w, fa) = absorption_spectrum(100, 500.0, 510.0, &[]);
    // A saturated line drives the denominator to (almost) zero.
    let (_, fb) = absorption_spectrum(100, 500.0, 510.0, &[(505.0, 0.5, 1.0)]);
    let a_payload = encode_columns(&w, &fa, &[("label", "continuum")]);
    let b_payload = encode_columns(&w, &fb, &[("label", "absorbed")]);

    let a_handle = session.pipeline().submit(IngestJob::upload(a_payload)).await;
    let b_handle = session.pipeline().submit(IngestJob::upload(b_payload)).await;
    let a = session.pipeline().wait(&a_handle).await.unwrap().trace_id().unwrap();
    let b = session.pipeline().wait(&b_handle).await.unwrap().trace_id().unwrap();

    let derived = session.differential().compute(a, b, DiffOp::Ratio, 100).unwrap();
    assert!(derived.flux.iter().all(|v| v.is_finite()));
    assert_eq!(derived.kind, TraceKind::DerivedDifferential);

    // Side-effect-free until promoted.
    assert_eq!(session.registry().len(), 2);
    let promoted = session.differential().promote(&derived);
    assert_eq!(session.registry().len(), 3);

    let manifest = session.manifest();
    let entry = manifest
        .entries
        .iter()
        .find(|e| e.trace_id == promoted)
        .expect("derived trace exported");
    let stage = &entry.provenance.stages()[0];
    assert_eq!(stage.parameters.get("operation").unwrap(), "ratio");
    assert_eq!(stage.parameters.get("source_a").unwrap(), &a.to_string());
}

#[tokio::test]
async fn removal_cascades_into_analysis_caches() {
    let session = make_session(Arc::new(MemorySink::new()));

    let a_handle = session
        .pipeline()
        .submit(IngestJob::upload(spectrum_payload("left")))
        .await;
    let (w, f) = absorption_spectrum(200, 505.0, 525.0, &[(515.0, 1.0, 0.4)]);
    let b_handle = session
        .pipeline()
        .submit(IngestJob::upload(encode_columns(&w, &f, &[("label", "right")])))
        .await;
    let a = session.pipeline().wait(&a_handle).await.unwrap().trace_id().unwrap();
    let b = session.pipeline().wait(&b_handle).await.unwrap().trace_id().unwrap();

    let score = session
        .similarity()
        .score(a, b, Metric::Cosine, Normalization::UnitVector)
        .unwrap();
    assert!(score.is_finite());

    // Removal through the registry fires the wired hooks.
    session.registry().remove(a).unwrap();
    let result = session.similarity().score(a, b, Metric::Cosine, Normalization::UnitVector);
    assert!(matches!(result, Err(AnalysisError::UnknownTrace(_))));

    // Re-ingesting the same payload registers a fresh trace that scores.
    let again = session
        .pipeline()
        .submit(IngestJob::upload(spectrum_payload("left")))
        .await;
    let a2 = session.pipeline().wait(&again).await.unwrap().trace_id().unwrap();
    assert_ne!(a2, a);
    let rescored = session
        .similarity()
        .score(a2, b, Metric::Cosine, Normalization::UnitVector)
        .unwrap();
    assert!((rescored - score).abs() < 1e-9);
}

#[tokio::test]
async fn reset_purges_scope_state() {
    let session = make_session(Arc::new(MemorySink::new()));

    let handle = session
        .pipeline()
        .submit(IngestJob::upload(spectrum_payload("ephemeral")))
        .await;
    session.pipeline().wait(&handle).await.unwrap();
    assert_eq!(session.registry().len(), 1);

    session.reset().await.unwrap();
    assert!(session.registry().is_empty());

    // The ledger forgot the fingerprint: the payload registers anew.
    let again = session
        .pipeline()
        .submit(IngestJob::upload(spectrum_payload("ephemeral")))
        .await;
    let status = session.pipeline().wait(&again).await.unwrap();
    assert!(matches!(status, JobStatus::Done { .. }));
}

#[tokio::test]
async fn fetch_failures_pass_provenance_through() {
    let session = make_session(Arc::new(MemorySink::new()));
    let fetcher = ScriptedFetcher::new();
    fetcher.script(
        "archive://m31",
        FetchOutcome::failure(FetchFailureKind::Http5xx, "internal server error"),
    );
    let (w, f) = absorption_spectrum(64, 600.0, 610.0, &[]);
    let mut provenance = BTreeMap::new();
    provenance.insert("archive".to_string(), "sdss".to_string());
    fetcher.script(
        "archive://vega",
        FetchOutcome::success(encode_columns(&w, &f, &[("label", "Vega")]), provenance),
    );

    let failed = fetcher.fetch("archive://m31", &BTreeMap::new()).await;
    let failed_handle = session.pipeline().submit_fetched("archive://m31", failed, None).await;
    match session.pipeline().poll(&failed_handle).unwrap() {
        JobStatus::Failed { message, locator, .. } => {
            assert_eq!(message, "internal server error");
            assert_eq!(locator.as_deref(), Some("archive://m31"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }

    let fetched = fetcher.fetch("archive://vega", &BTreeMap::new()).await;
    let handle = session.pipeline().submit_fetched("archive://vega", fetched, None).await;
    let trace_id = session
        .pipeline()
        .wait(&handle)
        .await
        .unwrap()
        .trace_id()
        .expect("fetched payload registers");

    let trace = session.registry().get(trace_id).unwrap();
    assert_eq!(trace.kind, TraceKind::ArchiveFetched);
    let fetch_stage = &trace.provenance.stages()[0];
    assert_eq!(fetch_stage.stage_name, "fetch");
    assert_eq!(fetch_stage.parameters.get("archive").unwrap(), "sdss");
}

#[tokio::test]
async fn companion_batch_links_survivors() {
    let session = make_session(Arc::new(MemorySink::new()));

    let science = IngestJob::upload(spectrum_payload("science"));
    let (w, f) = absorption_spectrum(120, 500.0, 520.0, &[]);
    let calibration =
        IngestJob::upload(encode_columns(&w, &f, &[("label", "calibration")]));
    let broken = IngestJob::upload(b"not a spectrum".to_vec());

    let batch = session
        .pipeline()
        .submit_batch(vec![science, calibration, broken])
        .await;
    let statuses = session.pipeline().wait_batch(&batch).await.unwrap();

    let survivors: Vec<_> = statuses.iter().filter_map(JobStatus::trace_id).collect();
    assert_eq!(survivors.len(), 2);
    assert!(matches!(statuses[2], JobStatus::Failed { .. }));

    // Linking runs asynchronously once the batch settles.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let science_trace = session.registry().get(survivors[0]).unwrap();
    assert_eq!(science_trace.companions, vec![survivors[1]]);
    let calibration_trace = session.registry().get(survivors[1]).unwrap();
    assert_eq!(calibration_trace.companions, vec![survivors[0]]);
}
