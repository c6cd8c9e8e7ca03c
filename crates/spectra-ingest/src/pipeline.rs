//! The ingestion worker pool
//!
//! Jobs flow through a bounded queue into `min(available_parallelism,
//! worker_cap)` worker tasks. Each job decodes, normalizes,
//! fingerprints, consults the duplicate ledger, and registers. The
//! ledger reservation is the at-most-once gate: a job observing an
//! in-flight reservation for its fingerprint attaches to that job's
//! result instead of registering a second copy.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

use spectra_ledger::{DuplicateLedger, Outcome};
use spectra_model::{Fingerprint, JobId, ProvenanceStage, Provenance, ScopeId, Trace, TraceId};
use spectra_registry::TraceRegistry;

use crate::capability::{DecodedSeries, Decoder, FetchOutcome};
use crate::config::PipelineConfig;
use crate::job::{BatchHandle, FailureKind, IngestJob, JobHandle, JobStatus};
use crate::normalize::{normalize, NormalizeOutcome, NormalizedPayload};
use crate::IngestError;

/// Pool statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    /// Worker tasks serving the queue
    pub workers: usize,
    /// Jobs submitted over the pipeline's lifetime
    pub submitted: usize,
    /// Jobs in a terminal state
    pub settled: usize,
    /// Jobs suspended awaiting parameters
    pub suspended: usize,
}

struct WorkItem {
    job_id: JobId,
    job: IngestJob,
    /// Present on resumed jobs; skips the decode stage
    decoded: Option<DecodedSeries>,
}

struct SuspendedJob {
    job: IngestJob,
    decoded: DecodedSeries,
}

struct PipelineInner {
    scope: ScopeId,
    config: PipelineConfig,
    decoder: Arc<dyn Decoder>,
    registry: Arc<TraceRegistry>,
    ledger: Arc<DuplicateLedger>,
    statuses: DashMap<JobId, watch::Sender<JobStatus>>,
    suspended: DashMap<JobId, SuspendedJob>,
}

/// Bounded ingestion worker pool
pub struct IngestPipeline {
    inner: Arc<PipelineInner>,
    queue: mpsc::Sender<WorkItem>,
    workers: usize,
}

impl IngestPipeline {
    /// Create the pipeline and spawn its workers
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        scope: ScopeId,
        config: PipelineConfig,
        decoder: Arc<dyn Decoder>,
        registry: Arc<TraceRegistry>,
        ledger: Arc<DuplicateLedger>,
    ) -> Self {
        let parallelism = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let workers = parallelism.min(config.worker_cap).max(1);
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));

        let inner = Arc::new(PipelineInner {
            scope,
            config,
            decoder,
            registry,
            ledger,
            statuses: DashMap::new(),
            suspended: DashMap::new(),
        });

        let shared_rx = Arc::new(Mutex::new(rx));
        for worker in 0..workers {
            let inner = Arc::clone(&inner);
            let rx = Arc::clone(&shared_rx);
            tokio::spawn(async move {
                tracing::debug!(worker, "ingest worker started");
                loop {
                    let item = { rx.lock().await.recv().await };
                    let Some(item) = item else { break };
                    inner.process(item).await;
                }
                tracing::debug!(worker, "ingest worker stopped");
            });
        }

        Self { inner, queue: tx, workers }
    }

    /// Session scope jobs are deduplicated within
    #[inline]
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.inner.scope
    }

    /// Submit a job for processing
    pub async fn submit(&self, job: IngestJob) -> JobHandle {
        let job_id = JobId::new();
        let (tx, _) = watch::channel(JobStatus::Queued);
        self.inner.statuses.insert(job_id, tx);
        tracing::debug!(%job_id, "job submitted");

        if self
            .queue
            .send(WorkItem { job_id, job, decoded: None })
            .await
            .is_err()
        {
            self.inner.set_status(
                job_id,
                JobStatus::Failed {
                    kind: FailureKind::Internal,
                    message: "pipeline shut down".to_string(),
                    locator: None,
                },
            );
        }
        JobHandle { job_id }
    }

    /// Submit the outcome of an archive fetch
    ///
    /// A failed fetch yields an immediately settled `Failed` job with the
    /// fetcher's provenance preserved, so the UI can explain the failure.
    pub async fn submit_fetched(
        &self,
        target: &str,
        outcome: FetchOutcome,
        hint: Option<&str>,
    ) -> JobHandle {
        match outcome.payload {
            Some(payload) => {
                let mut job = IngestJob::upload(payload)
                    .with_locator(target)
                    .with_kind(spectra_model::TraceKind::ArchiveFetched);
                job.fetch_provenance = outcome.provenance;
                if let Some(hint) = hint {
                    job = job.with_hint(hint);
                }
                self.submit(job).await
            }
            None => {
                let job_id = JobId::new();
                let message = outcome
                    .provenance
                    .get(FetchOutcome::ERROR_KEY)
                    .cloned()
                    .unwrap_or_else(|| "fetch failed".to_string());
                let (tx, _) = watch::channel(JobStatus::Failed {
                    kind: FailureKind::Fetch,
                    message,
                    locator: Some(target.to_string()),
                });
                self.inner.statuses.insert(job_id, tx);
                tracing::warn!(%job_id, target, "fetch produced no payload");
                JobHandle { job_id }
            }
        }
    }

    /// Submit companion traces as a batch
    ///
    /// Items are processed and settle independently; once all have
    /// settled, every successful trace is linked to the others. A failed
    /// item never rolls back its siblings.
    pub async fn submit_batch(&self, jobs: Vec<IngestJob>) -> BatchHandle {
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            handles.push(self.submit(job).await);
        }

        let inner = Arc::clone(&self.inner);
        let monitored = handles.clone();
        tokio::spawn(async move {
            let mut linked = Vec::new();
            for handle in &monitored {
                if let Ok(status) = inner.wait_for(handle.job_id, JobStatus::is_terminal).await {
                    if let Some(trace_id) = status.trace_id() {
                        if !linked.contains(&trace_id) {
                            linked.push(trace_id);
                        }
                    }
                }
            }
            if linked.len() > 1 {
                inner.registry.link_companions(&linked);
                tracing::info!(count = linked.len(), "companion batch linked");
            }
        });

        BatchHandle { handles }
    }

    /// Current status of a job
    ///
    /// # Errors
    /// [`IngestError::UnknownJob`] if the handle does not belong to this
    /// pipeline.
    pub fn poll(&self, handle: &JobHandle) -> Result<JobStatus, IngestError> {
        self.inner
            .statuses
            .get(&handle.job_id)
            .map(|tx| tx.borrow().clone())
            .ok_or(IngestError::UnknownJob(handle.job_id))
    }

    /// Wait until a job settles or suspends
    ///
    /// Returns on any terminal status and on `PendingParameter` (the
    /// caller must `resume` to make further progress).
    ///
    /// # Errors
    /// [`IngestError::UnknownJob`] if the handle does not belong to this
    /// pipeline.
    pub async fn wait(&self, handle: &JobHandle) -> Result<JobStatus, IngestError> {
        self.inner
            .wait_for(handle.job_id, |status| {
                status.is_terminal() || status.is_pending_parameter()
            })
            .await
    }

    /// Wait for every job of a batch
    ///
    /// # Errors
    /// [`IngestError::UnknownJob`] if any handle is foreign.
    pub async fn wait_batch(&self, batch: &BatchHandle) -> Result<Vec<JobStatus>, IngestError> {
        futures::future::join_all(batch.handles.iter().map(|handle| self.wait(handle)))
            .await
            .into_iter()
            .collect()
    }

    /// Cancel a job that has not yet started running
    ///
    /// Returns `true` only when the job was still queued; a running job
    /// always runs to completion so no trace is left half-converted.
    #[must_use]
    pub fn cancel(&self, handle: &JobHandle) -> bool {
        let Some(tx) = self.inner.statuses.get(&handle.job_id) else {
            return false;
        };
        let mut cancelled = false;
        tx.send_if_modified(|status| {
            if matches!(status, JobStatus::Queued) {
                *status = JobStatus::Cancelled;
                cancelled = true;
                true
            } else {
                false
            }
        });
        if cancelled {
            tracing::debug!(job = %handle.job_id, "job cancelled while queued");
        }
        cancelled
    }

    /// Supply the parameters a suspended job is waiting for
    ///
    /// The job re-enters the queue with its decoded payload intact; the
    /// decode stage is not repeated.
    ///
    /// # Errors
    /// [`IngestError::NotSuspended`] if the job is not awaiting
    /// parameters, [`IngestError::Shutdown`] if the queue is gone.
    pub async fn resume(
        &self,
        job_id: JobId,
        params: BTreeMap<String, String>,
    ) -> Result<JobHandle, IngestError> {
        let (_, suspended) = self
            .inner
            .suspended
            .remove(&job_id)
            .ok_or(IngestError::NotSuspended(job_id))?;

        let mut job = suspended.job;
        job.conversion_params.extend(params);

        self.inner.set_status(job_id, JobStatus::Queued);
        tracing::debug!(%job_id, "suspended job resumed");
        self.queue
            .send(WorkItem {
                job_id,
                job,
                decoded: Some(suspended.decoded),
            })
            .await
            .map_err(|_| IngestError::Shutdown)?;
        Ok(JobHandle { job_id })
    }

    /// Pool statistics
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        let mut settled = 0;
        for entry in self.inner.statuses.iter() {
            if entry.value().borrow().is_terminal() {
                settled += 1;
            }
        }
        PipelineStats {
            workers: self.workers,
            submitted: self.inner.statuses.len(),
            settled,
            suspended: self.inner.suspended.len(),
        }
    }
}

impl PipelineInner {
    fn set_status(&self, job_id: JobId, status: JobStatus) {
        if let Some(tx) = self.statuses.get(&job_id) {
            tx.send_replace(status);
        }
    }

    async fn wait_for(
        &self,
        job_id: JobId,
        predicate: impl Fn(&JobStatus) -> bool,
    ) -> Result<JobStatus, IngestError> {
        let mut rx = self
            .statuses
            .get(&job_id)
            .map(|tx| tx.subscribe())
            .ok_or(IngestError::UnknownJob(job_id))?;
        let status = rx
            .wait_for(|status| predicate(status))
            .await
            .map_err(|_| IngestError::UnknownJob(job_id))?;
        Ok(status.clone())
    }

    /// Move Queued -> Running; false when the job was cancelled first
    fn claim_running(&self, job_id: JobId) -> bool {
        let Some(tx) = self.statuses.get(&job_id) else {
            return false;
        };
        let mut claimed = false;
        tx.send_if_modified(|status| {
            if matches!(status, JobStatus::Queued) {
                *status = JobStatus::Running;
                claimed = true;
                true
            } else {
                false
            }
        });
        claimed
    }

    async fn process(&self, item: WorkItem) {
        let WorkItem { job_id, job, decoded } = item;
        if !self.claim_running(job_id) {
            return;
        }
        let locator = job.source_locator.clone();

        // Decode (skipped on resume).
        let decoded = match decoded {
            Some(series) => series,
            None => {
                tracing::debug!(%job_id, "ingest.decode");
                match self.decoder.decode(&job.payload, job.decoder_hint.as_deref()) {
                    Ok(series) => series,
                    Err(error) => {
                        tracing::warn!(%job_id, %error, "decode failed");
                        self.set_status(
                            job_id,
                            JobStatus::Failed {
                                kind: FailureKind::Decode,
                                message: error.to_string(),
                                locator,
                            },
                        );
                        return;
                    }
                }
            }
        };

        // Normalize; a missing conversion parameter suspends the job.
        tracing::debug!(%job_id, "ingest.normalize");
        let meta_label = decoded.meta.get(DecodedSeries::META_LABEL).cloned();
        let payload = match normalize(&decoded, &job.conversion_params, &self.config) {
            Ok(NormalizeOutcome::Ready(payload)) => *payload,
            Ok(NormalizeOutcome::MissingParameters(missing)) => {
                tracing::info!(%job_id, ?missing, "job suspended awaiting parameters");
                self.suspended.insert(job_id, SuspendedJob { job, decoded });
                self.set_status(job_id, JobStatus::PendingParameter { missing });
                return;
            }
            Err(error) => {
                tracing::warn!(%job_id, %error, "normalization failed");
                self.set_status(
                    job_id,
                    JobStatus::Failed {
                        kind: FailureKind::Normalize,
                        message: error.to_string(),
                        locator,
                    },
                );
                return;
            }
        };

        let fingerprint = Fingerprint::of_series(
            &payload.wavelength,
            &payload.flux,
            payload.wavelength_unit,
            payload.flux_unit,
        );
        tracing::debug!(%job_id, fingerprint = %fingerprint.short(), "ingest.dedup");

        // Dedup gate. Loop because an in-flight holder may fail and
        // release, at which point this job takes over the reservation.
        loop {
            match self.ledger.check_and_reserve(fingerprint, self.scope, job_id) {
                Outcome::Existing(trace_id) => {
                    tracing::info!(%job_id, trace = %trace_id, "duplicate payload");
                    self.set_status(job_id, JobStatus::Duplicate { trace_id });
                    return;
                }
                Outcome::InFlight(holder) => {
                    tracing::debug!(%job_id, %holder, "attached to in-flight ingest");
                    // The holder is past normalization, so it can only
                    // settle; attach to its result and re-check.
                    let _ = self.wait_for(holder, JobStatus::is_terminal).await;
                }
                Outcome::New(reservation) => {
                    match self.register(&job, &payload, fingerprint, meta_label.clone()) {
                        Ok(trace_id) => {
                            if let Err(error) = self.ledger.commit(reservation, trace_id).await {
                                tracing::warn!(%job_id, %error, "ledger commit failed");
                            }
                            tracing::info!(%job_id, trace = %trace_id, "ingest.register complete");
                            self.set_status(job_id, JobStatus::Done { trace_id });
                        }
                        Err(error) => {
                            self.ledger.release(reservation);
                            tracing::warn!(%job_id, %error, "registration failed");
                            self.set_status(
                                job_id,
                                JobStatus::Failed {
                                    kind: FailureKind::Registry,
                                    message: error.to_string(),
                                    locator,
                                },
                            );
                        }
                    }
                    return;
                }
            }
        }
    }

    fn register(
        &self,
        job: &IngestJob,
        payload: &NormalizedPayload,
        fingerprint: Fingerprint,
        meta_label: Option<String>,
    ) -> Result<TraceId, spectra_model::ModelError> {
        let mut provenance = Provenance::new();
        if !job.fetch_provenance.is_empty() {
            let mut stage = ProvenanceStage::now("fetch");
            stage.parameters = job.fetch_provenance.clone();
            if let Some(locator) = &job.source_locator {
                stage = stage.with_locator(locator.clone());
            }
            provenance.record(stage);
        }
        let mut decode_stage = ProvenanceStage::now("decode");
        if let Some(hint) = &job.decoder_hint {
            decode_stage = decode_stage.with_parameter("format_hint", hint.clone());
        }
        if let Some(locator) = &job.source_locator {
            decode_stage = decode_stage.with_locator(locator.clone());
        }
        provenance.record(decode_stage);

        let mut normalize_stage = ProvenanceStage::now("normalize");
        normalize_stage.parameters = payload.conversion_parameters.clone();
        provenance.record(normalize_stage);

        let label = job
            .label
            .clone()
            .or(meta_label)
            .or_else(|| job.source_locator.clone())
            .unwrap_or_else(|| format!("trace-{}", fingerprint.short()));

        let trace = Trace::new(
            label,
            job.kind,
            payload.wavelength.clone(),
            payload.flux.clone(),
            payload.wavelength_unit,
            payload.flux_unit,
            payload.direction,
            provenance,
            fingerprint,
        )?;

        Ok(self.registry.register(trace))
    }
}
