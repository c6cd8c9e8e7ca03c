//! Ingestion pipeline
//!
//! Turns raw uploaded/fetched payloads into registered traces:
//! - `Fetcher`/`Decoder` capability contracts for external collaborators
//! - Unit normalization with pending-parameter continuations
//! - Fingerprinting and duplicate short-circuiting via the ledger
//! - A bounded worker pool with per-fingerprint at-most-once semantics

mod capability;
mod config;
mod job;
mod normalize;
mod pipeline;

pub use capability::{
    DecodeError, DecodedSeries, Decoder, FetchFailureKind, FetchOutcome, Fetcher,
};
pub use config::PipelineConfig;
pub use job::{BatchHandle, FailureKind, IngestJob, JobHandle, JobStatus};
pub use normalize::{normalize, NormalizeError, NormalizeOutcome, NormalizedPayload};
pub use pipeline::{IngestPipeline, PipelineStats};

use spectra_model::JobId;

/// Errors returned by pipeline control operations
///
/// Per-job processing failures are not errors here; they surface as
/// [`JobStatus::Failed`] on the job itself.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// No job with the given id exists in this pipeline
    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    /// The job is not suspended awaiting parameters
    #[error("job is not awaiting parameters: {0}")]
    NotSuspended(JobId),

    /// The pipeline's queue has shut down
    #[error("pipeline shut down")]
    Shutdown,
}
