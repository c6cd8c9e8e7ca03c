//! Ingestion jobs, handles, and statuses

use std::collections::BTreeMap;

use spectra_model::{JobId, TraceId, TraceKind};

/// A unit of ingestion work
#[derive(Debug, Clone)]
pub struct IngestJob {
    /// Raw payload bytes as uploaded or fetched
    pub payload: Vec<u8>,
    /// Format hint forwarded to the decoder
    pub decoder_hint: Option<String>,
    /// Where the payload came from, for diagnostics and provenance
    pub source_locator: Option<String>,
    /// Label override; falls back to decoder metadata, then the locator
    pub label: Option<String>,
    /// How the resulting trace entered the workspace
    pub kind: TraceKind,
    /// Provenance reported by the fetcher, recorded as the first stage
    pub fetch_provenance: BTreeMap<String, String>,
    /// User-supplied conversion parameters (path length, mole fraction)
    pub conversion_params: BTreeMap<String, String>,
}

impl IngestJob {
    /// Create an upload job from raw bytes
    #[must_use]
    pub fn upload(payload: Vec<u8>) -> Self {
        Self {
            payload,
            decoder_hint: None,
            source_locator: None,
            label: None,
            kind: TraceKind::Uploaded,
            fetch_provenance: BTreeMap::new(),
            conversion_params: BTreeMap::new(),
        }
    }

    /// With a decoder format hint
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.decoder_hint = Some(hint.into());
        self
    }

    /// With a source locator
    #[must_use]
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.source_locator = Some(locator.into());
        self
    }

    /// With a label override
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// With a trace kind
    #[must_use]
    pub fn with_kind(mut self, kind: TraceKind) -> Self {
        self.kind = kind;
        self
    }

    /// With a conversion parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conversion_params.insert(key.into(), value.into());
        self
    }
}

/// Why a job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The decoder rejected the payload
    Decode,
    /// The fetcher reported no payload
    Fetch,
    /// Normalization rejected the decoded series
    Normalize,
    /// Registration was rejected
    Registry,
    /// Unexpected internal condition
    Internal,
}

/// Observable job state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted, waiting for a worker
    Queued,
    /// A worker is processing the job
    Running,
    /// Suspended until the listed parameters are supplied via `resume`
    PendingParameter {
        /// Names of the missing conversion parameters
        missing: Vec<String>,
    },
    /// A new trace was registered
    Done {
        /// The registered trace
        trace_id: TraceId,
    },
    /// The payload was already registered in this scope
    Duplicate {
        /// The previously registered trace
        trace_id: TraceId,
    },
    /// The job failed; the trace was not created
    Failed {
        /// Failure classification
        kind: FailureKind,
        /// Human-readable diagnostic
        message: String,
        /// Raw locator preserved for user diagnosis
        locator: Option<String>,
    },
    /// Cancelled before leaving the queue
    Cancelled,
}

impl JobStatus {
    /// Whether the job has reached a final state
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Duplicate { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }

    /// Whether the job is suspended awaiting parameters
    #[inline]
    #[must_use]
    pub fn is_pending_parameter(&self) -> bool {
        matches!(self, Self::PendingParameter { .. })
    }

    /// The trace id, for `Done` and `Duplicate`
    #[inline]
    #[must_use]
    pub fn trace_id(&self) -> Option<TraceId> {
        match self {
            Self::Done { trace_id } | Self::Duplicate { trace_id } => Some(*trace_id),
            _ => None,
        }
    }
}

/// Handle to a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle {
    /// The job's id
    pub job_id: JobId,
}

/// Handle to a companion batch
///
/// Items settle independently; once every item has settled, the
/// successful traces are linked as companions of each other.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    /// Per-item handles, in submission order
    pub handles: Vec<JobHandle>,
}
