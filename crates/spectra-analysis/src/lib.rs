//! Pairwise analysis engines
//!
//! Derived views over registered traces:
//! - [`SimilarityEngine`]: memoized pairwise similarity scores
//! - [`DifferentialEngine`]: subtraction/ratio curves on a shared grid
//!
//! Both engines resample through the shared-grid primitive so unequal
//! sampling never biases a result, memoize per composite key (degenerate
//! results included, to stop recomputation storms), and subscribe to
//! registry invalidation so removed traces never serve stale entries.

mod differential;
mod similarity;

pub use differential::{DifferentialEngine, DiffOp};
pub use similarity::{Metric, Normalization, SimilarityEngine};

use spectra_model::TraceId;
use spectra_resample::ResampleError;

/// Errors raised by analysis operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    /// The referenced trace is not registered
    #[error("trace not found: {0}")]
    UnknownTrace(TraceId),

    /// The traces' wavelength ranges do not intersect
    #[error("no overlap: {0}")]
    NoOverlap(String),

    /// The metric is undefined for the given data
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
}

impl From<ResampleError> for AnalysisError {
    fn from(error: ResampleError) -> Self {
        match error {
            ResampleError::NoOverlap { .. } => Self::NoOverlap(error.to_string()),
            ResampleError::EmptySeries => Self::DegenerateInput(error.to_string()),
        }
    }
}
