//! Pipeline configuration

use serde::{Deserialize, Serialize};

/// Tunable knobs of the ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on worker tasks; effective size is
    /// `min(available_parallelism, worker_cap)`
    pub worker_cap: usize,
    /// Bounded submission queue depth
    pub queue_depth: usize,
    /// Parameters required before an absorbance payload can convert to an
    /// absorption coefficient; a submission missing any of them suspends
    /// in the pending-parameter state instead of failing
    pub absorption_params: Vec<String>,
}

impl PipelineConfig {
    /// Create the default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a worker cap
    #[inline]
    #[must_use]
    pub fn with_worker_cap(mut self, cap: usize) -> Self {
        self.worker_cap = cap.max(1);
        self
    }

    /// With a submission queue depth
    #[inline]
    #[must_use]
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// With the required absorption conversion parameters
    #[inline]
    #[must_use]
    pub fn with_absorption_params(mut self, params: Vec<String>) -> Self {
        self.absorption_params = params;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_cap: 4,
            queue_depth: 64,
            absorption_params: vec!["path_length_cm".to_string(), "mole_fraction".to_string()],
        }
    }
}
