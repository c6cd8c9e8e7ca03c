//! Session configuration

use serde::{Deserialize, Serialize};

use spectra_ingest::PipelineConfig;
use spectra_registry::DEFAULT_TIER_TARGETS;

/// Configuration for a workspace session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Ingestion pipeline knobs
    pub pipeline: PipelineConfig,
    /// Downsample tier targets, smallest first
    pub tier_targets: Vec<usize>,
    /// Shared-grid density for similarity scoring
    pub grid_samples: usize,
    /// Epsilon added to ratio denominators; a policy constant, not a
    /// physical one
    pub ratio_epsilon: f64,
    /// Similarity cache capacity (entries)
    pub similarity_cache_capacity: u64,
    /// Differential cache capacity (entries)
    pub differential_cache_capacity: u64,
}

impl SessionConfig {
    /// Create the default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With pipeline knobs
    #[inline]
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// With downsample tier targets
    #[inline]
    #[must_use]
    pub fn with_tier_targets(mut self, targets: Vec<usize>) -> Self {
        self.tier_targets = targets;
        self
    }

    /// With a shared-grid density
    #[inline]
    #[must_use]
    pub fn with_grid_samples(mut self, samples: usize) -> Self {
        self.grid_samples = samples.max(2);
        self
    }

    /// With a ratio epsilon
    #[inline]
    #[must_use]
    pub fn with_ratio_epsilon(mut self, epsilon: f64) -> Self {
        self.ratio_epsilon = epsilon;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            tier_targets: DEFAULT_TIER_TARGETS.to_vec(),
            grid_samples: 1024,
            ratio_epsilon: 1e-12,
            similarity_cache_capacity: 4096,
            differential_cache_capacity: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = SessionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.grid_samples, config.grid_samples);
        assert_eq!(decoded.tier_targets, config.tier_targets);
    }

    #[test]
    fn builders_clamp_grid_samples() {
        let config = SessionConfig::new().with_grid_samples(1);
        assert_eq!(config.grid_samples, 2);
    }
}
