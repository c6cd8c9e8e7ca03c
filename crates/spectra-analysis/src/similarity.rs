//! Memoized pairwise similarity
//!
//! Scores are cached per `(pair, metric, normalization)` key with the
//! pair canonicalized, so `score(A, B)` and `score(B, A)` share one
//! entry. Degenerate results are cached too; a zero-variance trace would
//! otherwise be recomputed on every viewport refresh.

use moka::sync::Cache;
use std::sync::Arc;

use spectra_model::TraceId;
use spectra_registry::TraceRegistry;

use crate::AnalysisError;

/// Similarity metric over two flux vectors on a shared grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Cosine of the angle between the flux vectors
    Cosine,
    /// Pearson correlation coefficient
    Pearson,
    /// Euclidean distance
    Euclidean,
    /// Root-mean-square error
    Rmse,
}

impl Metric {
    /// Stable name for manifests and diagnostics
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Pearson => "pearson",
            Self::Euclidean => "euclidean",
            Self::Rmse => "rmse",
        }
    }
}

/// Flux normalization applied before scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalization {
    /// Scale to unit Euclidean norm
    UnitVector,
    /// Scale so the maximum absolute value is 1
    MaxScale,
    /// Subtract the mean, divide by the standard deviation
    ZScore,
    /// No normalization
    Raw,
}

impl Normalization {
    /// Stable name for manifests and diagnostics
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::UnitVector => "unit_vector",
            Self::MaxScale => "max_scale",
            Self::ZScore => "z_score",
            Self::Raw => "raw",
        }
    }
}

/// Canonicalized cache key: the pair is ordered so (a, b) == (b, a)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ScoreKey {
    low: TraceId,
    high: TraceId,
    metric: Metric,
    normalization: Normalization,
}

impl ScoreKey {
    fn new(a: TraceId, b: TraceId, metric: Metric, normalization: Normalization) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low,
            high,
            metric,
            normalization,
        }
    }

    fn involves(&self, id: TraceId) -> bool {
        self.low == id || self.high == id
    }
}

/// Memoized pairwise similarity over registered traces
pub struct SimilarityEngine {
    registry: Arc<TraceRegistry>,
    grid_samples: usize,
    cache: Cache<ScoreKey, Result<f64, AnalysisError>>,
}

impl SimilarityEngine {
    /// Create an engine resampling pairs onto `grid_samples` points
    #[must_use]
    pub fn new(registry: Arc<TraceRegistry>, grid_samples: usize, cache_capacity: u64) -> Self {
        Self {
            registry,
            grid_samples: grid_samples.max(2),
            cache: Cache::builder()
                .max_capacity(cache_capacity)
                .support_invalidation_closures()
                .build(),
        }
    }

    /// Score a pair of traces, memoized
    ///
    /// Concurrent callers of one key share a single computation; the
    /// second caller waits on the first's in-flight result.
    ///
    /// # Errors
    /// [`AnalysisError::UnknownTrace`] for unregistered ids,
    /// [`AnalysisError::NoOverlap`] for disjoint wavelength ranges,
    /// [`AnalysisError::DegenerateInput`] when the metric is undefined
    /// for the data (cached as a negative result).
    pub fn score(
        &self,
        a: TraceId,
        b: TraceId,
        metric: Metric,
        normalization: Normalization,
    ) -> Result<f64, AnalysisError> {
        let key = ScoreKey::new(a, b, metric, normalization);
        self.cache.get_with(key, || self.compute(key))
    }

    /// Score every visible pair under one metric
    ///
    /// Degenerate pairs surface their error in place; they never abort
    /// the rest of the batch.
    #[must_use]
    pub fn score_visible_pairs(
        &self,
        metric: Metric,
        normalization: Normalization,
    ) -> Vec<((TraceId, TraceId), Result<f64, AnalysisError>)> {
        let visible = self.registry.visible();
        let mut results = Vec::new();
        for (i, left) in visible.iter().enumerate() {
            for right in &visible[i + 1..] {
                let score = self.score(left.id, right.id, metric, normalization);
                results.push(((left.id, right.id), score));
            }
        }
        results
    }

    /// Drop every cached entry touching `id`
    ///
    /// Wired to registry removal so a removed trace is absent from
    /// subsequent results immediately.
    pub fn invalidate(&self, id: TraceId) {
        let _ = self
            .cache
            .invalidate_entries_if(move |key, _| key.involves(id));
        tracing::debug!(trace = %id, "similarity cache invalidated");
    }

    /// Drop the whole cache (session reset)
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of cached scores
    #[inline]
    #[must_use]
    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }

    fn compute(&self, key: ScoreKey) -> Result<f64, AnalysisError> {
        let left = self
            .registry
            .get(key.low)
            .ok_or(AnalysisError::UnknownTrace(key.low))?;
        let right = self
            .registry
            .get(key.high)
            .ok_or(AnalysisError::UnknownTrace(key.high))?;

        let (_, flux_a, flux_b) = spectra_resample::shared_grid(
            &left.wavelength,
            &left.flux,
            &right.wavelength,
            &right.flux,
            self.grid_samples,
        )?;

        let flux_a = apply_normalization(&flux_a, key.normalization)?;
        let flux_b = apply_normalization(&flux_b, key.normalization)?;

        let score = match key.metric {
            Metric::Cosine => cosine(&flux_a, &flux_b)?,
            Metric::Pearson => pearson(&flux_a, &flux_b)?,
            Metric::Euclidean => euclidean(&flux_a, &flux_b),
            Metric::Rmse => rmse(&flux_a, &flux_b),
        };
        tracing::debug!(
            a = %key.low,
            b = %key.high,
            metric = key.metric.name(),
            score,
            "similarity computed"
        );
        Ok(score)
    }
}

fn apply_normalization(flux: &[f64], normalization: Normalization) -> Result<Vec<f64>, AnalysisError> {
    match normalization {
        Normalization::Raw => Ok(flux.to_vec()),
        Normalization::UnitVector => {
            let norm = flux.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm == 0.0 {
                return Err(AnalysisError::DegenerateInput(
                    "zero-norm flux under unit-vector normalization".to_string(),
                ));
            }
            Ok(flux.iter().map(|v| v / norm).collect())
        }
        Normalization::MaxScale => {
            let max = flux.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
            if max == 0.0 {
                return Err(AnalysisError::DegenerateInput(
                    "all-zero flux under max scaling".to_string(),
                ));
            }
            Ok(flux.iter().map(|v| v / max).collect())
        }
        Normalization::ZScore => {
            let n = flux.len() as f64;
            let mean = flux.iter().sum::<f64>() / n;
            let variance = flux.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            if variance == 0.0 {
                return Err(AnalysisError::DegenerateInput(
                    "zero-variance flux under z-score normalization".to_string(),
                ));
            }
            let stddev = variance.sqrt();
            Ok(flux.iter().map(|v| (v - mean) / stddev).collect())
        }
    }
}

fn cosine(a: &[f64], b: &[f64]) -> Result<f64, AnalysisError> {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(AnalysisError::DegenerateInput(
            "zero-norm flux under cosine metric".to_string(),
        ));
    }
    Ok(dot / (norm_a * norm_b))
}

fn pearson(a: &[f64], b: &[f64]) -> Result<f64, AnalysisError> {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut covariance = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        covariance += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return Err(AnalysisError::DegenerateInput(
            "zero-variance flux under pearson metric".to_string(),
        ));
    }
    Ok(covariance / (var_a.sqrt() * var_b.sqrt()))
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn rmse(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    (a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / n).sqrt()
}
