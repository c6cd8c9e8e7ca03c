//! Differential curves
//!
//! Subtraction and ratio between two traces on a shared grid. The
//! computation is side-effect-free: the derived trace is returned (and
//! memoized) but only enters the registry when the caller promotes it.

use moka::sync::Cache;
use std::sync::Arc;

use spectra_model::{
    Direction, Fingerprint, FluxUnit, Provenance, ProvenanceStage, Trace, TraceId, TraceKind,
    WavelengthUnit,
};
use spectra_registry::TraceRegistry;

use crate::AnalysisError;

/// Differential operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffOp {
    /// `flux_a - flux_b`
    Subtract,
    /// `flux_a / (flux_b + epsilon)`
    Ratio,
}

impl DiffOp {
    /// Stable name for provenance and labels
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Subtract => "subtract",
            Self::Ratio => "ratio",
        }
    }

    /// Operator symbol for derived labels
    #[inline]
    #[must_use]
    fn symbol(self) -> &'static str {
        match self {
            Self::Subtract => "-",
            Self::Ratio => "/",
        }
    }
}

/// Cache key: differential results are directional, (a, b) != (b, a)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DiffKey {
    a: TraceId,
    b: TraceId,
    op: DiffOp,
    samples: usize,
}

impl DiffKey {
    fn involves(&self, id: TraceId) -> bool {
        self.a == id || self.b == id
    }
}

/// Shared-grid differential engine
pub struct DifferentialEngine {
    registry: Arc<TraceRegistry>,
    /// Added to ratio denominators so an exact zero stays finite; small
    /// enough not to visibly bias ratios in normal operating ranges
    epsilon: f64,
    cache: Cache<DiffKey, Result<Arc<Trace>, AnalysisError>>,
}

impl DifferentialEngine {
    /// Create an engine with the configured ratio epsilon
    #[must_use]
    pub fn new(registry: Arc<TraceRegistry>, epsilon: f64, cache_capacity: u64) -> Self {
        Self {
            registry,
            epsilon,
            cache: Cache::builder()
                .max_capacity(cache_capacity)
                .support_invalidation_closures()
                .build(),
        }
    }

    /// Compute a differential trace, memoized by `(a, b, op, samples)`
    ///
    /// The result is not registered; pass it to [`Self::promote`] to make
    /// it a first-class trace.
    ///
    /// # Errors
    /// [`AnalysisError::UnknownTrace`] for unregistered ids,
    /// [`AnalysisError::NoOverlap`] for disjoint wavelength ranges.
    pub fn compute(
        &self,
        a: TraceId,
        b: TraceId,
        op: DiffOp,
        samples: usize,
    ) -> Result<Arc<Trace>, AnalysisError> {
        let key = DiffKey {
            a,
            b,
            op,
            samples: samples.max(2),
        };
        self.cache.get_with(key, || self.compute_uncached(key))
    }

    /// Register a computed differential trace
    ///
    /// Idempotent: promoting the same derived trace twice registers it
    /// once and returns the same id.
    #[must_use]
    pub fn promote(&self, derived: &Arc<Trace>) -> TraceId {
        if self.registry.contains(derived.id) {
            return derived.id;
        }
        self.registry.register(derived.as_ref().clone())
    }

    /// Drop every cached entry touching `id`
    pub fn invalidate(&self, id: TraceId) {
        let _ = self
            .cache
            .invalidate_entries_if(move |key, _| key.involves(id));
        tracing::debug!(trace = %id, "differential cache invalidated");
    }

    /// Drop the whole cache (session reset)
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    fn compute_uncached(&self, key: DiffKey) -> Result<Arc<Trace>, AnalysisError> {
        let left = self
            .registry
            .get(key.a)
            .ok_or(AnalysisError::UnknownTrace(key.a))?;
        let right = self
            .registry
            .get(key.b)
            .ok_or(AnalysisError::UnknownTrace(key.b))?;

        let (grid, flux_a, flux_b) = spectra_resample::shared_grid(
            &left.wavelength,
            &left.flux,
            &right.wavelength,
            &right.flux,
            key.samples,
        )?;

        let flux: Vec<f64> = match key.op {
            DiffOp::Subtract => flux_a.iter().zip(&flux_b).map(|(x, y)| x - y).collect(),
            DiffOp::Ratio => flux_a
                .iter()
                .zip(&flux_b)
                .map(|(x, y)| x / (y + self.epsilon))
                .collect(),
        };

        let stage = ProvenanceStage::now("differential")
            .with_parameter("source_a", key.a.to_string())
            .with_parameter("source_b", key.b.to_string())
            .with_parameter("operation", key.op.name())
            .with_parameter("sample_count", key.samples.to_string());
        let mut provenance = Provenance::new();
        provenance.record(stage);

        let fingerprint =
            Fingerprint::of_series(&grid, &flux, WavelengthUnit::Nanometer, FluxUnit::Raw);
        let label = format!("{} {} {}", left.label, key.op.symbol(), right.label);

        let trace = Trace::new(
            label,
            TraceKind::DerivedDifferential,
            grid,
            flux,
            WavelengthUnit::Nanometer,
            FluxUnit::Raw,
            Direction::Ascending,
            provenance,
            fingerprint,
        )
        .map_err(|e| AnalysisError::DegenerateInput(e.to_string()))?;

        tracing::debug!(
            a = %key.a,
            b = %key.b,
            op = key.op.name(),
            points = trace.len(),
            "differential computed"
        );
        Ok(Arc::new(trace))
    }
}
