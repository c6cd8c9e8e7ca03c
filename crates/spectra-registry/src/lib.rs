//! Trace registry
//!
//! Exclusive owner of every registered [`Trace`]. Mutations (register,
//! unit conversion, visibility, removal, companion linking) are
//! serialized behind a write lock; reads hand out cloned snapshots so
//! renderers and engines never observe a half-applied mutation.
//!
//! Removal and flux-rewriting mutations fan out to invalidation hooks so
//! memoized analysis caches never serve stale entries.

use parking_lot::RwLock;
use std::collections::HashMap;

use spectra_model::{ProvenanceStage, TierData, Trace, TraceId};

/// Default downsample tier targets, smallest first
pub const DEFAULT_TIER_TARGETS: [usize; 4] = [512, 1024, 2048, 4096];

/// Errors raised by registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No trace with the given id exists
    #[error("trace not found: {0}")]
    TraceNotFound(TraceId),

    /// Replacement flux length does not match the wavelength axis
    #[error("flux length {flux} does not match wavelength length {wavelength}")]
    FluxLengthMismatch {
        /// Existing wavelength sample count
        wavelength: usize,
        /// Proposed flux sample count
        flux: usize,
    },
}

/// Callback invoked with the id of a removed or rewritten trace
pub type InvalidationHook = Box<dyn Fn(TraceId) + Send + Sync>;

/// Single-writer-multiple-reader trace store
pub struct TraceRegistry {
    traces: RwLock<HashMap<TraceId, Trace>>,
    hooks: RwLock<Vec<InvalidationHook>>,
    tier_targets: Vec<usize>,
}

impl TraceRegistry {
    /// Create a registry with the given downsample tier targets
    ///
    /// Targets are sorted ascending; an empty list falls back to
    /// [`DEFAULT_TIER_TARGETS`].
    #[must_use]
    pub fn new(mut tier_targets: Vec<usize>) -> Self {
        if tier_targets.is_empty() {
            tier_targets = DEFAULT_TIER_TARGETS.to_vec();
        }
        tier_targets.sort_unstable();
        tier_targets.dedup();
        Self {
            traces: RwLock::new(HashMap::new()),
            hooks: RwLock::new(Vec::new()),
            tier_targets,
        }
    }

    /// Register an invalidation hook
    ///
    /// Hooks fire on removal and on flux-rewriting mutations, after the
    /// registry state has changed.
    pub fn on_invalidate(&self, hook: InvalidationHook) {
        self.hooks.write().push(hook);
    }

    /// Register a trace, seeding its first downsample tier
    ///
    /// Idempotent for an id already present: the existing record wins and
    /// its id is returned unchanged.
    pub fn register(&self, mut trace: Trace) -> TraceId {
        let mut traces = self.traces.write();
        if traces.contains_key(&trace.id) {
            return trace.id;
        }
        if let Some(first) = self.tier_targets.first() {
            if trace.len() > *first {
                let (w, f) = spectra_resample::downsample(&trace.wavelength, &trace.flux, *first);
                trace
                    .downsample_tiers
                    .insert(*first, TierData { wavelength: w, flux: f });
            }
        }
        let id = trace.id;
        tracing::info!(trace = %id, label = %trace.label, points = trace.len(), "trace registered");
        traces.insert(id, trace);
        id
    }

    /// Snapshot of a trace by id
    #[must_use]
    pub fn get(&self, id: TraceId) -> Option<Trace> {
        self.traces.read().get(&id).cloned()
    }

    /// Whether a trace is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, id: TraceId) -> bool {
        self.traces.read().contains_key(&id)
    }

    /// Number of registered traces
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.traces.read().len()
    }

    /// Whether no trace is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traces.read().is_empty()
    }

    /// Ids of all registered traces
    #[must_use]
    pub fn ids(&self) -> Vec<TraceId> {
        self.traces.read().keys().copied().collect()
    }

    /// Snapshots of all visible traces
    #[must_use]
    pub fn visible(&self) -> Vec<Trace> {
        let mut traces: Vec<Trace> = self
            .traces
            .read()
            .values()
            .filter(|t| t.visible)
            .cloned()
            .collect();
        traces.sort_by_key(|t| t.id);
        traces
    }

    /// Toggle a trace's visibility
    ///
    /// # Errors
    /// [`RegistryError::TraceNotFound`] if the id is unknown.
    pub fn set_visible(&self, id: TraceId, visible: bool) -> Result<(), RegistryError> {
        let mut traces = self.traces.write();
        let trace = traces.get_mut(&id).ok_or(RegistryError::TraceNotFound(id))?;
        trace.visible = visible;
        Ok(())
    }

    /// Rename a trace (identity is unaffected)
    ///
    /// # Errors
    /// [`RegistryError::TraceNotFound`] if the id is unknown.
    pub fn set_label(&self, id: TraceId, label: impl Into<String>) -> Result<(), RegistryError> {
        let mut traces = self.traces.write();
        let trace = traces.get_mut(&id).ok_or(RegistryError::TraceNotFound(id))?;
        trace.label = label.into();
        Ok(())
    }

    /// Apply a unit conversion in place
    ///
    /// Replaces the flux axis and unit, appends the provenance stage, and
    /// drops the now-stale downsample tiers. Invalidation hooks fire so
    /// memoized scores over the old flux are discarded.
    ///
    /// # Errors
    /// [`RegistryError::TraceNotFound`] for an unknown id,
    /// [`RegistryError::FluxLengthMismatch`] if the replacement flux does
    /// not match the wavelength axis.
    pub fn apply_conversion(
        &self,
        id: TraceId,
        new_flux: Vec<f64>,
        new_unit: spectra_model::FluxUnit,
        stage: ProvenanceStage,
    ) -> Result<(), RegistryError> {
        {
            let mut traces = self.traces.write();
            let trace = traces.get_mut(&id).ok_or(RegistryError::TraceNotFound(id))?;
            if new_flux.len() != trace.wavelength.len() {
                return Err(RegistryError::FluxLengthMismatch {
                    wavelength: trace.wavelength.len(),
                    flux: new_flux.len(),
                });
            }
            trace.flux = new_flux;
            trace.flux_unit = new_unit;
            trace.provenance.record(stage);
            trace.downsample_tiers.clear();
            tracing::info!(trace = %id, unit = new_unit.tag(), "unit conversion applied");
        }
        self.fire_hooks(id);
        Ok(())
    }

    /// Remove a trace, cascading to caches via the invalidation hooks
    ///
    /// Companion back-references held by other traces are pruned.
    ///
    /// # Errors
    /// [`RegistryError::TraceNotFound`] if the id is unknown.
    pub fn remove(&self, id: TraceId) -> Result<Trace, RegistryError> {
        let removed = {
            let mut traces = self.traces.write();
            let removed = traces.remove(&id).ok_or(RegistryError::TraceNotFound(id))?;
            for trace in traces.values_mut() {
                trace.companions.retain(|companion| *companion != id);
            }
            removed
        };
        tracing::info!(trace = %id, "trace removed");
        self.fire_hooks(id);
        Ok(removed)
    }

    /// Link a set of traces as companions of each other
    ///
    /// Each trace's `companions` gains the other ids; unknown ids are
    /// skipped (a failed batch sibling never blocks the links between
    /// the successes).
    pub fn link_companions(&self, ids: &[TraceId]) {
        let mut traces = self.traces.write();
        for id in ids {
            if let Some(trace) = traces.get_mut(id) {
                for other in ids {
                    if other != id && !trace.companions.contains(other) {
                        trace.companions.push(*other);
                    }
                }
            }
        }
    }

    /// Reduced view of a trace at roughly `target` points
    ///
    /// The request is bucketed to the smallest configured tier at or
    /// above `target` (the largest tier when the request exceeds all of
    /// them). Tiers are computed on first request under the write lock,
    /// so concurrent requests for one tier compute it exactly once. A
    /// trace already at or below the bucket is returned as-is.
    ///
    /// # Errors
    /// [`RegistryError::TraceNotFound`] if the id is unknown.
    pub fn downsampled(&self, id: TraceId, target: usize) -> Result<TierData, RegistryError> {
        let bucket = self.bucket_for(target);

        {
            let traces = self.traces.read();
            let trace = traces.get(&id).ok_or(RegistryError::TraceNotFound(id))?;
            if trace.len() <= bucket {
                return Ok(TierData {
                    wavelength: trace.wavelength.clone(),
                    flux: trace.flux.clone(),
                });
            }
            if let Some(tier) = trace.downsample_tiers.get(&bucket) {
                return Ok(tier.clone());
            }
        }

        let mut traces = self.traces.write();
        let trace = traces.get_mut(&id).ok_or(RegistryError::TraceNotFound(id))?;
        if let Some(tier) = trace.downsample_tiers.get(&bucket) {
            return Ok(tier.clone());
        }
        let (w, f) = spectra_resample::downsample(&trace.wavelength, &trace.flux, bucket);
        let tier = TierData { wavelength: w, flux: f };
        trace.downsample_tiers.insert(bucket, tier.clone());
        tracing::debug!(trace = %id, bucket, "downsample tier computed");
        Ok(tier)
    }

    /// Drop every trace without firing hooks (session teardown)
    pub fn clear(&self) {
        self.traces.write().clear();
    }

    fn bucket_for(&self, target: usize) -> usize {
        self.tier_targets
            .iter()
            .copied()
            .find(|tier| *tier >= target)
            .or_else(|| self.tier_targets.last().copied())
            .unwrap_or(target)
    }

    fn fire_hooks(&self, id: TraceId) {
        for hook in self.hooks.read().iter() {
            hook(id);
        }
    }
}

impl Default for TraceRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
