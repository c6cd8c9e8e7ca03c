//! The canonical trace record
//!
//! A [`Trace`] is owned exclusively by the registry; every other component
//! references it by [`TraceId`]. The constructor enforces the data
//! invariants so a registered trace is always well-formed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fingerprint::Fingerprint;
use crate::id::{ScopeId, TraceId};
use crate::provenance::Provenance;
use crate::unit::{Direction, FluxUnit, WavelengthUnit};
use crate::ModelError;

/// How a trace entered the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// Uploaded by the user
    Uploaded,
    /// Fetched from an archive provider
    ArchiveFetched,
    /// Produced by the differential engine
    DerivedDifferential,
    /// A line list rather than a continuous spectrum
    LineList,
}

/// One reduced representation of a trace at a target point count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierData {
    /// Reduced wavelength samples
    pub wavelength: Vec<f64>,
    /// Reduced flux samples
    pub flux: Vec<f64>,
}

/// A registered spectral series
///
/// # Invariants
/// - `wavelength` and `flux` have equal, non-zero length
/// - every sample is finite
/// - `wavelength` is strictly increasing (canonical storage order;
///   the original direction is preserved in `direction`)
/// - `fingerprint` is computed once, from the normalized payload
/// - `provenance` is append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Stable identifier, assigned at registration
    pub id: TraceId,
    /// User-facing name; mutable, does not affect identity
    pub label: String,
    /// How the trace entered the workspace
    pub kind: TraceKind,
    /// Wavelength samples, strictly increasing
    pub wavelength: Vec<f64>,
    /// Flux samples, same length as `wavelength`
    pub flux: Vec<f64>,
    /// Wavelength unit tag (canonical: nanometers)
    pub wavelength_unit: WavelengthUnit,
    /// Flux unit tag
    pub flux_unit: FluxUnit,
    /// Direction the source payload arrived in
    pub direction: Direction,
    /// Append-only processing history
    pub provenance: Provenance,
    /// Content hash of the normalized payload
    pub fingerprint: Fingerprint,
    /// Lazily filled downsample tiers, keyed by target point count
    pub downsample_tiers: BTreeMap<usize, TierData>,
    /// Whether the trace participates in rendering and manifests
    pub visible: bool,
    /// Non-owning back-references to companion traces
    pub companions: Vec<TraceId>,
}

impl Trace {
    /// Create a trace, validating the data invariants
    ///
    /// # Errors
    /// Returns [`ModelError`] if the series is empty, lengths differ,
    /// any sample is non-finite, or wavelengths are not strictly
    /// increasing.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        label: impl Into<String>,
        kind: TraceKind,
        wavelength: Vec<f64>,
        flux: Vec<f64>,
        wavelength_unit: WavelengthUnit,
        flux_unit: FluxUnit,
        direction: Direction,
        provenance: Provenance,
        fingerprint: Fingerprint,
    ) -> Result<Self, ModelError> {
        validate_series(&wavelength, &flux)?;
        Ok(Self {
            id: TraceId::new(),
            label: label.into(),
            kind,
            wavelength,
            flux,
            wavelength_unit,
            flux_unit,
            direction,
            provenance,
            fingerprint,
            downsample_tiers: BTreeMap::new(),
            visible: true,
            companions: Vec::new(),
        })
    }

    /// Number of samples
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    /// Whether the trace holds no samples (never true for a valid trace)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Wavelength coverage as `(min, max)`
    #[inline]
    #[must_use]
    pub fn coverage(&self) -> (f64, f64) {
        // Safe on a validated trace: non-empty and ascending.
        (self.wavelength[0], self.wavelength[self.wavelength.len() - 1])
    }
}

/// Check the series invariants shared by traces and normalized payloads
///
/// # Errors
/// Returns the first violated invariant.
pub(crate) fn validate_series(wavelength: &[f64], flux: &[f64]) -> Result<(), ModelError> {
    if wavelength.len() != flux.len() {
        return Err(ModelError::LengthMismatch {
            wavelength: wavelength.len(),
            flux: flux.len(),
        });
    }
    if wavelength.is_empty() {
        return Err(ModelError::EmptySeries);
    }
    for (i, (w, f)) in wavelength.iter().zip(flux.iter()).enumerate() {
        if !w.is_finite() || !f.is_finite() {
            return Err(ModelError::NonFinite(i));
        }
    }
    for i in 1..wavelength.len() {
        if wavelength[i] <= wavelength[i - 1] {
            return Err(ModelError::NonMonotonic(i));
        }
    }
    Ok(())
}

/// Duplicate-ledger record persisted to the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Fingerprint of the registered payload
    pub fingerprint: Fingerprint,
    /// Trace the fingerprint resolved to
    pub trace_id: TraceId,
    /// Session scope the entry belongs to
    pub scope: ScopeId,
    /// When the entry was committed
    pub created_at: DateTime<Utc>,
}
