//! Manifest export
//!
//! A manifest is the authoritative record for reproducing a view: every
//! visible trace with its full provenance chain, plus the normalization
//! settings that were in effect at export time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spectra_model::{FluxUnit, Provenance, ScopeId, TraceId, TraceKind, WavelengthUnit};
use spectra_registry::TraceRegistry;

use crate::config::SessionConfig;

/// Manifest schema version
pub const MANIFEST_VERSION: u32 = 1;

/// Normalization settings in effect at export time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSettings {
    /// Shared-grid density used for similarity scoring
    pub grid_samples: usize,
    /// Ratio denominator epsilon
    pub ratio_epsilon: f64,
    /// Downsample tier targets
    pub tier_targets: Vec<usize>,
}

/// One visible trace in the export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Trace identity
    pub trace_id: TraceId,
    /// User-facing label
    pub label: String,
    /// How the trace entered the workspace
    pub kind: TraceKind,
    /// Wavelength unit tag
    pub wavelength_unit: WavelengthUnit,
    /// Flux unit tag
    pub flux_unit: FluxUnit,
    /// Number of samples
    pub point_count: usize,
    /// Full provenance chain
    pub provenance: Provenance,
    /// Companion back-references
    pub companions: Vec<TraceId>,
}

/// Exportable snapshot of the visible registry subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest schema version
    pub version: u32,
    /// Version of the exporting build, for continuity checks
    pub app_version: String,
    /// Export timestamp
    pub exported_at: DateTime<Utc>,
    /// Session scope the export came from
    pub scope: ScopeId,
    /// Settings needed to reproduce derived views
    pub normalization: NormalizationSettings,
    /// Visible traces, in id order
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Serialize to pretty-printed JSON bytes
    ///
    /// # Errors
    /// Returns the underlying serialization error.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// Builds manifests from the registry's visible subset
pub struct ManifestBuilder<'a> {
    registry: &'a TraceRegistry,
    scope: ScopeId,
    config: &'a SessionConfig,
}

impl<'a> ManifestBuilder<'a> {
    /// Create a builder over the given registry and settings
    #[must_use]
    pub fn new(registry: &'a TraceRegistry, scope: ScopeId, config: &'a SessionConfig) -> Self {
        Self {
            registry,
            scope,
            config,
        }
    }

    /// Snapshot the visible traces into a manifest
    #[must_use]
    pub fn build(&self) -> Manifest {
        let entries = self
            .registry
            .visible()
            .into_iter()
            .map(|trace| ManifestEntry {
                trace_id: trace.id,
                label: trace.label.clone(),
                kind: trace.kind,
                wavelength_unit: trace.wavelength_unit,
                flux_unit: trace.flux_unit,
                point_count: trace.len(),
                provenance: trace.provenance.clone(),
                companions: trace.companions.clone(),
            })
            .collect();

        Manifest {
            version: MANIFEST_VERSION,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            scope: self.scope,
            normalization: NormalizationSettings {
                grid_samples: self.config.grid_samples,
                ratio_epsilon: self.config.ratio_epsilon,
                tier_targets: self.config.tier_targets.clone(),
            },
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectra_model::{Direction, Fingerprint, ProvenanceStage, Trace};

    fn register_fixture(registry: &TraceRegistry, label: &str, visible: bool) -> TraceId {
        let w: Vec<f64> = (0..32).map(|i| 500.0 + f64::from(i)).collect();
        let f: Vec<f64> = (0..32).map(|i| f64::from(i) * 0.1).collect();
        let fp = Fingerprint::of_series(&w, &f, WavelengthUnit::Nanometer, FluxUnit::Raw);
        let mut provenance = Provenance::new();
        provenance.record(ProvenanceStage::now("decode"));
        let trace = Trace::new(
            label,
            TraceKind::Uploaded,
            w,
            f,
            WavelengthUnit::Nanometer,
            FluxUnit::Raw,
            Direction::Ascending,
            provenance,
            fp,
        )
        .unwrap();
        let id = registry.register(trace);
        registry.set_visible(id, visible).unwrap();
        id
    }

    #[test]
    fn manifest_contains_only_visible_traces() {
        let registry = TraceRegistry::default();
        let config = SessionConfig::default();
        let scope = ScopeId::new();

        let shown = register_fixture(&registry, "shown", true);
        register_fixture(&registry, "hidden", false);

        let manifest = ManifestBuilder::new(&registry, scope, &config).build();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].trace_id, shown);
        assert_eq!(manifest.entries[0].label, "shown");
        assert_eq!(manifest.entries[0].point_count, 32);
        assert_eq!(manifest.entries[0].provenance.len(), 1);
    }

    #[test]
    fn manifest_records_settings_and_version() {
        let registry = TraceRegistry::default();
        let config = SessionConfig::default().with_grid_samples(256);
        let scope = ScopeId::new();

        let manifest = ManifestBuilder::new(&registry, scope, &config).build();
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert_eq!(manifest.normalization.grid_samples, 256);
        assert_eq!(manifest.scope, scope);
        assert!(!manifest.app_version.is_empty());
    }

    #[test]
    fn manifest_json_round_trip() {
        let registry = TraceRegistry::default();
        let config = SessionConfig::default();
        register_fixture(&registry, "trace", true);

        let manifest = ManifestBuilder::new(&registry, ScopeId::new(), &config).build();
        let bytes = manifest.to_json().unwrap();
        let decoded: Manifest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, manifest);
    }
}
