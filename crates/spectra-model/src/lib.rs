//! Trace data model for the spectral overlay workspace
//!
//! Defines the shared vocabulary of the pipeline:
//! - Strongly-typed identifiers (traces, jobs, session scopes)
//! - Wavelength/flux unit tags and the monotonic direction tag
//! - Append-only provenance chains
//! - Content fingerprints over normalized payloads
//! - The canonical [`Trace`] record and its invariants

mod fingerprint;
mod id;
mod provenance;
mod trace;
mod unit;

pub use fingerprint::{Fingerprint, FingerprintError};
pub use id::{JobId, ScopeId, TraceId};
pub use provenance::{Provenance, ProvenanceStage};
pub use trace::{LedgerEntry, TierData, Trace, TraceKind};
pub use unit::{Direction, FluxUnit, WavelengthUnit};

/// Errors raised when constructing or mutating model values
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Wavelength and flux sequences differ in length
    #[error("length mismatch: {wavelength} wavelength samples, {flux} flux samples")]
    LengthMismatch {
        /// Wavelength sample count
        wavelength: usize,
        /// Flux sample count
        flux: usize,
    },

    /// A sample survived normalization while non-finite
    #[error("non-finite sample at index {0}")]
    NonFinite(usize),

    /// Wavelengths are not strictly monotonic
    #[error("wavelengths not strictly increasing at index {0}")]
    NonMonotonic(usize),

    /// Empty series cannot be registered
    #[error("empty series")]
    EmptySeries,
}
