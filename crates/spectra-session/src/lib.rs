//! Session orchestration
//!
//! A [`Session`] is the explicit boundary for everything scope-bound:
//! the trace registry, the duplicate ledger, the ingestion pipeline, the
//! analysis engines and their caches. `reset()` tears all of it down
//! without leaking into other sessions sharing the same sink.

mod config;
mod manifest;
mod session;

pub use config::SessionConfig;
pub use manifest::{Manifest, ManifestBuilder, ManifestEntry, NormalizationSettings, MANIFEST_VERSION};
pub use session::Session;

use spectra_ledger::{LedgerError, SinkError};

/// Errors raised by session-level operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The duplicate ledger rejected an operation
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The durable sink rejected an operation
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Manifest serialization failed
    #[error("manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
