//! External capability contracts
//!
//! The pipeline never talks to archives or file formats directly. A
//! [`Fetcher`] produces raw payloads plus provenance (and never raises),
//! a [`Decoder`] turns raw bytes into a wavelength/flux series.

use async_trait::async_trait;
use std::collections::BTreeMap;

/// A decoded but not yet normalized series
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSeries {
    /// Wavelength samples in the decoder's native unit and order
    pub wavelength: Vec<f64>,
    /// Flux samples, pairwise with `wavelength`
    pub flux: Vec<f64>,
    /// Decoder metadata: unit tags, labels, format details
    pub meta: BTreeMap<String, String>,
}

impl DecodedSeries {
    /// Metadata keys the normalizer understands
    pub const META_WAVELENGTH_UNIT: &'static str = "wavelength_unit";
    /// Flux unit tag key
    pub const META_FLUX_UNIT: &'static str = "flux_unit";
    /// Suggested label key
    pub const META_LABEL: &'static str = "label";
}

/// Errors raised by decoders
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload bytes do not parse under the claimed format
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The format hint names a format this decoder cannot handle
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Decodes raw payload bytes into a spectral series
pub trait Decoder: Send + Sync {
    /// Decode `payload`, optionally guided by a format hint
    ///
    /// # Errors
    /// Returns [`DecodeError`] when the payload cannot be interpreted.
    fn decode(&self, payload: &[u8], hint: Option<&str>) -> Result<DecodedSeries, DecodeError>;
}

/// Classified fetch failure, carried in provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailureKind {
    /// Client-side HTTP error
    Http4xx,
    /// Server-side HTTP error
    Http5xx,
    /// The provider did not answer in time
    Timeout,
    /// The provider answered with an unparseable response
    ParseError,
}

impl FetchFailureKind {
    /// Stable tag stored in provenance
    #[inline]
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Http4xx => "http_4xx",
            Self::Http5xx => "http_5xx",
            Self::Timeout => "timeout",
            Self::ParseError => "parse_error",
        }
    }
}

/// Result of a fetch attempt
///
/// Fetchers never raise; a failure is a `None` payload plus a provenance
/// map explaining what happened (`error` and `error_kind` keys).
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// The fetched payload, absent on failure
    pub payload: Option<Vec<u8>>,
    /// Provider-reported provenance (query, archive id, error details)
    pub provenance: BTreeMap<String, String>,
}

impl FetchOutcome {
    /// Provenance key holding the failure message
    pub const ERROR_KEY: &'static str = "error";
    /// Provenance key holding the failure kind tag
    pub const ERROR_KIND_KEY: &'static str = "error_kind";

    /// Build a successful outcome
    #[must_use]
    pub fn success(payload: Vec<u8>, provenance: BTreeMap<String, String>) -> Self {
        Self {
            payload: Some(payload),
            provenance,
        }
    }

    /// Build a failed outcome with the classification the UI needs
    #[must_use]
    pub fn failure(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        let mut provenance = BTreeMap::new();
        provenance.insert(Self::ERROR_KEY.to_string(), message.into());
        provenance.insert(Self::ERROR_KIND_KEY.to_string(), kind.tag().to_string());
        Self {
            payload: None,
            provenance,
        }
    }

    /// Whether the fetch produced a payload
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.payload.is_some()
    }
}

/// Fetches raw payloads from archive providers
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `target` with provider-specific parameters
    ///
    /// Must never panic or return an error type; failures are encoded in
    /// the outcome's provenance.
    async fn fetch(&self, target: &str, params: &BTreeMap<String, String>) -> FetchOutcome;
}
