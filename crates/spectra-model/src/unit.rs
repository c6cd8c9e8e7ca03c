//! Unit tags for wavelength and flux axes

use serde::{Deserialize, Serialize};

/// Wavelength axis unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WavelengthUnit {
    /// Nanometers — the canonical storage unit
    Nanometer,
    /// Ångströms (0.1 nm)
    Angstrom,
    /// Micrometers (1000 nm)
    Micrometer,
    /// Wavenumbers, cm⁻¹ (converted via 1e7 / x)
    InverseCentimeter,
}

impl WavelengthUnit {
    /// Parse a unit tag as emitted by decoders
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "nm" | "nanometer" | "nanometers" => Some(Self::Nanometer),
            "a" | "angstrom" | "angstroms" | "aa" => Some(Self::Angstrom),
            "um" | "micron" | "microns" | "micrometer" | "micrometers" => Some(Self::Micrometer),
            "cm-1" | "cm^-1" | "wavenumber" | "wavenumbers" => Some(Self::InverseCentimeter),
            _ => None,
        }
    }

    /// Convert a single sample to nanometers
    ///
    /// Wavenumber conversion is reciprocal; callers must re-sort afterwards.
    #[inline]
    #[must_use]
    pub fn to_nanometers(self, value: f64) -> f64 {
        match self {
            Self::Nanometer => value,
            Self::Angstrom => value / 10.0,
            Self::Micrometer => value * 1000.0,
            Self::InverseCentimeter => 1.0e7 / value,
        }
    }

    /// Stable tag used in fingerprints and manifests
    #[inline]
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Nanometer => "nm",
            Self::Angstrom => "angstrom",
            Self::Micrometer => "um",
            Self::InverseCentimeter => "cm-1",
        }
    }
}

/// Flux axis unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxUnit {
    /// Unscaled instrument counts
    Raw,
    /// A10 archive normalization
    A10,
    /// Absorbance awaiting path length / mole fraction before conversion
    AbsorptionPending,
    /// Absorption coefficient after pending parameters were supplied
    AbsorptionCoefficient,
}

impl FluxUnit {
    /// Parse a unit tag as emitted by decoders
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "raw" | "counts" => Some(Self::Raw),
            "a10" => Some(Self::A10),
            "absorption-pending" | "absorbance" => Some(Self::AbsorptionPending),
            "absorption-coefficient" => Some(Self::AbsorptionCoefficient),
            _ => None,
        }
    }

    /// Stable tag used in fingerprints and manifests
    #[inline]
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::A10 => "a10",
            Self::AbsorptionPending => "absorption-pending",
            Self::AbsorptionCoefficient => "absorption-coefficient",
        }
    }
}

/// Monotonic direction of the source wavelength axis
///
/// Storage is always ascending; the tag preserves how the payload arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Wavelengths arrived in increasing order
    Ascending,
    /// Wavelengths arrived in decreasing order
    Descending,
}
