//! Content fingerprints for duplicate detection
//!
//! Provides [`Fingerprint`], a strongly-typed 32-byte Blake3 hash computed
//! over the *normalized* payload (wavelength + flux + unit tags), so
//! unit-equivalent duplicates collide regardless of how they were uploaded.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::unit::{FluxUnit, WavelengthUnit};

/// A 32-byte content fingerprint (Blake3)
///
/// Immutable and cheap to clone (Copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create a fingerprint from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute the fingerprint of arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self::new(*hash.as_bytes())
    }

    /// Fingerprint a normalized series
    ///
    /// Hashes the IEEE-754 bit patterns of both axes plus the unit tags,
    /// in order. Callers must pass normalized (canonical-unit, ascending,
    /// finite) data; raw payload bytes would defeat duplicate detection.
    #[must_use]
    pub fn of_series(
        wavelength: &[f64],
        flux: &[f64],
        wavelength_unit: WavelengthUnit,
        flux_unit: FluxUnit,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(wavelength_unit.tag().as_bytes());
        hasher.update(flux_unit.tag().as_bytes());
        for w in wavelength {
            hasher.update(&w.to_bits().to_le_bytes());
        }
        for f in flux {
            hasher.update(&f.to_bits().to_le_bytes());
        }
        Self::new(*hasher.finalize().as_bytes())
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(FingerprintError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct FingerprintVisitor;

        impl serde::de::Visitor<'_> for FingerprintVisitor {
            type Value = Fingerprint;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("a 32-byte fingerprint as hex string or byte array")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value.parse().map_err(serde::de::Error::custom)
            }

            fn visit_bytes<E>(self, value: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.len() != 32 {
                    return Err(serde::de::Error::invalid_length(value.len(), &"32 bytes"));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(value);
                Ok(Fingerprint::new(arr))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(FingerprintVisitor)
        } else {
            deserializer.deserialize_bytes(FingerprintVisitor)
        }
    }
}

/// Errors that can occur when parsing fingerprints
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// Invalid fingerprint length
    #[error("invalid fingerprint length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_compute_deterministic() {
        let h1 = Fingerprint::compute(b"series");
        let h2 = Fingerprint::compute(b"series");
        assert_eq!(h1, h2);
    }

    #[test]
    fn fingerprint_display_and_parse() {
        let fp = Fingerprint::compute(b"test");
        let s = fp.to_string();
        let parsed: Fingerprint = s.parse().unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn fingerprint_short() {
        let fp = Fingerprint::compute(b"test");
        let short = fp.short();
        assert_eq!(short.len(), 16);
        assert!(fp.to_string().starts_with(&short));
    }

    #[test]
    fn series_fingerprint_sensitive_to_flux() {
        let w = [500.0, 501.0, 502.0];
        let a = Fingerprint::of_series(&w, &[1.0, 2.0, 3.0], WavelengthUnit::Nanometer, FluxUnit::Raw);
        let b = Fingerprint::of_series(&w, &[1.0, 2.0, 4.0], WavelengthUnit::Nanometer, FluxUnit::Raw);
        assert_ne!(a, b);
    }

    #[test]
    fn series_fingerprint_sensitive_to_unit_tag() {
        let w = [500.0, 501.0];
        let f = [1.0, 1.0];
        let raw = Fingerprint::of_series(&w, &f, WavelengthUnit::Nanometer, FluxUnit::Raw);
        let a10 = Fingerprint::of_series(&w, &f, WavelengthUnit::Nanometer, FluxUnit::A10);
        assert_ne!(raw, a10);
    }

    #[test]
    fn fingerprint_serde_json_is_hex() {
        let fp = Fingerprint::compute(b"test");
        let json = serde_json::to_string(&fp).unwrap();
        assert!(json.contains('"'));
        let decoded: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, decoded);
    }

    #[test]
    fn fingerprint_rejects_short_hex() {
        let result: Result<Fingerprint, _> = "deadbeef".parse();
        assert!(matches!(
            result,
            Err(FingerprintError::InvalidLength { expected: 32, actual: 4 })
        ));
    }
}
