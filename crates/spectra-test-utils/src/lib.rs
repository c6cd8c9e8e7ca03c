//! Shared fixtures for the spectra test suites
//!
//! Synthetic spectra, a columnar text [`Decoder`], a scripted
//! [`Fetcher`], and a directory-backed [`Sink`] for exercising durable
//! export paths.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use spectra_ingest::{DecodeError, DecodedSeries, Decoder, FetchOutcome, Fetcher};
use spectra_ledger::{Sink, SinkError};
use spectra_model::ScopeId;

/// A synthetic continuum spectrum with gaussian absorption lines
///
/// `lines` are `(center, width, depth)` triples in the same unit as the
/// wavelength range.
#[must_use]
pub fn absorption_spectrum(
    n: usize,
    lo: f64,
    hi: f64,
    lines: &[(f64, f64, f64)],
) -> (Vec<f64>, Vec<f64>) {
    #[allow(clippy::cast_precision_loss)]
    let step = (hi - lo) / (n.max(2) - 1) as f64;
    let mut wavelength = Vec::with_capacity(n);
    let mut flux = Vec::with_capacity(n);
    for i in 0..n {
        #[allow(clippy::cast_precision_loss)]
        let w = lo + step * i as f64;
        let mut f = 1.0;
        for (center, width, depth) in lines {
            let z = (w - center) / width;
            f -= depth * (-0.5 * z * z).exp();
        }
        wavelength.push(w);
        flux.push(f);
    }
    (wavelength, flux)
}

/// An absorption spectrum with deterministic pseudo-random noise
#[must_use]
pub fn noisy_spectrum(n: usize, lo: f64, hi: f64, noise: f64, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let (wavelength, mut flux) = absorption_spectrum(n, lo, hi, &[]);
    let mut rng = StdRng::seed_from_u64(seed);
    for f in &mut flux {
        *f += rng.random_range(-noise..noise);
    }
    (wavelength, flux)
}

/// Encode a series in the two-column text format [`ColumnTextDecoder`]
/// understands, with `# key: value` metadata headers
#[must_use]
pub fn encode_columns(wavelength: &[f64], flux: &[f64], meta: &[(&str, &str)]) -> Vec<u8> {
    let mut out = String::new();
    for (key, value) in meta {
        out.push_str(&format!("# {key}: {value}\n"));
    }
    for (w, f) in wavelength.iter().zip(flux) {
        out.push_str(&format!("{w} {f}\n"));
    }
    out.into_bytes()
}

/// Decoder for whitespace-separated two-column text payloads
///
/// Header lines start with `#` and carry `key: value` metadata
/// (wavelength/flux unit tags, label).
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnTextDecoder;

impl Decoder for ColumnTextDecoder {
    fn decode(&self, payload: &[u8], _hint: Option<&str>) -> Result<DecodedSeries, DecodeError> {
        let text =
            std::str::from_utf8(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let mut meta = BTreeMap::new();
        let mut wavelength = Vec::new();
        let mut flux = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix('#') {
                if let Some((key, value)) = rest.split_once(':') {
                    meta.insert(key.trim().to_string(), value.trim().to_string());
                }
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(w), Some(f)) = (parts.next(), parts.next()) else {
                return Err(DecodeError::Malformed(format!("bad line: {line}")));
            };
            wavelength.push(
                w.parse()
                    .map_err(|_| DecodeError::Malformed(line.to_string()))?,
            );
            flux.push(
                f.parse()
                    .map_err(|_| DecodeError::Malformed(line.to_string()))?,
            );
        }
        if wavelength.is_empty() {
            return Err(DecodeError::Malformed("no samples".to_string()));
        }
        Ok(DecodedSeries {
            wavelength,
            flux,
            meta,
        })
    }
}

/// Fetcher replaying scripted outcomes by target
///
/// Unknown targets report a `parse_error` failure, mirroring a provider
/// that answered with something unusable.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    responses: Mutex<BTreeMap<String, FetchOutcome>>,
}

impl ScriptedFetcher {
    /// Create an empty fetcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for a target
    pub fn script(&self, target: impl Into<String>, outcome: FetchOutcome) {
        self.responses
            .lock()
            .expect("fetcher script lock")
            .insert(target.into(), outcome);
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, target: &str, _params: &BTreeMap<String, String>) -> FetchOutcome {
        self.responses
            .lock()
            .expect("fetcher script lock")
            .get(target)
            .cloned()
            .unwrap_or_else(|| {
                FetchOutcome::failure(
                    spectra_ingest::FetchFailureKind::ParseError,
                    format!("no scripted response for {target}"),
                )
            })
    }
}

/// Directory-backed sink for exercising durable persistence in tests
///
/// Each `(scope, key)` pair is one file under a temporary directory that
/// is removed when the sink is dropped.
#[derive(Debug)]
pub struct DirSink {
    root: tempfile::TempDir,
}

impl DirSink {
    /// Create a sink over a fresh temporary directory
    ///
    /// # Panics
    /// Panics when the temporary directory cannot be created; tests have
    /// no sensible recovery from that.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create sink tempdir"),
        }
    }

    fn path_for(&self, scope: ScopeId, key: &str) -> PathBuf {
        let sanitized = key.replace(['/', '\\'], "_");
        self.root.path().join(format!("{scope}__{sanitized}"))
    }
}

impl Default for DirSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for DirSink {
    async fn put(&self, scope: ScopeId, key: &str, value: Vec<u8>) -> Result<(), SinkError> {
        std::fs::write(self.path_for(scope, key), value)
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }

    async fn get(&self, scope: ScopeId, key: &str) -> Result<Option<Vec<u8>>, SinkError> {
        let path = self.path_for(scope, key);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read(&path)
            .map(Some)
            .map_err(|e| SinkError::Unavailable(e.to_string()))
    }

    async fn purge(&self, scope: ScopeId) -> Result<(), SinkError> {
        let prefix = format!("{scope}__");
        let entries = std::fs::read_dir(self.root.path())
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        for entry in entries.flatten() {
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(&prefix)
            {
                std::fs::remove_file(entry.path())
                    .map_err(|e| SinkError::Unavailable(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorption_spectrum_dips_at_line_centers() {
        let (w, f) = absorption_spectrum(1001, 400.0, 700.0, &[(550.0, 2.0, 0.8)]);
        let center_idx = w
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - 550.0).abs().total_cmp(&(*b - 550.0).abs()))
            .map(|(i, _)| i)
            .unwrap();
        assert!(f[center_idx] < 0.3);
        assert!((f[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn encode_decode_round_trip() {
        let (w, f) = absorption_spectrum(50, 500.0, 510.0, &[]);
        let payload = encode_columns(&w, &f, &[("wavelength_unit", "nm"), ("label", "fixture")]);

        let decoded = ColumnTextDecoder.decode(&payload, None).unwrap();
        assert_eq!(decoded.wavelength.len(), 50);
        assert_eq!(decoded.meta.get("label").unwrap(), "fixture");
    }

    #[test]
    fn noisy_spectrum_is_deterministic_per_seed() {
        let (_, a) = noisy_spectrum(100, 500.0, 510.0, 0.01, 42);
        let (_, b) = noisy_spectrum(100, 500.0, 510.0, 0.01, 42);
        let (_, c) = noisy_spectrum(100, 500.0, 510.0, 0.01, 7);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
