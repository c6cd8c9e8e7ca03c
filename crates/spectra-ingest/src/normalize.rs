//! Payload normalization
//!
//! Converts a decoded series to canonical form: nanometer wavelengths,
//! ascending order, finite samples only, flux units resolved. Absorbance
//! payloads missing their conversion parameters do not fail; they report
//! the missing names so the job can suspend and resume.

use std::collections::BTreeMap;

use spectra_model::{Direction, FluxUnit, WavelengthUnit};

use crate::capability::DecodedSeries;
use crate::config::PipelineConfig;

/// Errors raised by normalization
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The decoder reported a wavelength unit tag nobody understands
    #[error("unknown wavelength unit: {0}")]
    UnknownWavelengthUnit(String),

    /// The decoder reported a flux unit tag nobody understands
    #[error("unknown flux unit: {0}")]
    UnknownFluxUnit(String),

    /// Filtering non-finite samples left nothing to register
    #[error("no finite samples after filtering")]
    EmptyAfterFiltering,

    /// A supplied conversion parameter is not a usable number
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Rejected value
        value: String,
    },
}

/// A series in canonical form, ready for fingerprinting
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    /// Wavelengths in nanometers, strictly ascending
    pub wavelength: Vec<f64>,
    /// Flux samples, pairwise with `wavelength`
    pub flux: Vec<f64>,
    /// Always [`WavelengthUnit::Nanometer`] after normalization
    pub wavelength_unit: WavelengthUnit,
    /// Resolved flux unit
    pub flux_unit: FluxUnit,
    /// Direction the payload arrived in
    pub direction: Direction,
    /// Every conversion parameter used, for provenance
    pub conversion_parameters: BTreeMap<String, String>,
    /// Samples dropped as non-finite or duplicate wavelengths
    pub dropped_samples: usize,
}

/// Result of normalization
#[derive(Debug)]
pub enum NormalizeOutcome {
    /// Canonical payload ready for fingerprinting and registration
    Ready(Box<NormalizedPayload>),
    /// Conversion needs user input before it can proceed
    MissingParameters(Vec<String>),
}

/// Normalize a decoded series
///
/// # Errors
/// Returns [`NormalizeError`] for unusable unit tags, empty results, or
/// malformed parameter values. Missing absorbance parameters are not an
/// error; they yield [`NormalizeOutcome::MissingParameters`].
pub fn normalize(
    series: &DecodedSeries,
    params: &BTreeMap<String, String>,
    config: &PipelineConfig,
) -> Result<NormalizeOutcome, NormalizeError> {
    let wavelength_unit = match series.meta.get(DecodedSeries::META_WAVELENGTH_UNIT) {
        Some(tag) => WavelengthUnit::parse(tag)
            .ok_or_else(|| NormalizeError::UnknownWavelengthUnit(tag.clone()))?,
        None => WavelengthUnit::Nanometer,
    };
    let flux_unit = match series.meta.get(DecodedSeries::META_FLUX_UNIT) {
        Some(tag) => {
            FluxUnit::parse(tag).ok_or_else(|| NormalizeError::UnknownFluxUnit(tag.clone()))?
        }
        None => FluxUnit::Raw,
    };

    // Absorbance needs its conversion parameters before anything is
    // registered; report what is missing so the job can suspend.
    let mut conversion_parameters = BTreeMap::new();
    let mut flux_divisor = 1.0f64;
    let resolved_flux_unit = if flux_unit == FluxUnit::AbsorptionPending {
        let missing: Vec<String> = config
            .absorption_params
            .iter()
            .filter(|name| !params.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Ok(NormalizeOutcome::MissingParameters(missing));
        }
        for name in &config.absorption_params {
            let value = &params[name];
            let parsed: f64 = value.parse().map_err(|_| NormalizeError::InvalidParameter {
                name: name.clone(),
                value: value.clone(),
            })?;
            if !parsed.is_finite() || parsed <= 0.0 {
                return Err(NormalizeError::InvalidParameter {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
            flux_divisor *= parsed;
            conversion_parameters.insert(name.clone(), value.clone());
        }
        FluxUnit::AbsorptionCoefficient
    } else {
        flux_unit
    };

    // Pairwise filter, then convert to nanometers.
    let total = series.wavelength.len().min(series.flux.len());
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(total);
    for (w, f) in series.wavelength[..total].iter().zip(&series.flux[..total]) {
        if w.is_finite() && f.is_finite() {
            let nm = wavelength_unit.to_nanometers(*w);
            if nm.is_finite() {
                pairs.push((nm, *f / flux_divisor));
            }
        }
    }
    if pairs.is_empty() {
        return Err(NormalizeError::EmptyAfterFiltering);
    }

    let direction = if pairs.last().unwrap_or(&(0.0, 0.0)).0 >= pairs[0].0 {
        Direction::Ascending
    } else {
        Direction::Descending
    };

    // Canonical order: ascending, duplicates collapsed to the first
    // occurrence. The stable sort keeps arrival order among equals.
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut wavelength = Vec::with_capacity(pairs.len());
    let mut flux = Vec::with_capacity(pairs.len());
    for (w, f) in &pairs {
        if wavelength.last().map_or(true, |last| *w > *last) {
            wavelength.push(*w);
            flux.push(*f);
        }
    }

    let dropped_samples = total - wavelength.len();
    conversion_parameters.insert(
        "source_wavelength_unit".to_string(),
        wavelength_unit.tag().to_string(),
    );
    conversion_parameters.insert("dropped_samples".to_string(), dropped_samples.to_string());

    Ok(NormalizeOutcome::Ready(Box::new(NormalizedPayload {
        wavelength,
        flux,
        wavelength_unit: WavelengthUnit::Nanometer,
        flux_unit: resolved_flux_unit,
        direction,
        conversion_parameters,
        dropped_samples,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(w: Vec<f64>, f: Vec<f64>, meta: &[(&str, &str)]) -> DecodedSeries {
        DecodedSeries {
            wavelength: w,
            flux: f,
            meta: meta
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    fn ready(outcome: NormalizeOutcome) -> NormalizedPayload {
        match outcome {
            NormalizeOutcome::Ready(payload) => *payload,
            NormalizeOutcome::MissingParameters(missing) => {
                panic!("unexpected missing parameters: {missing:?}")
            }
        }
    }

    #[test]
    fn angstroms_convert_to_nanometers() {
        let input = series(
            vec![5000.0, 5010.0],
            vec![1.0, 2.0],
            &[("wavelength_unit", "angstrom")],
        );
        let payload = ready(normalize(&input, &BTreeMap::new(), &PipelineConfig::default()).unwrap());
        assert_eq!(payload.wavelength, [500.0, 501.0]);
        assert_eq!(payload.wavelength_unit, WavelengthUnit::Nanometer);
    }

    #[test]
    fn wavenumbers_flip_direction_and_resort() {
        // Ascending wavenumbers are descending wavelengths.
        let input = series(
            vec![20_000.0, 25_000.0],
            vec![1.0, 2.0],
            &[("wavelength_unit", "cm-1")],
        );
        let payload = ready(normalize(&input, &BTreeMap::new(), &PipelineConfig::default()).unwrap());
        assert_eq!(payload.direction, Direction::Descending);
        assert!(payload.wavelength[0] < payload.wavelength[1]);
        // 25000 cm^-1 = 400 nm pairs with flux 2.0 after the resort.
        assert!((payload.wavelength[0] - 400.0).abs() < 1e-9);
        assert_eq!(payload.flux[0], 2.0);
    }

    #[test]
    fn non_finite_pairs_are_dropped() {
        let input = series(
            vec![500.0, f64::NAN, 501.0, 502.0],
            vec![1.0, 2.0, f64::INFINITY, 3.0],
            &[],
        );
        let payload = ready(normalize(&input, &BTreeMap::new(), &PipelineConfig::default()).unwrap());
        assert_eq!(payload.wavelength, [500.0, 502.0]);
        assert_eq!(payload.flux, [1.0, 3.0]);
        assert_eq!(payload.dropped_samples, 2);
    }

    #[test]
    fn duplicate_wavelengths_keep_first_occurrence() {
        let input = series(vec![500.0, 500.0, 501.0], vec![1.0, 9.0, 2.0], &[]);
        let payload = ready(normalize(&input, &BTreeMap::new(), &PipelineConfig::default()).unwrap());
        assert_eq!(payload.wavelength, [500.0, 501.0]);
        assert_eq!(payload.flux, [1.0, 2.0]);
        assert_eq!(payload.dropped_samples, 1);
    }

    #[test]
    fn all_non_finite_is_rejected() {
        let input = series(vec![f64::NAN, f64::NAN], vec![1.0, 2.0], &[]);
        let result = normalize(&input, &BTreeMap::new(), &PipelineConfig::default());
        assert!(matches!(result, Err(NormalizeError::EmptyAfterFiltering)));
    }

    #[test]
    fn unknown_unit_tags_are_rejected() {
        let input = series(vec![500.0], vec![1.0], &[("wavelength_unit", "furlong")]);
        assert!(matches!(
            normalize(&input, &BTreeMap::new(), &PipelineConfig::default()),
            Err(NormalizeError::UnknownWavelengthUnit(_))
        ));
    }

    #[test]
    fn absorbance_without_params_reports_missing() {
        let input = series(
            vec![500.0, 501.0],
            vec![0.5, 0.6],
            &[("flux_unit", "absorption-pending")],
        );
        let outcome = normalize(&input, &BTreeMap::new(), &PipelineConfig::default()).unwrap();
        match outcome {
            NormalizeOutcome::MissingParameters(missing) => {
                assert_eq!(missing, ["path_length_cm", "mole_fraction"]);
            }
            NormalizeOutcome::Ready(_) => panic!("expected suspension"),
        }
    }

    #[test]
    fn absorbance_with_params_converts() {
        let input = series(
            vec![500.0, 501.0],
            vec![2.0, 4.0],
            &[("flux_unit", "absorption-pending")],
        );
        let mut params = BTreeMap::new();
        params.insert("path_length_cm".to_string(), "10".to_string());
        params.insert("mole_fraction".to_string(), "0.5".to_string());

        let payload = ready(normalize(&input, &params, &PipelineConfig::default()).unwrap());
        assert_eq!(payload.flux_unit, FluxUnit::AbsorptionCoefficient);
        // 2.0 / (10 * 0.5)
        assert!((payload.flux[0] - 0.4).abs() < 1e-12);
        assert_eq!(
            payload.conversion_parameters.get("path_length_cm").unwrap(),
            "10"
        );
    }

    #[test]
    fn unparseable_parameter_is_an_error() {
        let input = series(
            vec![500.0],
            vec![2.0],
            &[("flux_unit", "absorption-pending")],
        );
        let mut params = BTreeMap::new();
        params.insert("path_length_cm".to_string(), "ten".to_string());
        params.insert("mole_fraction".to_string(), "0.5".to_string());

        assert!(matches!(
            normalize(&input, &params, &PipelineConfig::default()),
            Err(NormalizeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn unit_equivalent_payloads_normalize_identically() {
        let nm = series(vec![500.0, 501.0], vec![1.0, 2.0], &[("wavelength_unit", "nm")]);
        let angstrom = series(
            vec![5000.0, 5010.0],
            vec![1.0, 2.0],
            &[("wavelength_unit", "angstrom")],
        );
        let config = PipelineConfig::default();
        let a = ready(normalize(&nm, &BTreeMap::new(), &config).unwrap());
        let b = ready(normalize(&angstrom, &BTreeMap::new(), &config).unwrap());
        assert_eq!(a.wavelength, b.wavelength);
        assert_eq!(a.flux, b.flux);
        assert_eq!(a.flux_unit, b.flux_unit);
    }
}
