//! Native resolution estimation
//!
//! The median wavelength step of a series, used to pick sensible shared
//! grid densities. Duplicate and unsorted samples would otherwise produce
//! zero or negative deltas and poison downstream divisions.

/// Estimate the native wavelength resolution of a series
///
/// Sorts the finite samples, computes successive deltas, discards
/// non-positive deltas (duplicates, unsorted noise), and returns the
/// median of what remains. Returns `None` when fewer than two valid
/// deltas remain.
#[must_use]
pub fn estimate_native_resolution(wavelength: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = wavelength.iter().copied().filter(|w| w.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    let mut deltas: Vec<f64> = sorted.windows(2).map(|p| p[1] - p[0]).filter(|d| *d > 0.0).collect();
    if deltas.len() < 2 {
        return None;
    }
    deltas.sort_by(f64::total_cmp);

    let mid = deltas.len() / 2;
    if deltas.len() % 2 == 1 {
        Some(deltas[mid])
    } else {
        Some((deltas[mid - 1] + deltas[mid]) / 2.0)
    }
}
