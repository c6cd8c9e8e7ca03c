//! Shared-grid interpolation
//!
//! Two traces are comparable only on a common wavelength sampling. The
//! shared grid spans the overlap of both ranges; both traces are linearly
//! interpolated onto it.

use crate::ResampleError;

/// Resample two traces onto a common evenly spaced grid
///
/// The grid covers `[max(min_a, min_b), min(max_a, max_b)]` with
/// `n_samples` points (clamped to at least 2, or 1 when the overlap is a
/// single wavelength). Inputs are expected in ascending order, as stored
/// by the registry.
///
/// # Errors
/// [`ResampleError::NoOverlap`] when the ranges do not intersect;
/// [`ResampleError::EmptySeries`] when either series is empty.
pub fn shared_grid(
    wave_a: &[f64],
    flux_a: &[f64],
    wave_b: &[f64],
    flux_b: &[f64],
    n_samples: usize,
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>), ResampleError> {
    let (min_a, max_a) = bounds(wave_a)?;
    let (min_b, max_b) = bounds(wave_b)?;

    let lo = min_a.max(min_b);
    let hi = max_a.min(max_b);
    if lo > hi {
        return Err(ResampleError::NoOverlap {
            min_a,
            max_a,
            min_b,
            max_b,
        });
    }

    let grid = if hi == lo {
        vec![lo]
    } else {
        let n = n_samples.max(2);
        #[allow(clippy::cast_precision_loss)]
        let step = (hi - lo) / (n - 1) as f64;
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x = lo + step * i as f64;
                // Guard the final point against accumulation drift.
                x.min(hi)
            })
            .collect()
    };

    let fa = grid.iter().map(|x| interpolate(wave_a, flux_a, *x)).collect();
    let fb = grid.iter().map(|x| interpolate(wave_b, flux_b, *x)).collect();
    Ok((grid, fa, fb))
}

fn bounds(wavelength: &[f64]) -> Result<(f64, f64), ResampleError> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for w in wavelength {
        if w.is_finite() {
            min = min.min(*w);
            max = max.max(*w);
        }
    }
    if min > max {
        return Err(ResampleError::EmptySeries);
    }
    Ok((min, max))
}

/// Linear interpolation at `x` over an ascending series
///
/// Clamps to the boundary samples outside the covered range; exact on
/// grid points.
fn interpolate(wavelength: &[f64], flux: &[f64], x: f64) -> f64 {
    let n = wavelength.len();
    if x <= wavelength[0] {
        return flux[0];
    }
    if x >= wavelength[n - 1] {
        return flux[n - 1];
    }
    let upper = wavelength.partition_point(|w| *w < x);
    let (w0, w1) = (wavelength[upper - 1], wavelength[upper]);
    let (f0, f1) = (flux[upper - 1], flux[upper]);
    if w1 == w0 {
        return f0;
    }
    f0 + (f1 - f0) * (x - w0) / (w1 - w0)
}
