//! Viewport cropping

/// Crop a series to the inclusive wavelength range `[lo, hi]`
///
/// Returns empty sequences (not an error) when `lo > hi` or the range
/// excludes every point. Sample order is preserved.
#[must_use]
pub fn crop_to_viewport(
    wavelength: &[f64],
    flux: &[f64],
    lo: f64,
    hi: f64,
) -> (Vec<f64>, Vec<f64>) {
    if lo > hi {
        return (Vec::new(), Vec::new());
    }
    let mut w_out = Vec::new();
    let mut f_out = Vec::new();
    for (w, f) in wavelength.iter().zip(flux.iter()) {
        if *w >= lo && *w <= hi {
            w_out.push(*w);
            f_out.push(*f);
        }
    }
    (w_out, f_out)
}
