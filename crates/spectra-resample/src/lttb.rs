//! Largest-Triangle-Three-Buckets downsampling
//!
//! Reduces a series to a target point count while preserving visual
//! shape: the first and last points are always retained, and each
//! interior bucket keeps the point forming the largest triangle with the
//! previously selected point and the average of the next bucket.

/// Downsample a series to at most `target` points
///
/// Identity when `wavelength.len() <= target`, so repeated application is
/// idempotent. Tolerates non-uniform sampling and duplicate x-values; on
/// equal triangle areas the first occurrence in the bucket wins.
#[must_use]
pub fn downsample(wavelength: &[f64], flux: &[f64], target: usize) -> (Vec<f64>, Vec<f64>) {
    let n = wavelength.len().min(flux.len());
    if n <= target {
        return (wavelength[..n].to_vec(), flux[..n].to_vec());
    }
    match target {
        0 => return (Vec::new(), Vec::new()),
        1 => return (vec![wavelength[0]], vec![flux[0]]),
        2 => {
            return (
                vec![wavelength[0], wavelength[n - 1]],
                vec![flux[0], flux[n - 1]],
            )
        }
        _ => {}
    }

    let mut out_w = Vec::with_capacity(target);
    let mut out_f = Vec::with_capacity(target);
    out_w.push(wavelength[0]);
    out_f.push(flux[0]);

    // Interior points are split into target - 2 buckets over [1, n - 1).
    let bucket_count = target - 2;
    #[allow(clippy::cast_precision_loss)]
    let every = (n - 2) as f64 / bucket_count as f64;
    let mut selected = 0usize;

    for bucket in 0..bucket_count {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let range_start = ((bucket as f64 * every).floor() as usize) + 1;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let range_end = (((bucket + 1) as f64 * every).floor() as usize + 1).min(n - 1);

        // Anchor: average of the next bucket, or the last point when the
        // next bucket is empty.
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let next_start = (((bucket + 1) as f64 * every).floor() as usize + 1).min(n - 1);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let next_end = (((bucket + 2) as f64 * every).floor() as usize + 1).min(n);
        let (avg_w, avg_f) = if next_start < next_end {
            let len = (next_end - next_start) as f64;
            let sum_w: f64 = wavelength[next_start..next_end].iter().sum();
            let sum_f: f64 = flux[next_start..next_end].iter().sum();
            (sum_w / len, sum_f / len)
        } else {
            (wavelength[n - 1], flux[n - 1])
        };

        let base_w = wavelength[selected];
        let base_f = flux[selected];
        let mut best_idx = range_start;
        let mut best_area = -1.0f64;
        for j in range_start..range_end.max(range_start + 1) {
            let area = ((base_w - avg_w) * (flux[j] - base_f)
                - (base_w - wavelength[j]) * (avg_f - base_f))
                .abs();
            // Strict comparison keeps the first occurrence on ties.
            if area > best_area {
                best_area = area;
                best_idx = j;
            }
        }

        out_w.push(wavelength[best_idx]);
        out_f.push(flux[best_idx]);
        selected = best_idx;
    }

    out_w.push(wavelength[n - 1]);
    out_f.push(flux[n - 1]);
    (out_w, out_f)
}
