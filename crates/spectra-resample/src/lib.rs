//! Pure resampling primitives
//!
//! Stateless numerical operations over raw wavelength/flux arrays:
//! - Viewport cropping
//! - Largest-Triangle-Three-Buckets downsampling
//! - Shared-grid interpolation for pairwise comparison
//! - Native resolution estimation
//!
//! Nothing here touches the registry; callers pass slices and own the
//! returned vectors.

mod grid;
mod lttb;
mod resolution;
mod viewport;

pub use grid::shared_grid;
pub use lttb::downsample;
pub use resolution::estimate_native_resolution;
pub use viewport::crop_to_viewport;

/// Errors raised by resampling operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResampleError {
    /// The two traces' wavelength ranges do not intersect
    #[error("wavelength ranges do not overlap: [{min_a}, {max_a}] vs [{min_b}, {max_b}]")]
    NoOverlap {
        /// First trace lower bound
        min_a: f64,
        /// First trace upper bound
        max_a: f64,
        /// Second trace lower bound
        min_b: f64,
        /// Second trace upper bound
        max_b: f64,
    },

    /// A series held no finite samples
    #[error("series contains no finite samples")]
    EmptySeries,
}
