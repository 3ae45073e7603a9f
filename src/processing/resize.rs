//! Bounded downscaling

use image::imageops::FilterType;

use crate::config::ResizeSpec;

/// Resampling filter used for every downscale
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Compute the output size for `(width, height)` under `spec`.
///
/// Returns `None` when no enforced bound is exceeded. Otherwise the uniform
/// scale is the smallest ratio among the enforced bounds, never above 1.0,
/// and each dimension is truncated with a floor of one pixel.
pub fn compute_target_dimensions(width: u32, height: u32, spec: &ResizeSpec) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }

    let height_exceeded = spec.enforce_height && height > spec.max_height;
    let width_exceeded = spec.enforce_width && width > spec.max_width;
    if !height_exceeded && !width_exceeded {
        return None;
    }

    let mut scale = 1.0_f64;
    if spec.enforce_height {
        scale = scale.min(f64::from(spec.max_height) / f64::from(height));
    }
    if spec.enforce_width {
        scale = scale.min(f64::from(spec.max_width) / f64::from(width));
    }

    // epsilon keeps an exact bound from truncating to bound - 1
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = |dim: u32| ((f64::from(dim) * scale + 1e-9) as u32).max(1);

    Some((scaled(width), scaled(height)))
}
