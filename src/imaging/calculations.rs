//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Fit `source` inside the `max` bounding box, preserving aspect ratio.
///
/// Sources that already fit are returned unchanged (never upscaled).
/// Otherwise the longer side is pinned to its bound first, then the result is
/// clamped again against the other bound, which catches extreme aspect ratios
/// where the first pass still overflows. Rounding happens once, at the end.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `max` - Bounding box (max width, max height)
///
/// # Returns
/// * `(width, height)` - Output dimensions, each at least 1
///
/// # Examples
/// ```
/// # use catalog_images::imaging::fit_within_bounds;
/// // Portrait camera shot into a 1200 box: height limits the scale
/// assert_eq!(fit_within_bounds((2000, 3000), (1200, 1200)), (800, 1200));
///
/// // Already small enough: untouched
/// assert_eq!(fit_within_bounds((640, 480), (1200, 1200)), (640, 480));
/// ```
pub fn fit_within_bounds(source: (u32, u32), max: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = max;

    if src_w <= max_w && src_h <= max_h {
        return (src_w, src_h);
    }

    let max_w = max_w as f64;
    let max_h = max_h as f64;
    let aspect = src_w as f64 / src_h as f64;

    let (mut w, mut h) = if src_w > src_h {
        (max_w, max_w / aspect)
    } else {
        (max_h * aspect, max_h)
    };

    // Second pass against the opposite bound
    if w > max_w {
        w = max_w;
        h = w / aspect;
    }
    if h > max_h {
        h = max_h;
        w = h * aspect;
    }

    (round_dimension(w), round_dimension(h))
}

/// Round to the nearest pixel, never below 1.
fn round_dimension(value: f64) -> u32 {
    (value.round() as u32).max(1)
}
