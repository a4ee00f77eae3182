//! Ratio mapping between absolute scroll offsets and normalized positions.
//!
//! A ratio of `0.0` is the top, `1.0` is fully scrolled to the bottom. Both
//! directions are total: degenerate extents (content no taller than the
//! viewport, negative or non-finite values) map to `0.0` instead of dividing
//! by zero or producing `NaN`.

/// Normalized position of `scroll_offset` within the scrollable range
/// `content_extent - viewport_extent`, clamped to `[0, 1]`.
pub fn compute_ratio(scroll_offset: f64, content_extent: f64, viewport_extent: f64) -> f64 {
    let scroll_height = content_extent - viewport_extent;
    if !scroll_height.is_finite() || scroll_height <= 0.0 || !scroll_offset.is_finite() {
        return 0.0;
    }
    (scroll_offset / scroll_height).clamp(0.0, 1.0)
}

/// Offset that places a pane with the given extents at `ratio`, clamped to
/// `[0, content_extent - viewport_extent]`.
pub fn apply_ratio(ratio: f64, content_extent: f64, viewport_extent: f64) -> f64 {
    let scroll_height = content_extent - viewport_extent;
    if !scroll_height.is_finite() || scroll_height <= 0.0 || !ratio.is_finite() {
        return 0.0;
    }
    (ratio * scroll_height).clamp(0.0, scroll_height)
}
