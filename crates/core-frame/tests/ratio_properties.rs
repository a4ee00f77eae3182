//! Property-based tests for the offset <-> ratio mapping.

use core_frame::{ScrollMetrics, apply_ratio, compute_ratio};
use proptest::prelude::*;

proptest! {
    // apply(compute(offset)) reproduces any in-range offset
    #[test]
    fn round_trip_reproduces_offset(
        viewport in 1.0f64..5_000.0,
        extra in 1.0f64..100_000.0,
        frac in 0.0f64..=1.0,
    ) {
        let content = viewport + extra;
        let offset = frac * extra;
        let ratio = compute_ratio(offset, content, viewport);
        let back = apply_ratio(ratio, content, viewport);
        prop_assert!((back - offset).abs() <= 1e-6 * extra.max(1.0));
    }

    // Content no taller than the viewport always maps to the top
    #[test]
    fn no_scroll_range_is_exactly_zero(
        content in 0.0f64..5_000.0,
        slack in 0.0f64..5_000.0,
        offset in -10_000.0f64..10_000.0,
    ) {
        let viewport = content + slack;
        prop_assert_eq!(compute_ratio(offset, content, viewport), 0.0);
    }

    #[test]
    fn ratio_always_in_unit_interval(
        offset in -1e6f64..1e6,
        content in -1e6f64..1e6,
        viewport in -1e6f64..1e6,
    ) {
        let r = compute_ratio(offset, content, viewport);
        prop_assert!((0.0..=1.0).contains(&r));
    }

    // Same ratio on panes of different sizes lands on the same relative spot
    #[test]
    fn proportional_between_panes(
        a_extra in 1.0f64..50_000.0,
        b_extra in 1.0f64..50_000.0,
        frac in 0.0f64..=1.0,
    ) {
        let a = ScrollMetrics::new(frac * a_extra, 1000.0 + a_extra, 1000.0);
        let b_offset = apply_ratio(a.ratio(), 500.0 + b_extra, 500.0);
        prop_assert!((b_offset / b_extra - frac).abs() <= 1e-9);
    }
}
