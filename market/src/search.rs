//! Binary search helpers over sorted timestamp slices.

/// First index `i` such that `x[i] >= value`.
pub fn searchsorted_left(x: &[f64], value: f64) -> usize {
    x.partition_point(|v| *v < value)
}

/// First index `i` such that `x[i] > value`.
pub fn searchsorted_right(x: &[f64], value: f64) -> usize {
    x.partition_point(|v| *v <= value)
}

/// Index window `[lo, hi)` covering `[x_lo, x_hi]`, including one point before
/// the left edge so a segment entering the window is not lost.
///
/// `lo` is clamped to zero.
pub fn find_idx_filters(x: &[f64], x_lo: f64, x_hi: f64) -> (usize, usize) {
    let lo = searchsorted_right(x, x_lo).saturating_sub(1);
    let hi = searchsorted_left(x, x_hi);
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: [f64; 5] = [0.0, 10.0, 20.0, 30.0, 40.0];

    #[test]
    fn left_and_right_differ_on_exact_hits() {
        assert_eq!(searchsorted_left(&X, 20.0), 2);
        assert_eq!(searchsorted_right(&X, 20.0), 3);
    }

    #[test]
    fn window_includes_one_point_before_left_edge() {
        // searchsorted_right(15) - 1 = 1, searchsorted_left(35) = 4
        assert_eq!(find_idx_filters(&X, 15.0, 35.0), (1, 4));
    }

    #[test]
    fn window_left_edge_clamps_to_zero() {
        assert_eq!(find_idx_filters(&X, -5.0, 10.0), (0, 1));
    }

    #[test]
    fn window_right_edge_on_exact_hit_is_excluded() {
        assert_eq!(find_idx_filters(&X, 10.0, 30.0), (1, 3));
    }
}
