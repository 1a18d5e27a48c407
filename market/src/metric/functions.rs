//! Scalar price and spread transforms.
//!
//! Every return transform takes the reference price first. A zero or
//! non-finite reference yields `NaN`: callers render a gap instead of failing.

pub fn mid(bid: f64, ask: f64) -> f64 {
    0.5 * (bid + ask)
}

pub fn spread(bid: f64, ask: f64) -> f64 {
    ask - bid
}

pub fn decimal_spread(bid: f64, ask: f64) -> f64 {
    let denom = bid + ask;
    if denom == 0.0 || !denom.is_finite() {
        return f64::NAN;
    }
    2.0 * (ask - bid) / denom
}

pub fn pct_spread(bid: f64, ask: f64) -> f64 {
    100.0 * decimal_spread(bid, ask)
}

#[inline]
fn usable_reference(reference: f64) -> bool {
    reference != 0.0 && reference.is_finite()
}

/// `v / reference - 1`
pub fn returns(reference: f64, v: f64) -> f64 {
    if !usable_reference(reference) {
        return f64::NAN;
    }
    v / reference - 1.0
}

pub fn returns_reverse(reference: f64, r: f64) -> f64 {
    reference * (1.0 + r)
}

/// `100 * (v / reference - 1)`
pub fn pct_returns(reference: f64, v: f64) -> f64 {
    100.0 * returns(reference, v)
}

pub fn pct_returns_reverse(reference: f64, r: f64) -> f64 {
    reference * (1.0 + r / 100.0)
}

/// `ln(v / reference)`
pub fn log_returns(reference: f64, v: f64) -> f64 {
    if !usable_reference(reference) {
        return f64::NAN;
    }
    (v / reference).ln()
}

pub fn log_returns_reverse(reference: f64, r: f64) -> f64 {
    reference * r.exp()
}

/// Round to `decimals` places, ties to even.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_transforms_against_reference() {
        assert!((returns(100.0, 101.0) - 0.01).abs() < 1e-12);
        assert!((pct_returns(100.0, 101.0) - 1.0).abs() < 1e-12);
        assert!((log_returns(100.0, 100.0)).abs() < 1e-12);
    }

    #[test]
    fn zero_or_nan_reference_propagates_nan() {
        assert!(returns(0.0, 1.0).is_nan());
        assert!(pct_returns(f64::NAN, 1.0).is_nan());
        assert!(log_returns(0.0, 1.0).is_nan());
        assert!(decimal_spread(0.0, 0.0).is_nan());
    }

    #[test]
    fn reverse_transforms_recover_price() {
        let p = 4_321.5;
        let r = pct_returns(4_000.0, p);
        assert!((pct_returns_reverse(4_000.0, r) - p).abs() < 1e-9);

        let l = log_returns(4_000.0, p);
        assert!((log_returns_reverse(4_000.0, l) - p).abs() < 1e-9);
    }

    #[test]
    fn spread_variants() {
        assert_eq!(spread(99.0, 101.0), 2.0);
        assert!((decimal_spread(99.0, 101.0) - 0.02).abs() < 1e-12);
        assert!((pct_spread(99.0, 101.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn rounding_to_decimals() {
        assert_eq!(round_to(0.123456, 5), 0.12346);
        assert_eq!(round_to(2.675, 2), 2.67);
    }

    #[test]
    fn rounding_ties_go_to_even() {
        assert_eq!(round_to(0.5, 0), 0.0);
        assert_eq!(round_to(1.5, 0), 2.0);
        assert_eq!(round_to(-2.5, 0), -2.0);
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
    }
}
