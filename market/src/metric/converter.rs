use serde::{Deserialize, Serialize};

use super::functions::{
    decimal_spread, log_returns, log_returns_reverse, mid, pct_returns, pct_returns_reverse,
    pct_spread, returns, returns_reverse, spread,
};
use crate::error::MarketError;

/// Display scale of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    Base,
    Decimal,
    Pct,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Stored as mid price, displayed relative to `static_param`.
    Price,
    /// Stored already in the selected spread scale; display is identity.
    Spread,
    /// Identity.
    Null,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Price => "price",
            MetricKind::Spread => "spread",
            MetricKind::Null => "null",
        }
    }
}

/// Maps raw bid/ask data onto a displayed metric.
///
/// Two independent axes: `scale` picks the transform, `static_param` is the
/// rebase anchor. Display is a pure function of `(static_param, raw)`, so a
/// bulk recompute after a scale or anchor change is identical to replaying
/// every tick with the same settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricConverter {
    kind: MetricKind,
    scale: Scale,
    static_param: f64,
}

impl MetricConverter {
    pub fn price(static_param: f64) -> Self {
        Self {
            kind: MetricKind::Price,
            scale: Scale::Base,
            static_param,
        }
    }

    /// Price converter anchored on the first mid of `bid`/`ask`.
    pub fn price_from_quotes(bid: &[f64], ask: &[f64]) -> Self {
        let anchor = match (bid.first(), ask.first()) {
            (Some(b), Some(a)) => mid(*b, *a),
            _ => f64::NAN,
        };
        Self::price(anchor)
    }

    pub fn spread() -> Self {
        Self {
            kind: MetricKind::Spread,
            scale: Scale::Base,
            static_param: f64::NAN,
        }
    }

    pub fn null() -> Self {
        Self {
            kind: MetricKind::Null,
            scale: Scale::Base,
            static_param: f64::NAN,
        }
    }

    pub fn with_scale(mut self, scale: Scale) -> Result<Self, MarketError> {
        self.change_scale(scale)?;
        Ok(self)
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn static_param(&self) -> f64 {
        self.static_param
    }

    /// Raw stored value for one bid/ask observation.
    pub fn ingest(&self, bid: f64, ask: f64) -> f64 {
        match self.kind {
            MetricKind::Price | MetricKind::Null => mid(bid, ask),
            MetricKind::Spread => match self.scale {
                Scale::Base => spread(bid, ask),
                Scale::Decimal => decimal_spread(bid, ask),
                Scale::Pct => pct_spread(bid, ask),
                Scale::Log => f64::NAN,
            },
        }
    }

    /// Displayed value of `raw` against the anchor `static_param`.
    pub fn convert_to_display(&self, static_param: f64, raw: f64) -> f64 {
        match (self.kind, self.scale) {
            (MetricKind::Price, Scale::Base) => raw,
            (MetricKind::Price, Scale::Decimal) => returns(static_param, raw),
            (MetricKind::Price, Scale::Pct) => pct_returns(static_param, raw),
            (MetricKind::Price, Scale::Log) => log_returns(static_param, raw),
            (MetricKind::Spread, _) | (MetricKind::Null, _) => raw,
        }
    }

    /// Display against the converter's own anchor.
    pub fn display(&self, raw: f64) -> f64 {
        self.convert_to_display(self.static_param, raw)
    }

    pub fn display_all(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter().map(|v| self.display(*v)).collect()
    }

    /// Map a displayed value back onto the raw (price) axis.
    pub fn reverse(&self, static_param: f64, displayed: f64) -> f64 {
        match (self.kind, self.scale) {
            (MetricKind::Price, Scale::Decimal) => returns_reverse(static_param, displayed),
            (MetricKind::Price, Scale::Pct) => pct_returns_reverse(static_param, displayed),
            (MetricKind::Price, Scale::Log) => log_returns_reverse(static_param, displayed),
            _ => displayed,
        }
    }

    /// Swap the transform. `static_param` is untouched.
    pub fn change_scale(&mut self, scale: Scale) -> Result<(), MarketError> {
        if self.kind == MetricKind::Spread && scale == Scale::Log {
            return Err(MarketError::UnsupportedScale {
                metric: self.kind.as_str(),
                scale,
            });
        }
        self.scale = scale;
        Ok(())
    }

    pub fn change_static_param(&mut self, value: f64) {
        self.static_param = value;
    }

    /// Spread series store scaled values, so a scale change means re-ingesting
    /// from the source bid/ask.
    pub fn reingest_on_scale_change(&self) -> bool {
        self.kind == MetricKind::Spread
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_scales() {
        let mut c = MetricConverter::price(100.0);
        assert_eq!(c.display(110.0), 110.0);

        c.change_scale(Scale::Decimal).unwrap();
        assert!((c.display(110.0) - 0.1).abs() < 1e-12);

        c.change_scale(Scale::Pct).unwrap();
        assert!((c.display(110.0) - 10.0).abs() < 1e-9);

        c.change_scale(Scale::Log).unwrap();
        assert!((c.display(110.0) - 1.1f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn change_scale_keeps_static_param() {
        let mut c = MetricConverter::price(123.0);
        c.change_scale(Scale::Pct).unwrap();
        c.change_scale(Scale::Log).unwrap();
        assert_eq!(c.static_param(), 123.0);
    }

    #[test]
    fn decimal_pct_decimal_round_trip_is_exact() {
        let raw = [101.0, 99.5, 100.25, 97.0];
        let mut c = MetricConverter::price(100.0).with_scale(Scale::Decimal).unwrap();
        let first = c.display_all(&raw);

        c.change_scale(Scale::Pct).unwrap();
        let pct = c.display_all(&raw);
        for (p, d) in pct.iter().zip(&first) {
            assert!((p - 100.0 * d).abs() < 1e-12);
        }

        c.change_scale(Scale::Decimal).unwrap();
        assert_eq!(c.display_all(&raw), first);
    }

    #[test]
    fn zero_anchor_yields_nan_not_panic() {
        let c = MetricConverter::price(0.0).with_scale(Scale::Pct).unwrap();
        assert!(c.display(10.0).is_nan());
    }

    #[test]
    fn spread_ingest_follows_scale_and_ignores_anchor() {
        let mut c = MetricConverter::spread();
        assert_eq!(c.ingest(99.0, 101.0), 2.0);

        c.change_scale(Scale::Pct).unwrap();
        assert!((c.ingest(99.0, 101.0) - 2.0).abs() < 1e-12);
        assert_eq!(c.convert_to_display(5.0, 1.5), 1.5);
        assert!(c.reingest_on_scale_change());
    }

    #[test]
    fn spread_rejects_log_scale() {
        let mut c = MetricConverter::spread();
        assert!(c.change_scale(Scale::Log).is_err());
        assert_eq!(c.scale(), Scale::Base);
    }

    #[test]
    fn reverse_maps_display_back_to_price() {
        let c = MetricConverter::price(200.0).with_scale(Scale::Pct).unwrap();
        let shown = c.display(210.0);
        assert!((c.reverse(200.0, shown) - 210.0).abs() < 1e-9);
    }

    #[test]
    fn price_anchor_from_first_quote() {
        let c = MetricConverter::price_from_quotes(&[99.0, 100.0], &[101.0, 102.0]);
        assert_eq!(c.static_param(), 100.0);
    }
}
