//! Metric engines.
//!
//! A series recomputes its values through a `MetricEngine`:
//!   • `Direct` wraps a `MetricConverter` (price / spread with scale + rebase)
//!   • `Expression` combines several instruments through a parsed formula
//!   • `Null` passes values through untouched

pub mod converter;
pub mod expression;
pub mod functions;

pub use converter::{MetricConverter, MetricKind, Scale};
pub use expression::{ExpressionError, ExpressionMetric};

use crate::error::MarketError;

/// One input to a metric engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricInput<'a> {
    /// A bid/ask observation of instrument `name`.
    Quote { name: &'a str, bid: f64, ask: f64 },
    /// A single already-derived value of instrument `name`.
    Value { name: &'a str, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricEngine {
    Direct(MetricConverter),
    Expression(ExpressionMetric),
    Null,
}

impl MetricEngine {
    /// Raw stored value for `input`.
    pub fn evaluate(&mut self, input: MetricInput<'_>) -> f64 {
        match (self, input) {
            (MetricEngine::Direct(c), MetricInput::Quote { bid, ask, .. }) => c.ingest(bid, ask),
            (MetricEngine::Direct(_), MetricInput::Value { value, .. }) => value,
            (MetricEngine::Expression(e), MetricInput::Quote { name, bid, ask }) => {
                e.update_and_evaluate(name, functions::mid(bid, ask))
            }
            (MetricEngine::Expression(e), MetricInput::Value { name, value }) => {
                e.update_and_evaluate(name, value)
            }
            (MetricEngine::Null, MetricInput::Quote { bid, ask, .. }) => functions::mid(bid, ask),
            (MetricEngine::Null, MetricInput::Value { value, .. }) => value,
        }
    }

    pub fn convert_to_display(&self, static_param: f64, raw: f64) -> f64 {
        match self {
            MetricEngine::Direct(c) => c.convert_to_display(static_param, raw),
            MetricEngine::Expression(_) | MetricEngine::Null => raw,
        }
    }

    /// Only direct converters carry a scale; the other engines accept any
    /// scale as a no-op.
    pub fn change_scale(&mut self, scale: Scale) -> Result<(), MarketError> {
        match self {
            MetricEngine::Direct(c) => c.change_scale(scale),
            MetricEngine::Expression(_) | MetricEngine::Null => Ok(()),
        }
    }

    pub fn change_static_param(&mut self, value: f64) {
        if let MetricEngine::Direct(c) = self {
            c.change_static_param(value);
        }
    }

    pub fn static_param(&self) -> f64 {
        match self {
            MetricEngine::Direct(c) => c.static_param(),
            MetricEngine::Expression(_) | MetricEngine::Null => f64::NAN,
        }
    }

    /// Converter a display view should start from.
    pub fn display_converter(&self) -> MetricConverter {
        match self {
            MetricEngine::Direct(c) => *c,
            MetricEngine::Expression(_) | MetricEngine::Null => MetricConverter::null(),
        }
    }

    pub fn reingest_on_scale_change(&self) -> bool {
        matches!(self, MetricEngine::Direct(c) if c.reingest_on_scale_change())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_engine_stores_mid_for_price() {
        let mut e = MetricEngine::Direct(MetricConverter::price(100.0));
        let raw = e.evaluate(MetricInput::Quote {
            name: "US500",
            bid: 99.0,
            ask: 101.0,
        });
        assert_eq!(raw, 100.0);
    }

    #[test]
    fn expression_engine_keeps_last_value_per_variable() {
        let mut e = MetricEngine::Expression(ExpressionMetric::parse("DE40 - US500").unwrap());

        let v = e.evaluate(MetricInput::Value { name: "DE40", value: 10.0 });
        assert!(v.is_nan());

        let v = e.evaluate(MetricInput::Quote {
            name: "US500",
            bid: 3.0,
            ask: 5.0,
        });
        assert_eq!(v, 6.0);
    }

    #[test]
    fn null_engine_is_identity_and_ignores_scale() {
        let mut e = MetricEngine::Null;
        assert!(e.change_scale(Scale::Log).is_ok());
        assert_eq!(e.evaluate(MetricInput::Value { name: "x", value: 3.5 }), 3.5);
        assert_eq!(e.convert_to_display(1.0, 3.5), 3.5);
    }
}
