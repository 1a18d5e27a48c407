use serde::Serialize;

/// The inferred "normal" weight of a leader/follower pair.
///
/// `ratio_map` holds alternate weights `w` that still count as consistent,
/// each with the factor `main / w` that maps them back onto `main` (a follower
/// sometimes reacts at a simple fraction of the dominant weight).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TheoWeight {
    pub main: f64,
    pub ratio_map: Vec<(f64, f64)>,
}

impl TheoWeight {
    pub fn new(main: f64) -> Self {
        Self {
            main,
            ratio_map: Vec::new(),
        }
    }

    pub fn with_ratio(mut self, weight: f64, ratio: f64) -> Self {
        self.ratio_map.push((weight, ratio));
        self
    }

    /// Build from weights ranked by frequency, most frequent first.
    pub fn from_ranked(ranked: &[f64]) -> Option<Self> {
        let (&main, rest) = ranked.split_first()?;
        let ratio_map = rest
            .iter()
            .filter(|w| **w > 0.0)
            .map(|w| (*w, main / w))
            .collect();
        Some(Self { main, ratio_map })
    }

    /// Classify `weight` against `main` within `dw`.
    ///
    /// Returns `(consistent, canonical)`. The first ratio that maps `weight`
    /// into the band wins; an inconsistent weight is its own canonical value.
    pub fn classify(&self, weight: f64, dw: f64) -> (bool, f64) {
        if (weight - self.main).abs() < dw {
            return (true, weight);
        }
        for (_, ratio) in &self.ratio_map {
            let scaled = weight * ratio;
            if (scaled - self.main).abs() < dw {
                return (true, scaled);
            }
        }
        (false, weight)
    }
}
