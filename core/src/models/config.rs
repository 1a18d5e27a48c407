//! Analytics configuration.
//!
//! One `GroupConfig` per analytics group (e.g. `EUREX`, `SWISS`, `FTSE`). A group
//! names the leader instruments whose moves are assumed to drive the follower
//! instruments, plus the tolerances used to pair and classify their moves.
//!
//! Configuration is validated once at setup. A malformed group is a fatal error:
//! recovering mid-stream from a bad tolerance is not well defined.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DT: f64 = 0.3;
pub const DEFAULT_DW: f64 = 0.2;
pub const DEFAULT_ADJUSTMENT: f64 = 10.0;
pub const DEFAULT_WEIGHT_ROUNDING: u32 = 5;
/// Beyond this, `10^decimals` scaling of a weight ratio loses every digit an `f64` holds.
pub const MAX_WEIGHT_ROUNDING: u32 = 15;
pub const DEFAULT_N_MAX: usize = 20;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("group {group}: tolerance.{field} must be finite and > 0 (got {value})")]
    InvalidTolerance {
        group: String,
        field: &'static str,
        value: f64,
    },

    #[error("group {group}: {role} list is empty")]
    EmptyRole { group: String, role: &'static str },

    #[error("group {group}: instrument {instrument} is both leader and follower")]
    OverlappingRoles { group: String, instrument: String },

    #[error("group {group}: window sizes must be >= 2 (n_max={n_max}, subset_k={subset_k})")]
    InvalidWindow {
        group: String,
        n_max: usize,
        subset_k: usize,
    },

    #[error("group {group}: rounding.weight must be <= {max} decimals (got {weight})")]
    InvalidRounding { group: String, weight: u32, max: u32 },

    #[error("invalid configuration document: {0}")]
    Parse(String),
}

/// Pairing and classification tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Time-proximity window (seconds) for pairing a follower tick with a leader tick.
    pub dt: f64,

    /// Consistency band in weight units. A weight within `dw` of the theoretical
    /// weight (or of one of its harmonic ratios) is "consistent".
    pub dw: f64,

    /// Reserved adjustment factor carried with the tolerance record.
    #[serde(default = "default_adjustment")]
    pub adjustment: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            dt: DEFAULT_DT,
            dw: DEFAULT_DW,
            adjustment: DEFAULT_ADJUSTMENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundingConfig {
    /// Decimal places used when rounding `follower_delta / leader_delta`.
    pub weight: u32,
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self {
            weight: DEFAULT_WEIGHT_ROUNDING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentRoles {
    pub leader_instruments: Vec<String>,
    pub follower_instruments: Vec<String>,
}

/// Configuration for one analytics group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default)]
    pub tolerance: ToleranceConfig,

    #[serde(default)]
    pub rounding: RoundingConfig,

    #[serde(rename = "instrument_roles_configs", alias = "instrument_roles")]
    pub instrument_roles: InstrumentRoles,

    /// Length of the rolling consistency buffer.
    #[serde(default = "default_n_max")]
    pub n_max: usize,

    /// Size of the windowed subset used for the secondary median check.
    #[serde(default = "default_n_max")]
    pub subset_k: usize,

    /// Dispatch the weight-changed callbacks from the subset-median check as well.
    /// Off by default: the check is computed and logged only.
    #[serde(default)]
    pub subset_break_dispatch: bool,
}

impl GroupConfig {
    pub fn new(leaders: &[&str], followers: &[&str]) -> Self {
        Self {
            tolerance: ToleranceConfig::default(),
            rounding: RoundingConfig::default(),
            instrument_roles: InstrumentRoles {
                leader_instruments: leaders.iter().map(|s| s.to_string()).collect(),
                follower_instruments: followers.iter().map(|s| s.to_string()).collect(),
            },
            n_max: DEFAULT_N_MAX,
            subset_k: DEFAULT_N_MAX,
            subset_break_dispatch: false,
        }
    }

    pub fn leaders(&self) -> &[String] {
        &self.instrument_roles.leader_instruments
    }

    pub fn followers(&self) -> &[String] {
        &self.instrument_roles.follower_instruments
    }

    /// Every instrument referenced by this group, leaders first.
    pub fn instruments(&self) -> impl Iterator<Item = &String> {
        self.leaders().iter().chain(self.followers().iter())
    }

    pub fn validate(&self, group: &str) -> Result<(), ConfigError> {
        for (field, value) in [("dt", self.tolerance.dt), ("dw", self.tolerance.dw)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidTolerance {
                    group: group.to_string(),
                    field,
                    value,
                });
            }
        }

        if self.leaders().is_empty() {
            return Err(ConfigError::EmptyRole {
                group: group.to_string(),
                role: "leader_instruments",
            });
        }
        if self.followers().is_empty() {
            return Err(ConfigError::EmptyRole {
                group: group.to_string(),
                role: "follower_instruments",
            });
        }

        let leaders: HashSet<&String> = self.leaders().iter().collect();
        if let Some(dup) = self.followers().iter().find(|f| leaders.contains(f)) {
            return Err(ConfigError::OverlappingRoles {
                group: group.to_string(),
                instrument: dup.clone(),
            });
        }

        if self.rounding.weight > MAX_WEIGHT_ROUNDING {
            return Err(ConfigError::InvalidRounding {
                group: group.to_string(),
                weight: self.rounding.weight,
                max: MAX_WEIGHT_ROUNDING,
            });
        }

        if self.n_max < 2 || self.subset_k < 2 {
            return Err(ConfigError::InvalidWindow {
                group: group.to_string(),
                n_max: self.n_max,
                subset_k: self.subset_k,
            });
        }

        Ok(())
    }
}

/// All analytics groups keyed by group title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub groups: BTreeMap<String, GroupConfig>,
}

impl AnalyticsConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, group) in &self.groups {
            group.validate(name)?;
        }
        Ok(())
    }

    /// Union of every instrument referenced by any group, sorted and deduplicated.
    pub fn instruments(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .groups
            .values()
            .flat_map(|g| g.instruments().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert("EUREX".to_string(), GroupConfig::new(&["US500"], &["DE40", "EU50"]));
        groups.insert("SWISS".to_string(), GroupConfig::new(&["US500", "EU50"], &["SW20"]));
        groups.insert("FTSE".to_string(), GroupConfig::new(&["US500"], &["UK100"]));
        Self { groups }
    }
}

fn default_adjustment() -> f64 {
    DEFAULT_ADJUSTMENT
}

fn default_n_max() -> usize {
    DEFAULT_N_MAX
}
