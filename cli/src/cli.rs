use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use corelib::config::AnalyticsConfig;

#[derive(Debug, Parser)]
#[clap(name = "weightwatch", version)]
pub struct Cli {
    /// Analytics group configuration (JSON). Built-in groups when omitted.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// How long to stream before shutting down (seconds)
    #[clap(long, default_value = "30")]
    pub duration_secs: u64,

    /// Dispatcher drain cadence (milliseconds)
    #[clap(long, default_value = "1")]
    pub cadence_ms: u64,

    /// Capacity of the bounded tick channel
    #[clap(long, default_value = "4096")]
    pub queue_capacity: usize,

    /// Wall-clock pause between synthetic market steps (milliseconds)
    #[clap(long, default_value = "20")]
    pub pace_ms: u64,

    /// Synthetic market steps used to seed each instrument's history
    #[clap(long, default_value = "600")]
    pub history_ticks: usize,

    /// Scale every synthetic weight after this many live steps
    #[clap(long)]
    pub regime_shift_step: Option<usize>,

    /// Factor applied at the regime shift
    #[clap(long, default_value = "0.7")]
    pub regime_shift_factor: f64,

    /// Seed for the synthetic market
    #[clap(long, default_value = "7")]
    pub seed: u64,

    /// Emit logs as JSON lines
    #[clap(long)]
    pub json_logs: bool,
}

impl Cli {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms.max(1))
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

/// Read and validate the group configuration, or fall back to the built-in groups.
pub(crate) fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<AnalyticsConfig> {
    let Some(path) = path else {
        let cfg = AnalyticsConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    };

    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    Ok(AnalyticsConfig::from_json(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::parse_from(["weightwatch"]);
        assert_eq!(cli.duration(), Duration::from_secs(30));
        assert_eq!(cli.cadence(), Duration::from_millis(1));
        assert!(cli.config.is_none());
        assert!(!cli.json_logs);
    }

    #[test]
    fn zero_cadence_is_clamped() {
        let cli = Cli::parse_from(["weightwatch", "--cadence-ms", "0"]);
        assert_eq!(cli.cadence(), Duration::from_millis(1));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let path = std::path::Path::new("/definitely/not/here.json");
        assert!(load_config(Some(path)).is_err());
    }

    #[test]
    fn builtin_groups_are_valid() {
        let cfg = load_config(None).unwrap();
        assert!(cfg.groups.contains_key("EUREX"));
    }
}
