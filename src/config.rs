use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use strum::Display;

use crate::domain::{BatterySpec, LoadInterval, TariffPlan};
use crate::optimizer::{DispatchOptions, SearchBounds};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub battery: BatterySpec,
    pub tariff: TariffPlan,
    #[serde(default)]
    pub search: SearchBounds,
    #[serde(default)]
    pub dispatch: DispatchOptions,
    pub run: RunConfig,
}

/// What the binary does with the loaded series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunMode {
    /// Heuristic dispatch at `threshold_kw` (searched when unset)
    Simulate,
    /// Hard cap at `cap_kw`
    Enforce,
    /// Economic threshold search
    Search,
    /// Tariff-optimal LP dispatch with heuristic fallback
    Bill,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub load_file: PathBuf,
    pub mode: RunMode,
    #[serde(default)]
    pub threshold_kw: Option<f64>,
    #[serde(default)]
    pub cap_kw: Option<f64>,
    /// Scalar demand rate used by the threshold search ($/kW-month)
    #[serde(default)]
    pub demand_rate_per_kw_month: f64,
    /// Installed cost used for payback ($)
    #[serde(default)]
    pub system_cost: f64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("BESS__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Self = figment.extract().context("invalid configuration")?;
        cfg.battery.check().context("invalid [battery] section")?;
        Ok(cfg)
    }
}

/// Read a JSON array of `{timestamp, kw}` readings.
pub fn load_series(path: &Path) -> Result<Vec<LoadInterval>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading load series {}", path.display()))?;
    parse_series(&raw).with_context(|| format!("parsing load series {}", path.display()))
}

pub fn parse_series(raw: &str) -> Result<Vec<LoadInterval>> {
    let series: Vec<LoadInterval> = serde_json::from_str(raw)?;
    if let Some(i) = (1..series.len()).find(|&i| series[i].timestamp <= series[i - 1].timestamp) {
        anyhow::bail!(
            "load series is not chronological at index {i} ({})",
            series[i].timestamp
        );
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [battery]
        energy_kwh = 500.0
        power_kw = 100.0
        round_trip_efficiency = 0.9
        min_soc = 0.1
        max_soc = 0.9

        [tariff]
        name = "flat"

        [run]
        load_file = "load.json"
        mode = "search"
        demand_rate_per_kw_month = 18.0
        system_cost = 150000.0
    "#;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let cfg = Config::from_figment(Figment::from(Toml::string(MINIMAL))).unwrap();
        assert_eq!(cfg.run.mode, RunMode::Search);
        assert_eq!(cfg.search.candidate_count, 20);
        assert!(!cfg.dispatch.allow_export);
        assert_eq!(cfg.battery.depth_of_discharge, 1.0);
        assert!(cfg.tariff.demand.is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_battery() {
        let bad = MINIMAL.replace("round_trip_efficiency = 0.9", "round_trip_efficiency = 1.4");
        assert!(Config::from_figment(Figment::from(Toml::string(&bad))).is_err());

        let inverted = MINIMAL.replace("min_soc = 0.1", "min_soc = 0.95");
        assert!(Config::from_figment(Figment::from(Toml::string(&inverted))).is_err());
    }

    #[test]
    fn test_parse_series() {
        let series = parse_series(
            r#"[
                {"timestamp": "2024-07-01T00:00:00-07:00", "kw": 120.5},
                {"timestamp": "2024-07-01T00:15:00-07:00", "kw": 98.0}
            ]"#,
        )
        .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[1].kw, 98.0);

        let unordered = parse_series(
            r#"[
                {"timestamp": "2024-07-01T00:15:00Z", "kw": 1.0},
                {"timestamp": "2024-07-01T00:00:00Z", "kw": 1.0}
            ]"#,
        );
        assert!(unordered.is_err());
    }
}
