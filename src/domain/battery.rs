use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// Battery specification errors
#[derive(Debug, Error)]
pub enum BatteryError {
    #[error("invalid battery specification: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error("minimum SOC {min} is above maximum SOC {max}")]
    SocRange { min: f64, max: f64 },
}

/// Nameplate description of a stationary battery.
///
/// SOC values are fractions of usable capacity. Every derived quantity is
/// clamped into its physical range, so a spec that fails [`BatterySpec::check`]
/// still simulates as a (possibly degenerate) battery instead of panicking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BatterySpec {
    /// Nameplate energy (kWh)
    #[validate(range(min = 0.0))]
    pub energy_kwh: f64,
    /// Nameplate inverter power (kW)
    #[validate(range(min = 0.0))]
    pub power_kw: f64,
    /// Round-trip efficiency (0..1)
    #[validate(range(min = 0.0, max = 1.0))]
    pub round_trip_efficiency: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_soc: f64,
    #[serde(default = "default_fraction_one")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_soc: f64,
    #[serde(default = "default_fraction_one")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub depth_of_discharge: f64,
    /// Charge power limit as a multiple of nameplate energy (1/h)
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub charge_c_rate: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub discharge_c_rate: Option<f64>,
    /// SOC fraction held back for backup; raises the effective minimum SOC
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub reserve_fraction: Option<f64>,
    /// Auxiliary load drawn by the system itself (HVAC, controls), in kW
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub parasitic_kw: Option<f64>,
}

fn default_fraction_one() -> f64 {
    1.0
}

impl BatterySpec {
    pub fn new(energy_kwh: f64, power_kw: f64, round_trip_efficiency: f64) -> Self {
        Self {
            energy_kwh,
            power_kw,
            round_trip_efficiency,
            min_soc: 0.0,
            max_soc: 1.0,
            depth_of_discharge: 1.0,
            charge_c_rate: None,
            discharge_c_rate: None,
            reserve_fraction: None,
            parasitic_kw: None,
        }
    }

    pub fn with_soc_limits(mut self, min_soc: f64, max_soc: f64) -> Self {
        self.min_soc = min_soc;
        self.max_soc = max_soc;
        self
    }

    pub fn with_depth_of_discharge(mut self, depth_of_discharge: f64) -> Self {
        self.depth_of_discharge = depth_of_discharge;
        self
    }

    pub fn with_c_rates(mut self, charge: f64, discharge: f64) -> Self {
        self.charge_c_rate = Some(charge);
        self.discharge_c_rate = Some(discharge);
        self
    }

    pub fn with_reserve(mut self, reserve_fraction: f64) -> Self {
        self.reserve_fraction = Some(reserve_fraction);
        self
    }

    pub fn with_parasitic_load(mut self, parasitic_kw: f64) -> Self {
        self.parasitic_kw = Some(parasitic_kw);
        self
    }

    /// Validate ranges and SOC ordering. Used at configuration boundaries;
    /// the simulators themselves never reject a spec.
    pub fn check(&self) -> Result<(), BatteryError> {
        self.validate()?;
        if self.min_soc > self.max_soc {
            return Err(BatteryError::SocRange {
                min: self.min_soc,
                max: self.max_soc,
            });
        }
        Ok(())
    }

    /// Nameplate energy times depth of discharge (kWh).
    pub fn usable_capacity_kwh(&self) -> f64 {
        self.energy_kwh.max(0.0) * self.depth_of_discharge.clamp(0.0, 1.0)
    }

    /// Square root of round-trip efficiency, applied once per direction.
    pub fn one_way_efficiency(&self) -> f64 {
        self.round_trip_efficiency.clamp(0.0, 1.0).sqrt()
    }

    pub fn max_charge_kw(&self) -> f64 {
        Self::limited_power(self.power_kw, self.charge_c_rate, self.energy_kwh)
    }

    pub fn max_discharge_kw(&self) -> f64 {
        Self::limited_power(self.power_kw, self.discharge_c_rate, self.energy_kwh)
    }

    fn limited_power(power_kw: f64, c_rate: Option<f64>, energy_kwh: f64) -> f64 {
        let power_kw = power_kw.max(0.0);
        match c_rate {
            Some(rate) => power_kw.min(rate.max(0.0) * energy_kwh.max(0.0)),
            None => power_kw,
        }
    }

    pub fn parasitic_load_kw(&self) -> f64 {
        self.parasitic_kw.unwrap_or(0.0).max(0.0)
    }

    /// Effective SOC window `(min, max)` after clamping and applying the reserve.
    pub fn soc_bounds(&self) -> (f64, f64) {
        let max = self.max_soc.max(0.0).min(1.0);
        let min = self
            .min_soc
            .max(self.reserve_fraction.unwrap_or(0.0))
            .max(0.0)
            .min(max);
        (min, max)
    }

    /// Effective SOC window expressed as stored energy (kWh).
    pub fn energy_bounds_kwh(&self) -> (f64, f64) {
        let (min, max) = self.soc_bounds();
        let usable = self.usable_capacity_kwh();
        (min * usable, max * usable)
    }
}
