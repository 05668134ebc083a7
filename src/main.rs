use anyhow::{Context, Result};
use bess_dispatch::{config, optimizer, simulation, telemetry};
use config::{load_series, Config, RunMode};
use optimizer::{BillOptimizer, ThresholdSearchOptimizer};
use serde_json::json;
use simulation::{detect_peak_events, CapFeasibilityOracle, HeuristicDispatchSimulator};
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let series = load_series(&cfg.run.load_file)?;
    info!(
        intervals = series.len(),
        mode = %cfg.run.mode,
        battery_kwh = cfg.battery.energy_kwh,
        battery_kw = cfg.battery.power_kw,
        "starting bess-dispatch"
    );
    if series.is_empty() {
        warn!("load series is empty; every result will be zero-valued");
    }

    let search = ThresholdSearchOptimizer::new(cfg.search.clone())
        .with_initial_soc(cfg.dispatch.initial_soc);

    let output = match cfg.run.mode {
        RunMode::Simulate => {
            let threshold_kw = match cfg.run.threshold_kw {
                Some(threshold_kw) => threshold_kw,
                None => {
                    search
                        .optimize(
                            &series,
                            &cfg.battery,
                            cfg.run.demand_rate_per_kw_month,
                            cfg.run.system_cost,
                        )
                        .threshold_kw
                }
            };
            let result = HeuristicDispatchSimulator::new(cfg.dispatch.initial_soc)
                .simulate(&series, &cfg.battery, threshold_kw);
            json!({
                "peak_events": detect_peak_events(&series, threshold_kw, result.interval_hours),
                "residual_peak_events": result.residual_peak_events(),
                "simulation": result,
            })
        }
        RunMode::Enforce => {
            let cap_kw = cfg
                .run
                .cap_kw
                .context("run.cap_kw is required in enforce mode")?;
            let outcome = CapFeasibilityOracle::new(cfg.dispatch.initial_soc)
                .enforce(&series, &cfg.battery, cap_kw);
            if let Some(violation) = &outcome.first_violation {
                warn!(
                    index = violation.index,
                    excess_kw = violation.excess_kw,
                    "cap cannot be held"
                );
            }
            serde_json::to_value(&outcome)?
        }
        RunMode::Search => serde_json::to_value(search.optimize(
            &series,
            &cfg.battery,
            cfg.run.demand_rate_per_kw_month,
            cfg.run.system_cost,
        ))?,
        RunMode::Bill => {
            let eligible = cfg.tariff.qualifies(&cfg.battery, &series);
            if !eligible {
                warn!(
                    tariff = %cfg.tariff.name,
                    "battery power is below the tariff enrollment threshold"
                );
            }
            let result = BillOptimizer::new(cfg.dispatch.clone(), cfg.search.clone())
                .optimize_bill_async(&series, &cfg.battery, &cfg.tariff)
                .await;
            info!(
                path = %result.path,
                status = %result.status,
                total = result.bill.total,
                savings = result.savings(),
                "bill optimized"
            );
            json!({ "eligible": eligible, "dispatch": result })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
