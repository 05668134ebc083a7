//! Invariants of the dispatch physics over arbitrary inputs.

mod common;

use bess_dispatch::domain::BatterySpec;
use bess_dispatch::simulation::{CapFeasibilityOracle, HeuristicDispatchSimulator};
use common::{midnight, series};
use proptest::prelude::*;

fn battery_strategy() -> impl Strategy<Value = BatterySpec> {
    (
        0.0..1000.0f64,
        0.0..300.0f64,
        0.5..=1.0f64,
        0.0..0.5f64,
        0.5..=1.0f64,
        0.5..=1.0f64,
        prop::option::of(0.0..0.6f64),
    )
        .prop_map(|(energy, power, rte, min_soc, max_soc, dod, reserve)| {
            let mut battery = BatterySpec::new(energy, power, rte)
                .with_soc_limits(min_soc, max_soc)
                .with_depth_of_discharge(dod);
            battery.reserve_fraction = reserve;
            battery
        })
}

fn load_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0..500.0f64, 1..96)
}

proptest! {
    #[test]
    fn soc_stays_inside_effective_window(
        load in load_strategy(),
        battery in battery_strategy(),
        threshold in 0.0..500.0f64,
        initial in prop::option::of(0.0..=1.0f64),
    ) {
        let series = series(midnight(2024, 4, 1), 15, &load);
        let (min_soc, max_soc) = battery.soc_bounds();

        let result = HeuristicDispatchSimulator::new(initial).simulate(&series, &battery, threshold);
        for soc in &result.soc {
            prop_assert!(*soc >= min_soc - 1e-9 && *soc <= max_soc + 1e-9, "{} not in [{}, {}]", soc, min_soc, max_soc);
        }

        let outcome = CapFeasibilityOracle::new(initial).enforce(&series, &battery, threshold);
        for soc in &outcome.soc {
            prop_assert!(*soc >= min_soc - 1e-9 && *soc <= max_soc + 1e-9);
        }
    }

    #[test]
    fn storage_energy_matches_grid_energy(
        load in load_strategy(),
        battery in battery_strategy(),
        threshold in 0.0..500.0f64,
    ) {
        let series = series(midnight(2024, 4, 1), 60, &load);
        let result = HeuristicDispatchSimulator::default().simulate(&series, &battery, threshold);
        let eta = battery.one_way_efficiency();

        let expected_removed = result.energy_discharged_kwh / eta;
        let expected_added = result.energy_charged_kwh * eta;
        prop_assert!((result.energy_removed_kwh - expected_removed).abs() <= 1e-9 * expected_removed.max(1.0));
        prop_assert!((result.energy_added_kwh - expected_added).abs() <= 1e-9 * expected_added.max(1.0));
    }

    #[test]
    fn raising_a_feasible_cap_stays_feasible(
        load in load_strategy(),
        battery in battery_strategy(),
        cap in 0.0..500.0f64,
        raise in 0.0..200.0f64,
    ) {
        let series = series(midnight(2024, 4, 1), 15, &load);
        let oracle = CapFeasibilityOracle::default();
        if oracle.is_feasible(&series, &battery, cap) {
            prop_assert!(oracle.is_feasible(&series, &battery, cap + raise));
        }
    }

    #[test]
    fn bigger_battery_discharges_at_least_as_much(
        before in prop::collection::vec(0.0..80.0f64, 0..24),
        peak in prop::collection::vec(101.0..400.0f64, 1..24),
        after in prop::collection::vec(0.0..80.0f64, 0..24),
        energy in 0.0..800.0f64,
        power in 0.0..200.0f64,
        extra_energy in 0.0..400.0f64,
        extra_power in 0.0..100.0f64,
        rte in 0.5..=1.0f64,
    ) {
        // A single peak event at a 100 kW threshold
        let load: Vec<f64> = before.iter().chain(&peak).chain(&after).copied().collect();
        let series = series(midnight(2024, 4, 1), 15, &load);
        let simulator = HeuristicDispatchSimulator::default();

        let small = BatterySpec::new(energy, power, rte).with_soc_limits(0.1, 0.9);
        let base = simulator.simulate(&series, &small, 100.0).energy_discharged_kwh;

        let more_power = BatterySpec::new(energy, power + extra_power, rte).with_soc_limits(0.1, 0.9);
        let more_energy = BatterySpec::new(energy + extra_energy, power, rte).with_soc_limits(0.1, 0.9);
        prop_assert!(simulator.simulate(&series, &more_power, 100.0).energy_discharged_kwh >= base - 1e-9);
        prop_assert!(simulator.simulate(&series, &more_energy, 100.0).energy_discharged_kwh >= base - 1e-9);
    }

    #[test]
    fn heuristic_never_raises_the_original_peak(
        load in load_strategy(),
        battery in battery_strategy(),
        offset in -200.0..300.0f64,
        initial in 0.0..=1.0f64,
    ) {
        // Thresholds on both sides of the peak, including well above it
        let peak = load.iter().copied().fold(0.0, f64::max);
        let threshold = (peak + offset).max(0.0);
        let series = series(midnight(2024, 4, 1), 15, &load);

        let result = HeuristicDispatchSimulator::new(Some(initial)).simulate(&series, &battery, threshold);
        prop_assert!(
            result.new_peak_kw <= result.original_peak_kw + 1e-9,
            "new {} > original {} at threshold {}",
            result.new_peak_kw,
            result.original_peak_kw,
            threshold
        );
    }

    #[test]
    fn simulation_is_repeatable(
        load in load_strategy(),
        battery in battery_strategy(),
        threshold in 0.0..500.0f64,
    ) {
        let series = series(midnight(2024, 4, 1), 15, &load);
        let simulator = HeuristicDispatchSimulator::default();
        let first = simulator.simulate(&series, &battery, threshold);
        let second = simulator.simulate(&series, &battery, threshold);
        prop_assert_eq!(first, second);
    }
}

#[cfg(feature = "optimization")]
mod lp_against_heuristic {
    use super::*;
    use bess_dispatch::domain::{
        Applicability, DemandComponent, EnergyRate, HourWindow, TariffPlan, TouPeriod,
    };
    use bess_dispatch::optimizer::{evaluate_bill, BillOptimizer, DispatchOptions, DispatchPath, SearchBounds};

    fn plan_strategy() -> impl Strategy<Value = TariffPlan> {
        (0.1..0.5f64, 0.02..0.2f64, 0.0..25.0f64, 0.0..3.0f64).prop_map(
            |(peak_rate, off_rate, facility_rate, daily_rate)| {
                let energy = EnergyRate::TimeOfUse {
                    periods: vec![TouPeriod {
                        bucket: "peak".into(),
                        rate: peak_rate,
                        applies: Applicability {
                            windows: vec![HourWindow::new(16, 21)],
                            ..Applicability::default()
                        },
                    }],
                    default_rate: off_rate,
                    default_bucket: "off_peak".into(),
                };
                TariffPlan::new("random", energy)
                    .with_component(DemandComponent::monthly("facility", facility_rate, Applicability::all_hours()))
                    .with_component(DemandComponent::daily("peak", daily_rate, Applicability::between(16, 21)))
            },
        )
    }

    fn lp_battery_strategy() -> impl Strategy<Value = BatterySpec> {
        (
            (0.0..600.0f64, 0.0..200.0f64, 0.6..=1.0f64),
            (0.0..0.3f64, 0.7..=1.0f64),
            prop::option::of(0.0..0.4f64),
            prop::option::of((0.25..2.0f64, 0.25..2.0f64)),
            prop::option::of(0.0..10.0f64),
        )
            .prop_map(|((energy, power, rte), (min_soc, max_soc), reserve, c_rates, parasitic)| {
                let mut battery = BatterySpec::new(energy, power, rte).with_soc_limits(min_soc, max_soc);
                if let Some(reserve) = reserve {
                    battery = battery.with_reserve(reserve);
                }
                if let Some((charge, discharge)) = c_rates {
                    battery = battery.with_c_rates(charge, discharge);
                }
                if let Some(parasitic) = parasitic {
                    battery = battery.with_parasitic_load(parasitic);
                }
                battery
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn lp_bill_is_no_worse_than_heuristic_bill(
            load in prop::collection::vec(0.0..300.0f64, 1..=24),
            battery in lp_battery_strategy(),
            plan in plan_strategy(),
            threshold in 0.0..350.0f64,
            initial_soc in prop::option::of(0.0..=1.0f64),
            degradation in 0.0..20.0f64,
        ) {
            let series = crate::common::hourly(midnight(2024, 7, 8), &load);
            let options = DispatchOptions {
                initial_soc,
                degradation_cost_per_mwh: degradation,
                ..DispatchOptions::default()
            };

            let lp = BillOptimizer::new(options.clone(), SearchBounds::default())
                .optimize_bill(&series, &battery, &plan);
            prop_assert_eq!(lp.path, DispatchPath::LinearProgram);

            let heuristic = HeuristicDispatchSimulator::new(initial_soc).simulate(&series, &battery, threshold);
            let net: Vec<f64> = heuristic.net_load.iter().map(|r| r.kw).collect();
            let heuristic_total =
                evaluate_bill(&plan.intervals(&series), &net, &heuristic.discharge_kw, &plan, &options)
                    .bill
                    .total;

            let slack = 1e-5 * heuristic_total.abs().max(1.0);
            prop_assert!(
                lp.bill.total <= heuristic_total + slack,
                "LP {} > heuristic {} at threshold {}",
                lp.bill.total,
                heuristic_total,
                threshold
            );
        }
    }
}
