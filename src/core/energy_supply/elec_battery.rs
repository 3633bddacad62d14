use crate::compare_floats::max_of_2;
use crate::core::asset::{Asset, EconomicAsset};
use crate::core::units::WATTS_PER_KILOWATT;
use crate::errors::DomainViolation;
use crate::input::{AssetEconomics, BatteryTechnology, Carrier};
use serde::Serialize;
use serde_repr::Serialize_repr;

/// Which limit, if any, shaped the energy a battery exchanged in a step.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum DispatchMode {
    /// charging up to soc_max, cut to the maximum current
    ChargeToLimitAtMaxCurrent = 1,
    /// charging up to soc_max would need less than the minimum current, so nothing is charged
    ChargeToLimitBelowMinCurrent = 2,
    ChargeToLimit = 3,
    ChargeRequestAtMaxCurrent = 4,
    ChargeRequestBelowMinCurrent = 5,
    ChargeRequest = 6,
    /// at soc_max already
    Full = 7,
    DischargeToLimitAtMaxCurrent = 8,
    DischargeToLimitBelowMinCurrent = 9,
    DischargeToLimit = 10,
    DischargeRequestAtMaxCurrent = 11,
    DischargeRequestBelowMinCurrent = 12,
    DischargeRequest = 13,
    /// at soc_min already
    Empty = 14,
}

/// Outcome of a single dispatch step. Energies are reported as average powers over the step (kW).
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DispatchStep {
    /// power offered to (+) or requested from (-) the battery
    pub requested_power: f64,
    /// state of charge at the end of the step
    pub soc: f64,
    pub stored: f64,
    pub supplied: f64,
    /// net power exchanged, (+) charge (-) discharge
    pub power: f64,
    /// offered power the battery could not take
    pub surplus: f64,
    /// requested power the battery could not give
    pub deficit: f64,
    /// A
    pub current: f64,
    pub mode: DispatchMode,
}

/// Per-step diagnostics of a battery over a simulation, as written by the dispatch controller.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatteryPerformance {
    /// power left for the next battery after this one was dispatched
    pub remaining_power: Vec<f64>,
    pub soc: Vec<f64>,
    pub stored: Vec<f64>,
    pub supplied: Vec<f64>,
    pub power: Vec<f64>,
    pub surplus: Vec<f64>,
    pub deficit: Vec<f64>,
    pub current: Vec<f64>,
    pub mode: Vec<DispatchMode>,
}

impl BatteryPerformance {
    pub(crate) fn with_capacity(steps: usize) -> Self {
        Self {
            remaining_power: Vec::with_capacity(steps),
            soc: Vec::with_capacity(steps),
            stored: Vec::with_capacity(steps),
            supplied: Vec::with_capacity(steps),
            power: Vec::with_capacity(steps),
            surplus: Vec::with_capacity(steps),
            deficit: Vec::with_capacity(steps),
            current: Vec::with_capacity(steps),
            mode: Vec::with_capacity(steps),
        }
    }

    pub(crate) fn record(&mut self, remaining_power: f64, step: &DispatchStep) {
        self.remaining_power.push(remaining_power);
        self.soc.push(step.soc);
        self.stored.push(step.stored);
        self.supplied.push(step.supplied);
        self.power.push(step.power);
        self.surplus.push(step.surplus);
        self.deficit.push(step.deficit);
        self.current.push(step.current);
        self.mode.push(step.mode);
    }

    pub fn len(&self) -> usize {
        self.soc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.soc.is_empty()
    }
}

enum CurrentBand {
    AboveMaximum,
    BelowMinimum,
    Within,
}

/// An electric battery made of identical modules, dispatched one step at a time.
#[derive(Clone, Debug)]
pub struct BatteryUnit {
    asset: EconomicAsset,
    /// kWh
    capacity: f64,
    /// V
    voltage: f64,
    /// A
    current_min: f64,
    current_max: f64,
    soc_min: f64,
    soc_max: f64,
    soc: f64,
    performance: BatteryPerformance,
}

impl BatteryUnit {
    /// Construct a BatteryUnit from module-level parameters; the array capacity is the module
    /// capacity times the number of modules, the voltage scales with the modules in series and
    /// the current limits with the modules in parallel.
    pub fn new(
        id: &str,
        tech: &BatteryTechnology,
        economics: AssetEconomics,
    ) -> Result<Self, DomainViolation> {
        if !(0. <= tech.soc_min
            && tech.soc_min <= tech.soc_in
            && tech.soc_in <= tech.soc_max
            && tech.soc_max <= 1.)
        {
            return Err(DomainViolation::InvalidSocLimits {
                entity: id.to_string(),
                soc_min: tech.soc_min,
                soc_in: tech.soc_in,
                soc_max: tech.soc_max,
            });
        }
        let negative = |field: &'static str, value: f64| DomainViolation::NegativeValue {
            entity: id.to_string(),
            field,
            value,
        };
        for (field, value) in [
            ("cap_module", tech.cap_module),
            ("v", tech.v),
            ("i_min", tech.i_min),
            ("i_max", tech.i_max),
        ] {
            if value < 0. {
                return Err(negative(field, value));
            }
        }

        let modules = (tech.n_series * tech.n_parallel) as f64;
        let capacity = tech.cap_module * modules;
        let asset = EconomicAsset::new(
            id,
            vec![Carrier::Electricity],
            capacity,
            capacity,
            economics,
        )?;

        Ok(Self {
            asset,
            capacity,
            voltage: tech.v * tech.n_series as f64,
            current_min: tech.i_min * tech.n_parallel as f64,
            current_max: tech.i_max * tech.n_parallel as f64,
            soc_min: tech.soc_min,
            soc_max: tech.soc_max,
            soc: tech.soc_in,
            performance: Default::default(),
        })
    }

    pub fn id(&self) -> &str {
        self.asset.id()
    }

    /// kWh
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    pub fn performance(&self) -> &BatteryPerformance {
        &self.performance
    }

    pub(crate) fn performance_mut(&mut self) -> &mut BatteryPerformance {
        &mut self.performance
    }

    /// Apply the state of charge reached by a dispatch step.
    pub(crate) fn commit(&mut self, step: &DispatchStep) {
        self.soc = step.soc;
    }

    /// Energy (kWh) that can pass through the battery in a step at the minimum and maximum current.
    fn energy_band(&self, step_duration: f64) -> (f64, f64) {
        let per_amp = self.voltage * step_duration / WATTS_PER_KILOWATT as f64;
        (per_amp * self.current_min, per_amp * self.current_max)
    }

    /// Cut an energy to the current band, returning the energy, the current and where it fell.
    fn limit_to_current_band(&self, energy: f64, step_duration: f64) -> (f64, f64, CurrentBand) {
        let (energy_min, energy_max) = self.energy_band(step_duration);
        if energy > energy_max {
            (energy_max, self.current_max, CurrentBand::AboveMaximum)
        } else if energy < energy_min {
            (0., 0., CurrentBand::BelowMinimum)
        } else {
            let current = energy * WATTS_PER_KILOWATT as f64 / (step_duration * self.voltage);
            (energy, current, CurrentBand::Within)
        }
    }

    /// Work out what the battery does with a power offered to it (positive, charging) or
    /// requested from it (negative, discharging) over a step of `step_duration` hours.
    ///
    /// The state of charge limit is applied first, then the current limits. The battery itself
    /// is left untouched; the returned step carries the new state of charge.
    pub fn dispatch(&self, requested_power: f64, step_duration: f64) -> DispatchStep {
        let requested_energy = requested_power * step_duration;

        // signed energy into the battery, unserved energy either way, current and mode
        let (exchanged, surplus, deficit, current, mode) = if requested_energy > 0. {
            if self.soc < self.soc_max {
                let headroom = self.capacity * (self.soc_max - self.soc);
                let limited_by_soc = requested_energy >= headroom;
                let candidate = if limited_by_soc {
                    headroom
                } else {
                    requested_energy
                };
                let (charge, current, band) = self.limit_to_current_band(candidate, step_duration);
                let mode = match (limited_by_soc, band) {
                    (true, CurrentBand::AboveMaximum) => DispatchMode::ChargeToLimitAtMaxCurrent,
                    (true, CurrentBand::BelowMinimum) => {
                        DispatchMode::ChargeToLimitBelowMinCurrent
                    }
                    (true, CurrentBand::Within) => DispatchMode::ChargeToLimit,
                    (false, CurrentBand::AboveMaximum) => DispatchMode::ChargeRequestAtMaxCurrent,
                    (false, CurrentBand::BelowMinimum) => {
                        DispatchMode::ChargeRequestBelowMinCurrent
                    }
                    (false, CurrentBand::Within) => DispatchMode::ChargeRequest,
                };
                (charge, requested_energy - charge, 0., current, mode)
            } else {
                (0., requested_energy, 0., 0., DispatchMode::Full)
            }
        } else {
            let demanded_energy = -requested_energy;
            if self.soc > self.soc_min {
                let available = self.capacity * (self.soc - self.soc_min);
                let limited_by_soc = demanded_energy >= available;
                let candidate = if limited_by_soc {
                    available
                } else {
                    demanded_energy
                };
                let (discharge, current, band) =
                    self.limit_to_current_band(candidate, step_duration);
                let mode = match (limited_by_soc, band) {
                    (true, CurrentBand::AboveMaximum) => {
                        DispatchMode::DischargeToLimitAtMaxCurrent
                    }
                    (true, CurrentBand::BelowMinimum) => {
                        DispatchMode::DischargeToLimitBelowMinCurrent
                    }
                    (true, CurrentBand::Within) => DispatchMode::DischargeToLimit,
                    (false, CurrentBand::AboveMaximum) => {
                        DispatchMode::DischargeRequestAtMaxCurrent
                    }
                    (false, CurrentBand::BelowMinimum) => {
                        DispatchMode::DischargeRequestBelowMinCurrent
                    }
                    (false, CurrentBand::Within) => DispatchMode::DischargeRequest,
                };
                (-discharge, 0., demanded_energy - discharge, current, mode)
            } else {
                (0., 0., demanded_energy, 0., DispatchMode::Empty)
            }
        };

        let soc = if self.capacity > 0. {
            (self.capacity * self.soc + exchanged) / self.capacity
        } else {
            self.soc
        };

        DispatchStep {
            requested_power,
            soc,
            stored: max_of_2(exchanged, 0.) / step_duration,
            supplied: max_of_2(-exchanged, 0.) / step_duration,
            power: exchanged / step_duration,
            surplus: surplus / step_duration,
            deficit: deficit / step_duration,
            current,
            mode,
        }
    }
}

impl Asset for BatteryUnit {
    fn economic_asset(&self) -> &EconomicAsset {
        &self.asset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    /// 10 kWh at 50 V, limited to between 1 A and 200 A (0.05 kWh to 10 kWh over an hour)
    fn battery_with_soc(soc_in: f64) -> BatteryUnit {
        BatteryUnit::new(
            "bess1",
            &BatteryTechnology::new(10., 50., 200., 1., soc_in, 0.8, 0.2, 1, 1),
            AssetEconomics::default(),
        )
        .unwrap()
    }

    #[fixture]
    fn battery() -> BatteryUnit {
        battery_with_soc(0.5)
    }

    #[rstest]
    fn test_array_scaling() {
        let battery = BatteryUnit::new(
            "bess1",
            &BatteryTechnology::new(2.56, 25.6, 100., 5., 0.2, 0.8, 0.2, 2, 3),
            AssetEconomics {
                cap_cost: 720.,
                opex_cost: 20.,
                ..Default::default()
            },
        )
        .unwrap();

        assert_relative_eq!(battery.capacity(), 15.36, max_relative = 1e-12);
        assert_relative_eq!(battery.capital_cost(), 15.36 * 720., max_relative = 1e-12);
        // 51.2 V at up to 300 A over an hour
        let step = battery.dispatch(20., 1.);
        assert_relative_eq!(step.stored, 9.216, max_relative = 1e-12);
        assert_eq!(step.mode, DispatchMode::ChargeToLimit);
    }

    #[rstest]
    fn test_charge_up_to_soc_max(battery: BatteryUnit) {
        let step = battery.dispatch(5., 1.);

        assert_eq!(step.mode, DispatchMode::ChargeToLimit);
        assert_relative_eq!(step.stored, 3., max_relative = 1e-12);
        assert_relative_eq!(step.surplus, 2., max_relative = 1e-12);
        assert_relative_eq!(step.soc, 0.8, max_relative = 1e-12);
        assert_relative_eq!(step.current, 60., max_relative = 1e-12);
        assert_eq!(step.supplied, 0.);
        // dispatching does not change the battery
        assert_eq!(battery.soc(), 0.5);
    }

    #[rstest]
    fn test_charge_requested_power(battery: BatteryUnit) {
        let step = battery.dispatch(2., 0.5);

        assert_eq!(step.mode, DispatchMode::ChargeRequest);
        assert_relative_eq!(step.stored, 2.);
        assert_relative_eq!(step.power, 2.);
        assert_eq!(step.surplus, 0.);
        assert_relative_eq!(step.soc, 0.6, max_relative = 1e-12);
    }

    #[rstest]
    fn test_charge_limited_by_current(battery: BatteryUnit) {
        // 200 A at 50 V over a quarter hour is 2.5 kWh, below the 3 kWh of headroom
        let step = battery.dispatch(11., 0.25);

        assert_eq!(step.mode, DispatchMode::ChargeRequestAtMaxCurrent);
        assert_relative_eq!(step.stored, 10., max_relative = 1e-12);
        assert_relative_eq!(step.surplus, 1., max_relative = 1e-9);
        assert_eq!(step.current, 200.);
    }

    #[rstest]
    fn test_charge_limited_by_soc_then_current(battery: BatteryUnit) {
        // 5 kWh requested, capped at the 3 kWh of headroom and then at 2.5 kWh by the current
        let step = battery.dispatch(20., 0.25);

        assert_eq!(step.mode, DispatchMode::ChargeToLimitAtMaxCurrent);
        assert_relative_eq!(step.stored, 10., max_relative = 1e-12);
        assert_relative_eq!(step.surplus, 10., max_relative = 1e-12);
        assert_eq!(step.current, 200.);
        assert_relative_eq!(step.soc, 0.75, max_relative = 1e-12);
    }

    #[rstest]
    fn test_charge_below_minimum_current(battery: BatteryUnit) {
        let step = battery.dispatch(0.01, 1.);

        assert_eq!(step.mode, DispatchMode::ChargeRequestBelowMinCurrent);
        assert_eq!(step.stored, 0.);
        assert_relative_eq!(step.surplus, 0.01);
        assert_eq!(step.current, 0.);
        assert_eq!(step.soc, 0.5);
    }

    #[rstest]
    fn test_full_battery_routes_everything_to_surplus() {
        let battery = battery_with_soc(0.8);

        let step = battery.dispatch(5., 1.);

        assert_eq!(step.mode, DispatchMode::Full);
        assert_eq!(step.surplus, 5.);
        assert_eq!(step.stored, 0.);
        assert_eq!(step.soc, 0.8);
    }

    #[rstest]
    fn test_discharge_down_to_soc_min(battery: BatteryUnit) {
        let step = battery.dispatch(-4., 1.);

        assert_eq!(step.mode, DispatchMode::DischargeToLimit);
        assert_relative_eq!(step.supplied, 3., max_relative = 1e-12);
        assert_relative_eq!(step.deficit, 1., max_relative = 1e-12);
        assert_relative_eq!(step.power, -3., max_relative = 1e-12);
        assert_relative_eq!(step.soc, 0.2, max_relative = 1e-12);
    }

    #[rstest]
    fn test_discharge_requested_power(battery: BatteryUnit) {
        let step = battery.dispatch(-1., 1.);

        assert_eq!(step.mode, DispatchMode::DischargeRequest);
        assert_relative_eq!(step.supplied, 1.);
        assert_eq!(step.deficit, 0.);
        assert_relative_eq!(step.soc, 0.4, max_relative = 1e-12);
        assert_relative_eq!(step.current, 20., max_relative = 1e-12);
    }

    #[rstest]
    fn test_discharge_limited_by_current(battery: BatteryUnit) {
        let step = battery.dispatch(-11., 0.25);

        assert_eq!(step.mode, DispatchMode::DischargeRequestAtMaxCurrent);
        assert_relative_eq!(step.supplied, 10., max_relative = 1e-12);
        assert_relative_eq!(step.deficit, 1., max_relative = 1e-9);
        assert_eq!(step.current, 200.);
    }

    #[rstest]
    fn test_discharge_limited_by_soc_then_current(battery: BatteryUnit) {
        // 5 kWh requested, 3 kWh above soc_min, 2.5 kWh allowed by the current
        let step = battery.dispatch(-20., 0.25);

        assert_eq!(step.mode, DispatchMode::DischargeToLimitAtMaxCurrent);
        assert_relative_eq!(step.supplied, 10., max_relative = 1e-12);
        assert_relative_eq!(step.deficit, 10., max_relative = 1e-12);
        assert_relative_eq!(step.soc, 0.25, max_relative = 1e-12);
    }

    #[rstest]
    fn test_empty_battery_routes_everything_to_deficit() {
        let battery = battery_with_soc(0.2);

        let step = battery.dispatch(-3., 1.);

        assert_eq!(step.mode, DispatchMode::Empty);
        assert_eq!(step.deficit, 3.);
        assert_eq!(step.supplied, 0.);
        assert_eq!(step.soc, 0.2);
    }

    #[rstest]
    #[case(5.)]
    #[case(0.3)]
    #[case(-0.3)]
    #[case(-5.)]
    #[case(40.)]
    #[case(-40.)]
    fn test_soc_limits_and_energy_conservation(#[case] requested_power: f64) {
        let mut battery = battery_with_soc(0.5);
        let step_duration = 0.25;

        for _ in 0..20 {
            let soc_before = battery.soc();
            let step = battery.dispatch(requested_power, step_duration);

            assert!(step.soc >= 0.2 - 1e-12 && step.soc <= 0.8 + 1e-12);
            assert_relative_eq!(
                (step.soc - soc_before) * battery.capacity(),
                (step.stored - step.supplied) * step_duration,
                epsilon = 1e-9
            );
            if requested_power > 0. {
                assert_relative_eq!(step.stored + step.surplus, requested_power, epsilon = 1e-9);
            } else {
                assert_relative_eq!(
                    step.supplied + step.deficit,
                    -requested_power,
                    epsilon = 1e-9
                );
            }
            battery.commit(&step);
        }
    }

    #[rstest]
    fn test_rejects_soc_limits_out_of_order() {
        let result = BatteryUnit::new(
            "bess1",
            &BatteryTechnology::new(10., 50., 200., 1., 0.5, 0.2, 0.8, 1, 1),
            AssetEconomics::default(),
        );

        assert!(matches!(
            result,
            Err(DomainViolation::InvalidSocLimits { .. })
        ));
    }

    #[rstest]
    fn test_dispatch_mode_serializes_as_number() {
        assert_eq!(
            serde_json::to_string(&DispatchMode::Empty).unwrap(),
            "14"
        );
    }
}
