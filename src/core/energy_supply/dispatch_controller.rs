use crate::compare_floats::min_of_2;
use crate::core::energy_supply::elec_battery::{BatteryPerformance, BatteryUnit};
use crate::errors::DomainViolation;
use itertools::Itertools;
use serde::Serialize;

/// Aggregate behaviour of a group of batteries over a simulation (kW, SOC as a fraction).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StoragePerformance {
    pub stored: Vec<f64>,
    pub supplied: Vec<f64>,
    pub power: Vec<f64>,
    pub surplus: Vec<f64>,
    pub deficit: Vec<f64>,
    pub soc: Vec<f64>,
}

/// Greedy dispatch of a group of batteries owned by one entity.
///
/// On each step the net power (production minus demand) is offered to the batteries one after
/// another: the emptiest first when there is a surplus, the fullest first when there is a deficit.
/// Whatever a battery takes or gives is removed from what the next one sees.
#[derive(Debug)]
pub struct DispatchController<'a> {
    owner: &'a str,
    batteries: &'a mut [BatteryUnit],
}

impl<'a> DispatchController<'a> {
    pub fn new(owner: &'a str, batteries: &'a mut [BatteryUnit]) -> Self {
        Self { owner, batteries }
    }

    /// Capacity-weighted mean SOC of the batteries.
    pub fn soc(&self) -> f64 {
        let total_capacity: f64 = self.batteries.iter().map(BatteryUnit::capacity).sum();
        if total_capacity > 0. {
            self.batteries
                .iter()
                .map(|battery| battery.soc() * battery.capacity())
                .sum::<f64>()
                / total_capacity
        } else {
            0.
        }
    }

    /// Dispatch the batteries over the whole of the given series.
    ///
    /// Arguments:
    /// * `production` - production at each step, in kW
    /// * `demand` - demand at each step, in kW
    /// * `step_duration` - in hours
    ///
    /// The diagnostic series on each battery are overwritten.
    pub fn run(
        &mut self,
        production: &[f64],
        demand: &[f64],
        step_duration: f64,
    ) -> Result<StoragePerformance, DomainViolation> {
        let steps = production.len();
        if demand.len() != steps {
            return Err(DomainViolation::SeriesLengthMismatch {
                entity: self.owner.to_string(),
                series: "demand".to_string(),
                expected: steps,
                actual: demand.len(),
            });
        }

        for battery in self.batteries.iter_mut() {
            *battery.performance_mut() = BatteryPerformance::with_capacity(steps);
        }

        let mut performance = StoragePerformance {
            stored: Vec::with_capacity(steps),
            supplied: Vec::with_capacity(steps),
            power: Vec::with_capacity(steps),
            surplus: Vec::with_capacity(steps),
            deficit: Vec::with_capacity(steps),
            soc: Vec::with_capacity(steps),
        };

        for (&p, &d) in production.iter().zip(demand) {
            let mut remaining = p - d;
            let charging = remaining > 0.;

            let order = (0..self.batteries.len())
                .sorted_by(|&a, &b| {
                    let (soc_a, soc_b) = (self.batteries[a].soc(), self.batteries[b].soc());
                    if charging {
                        soc_a.total_cmp(&soc_b)
                    } else {
                        soc_b.total_cmp(&soc_a)
                    }
                })
                .collect_vec();

            let (mut stored, mut supplied) = (0., 0.);
            for index in order {
                let battery = &mut self.batteries[index];
                let step = battery.dispatch(remaining, step_duration);
                battery.commit(&step);
                if charging {
                    remaining -= step.stored;
                } else {
                    remaining += step.supplied;
                }
                stored += step.stored;
                supplied += step.supplied;
                battery.performance_mut().record(remaining, &step);
            }

            let matched = min_of_2(p, d);
            performance.stored.push(stored);
            performance.supplied.push(supplied);
            performance
                .power
                .push(if charging { stored } else { -supplied });
            performance.surplus.push(p - matched - stored);
            performance.deficit.push(d - matched - supplied);
            performance.soc.push(self.soc());
        }

        Ok(performance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy_supply::elec_battery::DispatchMode;
    use crate::input::{AssetEconomics, BatteryTechnology};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn battery(id: &str, cap_module: f64, soc_in: f64) -> BatteryUnit {
        BatteryUnit::new(
            id,
            &BatteryTechnology::new(cap_module, 50., 200., 1., soc_in, 0.9, 0.1, 1, 1),
            AssetEconomics::default(),
        )
        .unwrap()
    }

    #[fixture]
    fn batteries() -> Vec<BatteryUnit> {
        vec![battery("bess1", 10., 0.5), battery("bess2", 5., 0.3)]
    }

    #[rstest]
    fn test_emptiest_battery_charges_first(mut batteries: Vec<BatteryUnit>) {
        let mut controller = DispatchController::new("prosumer1", &mut batteries);

        // bess2 has 3 kWh of headroom and takes 3 kW, bess1 takes the last 1 kW
        let performance = controller.run(&[4.], &[0.], 1.).unwrap();

        assert_relative_eq!(performance.stored[0], 4., max_relative = 1e-12);
        assert_relative_eq!(performance.power[0], 4., max_relative = 1e-12);
        assert_relative_eq!(performance.surplus[0], 0., epsilon = 1e-12);
        assert_relative_eq!(batteries[1].soc(), 0.9, max_relative = 1e-12);
        assert_relative_eq!(batteries[0].soc(), 0.6, max_relative = 1e-12);
        assert_eq!(batteries[1].performance().mode, vec![DispatchMode::ChargeToLimit]);
        assert_relative_eq!(batteries[1].performance().remaining_power[0], 1., max_relative = 1e-12);
        assert_relative_eq!(batteries[0].performance().remaining_power[0], 0., epsilon = 1e-12);
    }

    #[rstest]
    fn test_fullest_battery_discharges_first(mut batteries: Vec<BatteryUnit>) {
        let mut controller = DispatchController::new("prosumer1", &mut batteries);

        let performance = controller.run(&[1.], &[7.], 1.).unwrap();

        // bess1 can give 4 kWh, bess2 the remaining 1 kWh of its 1 kWh
        assert_relative_eq!(performance.supplied[0], 5., max_relative = 1e-12);
        assert_relative_eq!(performance.power[0], -5., max_relative = 1e-12);
        assert_relative_eq!(performance.deficit[0], 1., max_relative = 1e-12);
        assert_relative_eq!(batteries[0].soc(), 0.1, max_relative = 1e-12);
        assert_relative_eq!(batteries[1].soc(), 0.1, max_relative = 1e-12);
    }

    #[rstest]
    fn test_ties_keep_member_order() {
        let mut batteries = vec![battery("bess1", 10., 0.5), battery("bess2", 10., 0.5)];
        let mut controller = DispatchController::new("rec1", &mut batteries);

        controller.run(&[1.], &[0.], 1.).unwrap();

        assert_relative_eq!(batteries[0].performance().stored[0], 1.);
        assert_eq!(batteries[1].performance().stored[0], 0.);
    }

    #[rstest]
    fn test_soc_is_capacity_weighted(mut batteries: Vec<BatteryUnit>) {
        let production = [3., 0., 0., 6., 0., 1.];
        let demand = [0., 2., 0.5, 1., 4., 1.];
        let mut controller = DispatchController::new("prosumer1", &mut batteries);

        let performance = controller.run(&production, &demand, 0.5).unwrap();

        for i in 0..production.len() {
            let expected = (batteries[0].performance().soc[i] * 10.
                + batteries[1].performance().soc[i] * 5.)
                / 15.;
            assert_relative_eq!(performance.soc[i], expected, max_relative = 1e-12);
        }
    }

    #[rstest]
    fn test_balance_holds_at_every_step(mut batteries: Vec<BatteryUnit>) {
        let production = [3., 0., 0., 30., 0., 1.];
        let demand = [0., 2., 0.5, 1., 40., 1.];
        let mut controller = DispatchController::new("prosumer1", &mut batteries);

        let performance = controller.run(&production, &demand, 0.25).unwrap();

        for i in 0..production.len() {
            let matched = production[i].min(demand[i]);
            assert_relative_eq!(
                matched + performance.stored[i] + performance.surplus[i],
                production[i],
                epsilon = 1e-9
            );
            assert_relative_eq!(
                matched + performance.supplied[i] + performance.deficit[i],
                demand[i],
                epsilon = 1e-9
            );
        }
        assert_eq!(batteries[0].performance().len(), production.len());
    }

    #[rstest]
    fn test_rejects_mismatched_series(mut batteries: Vec<BatteryUnit>) {
        let mut controller = DispatchController::new("prosumer1", &mut batteries);

        assert_eq!(
            controller.run(&[1., 2.], &[1.], 1.),
            Err(DomainViolation::SeriesLengthMismatch {
                entity: "prosumer1".into(),
                series: "demand".into(),
                expected: 2,
                actual: 1
            })
        );
    }
}
