use crate::core::asset::Asset;
use crate::core::balance::{add_series, match_supply_and_demand, sum_series};
use crate::core::demand::DemandSource;
use crate::core::economics::{
    AnnualEnergyFlow, CashflowEngine, EconomicPerformance, PricedEnergyFlow,
};
use crate::core::energy_supply::dispatch_controller::DispatchController;
use crate::core::energy_supply::elec_battery::BatteryUnit;
use crate::core::energy_supply::pv::PvArray;
use crate::core::units::power_series_to_megawatt_hours;
use crate::errors::DomainViolation;
use crate::input::{Carrier, EntityEconomics};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Battery-related part of a prosumer's electricity balance (kW, SOC as a fraction).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProsumerStorage {
    pub self_consumption_without_battery: Vec<f64>,
    pub surplus_without_battery: Vec<f64>,
    pub unmet_without_battery: Vec<f64>,
    pub stored: Vec<f64>,
    pub supplied: Vec<f64>,
    pub power: Vec<f64>,
    pub soc: Vec<f64>,
}

/// Balance of one carrier for a prosumer, in kW.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProsumerEnergyPerformance {
    pub production: Vec<f64>,
    pub demand: Vec<f64>,
    pub self_consumption: Vec<f64>,
    pub surplus: Vec<f64>,
    pub unmet: Vec<f64>,
    /// only for electricity, and only when the prosumer has batteries
    pub storage: Option<ProsumerStorage>,
}

impl ProsumerEnergyPerformance {
    /// Series under their output names.
    pub fn columns(&self) -> Vec<(&'static str, &[f64])> {
        let mut columns = vec![
            ("prod", self.production.as_slice()),
            ("dem", self.demand.as_slice()),
            ("self_cons", self.self_consumption.as_slice()),
            ("surplus", self.surplus.as_slice()),
            ("unmet", self.unmet.as_slice()),
        ];
        if let Some(storage) = &self.storage {
            columns.extend([
                (
                    "self_cons_without_bess",
                    storage.self_consumption_without_battery.as_slice(),
                ),
                ("surplus_without_bess", storage.surplus_without_battery.as_slice()),
                ("unmet_without_bess", storage.unmet_without_battery.as_slice()),
                ("stored", storage.stored.as_slice()),
                ("supply", storage.supplied.as_slice()),
                ("power", storage.power.as_slice()),
                ("soc", storage.soc.as_slice()),
            ]);
        }
        columns
    }
}

/// Check that the carriers of an entity, the carriers priced in its economics and the carriers
/// its demand sources provide agree.
pub(crate) fn validate_carriers(
    entity: &str,
    carriers: &[Carrier],
    economics: &EntityEconomics,
    provides: impl Fn(Carrier) -> bool,
) -> Result<(), DomainViolation> {
    if let Some(carrier) = economics
        .carriers_and_costs
        .keys()
        .find(|carrier| !carriers.contains(carrier))
    {
        return Err(DomainViolation::PricedCarrierNotInTech {
            entity: entity.to_string(),
            carrier: *carrier,
        });
    }
    for &carrier in carriers {
        if !economics.carriers_and_costs.contains_key(&carrier) {
            return Err(DomainViolation::CarrierWithoutPrices {
                entity: entity.to_string(),
                carrier,
            });
        }
        if !provides(carrier) {
            return Err(DomainViolation::CarrierWithoutDemand {
                entity: entity.to_string(),
                carrier,
            });
        }
    }
    Ok(())
}

/// Price each carrier's annual flow with the entity's prices.
pub(crate) fn priced_energy_flows(
    flows: IndexMap<Carrier, AnnualEnergyFlow>,
    economics: &EntityEconomics,
) -> IndexMap<Carrier, PricedEnergyFlow> {
    flows
        .into_iter()
        .filter_map(|(carrier, flow)| {
            economics
                .carriers_and_costs
                .get(&carrier)
                .map(|prices| (carrier, PricedEnergyFlow { flow, prices: *prices }))
        })
        .collect()
}

/// A party with its own demand and, optionally, its own PV arrays and batteries.
#[derive(Debug)]
pub struct Prosumer {
    id: String,
    carriers: Vec<Carrier>,
    users: Vec<Arc<DemandSource>>,
    systems: Vec<Arc<PvArray>>,
    batteries: Vec<BatteryUnit>,
    economics: EntityEconomics,
    energy_performance: Option<IndexMap<Carrier, ProsumerEnergyPerformance>>,
    economic_performance: Option<EconomicPerformance>,
}

impl Prosumer {
    /// Construct a Prosumer
    ///
    /// Arguments:
    /// * `id` - identifier of the prosumer
    /// * `carriers` - carriers balanced for the prosumer; each needs prices in `economics` and
    ///                demand from at least one of the users
    /// * `users` - demand sources behind the prosumer's connection
    /// * `systems` - PV arrays of the prosumer
    /// * `batteries` - batteries of the prosumer, dispatched against the electricity balance
    /// * `economics` - tax and interest rates, prices per carrier and further capex
    pub fn new(
        id: &str,
        carriers: Vec<Carrier>,
        users: Vec<Arc<DemandSource>>,
        systems: Vec<Arc<PvArray>>,
        batteries: Vec<BatteryUnit>,
        economics: EntityEconomics,
    ) -> Result<Self, DomainViolation> {
        validate_carriers(id, &carriers, &economics, |carrier| {
            users.iter().any(|user| user.provides(carrier))
        })?;

        Ok(Self {
            id: id.to_string(),
            carriers,
            users,
            systems,
            batteries,
            economics,
            energy_performance: None,
            economic_performance: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn carriers(&self) -> &[Carrier] {
        &self.carriers
    }

    pub fn users(&self) -> &[Arc<DemandSource>] {
        &self.users
    }

    pub fn systems(&self) -> &[Arc<PvArray>] {
        &self.systems
    }

    pub fn batteries(&self) -> &[BatteryUnit] {
        &self.batteries
    }

    pub fn economics(&self) -> &EntityEconomics {
        &self.economics
    }

    pub fn energy_performance_results(
        &self,
    ) -> Option<&IndexMap<Carrier, ProsumerEnergyPerformance>> {
        self.energy_performance.as_ref()
    }

    pub fn energy_performance_for(&self, carrier: Carrier) -> Option<&ProsumerEnergyPerformance> {
        self.energy_performance.as_ref()?.get(&carrier)
    }

    pub fn economic_performance_results(&self) -> Option<&EconomicPerformance> {
        self.economic_performance.as_ref()
    }

    /// Balance production against demand for each carrier, dispatching the batteries against
    /// the electricity balance.
    ///
    /// Arguments:
    /// * `step_duration` - in hours
    pub fn energy_performance(
        &mut self,
        step_duration: f64,
    ) -> Result<&IndexMap<Carrier, ProsumerEnergyPerformance>, DomainViolation> {
        let mut results = IndexMap::with_capacity(self.carriers.len());

        for &carrier in &self.carriers {
            let steps = self
                .users
                .iter()
                .find_map(|user| user.demand_for(carrier))
                .map_or(0, <[f64]>::len);

            let demand = sum_series(
                &self.id,
                steps,
                self.users
                    .iter()
                    .filter_map(|user| user.demand_for(carrier).map(|d| (user.id(), d))),
            )?;

            let mut produced = Vec::with_capacity(self.systems.len());
            for system in &self.systems {
                if system.economic_asset().carriers().contains(&carrier) {
                    let power = system
                        .produced_power_for(carrier)
                        .ok_or_else(|| DomainViolation::OutputNotComputed(system.id().into()))?;
                    produced.push((system.id(), power));
                }
            }
            let production = sum_series(&self.id, steps, produced)?;

            let baseline = match_supply_and_demand(&production, &demand);

            let performance = if carrier == Carrier::Electricity && !self.batteries.is_empty() {
                let storage = DispatchController::new(&self.id, &mut self.batteries).run(
                    &production,
                    &demand,
                    step_duration,
                )?;
                ProsumerEnergyPerformance {
                    self_consumption: add_series(&baseline.matched, &storage.stored),
                    surplus: storage.surplus,
                    unmet: storage.deficit,
                    production,
                    demand,
                    storage: Some(ProsumerStorage {
                        self_consumption_without_battery: baseline.matched,
                        surplus_without_battery: baseline.surplus,
                        unmet_without_battery: baseline.unmet,
                        stored: storage.stored,
                        supplied: storage.supplied,
                        power: storage.power,
                        soc: storage.soc,
                    }),
                }
            } else {
                ProsumerEnergyPerformance {
                    production,
                    demand,
                    self_consumption: baseline.matched,
                    surplus: baseline.surplus,
                    unmet: baseline.unmet,
                    storage: None,
                }
            };
            debug!("Prosumer {} balanced for {carrier}", self.id);
            results.insert(carrier, performance);
        }

        Ok(self.energy_performance.insert(results))
    }

    /// Energy sold (the surplus) and self-consumed over the simulation, per carrier, in MWh.
    /// Nothing is counted as purchased.
    pub fn annual_energy_flows(
        &self,
        step_duration: f64,
    ) -> Result<IndexMap<Carrier, AnnualEnergyFlow>, DomainViolation> {
        let performance = self
            .energy_performance
            .as_ref()
            .ok_or_else(|| DomainViolation::EnergyPerformanceNotComputed(self.id.clone()))?;

        Ok(performance
            .iter()
            .map(|(carrier, performance)| {
                (
                    *carrier,
                    AnnualEnergyFlow {
                        sold: power_series_to_megawatt_hours(&performance.surplus, step_duration),
                        self_consumption: power_series_to_megawatt_hours(
                            &performance.self_consumption,
                            step_duration,
                        ),
                        purchased: 0.,
                    },
                )
            })
            .collect())
    }

    /// Cashflows of the prosumer's PV arrays and batteries, valuing the energy flows derived from
    /// its energy performance.
    ///
    /// Arguments:
    /// * `time_horizon` - years of operation after the investment
    /// * `step_duration` - in hours
    pub fn economic_performance(
        &mut self,
        time_horizon: usize,
        step_duration: f64,
    ) -> Result<&EconomicPerformance, DomainViolation> {
        let flows = priced_energy_flows(self.annual_energy_flows(step_duration)?, &self.economics);

        let assets = self
            .systems
            .iter()
            .map(|system| system.as_ref() as &dyn Asset)
            .chain(self.batteries.iter().map(|battery| battery as &dyn Asset))
            .collect();
        let performance = CashflowEngine::new(assets, flows, self.economics.fixed_annual_costs)
            .compute_cashflow(
                time_horizon,
                self.economics.tax_rate,
                self.economics.int_rate,
                &self.economics.other_capex_perc,
            )?;

        Ok(self.economic_performance.insert(performance))
    }
}
