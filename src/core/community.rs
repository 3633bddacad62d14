use crate::core::asset::Asset;
use crate::core::balance::{add_series, check_length, match_supply_and_demand, sum_series};
use crate::core::demand::DemandSource;
use crate::core::economics::{AnnualEnergyFlow, CashflowEngine, EconomicPerformance};
use crate::core::energy_supply::dispatch_controller::DispatchController;
use crate::core::energy_supply::elec_battery::BatteryUnit;
use crate::core::energy_supply::pv::PvArray;
use crate::core::prosumer::{
    priced_energy_flows, validate_carriers, Prosumer, ProsumerEnergyPerformance,
};
use crate::core::units::power_series_to_megawatt_hours;
use crate::errors::DomainViolation;
use crate::input::{Carrier, EntityEconomics};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Community battery behaviour (kW, SOC as a fraction).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CommunityStorage {
    pub stored: Vec<f64>,
    pub supplied: Vec<f64>,
    pub power: Vec<f64>,
    pub soc: Vec<f64>,
}

/// Balance of one carrier across a community, in kW.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CommunityEnergyPerformance {
    /// production of the prosumers and of the community's own arrays
    pub production: Vec<f64>,
    /// what is left of the production once the prosumers have covered their own demand
    pub production_net: Vec<f64>,
    /// production of the community's own arrays
    pub production_rec: Vec<f64>,
    pub demand: Vec<f64>,
    /// what is left of the demand once the prosumers have covered their own demand
    pub demand_net: Vec<f64>,
    /// net production matched to net demand, plus what the community batteries store
    pub shared: Vec<f64>,
    pub surplus_prosumers: Vec<f64>,
    pub selfcons_prosumers: Vec<f64>,
    pub unmet_prosumers: Vec<f64>,
    pub surplus: Vec<f64>,
    pub unmet: Vec<f64>,
    /// only for electricity, and only when the community has batteries
    pub storage: Option<CommunityStorage>,
}

impl CommunityEnergyPerformance {
    /// Series under their output names.
    pub fn columns(&self) -> Vec<(&'static str, &[f64])> {
        let mut columns = vec![
            ("prod", self.production.as_slice()),
            ("prod_net", self.production_net.as_slice()),
            ("prod_rec", self.production_rec.as_slice()),
            ("dem", self.demand.as_slice()),
            ("dem_net", self.demand_net.as_slice()),
            ("shared", self.shared.as_slice()),
            ("surplus_prosumers", self.surplus_prosumers.as_slice()),
            ("selfcons_prosumers", self.selfcons_prosumers.as_slice()),
            ("unmet_prosumers", self.unmet_prosumers.as_slice()),
            ("surplus", self.surplus.as_slice()),
            ("unmet", self.unmet.as_slice()),
        ];
        if let Some(storage) = &self.storage {
            columns.extend([
                ("stored", storage.stored.as_slice()),
                ("supply", storage.supplied.as_slice()),
                ("power", storage.power.as_slice()),
                ("soc", storage.soc.as_slice()),
            ]);
        }
        columns
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct CommunityMembers {
    pub total: usize,
    pub prosumers: usize,
    pub consumers: usize,
}

/// A renewable energy community: prosumers and consumers sharing energy, plus the community's own
/// PV arrays and batteries.
#[derive(Debug)]
pub struct Community {
    id: String,
    carriers: Vec<Carrier>,
    /// ids of the member prosumers
    prosumers: Vec<String>,
    consumers: Vec<Arc<DemandSource>>,
    systems: Vec<Arc<PvArray>>,
    batteries: Vec<BatteryUnit>,
    economics: EntityEconomics,
    energy_performance: Option<IndexMap<Carrier, CommunityEnergyPerformance>>,
    economic_performance: Option<EconomicPerformance>,
}

impl Community {
    /// Construct a Community
    ///
    /// Arguments:
    /// * `id` - identifier of the community
    /// * `carriers` - carriers balanced across the community; each needs prices in `economics`
    ///                and demand from a member prosumer or consumer
    /// * `prosumers` - member prosumers
    /// * `consumers` - member consumers, without production of their own
    /// * `systems` - PV arrays owned by the community
    /// * `batteries` - batteries owned by the community
    /// * `economics` - tax and interest rates, prices per carrier and further capex
    pub fn new(
        id: &str,
        carriers: Vec<Carrier>,
        prosumers: &[&Prosumer],
        consumers: Vec<Arc<DemandSource>>,
        systems: Vec<Arc<PvArray>>,
        batteries: Vec<BatteryUnit>,
        economics: EntityEconomics,
    ) -> Result<Self, DomainViolation> {
        validate_carriers(id, &carriers, &economics, |carrier| {
            prosumers
                .iter()
                .any(|prosumer| prosumer.carriers().contains(&carrier))
                || consumers.iter().any(|consumer| consumer.provides(carrier))
        })?;

        Ok(Self {
            id: id.to_string(),
            carriers,
            prosumers: prosumers
                .iter()
                .map(|prosumer| prosumer.id().to_string())
                .collect(),
            consumers,
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

    pub fn prosumer_ids(&self) -> &[String] {
        &self.prosumers
    }

    pub fn batteries(&self) -> &[BatteryUnit] {
        &self.batteries
    }

    pub fn members(&self) -> CommunityMembers {
        CommunityMembers {
            total: self.prosumers.len() + self.consumers.len(),
            prosumers: self.prosumers.len(),
            consumers: self.consumers.len(),
        }
    }

    pub fn energy_performance_results(
        &self,
    ) -> Option<&IndexMap<Carrier, CommunityEnergyPerformance>> {
        self.energy_performance.as_ref()
    }

    pub fn energy_performance_for(&self, carrier: Carrier) -> Option<&CommunityEnergyPerformance> {
        self.energy_performance.as_ref()?.get(&carrier)
    }

    pub fn economic_performance_results(&self) -> Option<&EconomicPerformance> {
        self.economic_performance.as_ref()
    }

    /// Share the members' net production and net demand for each carrier, dispatching the
    /// community batteries against the electricity balance. Every member prosumer's energy
    /// performance must already be computed.
    ///
    /// Arguments:
    /// * `prosumers` - prosumers by id, including at least the members
    /// * `step_duration` - in hours
    pub fn energy_performance(
        &mut self,
        prosumers: &IndexMap<String, Prosumer>,
        step_duration: f64,
    ) -> Result<&IndexMap<Carrier, CommunityEnergyPerformance>, DomainViolation> {
        let mut results = IndexMap::with_capacity(self.carriers.len());

        for &carrier in &self.carriers {
            let mut member_results: Vec<(&str, &ProsumerEnergyPerformance)> = vec![];
            for id in &self.prosumers {
                let prosumer = prosumers
                    .get(id)
                    .ok_or_else(|| DomainViolation::EnergyPerformanceNotComputed(id.clone()))?;
                if !prosumer.carriers().contains(&carrier) {
                    continue;
                }
                let performance = prosumer
                    .energy_performance_for(carrier)
                    .ok_or_else(|| DomainViolation::EnergyPerformanceNotComputed(id.clone()))?;
                member_results.push((prosumer.id(), performance));
            }

            let steps = member_results
                .first()
                .map(|(_, performance)| performance.demand.len())
                .or_else(|| {
                    self.consumers
                        .iter()
                        .find_map(|consumer| consumer.demand_for(carrier))
                        .map(<[f64]>::len)
                })
                .unwrap_or(0);

            let member_sum = |field: fn(&ProsumerEnergyPerformance) -> &[f64]| {
                sum_series(
                    &self.id,
                    steps,
                    member_results
                        .iter()
                        .map(|(id, performance)| (*id, field(performance))),
                )
            };
            let production_prosumers = member_sum(|p| p.production.as_slice())?;
            let demand_prosumers = member_sum(|p| p.demand.as_slice())?;
            let surplus_prosumers = member_sum(|p| p.surplus.as_slice())?;
            let selfcons_prosumers = member_sum(|p| p.self_consumption.as_slice())?;
            let unmet_prosumers = member_sum(|p| p.unmet.as_slice())?;

            let demand_consumers = sum_series(
                &self.id,
                steps,
                self.consumers.iter().filter_map(|consumer| {
                    consumer
                        .demand_for(carrier)
                        .map(|demand| (consumer.id(), demand))
                }),
            )?;

            let mut produced = Vec::with_capacity(self.systems.len());
            for system in &self.systems {
                if system.economic_asset().carriers().contains(&carrier) {
                    let power = system
                        .produced_power_for(carrier)
                        .ok_or_else(|| DomainViolation::OutputNotComputed(system.id().into()))?;
                    check_length(&self.id, system.id(), steps, power)?;
                    produced.push((system.id(), power));
                }
            }
            let production_rec = sum_series(&self.id, steps, produced)?;

            let production = add_series(&production_prosumers, &production_rec);
            let production_net = add_series(&surplus_prosumers, &production_rec);
            let demand = add_series(&demand_prosumers, &demand_consumers);
            let demand_net = add_series(&unmet_prosumers, &demand_consumers);

            let baseline = match_supply_and_demand(&production_net, &demand_net);

            let (shared, surplus, unmet, storage) =
                if carrier == Carrier::Electricity && !self.batteries.is_empty() {
                    let storage = DispatchController::new(&self.id, &mut self.batteries).run(
                        &production_net,
                        &demand_net,
                        step_duration,
                    )?;
                    (
                        add_series(&baseline.matched, &storage.stored),
                        storage.surplus,
                        storage.deficit,
                        Some(CommunityStorage {
                            stored: storage.stored,
                            supplied: storage.supplied,
                            power: storage.power,
                            soc: storage.soc,
                        }),
                    )
                } else {
                    (baseline.matched, baseline.surplus, baseline.unmet, None)
                };

            debug!("Community {} balanced for {carrier}", self.id);
            results.insert(
                carrier,
                CommunityEnergyPerformance {
                    production,
                    production_net,
                    production_rec,
                    demand,
                    demand_net,
                    shared,
                    surplus_prosumers,
                    selfcons_prosumers,
                    unmet_prosumers,
                    surplus,
                    unmet,
                    storage,
                },
            );
        }

        Ok(self.energy_performance.insert(results))
    }

    /// Energy sold (the production of the community's own arrays) and shared over the
    /// simulation, per carrier, in MWh. Nothing is counted as purchased.
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
                        sold: power_series_to_megawatt_hours(
                            &performance.production_rec,
                            step_duration,
                        ),
                        self_consumption: power_series_to_megawatt_hours(
                            &performance.shared,
                            step_duration,
                        ),
                        purchased: 0.,
                    },
                )
            })
            .collect())
    }

    /// Cashflows of the community's own PV arrays and batteries.
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
