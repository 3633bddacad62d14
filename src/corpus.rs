use crate::core::community::{Community, CommunityEnergyPerformance, CommunityMembers};
use crate::core::demand::DemandSource;
use crate::core::economics::EconomicPerformance;
use crate::core::energy_supply::elec_battery::{BatteryPerformance, BatteryUnit};
use crate::core::energy_supply::pv::{PvArray, PvOutput};
use crate::core::prosumer::{Prosumer, ProsumerEnergyPerformance};
use crate::errors::{ConfigurationError, DomainViolation, RecError};
use crate::input::{Carrier, DemandSeriesInput, Input, UserInput};
use crate::read_demand_file::DemandTable;
use crate::read_weather_file::IrradianceData;
use crate::simulation_time::SimulationTime;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a run produces, keyed by the ids used in the configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunResults {
    pub timeline: Vec<NaiveDateTime>,
    /// hours
    pub step_duration: f64,
    pub systems: IndexMap<String, PvOutput>,
    pub prosumers: IndexMap<String, ProsumerResults>,
    pub communities: IndexMap<String, CommunityResults>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProsumerResults {
    pub energy: IndexMap<Carrier, ProsumerEnergyPerformance>,
    pub economics: EconomicPerformance,
    pub batteries: IndexMap<String, BatteryPerformance>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommunityResults {
    pub members: CommunityMembers,
    pub energy: IndexMap<Carrier, CommunityEnergyPerformance>,
    pub economics: EconomicPerformance,
    pub batteries: IndexMap<String, BatteryPerformance>,
}

#[derive(Debug)]
struct PvSystem {
    array: Arc<PvArray>,
    tilt: f64,
    irradiance: IrradianceData,
}

/// All the entities of a community simulation, built from the configuration.
#[derive(Debug)]
pub struct Corpus {
    simulation_time: SimulationTime,
    time_horizon: usize,
    systems: IndexMap<String, PvSystem>,
    consumers: IndexMap<String, Arc<DemandSource>>,
    prosumers: IndexMap<String, Prosumer>,
    communities: IndexMap<String, Community>,
}

impl Corpus {
    /// Build the entities described by the configuration, in dependency order: PV arrays and
    /// batteries, consumers, prosumers, then communities.
    ///
    /// Arguments:
    /// * `input` - the configuration
    /// * `demand_table` - demand columns referred to by the users, if any
    /// * `irradiance` - hourly irradiance per PV system id
    pub fn from_inputs(
        input: &Input,
        demand_table: Option<&DemandTable>,
        mut irradiance: IndexMap<String, IrradianceData>,
    ) -> Result<Self, RecError> {
        let simulation_time = SimulationTime::from_config(
            &input.simulation.time_step,
            &input.simulation.start_date,
            0,
        )?;
        let steps_per_hour = simulation_time.steps_per_hour()?;

        let mut systems = IndexMap::with_capacity(input.systems.len());
        for (id, system) in &input.systems {
            let hourly = irradiance
                .shift_remove(id)
                .ok_or_else(|| ConfigurationError::MissingIrradiance(id.clone()))?;
            let array = PvArray::new(
                id,
                system.tech.module,
                system.tech.n_series,
                system.tech.n_parallel,
                system.tech.mppt,
                system.economics.clone(),
            )?;
            systems.insert(
                id.clone(),
                PvSystem {
                    array: Arc::new(array),
                    tilt: system.tech.tilt,
                    irradiance: hourly.forward_fill(steps_per_hour),
                },
            );
        }

        let mut batteries = IndexMap::with_capacity(input.bess.len());
        for (id, battery) in &input.bess {
            batteries.insert(
                id.clone(),
                BatteryUnit::new(id, &battery.tech, battery.economics.clone())?,
            );
        }
        let mut battery_owners: IndexMap<String, String> = IndexMap::new();
        info!(
            "Built {} PV arrays and {} batteries",
            systems.len(),
            batteries.len()
        );

        let mut consumers = IndexMap::with_capacity(input.users.len());
        for (id, user) in &input.users {
            consumers.insert(
                id.clone(),
                Arc::new(demand_source_from_input(id, user, demand_table)?),
            );
        }
        let total_steps = consumers
            .values()
            .find_map(|consumer: &Arc<DemandSource>| {
                consumer
                    .carriers()
                    .next()
                    .and_then(|carrier| consumer.demand_for(carrier))
                    .map(<[f64]>::len)
            })
            .unwrap_or(0);

        let mut prosumers = IndexMap::with_capacity(input.prosumers.len());
        for (id, prosumer) in &input.prosumers {
            let tech = &prosumer.tech;
            prosumers.insert(
                id.clone(),
                Prosumer::new(
                    id,
                    tech.carriers.clone(),
                    resolve(&consumers, &tech.users, "User", id)?,
                    resolve_systems(&systems, &tech.systems, id)?,
                    take_batteries(&mut batteries, &mut battery_owners, &tech.bess, id)?,
                    prosumer.economics.clone(),
                )?,
            );
        }

        let mut communities = IndexMap::with_capacity(input.rec.len());
        for (id, community) in &input.rec {
            let tech = &community.tech;
            let members = tech
                .prosumers
                .iter()
                .map(|member| {
                    prosumers
                        .get(member)
                        .ok_or_else(|| unknown_reference("Prosumer", member, id))
                })
                .collect::<Result<Vec<_>, _>>()?;
            communities.insert(
                id.clone(),
                Community::new(
                    id,
                    tech.carriers.clone(),
                    &members,
                    resolve(&consumers, &tech.consumers, "User", id)?,
                    resolve_systems(&systems, &tech.rec_systems, id)?,
                    take_batteries(&mut batteries, &mut battery_owners, &tech.bess, id)?,
                    community.economics.clone(),
                )?,
            );
        }

        for id in batteries.keys() {
            warn!("Battery {id} is not used by any prosumer or community and will be ignored");
        }
        info!(
            "Built {} consumers, {} prosumers and {} communities",
            consumers.len(),
            prosumers.len(),
            communities.len()
        );

        Ok(Self {
            simulation_time: simulation_time.with_total_steps(total_steps),
            time_horizon: input.simulation.time_horizon,
            systems,
            consumers,
            prosumers,
            communities,
        })
    }

    pub fn simulation_time(&self) -> &SimulationTime {
        &self.simulation_time
    }

    pub fn consumer(&self, id: &str) -> Option<&DemandSource> {
        self.consumers.get(id).map(Arc::as_ref)
    }

    /// Run the simulation: PV outputs, then the energy and economic performance of each
    /// prosumer, then of each community.
    pub fn run(&mut self) -> Result<RunResults, RecError> {
        let step_duration = self.simulation_time.step();

        let mut system_results = IndexMap::with_capacity(self.systems.len());
        for (id, system) in &self.systems {
            let output = system
                .array
                .compute_output(system.tilt, &system.irradiance)?;
            let capped = output
                .convergence
                .iter()
                .filter(|convergence| !convergence.is_converged())
                .count();
            if capped > 0 {
                warn!("PV array {id} reached its iteration cap in {capped} steps");
            }
            info!("Computed output of PV array {id}");
            system_results.insert(id.clone(), output);
        }

        let mut prosumer_results = IndexMap::with_capacity(self.prosumers.len());
        for (id, prosumer) in self.prosumers.iter_mut() {
            let energy = prosumer.energy_performance(step_duration)?.clone();
            info!("Balanced prosumer {id}");
            let economics = prosumer
                .economic_performance(self.time_horizon, step_duration)?
                .clone();
            info!("Computed economics of prosumer {id}: NPV {:.2}", economics.npv);
            prosumer_results.insert(
                id.clone(),
                ProsumerResults {
                    energy,
                    economics,
                    batteries: battery_results(prosumer.batteries()),
                },
            );
        }

        let mut community_results = IndexMap::with_capacity(self.communities.len());
        for (id, community) in self.communities.iter_mut() {
            let energy = community
                .energy_performance(&self.prosumers, step_duration)?
                .clone();
            info!("Balanced community {id}");
            let economics = community
                .economic_performance(self.time_horizon, step_duration)?
                .clone();
            info!("Computed economics of community {id}: NPV {:.2}", economics.npv);
            community_results.insert(
                id.clone(),
                CommunityResults {
                    members: community.members(),
                    energy,
                    economics,
                    batteries: battery_results(community.batteries()),
                },
            );
        }

        Ok(RunResults {
            timeline: self.simulation_time.timeline(),
            step_duration,
            systems: system_results,
            prosumers: prosumer_results,
            communities: community_results,
        })
    }
}

fn unknown_reference(kind: &'static str, id: &str, referrer: &str) -> ConfigurationError {
    ConfigurationError::UnknownReference {
        kind,
        id: id.to_string(),
        referrer: referrer.to_string(),
    }
}

fn resolve<T>(
    available: &IndexMap<String, Arc<T>>,
    ids: &[String],
    kind: &'static str,
    referrer: &str,
) -> Result<Vec<Arc<T>>, ConfigurationError> {
    ids.iter()
        .map(|id| {
            available
                .get(id)
                .cloned()
                .ok_or_else(|| unknown_reference(kind, id, referrer))
        })
        .collect()
}

fn resolve_systems(
    systems: &IndexMap<String, PvSystem>,
    ids: &[String],
    referrer: &str,
) -> Result<Vec<Arc<PvArray>>, ConfigurationError> {
    ids.iter()
        .map(|id| {
            systems
                .get(id)
                .map(|system| system.array.clone())
                .ok_or_else(|| unknown_reference("System", id, referrer))
        })
        .collect()
}

/// Hand the batteries over to their owner; a battery can only have one.
fn take_batteries(
    batteries: &mut IndexMap<String, BatteryUnit>,
    owners: &mut IndexMap<String, String>,
    ids: &[String],
    referrer: &str,
) -> Result<Vec<BatteryUnit>, ConfigurationError> {
    let mut taken = Vec::with_capacity(ids.len());
    for id in ids {
        match batteries.shift_remove(id) {
            Some(battery) => {
                owners.insert(id.clone(), referrer.to_string());
                taken.push(battery);
            }
            None => {
                return Err(match owners.get(id) {
                    Some(owner) => ConfigurationError::BatteryOwnedTwice {
                        id: id.clone(),
                        owner: owner.clone(),
                        referrer: referrer.to_string(),
                    },
                    None => unknown_reference("Battery", id, referrer),
                })
            }
        }
    }
    Ok(taken)
}

fn demand_source_from_input(
    id: &str,
    user: &UserInput,
    demand_table: Option<&DemandTable>,
) -> Result<DemandSource, RecError> {
    let mut demand = IndexMap::with_capacity(user.carriers.len());
    for (carrier, series) in &user.carriers {
        let values = match series {
            DemandSeriesInput::Values { values } => values.clone(),
            DemandSeriesInput::Column { column } => demand_table
                .ok_or_else(|| ConfigurationError::MissingDemandFile(id.to_string()))?
                .column(column)
                .ok_or_else(|| ConfigurationError::MissingDemandColumn {
                    id: id.to_string(),
                    column: column.clone(),
                })?
                .to_vec(),
        };
        if let Some(value) = values.iter().find(|value| **value < 0.) {
            return Err(DomainViolation::NegativeValue {
                entity: id.to_string(),
                field: "demand",
                value: *value,
            }
            .into());
        }
        demand.insert(*carrier, values);
    }
    Ok(DemandSource::new(id, demand))
}

fn battery_results(batteries: &[BatteryUnit]) -> IndexMap<String, BatteryPerformance> {
    batteries
        .iter()
        .map(|battery| (battery.id().to_string(), battery.performance().clone()))
        .collect()
}
