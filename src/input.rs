use crate::read_weather_file::IrradianceData;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Read};
use std::path::PathBuf;
use strum_macros::{Display, EnumString};

pub fn ingest_for_processing(json: impl Read) -> Result<Input, anyhow::Error> {
    let reader = BufReader::new(json);
    Ok(serde_json::from_reader(reader)?)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Input {
    pub simulation: SimulationInput,
    #[serde(default)]
    pub users: IndexMap<String, UserInput>,
    #[serde(default)]
    pub systems: IndexMap<String, PvSystemInput>,
    #[serde(default)]
    pub bess: IndexMap<String, BatteryInput>,
    #[serde(default)]
    pub prosumers: IndexMap<String, ProsumerInput>,
    #[serde(default, alias = "recs")]
    pub rec: IndexMap<String, CommunityInput>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationInput {
    /// e.g. "15min" or "1h"
    pub time_step: String,
    pub start_date: String,
    /// investment horizon, in years
    pub time_horizon: usize,
    /// `;`-separated demand file, relative to the configuration's base path
    pub demand_curve_file: Option<PathBuf>,
}

/// An energy type that is accounted for independently of the others.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Carrier {
    Electricity,
    Heat,
    Gas,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserInput {
    // informational only; users are referred to by their key
    #[allow(dead_code)]
    id: Option<String>,
    pub carriers: IndexMap<Carrier, DemandSeriesInput>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DemandSeriesInput {
    /// column of the simulation's demand file
    Column { column: String },
    /// demand in kW, one value per simulation step
    Values { values: Vec<f64> },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PvSystemInput {
    pub tech: PvTechInput,
    pub economics: AssetEconomics,
    /// hourly irradiance; when absent it is read from the irradiance directory
    pub irradiance: Option<IrradianceData>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PvTechInput {
    // the location and azimuth are only needed for fetching irradiance, which happens upstream
    #[allow(dead_code)]
    id: Option<String>,
    #[allow(dead_code)]
    lat: Option<f64>,
    #[allow(dead_code)]
    lon: Option<f64>,
    #[allow(dead_code)]
    azimuth: Option<f64>,
    pub n_series: u32,
    pub n_parallel: u32,
    /// slope of the modules from horizontal, in degrees
    pub tilt: f64,
    #[serde(default)]
    pub module: PvModuleParameters,
    #[serde(default = "default_mppt")]
    pub mppt: bool,
}

fn default_mppt() -> bool {
    true
}

/// Datasheet parameters of a single PV module. Temperatures are in degrees C.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PvModuleParameters {
    /// short-circuit current at reference conditions, A
    pub isc_ref: f64,
    /// open-circuit voltage at reference conditions, V
    pub voc_ref: f64,
    pub t_ref: f64,
    /// reference irradiance, W/m2
    pub irradiance_ref: f64,
    pub vmpp_ref: f64,
    pub impp_ref: f64,
    /// temperature coefficient of the short-circuit current, A/K
    pub mu_isc: f64,
    /// temperature coefficient of the open-circuit voltage, V/K
    pub mu_voc: f64,
    pub cells_in_series: u32,
    /// nominal operating cell temperature
    pub t_noct: f64,
    /// module area, m2
    pub area: f64,
}

impl Default for PvModuleParameters {
    fn default() -> Self {
        Self {
            isc_ref: 10.47,
            voc_ref: 49.3,
            t_ref: 25.,
            irradiance_ref: 1000.,
            vmpp_ref: 40.6,
            impp_ref: 9.86,
            mu_isc: 0.02,
            mu_voc: 0.26,
            cells_in_series: 60,
            t_noct: 42.,
            area: 2.07,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryInput {
    pub tech: BatteryTechnology,
    pub economics: AssetEconomics,
}

/// Module-level battery parameters plus the number of modules in series and in parallel.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BatteryTechnology {
    #[allow(dead_code)]
    id: Option<String>,
    /// module capacity, kWh
    pub cap_module: f64,
    /// module voltage, V
    pub v: f64,
    /// module current limits, A
    pub i_max: f64,
    pub i_min: f64,
    pub soc_in: f64,
    pub soc_max: f64,
    pub soc_min: f64,
    pub n_series: u32,
    pub n_parallel: u32,
}

impl BatteryTechnology {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cap_module: f64,
        v: f64,
        i_max: f64,
        i_min: f64,
        soc_in: f64,
        soc_max: f64,
        soc_min: f64,
        n_series: u32,
        n_parallel: u32,
    ) -> Self {
        Self {
            id: None,
            cap_module,
            v,
            i_max,
            i_min,
            soc_in,
            soc_max,
            soc_min,
            n_series,
            n_parallel,
        }
    }
}

/// Cost and revenue schedule of a single asset. Costs are per unit of capacity.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AssetEconomics {
    /// capital cost per unit of capacity
    pub cap_cost: f64,
    /// operating cost per unit of operating capacity, per year
    pub opex_cost: f64,
    #[serde(default)]
    pub inc_year: f64,
    #[serde(default)]
    pub inc_start_end: YearRange,
    #[serde(default)]
    pub tax_year: f64,
    #[serde(default)]
    pub other_cost: IndexMap<String, ScheduledItem>,
    #[serde(default)]
    pub other_rev: IndexMap<String, ScheduledItem>,
}

/// An inclusive range of 1-based project years, given as `[first, last]`.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct YearRange {
    pub first: u32,
    pub last: u32,
}

impl YearRange {
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    pub fn contains(&self, year: u32) -> bool {
        self.first <= year && year <= self.last
    }
}

impl From<[u32; 2]> for YearRange {
    fn from([first, last]: [u32; 2]) -> Self {
        Self { first, last }
    }
}

impl From<YearRange> for [u32; 2] {
    fn from(range: YearRange) -> Self {
        [range.first, range.last]
    }
}

/// An additional cost or revenue of `quantity * unit_price` per year while active.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScheduledItem {
    #[serde(alias = "unit")]
    pub quantity: f64,
    #[serde(alias = "cost_unit", alias = "rev_unit")]
    pub unit_price: f64,
    #[serde(alias = "dur")]
    pub years: YearRange,
}

impl ScheduledItem {
    pub fn annual_amount(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProsumerInput {
    pub tech: ProsumerTechInput,
    pub economics: EntityEconomics,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProsumerTechInput {
    #[allow(dead_code)]
    id: Option<String>,
    pub carriers: Vec<Carrier>,
    pub users: Vec<String>,
    #[serde(default)]
    pub systems: Vec<String>,
    #[serde(default)]
    pub bess: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommunityInput {
    pub tech: CommunityTechInput,
    pub economics: EntityEconomics,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommunityTechInput {
    #[allow(dead_code)]
    id: Option<String>,
    pub carriers: Vec<Carrier>,
    #[serde(default)]
    pub prosumers: Vec<String>,
    #[serde(default)]
    pub consumers: Vec<String>,
    #[serde(default, alias = "systems")]
    pub rec_systems: Vec<String>,
    #[serde(default)]
    pub bess: Vec<String>,
}

/// Economic parameters of a prosumer or a community.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EntityEconomics {
    /// tax on revenue from sold energy, as a fraction
    pub tax_rate: f64,
    /// discount rate for the net present value
    pub int_rate: f64,
    pub carriers_and_costs: IndexMap<Carrier, CarrierPrices>,
    /// further capital costs, each as a fraction of the total capex
    #[serde(default)]
    pub other_capex_perc: Vec<f64>,
    #[serde(default)]
    pub fixed_annual_costs: FixedCostPolicy,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CarrierPrices {
    /// yearly decay of the energy flows, as a fraction
    pub decay: f64,
    pub price_buy: f64,
    pub price_sold: f64,
}

/// Whether the fixed annual operating cost and tax of the assets enter the yearly cashflows.
///
/// They are summed across the assets either way, but by default they are left out of the yearly
/// cost series.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedCostPolicy {
    #[default]
    Excluded,
    Included,
}
