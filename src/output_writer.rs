use crate::core::economics::EconomicPerformance;
use crate::core::energy_supply::elec_battery::BatteryPerformance;
use crate::corpus::RunResults;
use crate::output::Output;
use chrono::NaiveDateTime;
use csv::WriterBuilder;
use std::borrow::Cow;
use tracing::{debug, info, warn};

pub const PROSUMERS_ENERGY_KEY: &str = "prosumers_en_perf_evolution_kW";
pub const COMMUNITIES_ENERGY_KEY: &str = "recs_en_perf_evolution_kW";
pub const PROSUMERS_ECONOMICS_KEY: &str = "prosumers_ec_perf";
pub const COMMUNITIES_ECONOMICS_KEY: &str = "recs_ec_perf";
pub const BATTERIES_KEY: &str = "bess_perf_evolution";
pub const SYSTEMS_KEY: &str = "systems_perf_evolution";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Named columns of numbers, written side by side.
#[derive(Debug, Default)]
struct Table<'a> {
    columns: Vec<(String, Cow<'a, [f64]>)>,
}

impl<'a> Table<'a> {
    fn push(&mut self, heading: String, values: impl Into<Cow<'a, [f64]>>) {
        self.columns.push((heading, values.into()));
    }

    fn rows(&self) -> usize {
        self.columns
            .iter()
            .map(|(_, values)| values.len())
            .max()
            .unwrap_or(0)
    }

    fn cell(&self, column: usize, row: usize) -> String {
        self.columns[column]
            .1
            .get(row)
            .map(f64::to_string)
            .unwrap_or_default()
    }
}

/// Write all result tables of a run.
pub fn write_output_files(output: &impl Output, results: &RunResults) -> anyhow::Result<()> {
    if output.is_noop() {
        return Ok(());
    }

    let mut prosumers_energy = Table::default();
    for (id, prosumer) in &results.prosumers {
        for (carrier, performance) in &prosumer.energy {
            for (field, values) in performance.columns() {
                prosumers_energy.push(format!("{id}_{carrier}_{field}"), values);
            }
        }
    }
    write_timeseries(output, PROSUMERS_ENERGY_KEY, &results.timeline, &prosumers_energy)?;

    let mut communities_energy = Table::default();
    for (id, community) in &results.communities {
        for (carrier, performance) in &community.energy {
            for (field, values) in performance.columns() {
                communities_energy.push(format!("{id}_{carrier}_{field}"), values);
            }
        }
    }
    write_timeseries(output, COMMUNITIES_ENERGY_KEY, &results.timeline, &communities_energy)?;

    let mut prosumers_economics = Table::default();
    for (id, prosumer) in &results.prosumers {
        push_economics(&mut prosumers_economics, id, &prosumer.economics, "rev_savings");
    }
    write_table(output, PROSUMERS_ECONOMICS_KEY, &prosumers_economics)?;

    let mut communities_economics = Table::default();
    for (id, community) in &results.communities {
        // a community saves on the energy it shares
        push_economics(
            &mut communities_economics,
            id,
            &community.economics,
            "rev_inc_on_shared",
        );
    }
    write_table(output, COMMUNITIES_ECONOMICS_KEY, &communities_economics)?;

    let mut batteries = Table::default();
    let owned_batteries = results
        .prosumers
        .values()
        .flat_map(|prosumer| &prosumer.batteries)
        .chain(
            results
                .communities
                .values()
                .flat_map(|community| &community.batteries),
        );
    for (id, performance) in owned_batteries {
        push_battery(&mut batteries, id, performance);
    }
    write_timeseries(output, BATTERIES_KEY, &results.timeline, &batteries)?;

    let mut systems = Table::default();
    for (id, system) in &results.systems {
        systems.push(format!("{id}_irradiance"), system.irradiance.as_slice());
        systems.push(format!("{id}_vmp"), system.vmp.as_slice());
        systems.push(format!("{id}_imp"), system.imp.as_slice());
        systems.push(format!("{id}_power"), system.power.as_slice());
        systems.push(format!("{id}_voc"), system.voc.as_slice());
        systems.push(format!("{id}_isc"), system.isc.as_slice());
        systems.push(format!("{id}_t_cell"), system.cell_temperature.as_slice());
        systems.push(format!("{id}_fill_factor"), system.fill_factor.as_slice());
        systems.push(format!("{id}_efficiency"), system.efficiency.as_slice());
        systems.push(
            format!("{id}_converged"),
            system
                .convergence
                .iter()
                .map(|convergence| if convergence.is_converged() { 1. } else { 0. })
                .collect::<Vec<_>>(),
        );
    }
    write_timeseries(output, SYSTEMS_KEY, &results.timeline, &systems)?;

    Ok(())
}

/// Scalars go in the first row, yearly series follow from year 0.
fn push_economics<'a>(
    table: &mut Table<'a>,
    id: &str,
    economics: &'a EconomicPerformance,
    savings_heading: &str,
) {
    table.push(format!("{id}_NPV"), vec![economics.npv]);
    table.push(format!("{id}_pbp"), vec![economics.payback_period]);
    table.push(format!("{id}_capex"), vec![economics.capex]);
    for (field, values) in economics.yearly_series() {
        let field = if field == "rev_savings" {
            savings_heading
        } else {
            field
        };
        table.push(format!("{id}_{field}"), values);
    }
    table.push(format!("{id}_cashflow"), economics.cashflow.as_slice());
    table.push(
        format!("{id}_cashflow_cum"),
        economics.cashflow_cumulative.as_slice(),
    );
}

fn push_battery<'a>(table: &mut Table<'a>, id: &str, performance: &'a BatteryPerformance) {
    table.push(
        format!("{id}_power_in"),
        performance.remaining_power.as_slice(),
    );
    table.push(format!("{id}_soc"), performance.soc.as_slice());
    table.push(format!("{id}_stored"), performance.stored.as_slice());
    table.push(format!("{id}_supply"), performance.supplied.as_slice());
    table.push(format!("{id}_power"), performance.power.as_slice());
    table.push(format!("{id}_surplus"), performance.surplus.as_slice());
    table.push(format!("{id}_deficit"), performance.deficit.as_slice());
    table.push(format!("{id}_current"), performance.current.as_slice());
    table.push(
        format!("{id}_case"),
        performance
            .mode
            .iter()
            .map(|mode| *mode as u8 as f64)
            .collect::<Vec<_>>(),
    );
}

fn write_timeseries(
    output: &impl Output,
    location_key: &str,
    timeline: &[NaiveDateTime],
    table: &Table,
) -> anyhow::Result<()> {
    if table.columns.is_empty() {
        debug!("Nothing to write to {location_key}");
        return Ok(());
    }
    if table.rows() != timeline.len() {
        warn!(
            "Columns of {location_key} have up to {} rows but the timeline has {} steps; writing one row per step",
            table.rows(),
            timeline.len()
        );
    }
    info!("Writing out to {location_key}");
    let writer = output.writer_for_location_key(location_key)?;
    let mut writer = WriterBuilder::new().from_writer(writer);

    writer.write_record(
        std::iter::once("date").chain(table.columns.iter().map(|(heading, _)| heading.as_str())),
    )?;
    for (row, date) in timeline.iter().enumerate() {
        let mut record = vec![date.format(DATE_FORMAT).to_string()];
        record.extend((0..table.columns.len()).map(|column| table.cell(column, row)));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(())
}

fn write_table(output: &impl Output, location_key: &str, table: &Table) -> anyhow::Result<()> {
    if table.columns.is_empty() {
        debug!("Nothing to write to {location_key}");
        return Ok(());
    }
    info!("Writing out to {location_key}");
    let writer = output.writer_for_location_key(location_key)?;
    let mut writer = WriterBuilder::new().from_writer(writer);

    writer.write_record(table.columns.iter().map(|(heading, _)| heading.as_str()))?;
    for row in 0..table.rows() {
        writer.write_record((0..table.columns.len()).map(|column| table.cell(column, row)))?;
    }
    writer.flush()?;

    Ok(())
}
