#![allow(clippy::too_many_arguments)]

mod compare_floats;
pub mod core;
pub mod corpus;
pub mod errors;
pub mod input;
pub mod output;
pub mod output_writer;
pub mod read_demand_file;
pub mod read_weather_file;
pub mod simulation_time;
mod statistics;
#[cfg(test)]
mod tests;

pub use crate::corpus::RunResults;
pub use crate::errors::RecError;
use crate::corpus::Corpus;
use crate::errors::ConfigurationError;
use crate::input::{ingest_for_processing, Input};
use crate::output::Output;
use crate::output_writer::write_output_files;
use crate::read_demand_file::{demand_table_from_csv, DemandTable, DEMAND_FILE_DELIMITER};
use crate::read_weather_file::{irradiance_data_from_csv, IrradianceData};
use anyhow::Context;
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::info;

/// Run a community simulation and write its result tables.
///
/// Arguments:
/// * `input` - the JSON configuration
/// * `output` - where the result tables go
/// * `base_path` - directory that the demand file named in the configuration is relative to
/// * `irradiance_dir` - directory of `<system id>.csv` hourly irradiance files, for systems whose
///                      irradiance is not given in the configuration
pub fn run_project(
    input: impl Read,
    output: impl Output,
    base_path: Option<&Path>,
    irradiance_dir: Option<&Path>,
) -> Result<RunResults, RecError> {
    let input = ingest_for_processing(input)?;

    let demand_table = input
        .simulation
        .demand_curve_file
        .as_ref()
        .map(|file| read_demand_table(&resolve_path(base_path, file)))
        .transpose()?;
    let irradiance = irradiance_for_systems(&input, irradiance_dir)?;

    let mut corpus = Corpus::from_inputs(&input, demand_table.as_ref(), irradiance)?;
    let results = corpus.run()?;
    info!(
        "Simulated {} steps for {} prosumers and {} communities",
        results.timeline.len(),
        results.prosumers.len(),
        results.communities.len()
    );

    write_output_files(&output, &results)?;

    Ok(results)
}

fn resolve_path(base_path: Option<&Path>, file: &Path) -> PathBuf {
    match base_path {
        Some(base_path) => base_path.join(file),
        None => file.to_path_buf(),
    }
}

fn read_demand_table(path: &Path) -> Result<DemandTable, RecError> {
    if !path.exists() {
        return Err(ConfigurationError::MissingFile(path.to_path_buf()).into());
    }
    let file = File::open(path)
        .with_context(|| format!("Could not open demand file {}", path.display()))?;
    Ok(demand_table_from_csv(
        BufReader::new(file),
        DEMAND_FILE_DELIMITER,
    )?)
}

/// Irradiance given in the configuration, or else read from the irradiance directory.
fn irradiance_for_systems(
    input: &Input,
    irradiance_dir: Option<&Path>,
) -> Result<IndexMap<String, IrradianceData>, RecError> {
    let mut irradiance = IndexMap::with_capacity(input.systems.len());
    for (id, system) in &input.systems {
        let data = match (&system.irradiance, irradiance_dir) {
            (Some(data), _) => data.clone(),
            (None, Some(directory)) => {
                let path = directory.join(format!("{id}.csv"));
                if !path.exists() {
                    return Err(ConfigurationError::MissingFile(path).into());
                }
                let file = File::open(&path)
                    .with_context(|| format!("Could not open irradiance file {}", path.display()))?;
                irradiance_data_from_csv(BufReader::new(file))?
            }
            // reported as missing when the system is built
            (None, None) => continue,
        };
        irradiance.insert(id.clone(), data);
    }
    Ok(irradiance)
}
