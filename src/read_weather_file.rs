use anyhow::{anyhow, bail};
use csv::ReaderBuilder as CsvReaderBuilder;
use serde::Deserialize;
use std::io::Read;

const COLUMN_BEAM: &str = "poa_direct"; // beam irradiance on the plane of array, W/m2
const COLUMN_SKY_DIFFUSE: &str = "poa_sky_diffuse"; // W/m2
const COLUMN_GROUND_DIFFUSE: &str = "poa_ground_diffuse"; // W/m2
const COLUMN_AIR_TEMP: &str = "temp_air"; // dry bulb temp in degrees
const COLUMN_INCIDENCE_ANGLE: &str = "aoi"; // optional, degrees

/// Irradiance on the plane of a PV array and the ambient air temperature, one value per entry.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IrradianceData {
    pub beam: Vec<f64>,
    pub sky_diffuse: Vec<f64>,
    pub ground_diffuse: Vec<f64>,
    pub air_temperature: Vec<f64>,
    #[serde(default)]
    pub incidence_angle: Option<Vec<f64>>,
}

impl IrradianceData {
    pub fn len(&self) -> usize {
        self.beam.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beam.is_empty()
    }

    /// Repeat each (hourly) entry `repeats` times, e.g. 4 times for a 15 minute simulation step.
    pub fn forward_fill(&self, repeats: usize) -> Self {
        let fill = |series: &[f64]| -> Vec<f64> {
            series
                .iter()
                .flat_map(|value| itertools::repeat_n(*value, repeats))
                .collect()
        };

        Self {
            beam: fill(&self.beam),
            sky_diffuse: fill(&self.sky_diffuse),
            ground_diffuse: fill(&self.ground_diffuse),
            air_temperature: fill(&self.air_temperature),
            incidence_angle: self.incidence_angle.as_deref().map(fill),
        }
    }

    fn check_lengths(&self) -> anyhow::Result<()> {
        let expected = self.beam.len();
        for (name, length) in [
            ("sky_diffuse", self.sky_diffuse.len()),
            ("ground_diffuse", self.ground_diffuse.len()),
            ("air_temperature", self.air_temperature.len()),
            (
                "incidence_angle",
                self.incidence_angle.as_ref().map_or(expected, Vec::len),
            ),
        ] {
            if length != expected {
                bail!("Irradiance series {name} has {length} entries, expected {expected}");
            }
        }
        Ok(())
    }
}

/// Read hourly irradiance from a CSV file with named columns, such as those exported by PVGIS.
/// Columns other than the ones needed are ignored.
pub fn irradiance_data_from_csv(file: impl Read) -> anyhow::Result<IrradianceData> {
    let mut reader = CsvReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let column_index = |name: &str| headers.iter().position(|header| header == name);
    let required_column = |name: &str| {
        column_index(name).ok_or_else(|| anyhow!("Irradiance file has no \"{name}\" column"))
    };

    let beam_idx = required_column(COLUMN_BEAM)?;
    let sky_idx = required_column(COLUMN_SKY_DIFFUSE)?;
    let ground_idx = required_column(COLUMN_GROUND_DIFFUSE)?;
    let temp_idx = required_column(COLUMN_AIR_TEMP)?;
    let aoi_idx = column_index(COLUMN_INCIDENCE_ANGLE);

    let mut beam = vec![];
    let mut sky_diffuse = vec![];
    let mut ground_diffuse = vec![];
    let mut air_temperature = vec![];
    let mut incidence_angle = aoi_idx.map(|_| vec![]);

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let field = |idx: usize| -> anyhow::Result<f64> {
            let raw = record
                .get(idx)
                .ok_or_else(|| anyhow!("Row {} of irradiance file is too short", i + 1))?;
            raw.parse::<f64>().map_err(|err| {
                anyhow!(
                    "Could not parse \"{raw}\" in row {} of irradiance file: {err}",
                    i + 1
                )
            })
        };

        beam.push(field(beam_idx)?);
        sky_diffuse.push(field(sky_idx)?);
        ground_diffuse.push(field(ground_idx)?);
        air_temperature.push(field(temp_idx)?);
        if let (Some(idx), Some(angles)) = (aoi_idx, incidence_angle.as_mut()) {
            angles.push(field(idx)?);
        }
    }

    let data = IrradianceData {
        beam,
        sky_diffuse,
        ground_diffuse,
        air_temperature,
        incidence_angle,
    };
    data.check_lengths()?;

    Ok(data)
}
