use anyhow::anyhow;
use csv::ReaderBuilder as CsvReaderBuilder;
use indexmap::IndexMap;
use std::io::Read;

pub const DEMAND_FILE_DELIMITER: u8 = b';';

/// Demand curves in kW, one named column per user, row-aligned with the simulation timeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DemandTable {
    columns: IndexMap<String, Vec<f64>>,
}

impl DemandTable {
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn rows(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }
}

pub fn demand_table_from_csv(file: impl Read, delimiter: u8) -> anyhow::Result<DemandTable> {
    let mut reader = CsvReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let mut columns: IndexMap<String, Vec<f64>> = headers
        .iter()
        .map(|header| (header.to_string(), vec![]))
        .collect();

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        for (header, raw) in headers.iter().zip(record.iter()) {
            let value = raw.parse::<f64>().map_err(|err| {
                anyhow!(
                    "Could not parse \"{raw}\" in column \"{header}\", row {} of demand file: {err}",
                    i + 1
                )
            })?;
            if let Some(column) = columns.get_mut(header) {
                column.push(value);
            }
        }
    }

    Ok(DemandTable { columns })
}
