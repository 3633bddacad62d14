pub const WATTS_PER_KILOWATT: u32 = 1_000;
pub const KILOWATT_HOURS_PER_MEGAWATT_HOUR: u32 = 1_000;
pub const MINUTES_PER_HOUR: u32 = 60;
pub const SECONDS_PER_HOUR: u32 = 3_600;

const ZERO_CELSIUS_IN_KELVIN: f64 = 273.15;

pub(crate) fn celsius_to_kelvin(temp_c: f64) -> Result<f64, BelowAbsoluteZeroError> {
    if temp_c < -ZERO_CELSIUS_IN_KELVIN {
        Err(BelowAbsoluteZeroError { temp_c })
    } else {
        Ok(temp_c + ZERO_CELSIUS_IN_KELVIN)
    }
}

pub(crate) fn kelvin_to_celsius(temp_k: f64) -> f64 {
    temp_k - ZERO_CELSIUS_IN_KELVIN
}

/// Convert a power series in kW to an energy total in MWh, for steps of `step_duration` hours.
pub(crate) fn power_series_to_megawatt_hours(series: &[f64], step_duration: f64) -> f64 {
    series.iter().sum::<f64>() * step_duration / KILOWATT_HOURS_PER_MEGAWATT_HOUR as f64
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BelowAbsoluteZeroError {
    pub temp_c: f64,
}
