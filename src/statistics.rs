/// A simple statistics module with some utility functions used by the economics calculations.
use statrs::statistics::Statistics;

/// Arithmetic mean of the given numbers, NaN when there are none.
pub fn mean(numbers: &[f64]) -> f64 {
    numbers.iter().mean()
}

/// Net present value of a series of cashflows, discounting the first entry at t = 0.
pub fn net_present_value(rate: f64, cashflows: &[f64]) -> f64 {
    cashflows
        .iter()
        .enumerate()
        .map(|(t, value)| value / (1. + rate).powi(t as i32))
        .sum()
}
