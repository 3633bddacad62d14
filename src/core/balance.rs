use crate::compare_floats::{max_of_2, min_of_2};
use crate::errors::DomainViolation;

/// Outcome of matching production against demand step by step (kW).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchedSeries {
    /// production used at the same step, min(p, d)
    pub matched: Vec<f64>,
    pub surplus: Vec<f64>,
    pub unmet: Vec<f64>,
}

pub fn match_supply_and_demand(production: &[f64], demand: &[f64]) -> MatchedSeries {
    let mut series = MatchedSeries {
        matched: Vec::with_capacity(production.len()),
        surplus: Vec::with_capacity(production.len()),
        unmet: Vec::with_capacity(production.len()),
    };
    for (&p, &d) in production.iter().zip(demand) {
        series.matched.push(min_of_2(p, d));
        series.surplus.push(max_of_2(p - d, 0.));
        series.unmet.push(max_of_2(d - p, 0.));
    }
    series
}

/// Step-by-step sum of a number of series, all of which must have `steps` entries.
///
/// Arguments:
/// * `entity` - owner of the series, for error reporting
/// * `steps` - expected length
/// * `series` - pairs of a name (for error reporting) and the series itself
pub fn sum_series<'a>(
    entity: &str,
    steps: usize,
    series: impl IntoIterator<Item = (&'a str, &'a [f64])>,
) -> Result<Vec<f64>, DomainViolation> {
    let mut total = vec![0.; steps];
    for (name, values) in series {
        check_length(entity, name, steps, values)?;
        for (sum, value) in total.iter_mut().zip(values) {
            *sum += value;
        }
    }
    Ok(total)
}

pub(crate) fn check_length(
    entity: &str,
    name: &str,
    steps: usize,
    values: &[f64],
) -> Result<(), DomainViolation> {
    if values.len() != steps {
        return Err(DomainViolation::SeriesLengthMismatch {
            entity: entity.to_string(),
            series: name.to_string(),
            expected: steps,
            actual: values.len(),
        });
    }
    Ok(())
}

pub(crate) fn add_series(first: &[f64], second: &[f64]) -> Vec<f64> {
    first.iter().zip(second).map(|(a, b)| a + b).collect()
}
