use crate::core::units::{MINUTES_PER_HOUR, SECONDS_PER_HOUR};
use crate::errors::ConfigurationError;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

const START_DATE_FORMATS: [&str; 2] = ["%d-%m-%Y", "%Y-%m-%d"];

/// Parse a time step such as "15min", "15 min" or "1h" into a number of hours.
pub fn parse_time_step(time_step: &str) -> Result<f64, ConfigurationError> {
    let malformed = || ConfigurationError::MalformedTimeStep(time_step.to_string());

    let normalised = time_step.trim().to_lowercase();
    let digits_end = normalised
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(normalised.len());
    let (digits, unit) = normalised.split_at(digits_end);
    let count: u32 = digits.parse().map_err(|_| malformed())?;
    if count == 0 {
        return Err(malformed());
    }

    let unit = unit.trim_start();
    if unit.starts_with("min") {
        Ok(count as f64 / MINUTES_PER_HOUR as f64)
    } else if unit.starts_with('h') {
        Ok(count as f64)
    } else {
        Err(malformed())
    }
}

pub fn parse_start_date(start_date: &str) -> Result<NaiveDateTime, ConfigurationError> {
    START_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(start_date.trim(), format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ConfigurationError::MalformedStartDate(start_date.to_string()))
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationTime {
    start: NaiveDateTime,
    /// step length, in hours
    step: f64,
    total_steps: usize,
}

impl SimulationTime {
    pub fn new(start: NaiveDateTime, step: f64, total_steps: usize) -> Self {
        Self {
            start,
            step,
            total_steps,
        }
    }

    pub fn from_config(
        time_step: &str,
        start_date: &str,
        total_steps: usize,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self::new(
            parse_start_date(start_date)?,
            parse_time_step(time_step)?,
            total_steps,
        ))
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn with_total_steps(&self, total_steps: usize) -> Self {
        Self {
            total_steps,
            ..self.clone()
        }
    }

    /// How many simulation steps make up an hour, for steps that divide an hour exactly.
    pub fn steps_per_hour(&self) -> Result<usize, ConfigurationError> {
        let steps = 1. / self.step;
        if self.step > 1. || (steps - steps.round()).abs() > 1e-9 {
            return Err(ConfigurationError::UnsupportedTimeStep(self.step));
        }
        Ok(steps.round() as usize)
    }

    pub fn iter(&self) -> SimulationTimeIterator {
        SimulationTimeIterator {
            current_index: 0,
            simulation_time: self.clone(),
        }
    }

    /// Date and time at the start of each step.
    pub fn timeline(&self) -> Vec<NaiveDateTime> {
        self.iter()
            .map(|iteration| {
                self.start
                    + TimeDelta::seconds(
                        (iteration.time * SECONDS_PER_HOUR as f64).round() as i64,
                    )
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct SimulationTimeIterator {
    current_index: usize,
    simulation_time: SimulationTime,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationTimeIteration {
    pub index: usize,
    /// hours since the start of the simulation
    pub time: f64,
    pub timestep: f64,
}

impl Iterator for SimulationTimeIterator {
    type Item = SimulationTimeIteration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.simulation_time.total_steps {
            return None;
        }
        let iteration = SimulationTimeIteration {
            index: self.current_index,
            time: self.current_index as f64 * self.simulation_time.step,
            timestep: self.simulation_time.step,
        };
        self.current_index += 1;
        Some(iteration)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .simulation_time
            .total_steps
            .saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SimulationTimeIterator {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn simulation_time() -> SimulationTime {
        SimulationTime::from_config("15min", "01-01-2020", 6).unwrap()
    }

    #[rstest]
    #[case("15min", 0.25)]
    #[case("30 min", 0.5)]
    #[case("60MIN", 1.)]
    #[case("1h", 1.)]
    #[case(" 2 H ", 2.)]
    fn test_parse_time_step(#[case] time_step: &str, #[case] expected: f64) {
        assert_relative_eq!(parse_time_step(time_step).unwrap(), expected);
    }

    #[rstest]
    #[case("quarter hour")]
    #[case("15")]
    #[case("15s")]
    #[case("0min")]
    #[case("min")]
    fn test_parse_time_step_rejects_malformed(#[case] time_step: &str) {
        assert_eq!(
            parse_time_step(time_step),
            Err(ConfigurationError::MalformedTimeStep(time_step.to_string()))
        );
    }

    #[rstest]
    fn test_parse_start_date() {
        let expected = NaiveDate::from_ymd_opt(2020, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_start_date("01-03-2020").unwrap(), expected);
        assert_eq!(parse_start_date("2020-03-01").unwrap(), expected);
        assert!(parse_start_date("March 2020").is_err());
    }

    #[rstest]
    fn test_iteration(simulation_time: SimulationTime) {
        let iterations = simulation_time.iter().collect::<Vec<_>>();

        assert_eq!(iterations.len(), 6);
        assert_eq!(
            iterations[5],
            SimulationTimeIteration {
                index: 5,
                time: 1.25,
                timestep: 0.25
            }
        );
    }

    #[rstest]
    fn test_timeline(simulation_time: SimulationTime) {
        let timeline = simulation_time.timeline();

        assert_eq!(timeline.len(), 6);
        assert_eq!(timeline[0].to_string(), "2020-01-01 00:00:00");
        assert_eq!(timeline[5].to_string(), "2020-01-01 01:15:00");
    }

    #[rstest]
    fn test_steps_per_hour(simulation_time: SimulationTime) {
        assert_eq!(simulation_time.steps_per_hour(), Ok(4));
        assert_eq!(
            SimulationTime::from_config("2h", "2020-01-01", 1)
                .unwrap()
                .steps_per_hour(),
            Err(ConfigurationError::UnsupportedTimeStep(2.))
        );
        assert!(SimulationTime::from_config("7min", "2020-01-01", 1)
            .unwrap()
            .steps_per_hour()
            .is_err());
    }
}
