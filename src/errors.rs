use crate::input::Carrier;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecError {
    #[error("Configuration was considered invalid due to error: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),
    #[error("Inputs violate a modelling constraint: {0}")]
    DomainViolation(#[from] DomainViolation),
    #[error("Error while reading inputs or writing results: {0}")]
    Io(#[from] anyhow::Error),
}

/// Problems with the configuration that are detected before any simulation starts.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Unrecognised time step \"{0}\", expected e.g. \"15min\" or \"1h\"")]
    MalformedTimeStep(String),
    #[error("Time step of {0} hours does not divide an hour into whole steps")]
    UnsupportedTimeStep(f64),
    #[error("Unrecognised start date \"{0}\", expected DD-MM-YYYY or YYYY-MM-DD")]
    MalformedStartDate(String),
    #[error("{kind} \"{id}\" referenced by \"{referrer}\" is not defined")]
    UnknownReference {
        kind: &'static str,
        id: String,
        referrer: String,
    },
    #[error("Battery \"{id}\" is already used by \"{owner}\" so cannot also be used by \"{referrer}\"")]
    BatteryOwnedTwice {
        id: String,
        owner: String,
        referrer: String,
    },
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Demand for \"{0}\" is read from a demand file but no demand file was given")]
    MissingDemandFile(String),
    #[error("Column \"{column}\" needed by \"{id}\" is not present in the demand file")]
    MissingDemandColumn { id: String, column: String },
    #[error("No irradiance data available for system \"{0}\"")]
    MissingIrradiance(String),
}

/// Inputs that are well-formed but which the model cannot work with.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainViolation {
    #[error("Other capex fractions sum to {0}, which must be below 1")]
    OtherCapexFractionsTooLarge(f64),
    #[error("Carrier {carrier} has prices in the economics of \"{entity}\" but is not one of its carriers")]
    PricedCarrierNotInTech { entity: String, carrier: Carrier },
    #[error("Carrier {carrier} of \"{entity}\" has no prices in its economics")]
    CarrierWithoutPrices { entity: String, carrier: Carrier },
    #[error("Carrier {carrier} of \"{entity}\" is not provided by any of its demand sources")]
    CarrierWithoutDemand { entity: String, carrier: Carrier },
    #[error("Series \"{series}\" of \"{entity}\" has {actual} steps, expected {expected}")]
    SeriesLengthMismatch {
        entity: String,
        series: String,
        expected: usize,
        actual: usize,
    },
    #[error("{field} of \"{entity}\" must not be negative, got {value}")]
    NegativeValue {
        entity: String,
        field: &'static str,
        value: f64,
    },
    #[error("State of charge limits of \"{entity}\" must satisfy 0 <= soc_min <= soc_in <= soc_max <= 1, got soc_min={soc_min}, soc_in={soc_in}, soc_max={soc_max}")]
    InvalidSocLimits {
        entity: String,
        soc_min: f64,
        soc_in: f64,
        soc_max: f64,
    },
    #[error("Module parameters of \"{entity}\" are not physical: {reason}")]
    InvalidModuleParameters { entity: String, reason: String },
    #[error("Temperature of {0} degrees C is below absolute zero")]
    BelowAbsoluteZero(f64),
    #[error("\"{0}\" has no produced power yet; its output must be computed first")]
    OutputNotComputed(String),
    #[error("Energy performance of \"{0}\" must be computed before its economics")]
    EnergyPerformanceNotComputed(String),
    #[error("Time horizon must be at least one year")]
    EmptyTimeHorizon,
}
