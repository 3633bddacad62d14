use crate::compare_floats::max_of_2;
use crate::core::asset::{Asset, EconomicAsset};
use crate::core::solvers::{bisect, newton_raphson, BisectionResult, Convergence};
use crate::core::units::{celsius_to_kelvin, kelvin_to_celsius, WATTS_PER_KILOWATT};
use crate::errors::DomainViolation;
use crate::input::{AssetEconomics, Carrier, PvModuleParameters};
use crate::read_weather_file::IrradianceData;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// This module contains objects that represent photovoltaic arrays, using the four-parameter
/// (light current, saturation current, ideality factor, series resistance) single-diode model of
/// a module, extrapolated to an array of identical modules.

// electron charge over Boltzmann constant, K/V
const Q_OVER_K: f64 = 11604.45;
const T_AMB_NOCT: f64 = 293.15; // K
const IRRADIANCE_NOCT: f64 = 800.; // W/m2
// transmittance-absorptance product of the cover at normal incidence
const TAU_ALPHA: f64 = 0.95;
// bandgap energy of silicon, eV
const BANDGAP: f64 = 1.12;

const SERIES_RESISTANCE_TOLERANCE: f64 = 0.0005; // ohm
const MPP_CURRENT_TOLERANCE: f64 = 0.001; // A
const MAX_MPP_ITERATIONS: usize = 100;
const CELL_TEMPERATURE_TOLERANCE: f64 = 0.01; // K
const MAX_CELL_TEMPERATURE_ITERATIONS: usize = 100;
// below this total irradiance no incidence angle corrections are applied
const MIN_IRRADIANCE_FOR_IAM: f64 = 0.1; // W/m2
// below this irradiance the cells are taken to be at ambient temperature
const MIN_IRRADIANCE_FOR_HEATING: f64 = 1.; // W/m2

/// Incidence angle modifier for an angle in degrees, never negative.
fn incidence_angle_modifier(theta: f64) -> f64 {
    max_of_2(
        1.0 - 1.098e-4 * theta + 6.26e-6 * theta.powi(2) + 6.583e-7 * theta.powi(3)
            - 1.472e-8 * theta.powi(4),
        0.,
    )
}

/// Effective incidence angle of sky diffuse radiation on a surface with the given slope (degrees).
fn effective_sky_diffuse_angle(slope: f64) -> f64 {
    59.56748 - 0.09123155 * slope - 0.00054240 * slope.powi(2) + 0.00003216 * slope.powi(3)
        - 0.00000017 * slope.powi(4)
}

/// Effective incidence angle of ground reflected radiation on a surface with the given slope (degrees).
fn effective_ground_diffuse_angle(slope: f64) -> f64 {
    90.03182 - 0.6614549 * slope + 0.00479618 * slope.powi(2) - 0.00001543 * slope.powi(3)
        + 0.00000002 * slope.powi(4)
}

/// Total irradiance on the plane of the array, in W/m2.
///
/// When the incidence angle of the beam radiation is known, each component is weighted by its
/// incidence angle modifier.
pub fn plane_of_array_irradiance(
    slope: f64,
    beam: f64,
    sky_diffuse: f64,
    ground_diffuse: f64,
    incidence_angle: Option<f64>,
) -> f64 {
    let uncorrected = beam + sky_diffuse + ground_diffuse;
    match incidence_angle {
        Some(theta) if uncorrected > MIN_IRRADIANCE_FOR_IAM => {
            incidence_angle_modifier(theta) * beam
                + incidence_angle_modifier(effective_sky_diffuse_angle(slope)) * sky_diffuse
                + incidence_angle_modifier(effective_ground_diffuse_angle(slope)) * ground_diffuse
        }
        _ => uncorrected,
    }
}

/// Electrical state of the array at its maximum power point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OperatingPoint {
    /// light current, A
    pub light_current: f64,
    /// diode saturation current, A
    pub saturation_current: f64,
    pub open_circuit_voltage: f64,
    pub short_circuit_current: f64,
    pub voltage: f64,
    pub current: f64,
    /// W
    pub power: f64,
    pub convergence: Convergence,
}

/// Per-step results of [`PvArray::compute_output`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PvOutput {
    /// total irradiance on the array, W/m2
    pub irradiance: Vec<f64>,
    /// V
    pub vmp: Vec<f64>,
    /// A
    pub imp: Vec<f64>,
    /// W
    pub power: Vec<f64>,
    pub voc: Vec<f64>,
    pub isc: Vec<f64>,
    /// degrees C
    pub cell_temperature: Vec<f64>,
    pub fill_factor: Vec<f64>,
    pub efficiency: Vec<f64>,
    pub convergence: Vec<Convergence>,
}

impl PvOutput {
    fn with_capacity(steps: usize) -> Self {
        Self {
            irradiance: Vec::with_capacity(steps),
            vmp: Vec::with_capacity(steps),
            imp: Vec::with_capacity(steps),
            power: Vec::with_capacity(steps),
            voc: Vec::with_capacity(steps),
            isc: Vec::with_capacity(steps),
            cell_temperature: Vec::with_capacity(steps),
            fill_factor: Vec::with_capacity(steps),
            efficiency: Vec::with_capacity(steps),
            convergence: Vec::with_capacity(steps),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PvArray {
    asset: EconomicAsset,
    module: PvModuleParameters,
    n_series: u32,
    n_parallel: u32,
    mppt: bool,
    // reference and NOCT cell temperatures, K
    t_ref: f64,
    // module efficiency at reference conditions
    eff_ref: f64,
    // thermal loss coefficient, W/(m2 K)
    u_l: f64,
    series_resistance_fit: BisectionResult,
    // array-level single diode parameters
    il_ref: f64,
    io_ref: f64,
    gamma: f64,
    r_series: f64,
    a: f64,
    array_area: f64,
    produced_power: OnceLock<Vec<f64>>,
}

impl PvArray {
    /// Construct a PvArray
    ///
    /// Arguments:
    /// * `id` - identifier of the array
    /// * `module` - datasheet parameters of a single module
    /// * `n_series` - number of modules in series
    /// * `n_parallel` - number of modules (strings) in parallel
    /// * `mppt` - whether the array operates at its maximum power point; when it does not, the
    ///            reported efficiency is 0
    /// * `economics` - cost schedule, per kW of rated capacity
    pub fn new(
        id: &str,
        module: PvModuleParameters,
        n_series: u32,
        n_parallel: u32,
        mppt: bool,
        economics: AssetEconomics,
    ) -> Result<Self, DomainViolation> {
        Self::validate(id, &module, n_series, n_parallel)?;

        let t_ref = celsius_to_kelvin(module.t_ref)
            .map_err(|err| DomainViolation::BelowAbsoluteZero(err.temp_c))?;
        let t_noct = celsius_to_kelvin(module.t_noct)
            .map_err(|err| DomainViolation::BelowAbsoluteZero(err.temp_c))?;

        let eff_ref = module.impp_ref * module.vmpp_ref / (module.irradiance_ref * module.area);
        let u_l = IRRADIANCE_NOCT * TAU_ALPHA / (t_noct - T_AMB_NOCT);

        let series_resistance_fit = fit_series_resistance(&module, t_ref);
        let r_series_module = series_resistance_fit.root;
        let gamma_module = ideality_factor(&module, t_ref, r_series_module);
        let il_ref_module = module.isc_ref;
        let io_ref_module =
            il_ref_module / (Q_OVER_K * module.voc_ref / (gamma_module * t_ref)).exp();

        let (n_s, n_p) = (n_series as f64, n_parallel as f64);
        let gamma = n_s * gamma_module;

        let capacity =
            module.impp_ref * module.vmpp_ref / WATTS_PER_KILOWATT as f64 * n_s * n_p;
        let asset = EconomicAsset::new(
            id,
            vec![Carrier::Electricity],
            capacity,
            capacity,
            economics,
        )?;

        Ok(Self {
            asset,
            module,
            n_series,
            n_parallel,
            mppt,
            t_ref,
            eff_ref,
            u_l,
            series_resistance_fit,
            il_ref: n_p * il_ref_module,
            io_ref: n_p * io_ref_module,
            gamma,
            r_series: n_s / n_p * r_series_module,
            a: gamma / (n_s * module.cells_in_series as f64),
            array_area: module.area * n_s * n_p,
            produced_power: OnceLock::new(),
        })
    }

    fn validate(
        id: &str,
        module: &PvModuleParameters,
        n_series: u32,
        n_parallel: u32,
    ) -> Result<(), DomainViolation> {
        let invalid = |reason: &str| DomainViolation::InvalidModuleParameters {
            entity: id.to_string(),
            reason: reason.to_string(),
        };
        if n_series == 0 || n_parallel == 0 {
            return Err(invalid("an array needs at least one module in series and in parallel"));
        }
        if module.cells_in_series == 0 {
            return Err(invalid("a module needs at least one cell in series"));
        }
        if !(module.isc_ref > 0. && module.impp_ref > 0. && module.impp_ref < module.isc_ref) {
            return Err(invalid("0 < impp_ref < isc_ref must hold"));
        }
        if !(module.voc_ref > 0. && module.vmpp_ref > 0. && module.vmpp_ref < module.voc_ref) {
            return Err(invalid("0 < vmpp_ref < voc_ref must hold"));
        }
        if !(module.irradiance_ref > 0. && module.area > 0.) {
            return Err(invalid("reference irradiance and module area must be positive"));
        }
        if module.t_noct + 273.15 <= T_AMB_NOCT {
            return Err(invalid("NOCT cell temperature must be above 20 degrees C"));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        self.asset.id()
    }

    pub fn n_series(&self) -> u32 {
        self.n_series
    }

    pub fn n_parallel(&self) -> u32 {
        self.n_parallel
    }

    /// Rated capacity in kW.
    pub fn capacity(&self) -> f64 {
        self.asset.capacity()
    }

    /// Result of the bisection that fitted the module series resistance.
    pub fn series_resistance_fit(&self) -> &BisectionResult {
        &self.series_resistance_fit
    }

    pub fn series_resistance(&self) -> f64 {
        self.r_series
    }

    pub fn ideality_factor(&self) -> f64 {
        self.gamma
    }

    pub fn array_area(&self) -> f64 {
        self.array_area
    }

    /// Produced power in kW, available once [`Self::compute_output`] has run.
    pub fn produced_power(&self) -> Option<&[f64]> {
        self.produced_power.get().map(Vec::as_slice)
    }

    /// Produced power in kW for a carrier, which is only ever the array's primary carrier.
    pub fn produced_power_for(&self, carrier: Carrier) -> Option<&[f64]> {
        match self.asset.carriers().first() {
            Some(primary) if *primary == carrier => self.produced_power(),
            _ => None,
        }
    }

    /// Maximum power point of the array for a total irradiance (W/m2) and a cell temperature (K).
    pub fn maximum_power_point(&self, irradiance: f64, cell_temperature: f64) -> OperatingPoint {
        let t = cell_temperature;
        let scale = irradiance / self.module.irradiance_ref;
        let n_p = self.n_parallel as f64;

        let light_current = max_of_2(
            scale * (self.il_ref + self.module.mu_isc * n_p * (t - self.t_ref)),
            0.,
        );
        let saturation_current = self.io_ref
            * (t / self.t_ref).powi(3)
            * ((Q_OVER_K * BANDGAP / self.a) * (1. / self.t_ref - 1. / t)).exp();

        if light_current <= 0. {
            return OperatingPoint {
                saturation_current,
                ..Default::default()
            };
        }

        let open_circuit_voltage =
            self.gamma * t * (light_current / saturation_current + 1.).ln() / Q_OVER_K;

        if saturation_current <= 0. {
            return OperatingPoint {
                light_current,
                saturation_current,
                open_circuit_voltage,
                short_circuit_current: light_current,
                ..Default::default()
            };
        }

        let (il, io) = (light_current, saturation_current);
        let c = Q_OVER_K * self.r_series / (self.gamma * t);
        let initial_current = scale * n_p * (self.module.impp_ref + self.module.mu_isc * (t - self.t_ref));

        let (current, convergence) = newton_raphson(
            |i| {
                let headroom = il - i + io;
                let log_term = (headroom / io).ln();
                let denominator = 1. + headroom * c;
                (
                    i + (i - il - io) * (log_term - i * c) / denominator,
                    2. + (log_term - c * i) / denominator.powi(2),
                )
            },
            initial_current,
            MPP_CURRENT_TOLERANCE,
            MAX_MPP_ITERATIONS,
            |i| if i > il { il * 0.99 } else { i },
        );

        let voltage =
            (1. + (il - current) / io).ln() * t * self.gamma / Q_OVER_K - current * self.r_series;

        OperatingPoint {
            light_current,
            saturation_current,
            open_circuit_voltage,
            short_circuit_current: light_current,
            voltage,
            current,
            power: voltage * current,
            convergence,
        }
    }

    /// Operating point and cell temperature (K) for a step, iterating the cell temperature to a
    /// fixed point of the array's energy balance.
    fn operate(&self, irradiance: f64, t_amb: f64) -> (OperatingPoint, f64, Convergence) {
        if irradiance < MIN_IRRADIANCE_FOR_HEATING {
            let point = self.maximum_power_point(irradiance, t_amb);
            return (point, t_amb, point.convergence);
        }

        let mut t_cell = t_amb + (irradiance * TAU_ALPHA - irradiance * self.eff_ref) / self.u_l;
        let mut iterations = 0;
        loop {
            let point = self.maximum_power_point(irradiance, t_cell);
            let t_cell_new = t_amb
                + (irradiance * TAU_ALPHA * self.array_area - point.power)
                    / (self.u_l * self.array_area);

            let thermal = if (t_cell - t_cell_new).abs() <= CELL_TEMPERATURE_TOLERANCE {
                Convergence::Converged
            } else if iterations == MAX_CELL_TEMPERATURE_ITERATIONS {
                Convergence::IterationCapReached
            } else {
                t_cell = t_cell_new;
                iterations += 1;
                continue;
            };
            return (point, t_cell, thermal.and(point.convergence));
        }
    }

    /// Calculate the electrical output of the array for each step of the given irradiance and
    /// store the produced power (kW). The produced power is only stored by the first call.
    ///
    /// Arguments:
    /// * `slope` - tilt of the array from horizontal, in degrees
    /// * `irradiance` - beam, sky diffuse and ground diffuse irradiance on the array (W/m2),
    ///                  ambient temperature (degrees C) and optionally the incidence angle of
    ///                  the beam radiation (degrees), one entry per step
    pub fn compute_output(
        &self,
        slope: f64,
        irradiance: &IrradianceData,
    ) -> Result<PvOutput, DomainViolation> {
        let steps = irradiance.len();
        let mismatch = |series: &str, actual: usize| DomainViolation::SeriesLengthMismatch {
            entity: self.id().to_string(),
            series: series.to_string(),
            expected: steps,
            actual,
        };
        for (series, length) in [
            ("sky_diffuse", irradiance.sky_diffuse.len()),
            ("ground_diffuse", irradiance.ground_diffuse.len()),
            ("air_temperature", irradiance.air_temperature.len()),
        ] {
            if length != steps {
                return Err(mismatch(series, length));
            }
        }
        if let Some(angles) = &irradiance.incidence_angle {
            if angles.len() != steps {
                return Err(mismatch("incidence_angle", angles.len()));
            }
        }

        let mut output = PvOutput::with_capacity(steps);
        for i in 0..steps {
            let g = plane_of_array_irradiance(
                slope,
                irradiance.beam[i],
                irradiance.sky_diffuse[i],
                irradiance.ground_diffuse[i],
                irradiance.incidence_angle.as_ref().map(|angles| angles[i]),
            );
            let t_amb = celsius_to_kelvin(irradiance.air_temperature[i])
                .map_err(|err| DomainViolation::BelowAbsoluteZero(err.temp_c))?;

            let (point, t_cell, convergence) = self.operate(g, t_amb);
            if !convergence.is_converged() {
                debug!(
                    "PV array {} did not converge at step {i}; reporting the last iterate",
                    self.id()
                );
            }

            let fill_factor = if point.open_circuit_voltage > 0. && point.short_circuit_current > 0.
            {
                point.voltage * point.current
                    / (point.open_circuit_voltage * point.short_circuit_current)
            } else {
                0.
            };
            let efficiency = if g > 0. && self.mppt {
                point.power / (g * self.array_area)
            } else {
                0.
            };

            output.irradiance.push(g);
            output.vmp.push(point.voltage);
            output.imp.push(point.current);
            output.power.push(point.power);
            output.voc.push(point.open_circuit_voltage);
            output.isc.push(point.short_circuit_current);
            output.cell_temperature.push(kelvin_to_celsius(t_cell));
            output.fill_factor.push(fill_factor);
            output.efficiency.push(efficiency);
            output.convergence.push(convergence);
        }

        let produced = output
            .power
            .iter()
            .map(|power| power / WATTS_PER_KILOWATT as f64)
            .collect();
        if self.produced_power.set(produced).is_err() {
            warn!(
                "Output of PV array {} was already computed; keeping the first produced power series",
                self.id()
            );
        }

        Ok(output)
    }
}

impl Asset for PvArray {
    fn economic_asset(&self) -> &EconomicAsset {
        &self.asset
    }
}

/// Ideality factor of a module at reference temperature for a given series resistance.
fn ideality_factor(module: &PvModuleParameters, t_ref: f64, r_series: f64) -> f64 {
    Q_OVER_K * (module.vmpp_ref - module.voc_ref + module.impp_ref * r_series)
        / (t_ref * (1. - module.impp_ref / module.isc_ref).ln())
}

/// Difference between the open-circuit voltage temperature coefficient implied by a series
/// resistance and the datasheet value.
fn voc_temperature_coefficient_residual(
    module: &PvModuleParameters,
    t_ref: f64,
    r_series: f64,
) -> f64 {
    let gamma = ideality_factor(module, t_ref, r_series);
    let a = gamma / module.cells_in_series as f64;
    let io = module.isc_ref * (-Q_OVER_K * module.voc_ref / (gamma * t_ref)).exp();

    -module.mu_voc
        + (gamma / Q_OVER_K)
            * ((1. + module.isc_ref / io).ln()
                + (t_ref / (module.isc_ref + io))
                    * (module.mu_isc
                        - module.isc_ref
                            * (Q_OVER_K * BANDGAP / (a * t_ref.powi(2)) + 3. / t_ref)))
}

fn fit_series_resistance(module: &PvModuleParameters, t_ref: f64) -> BisectionResult {
    let r_series_upper = (module.cells_in_series as f64
        * t_ref
        * (1. - module.impp_ref / module.isc_ref).ln()
        / Q_OVER_K
        + module.voc_ref
        - module.vmpp_ref)
        / module.impp_ref;

    bisect(
        |r_series| voc_temperature_coefficient_residual(module, t_ref, r_series),
        0.,
        r_series_upper,
        SERIES_RESISTANCE_TOLERANCE,
    )
}
