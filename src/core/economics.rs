use crate::core::asset::Asset;
use crate::errors::DomainViolation;
use crate::input::{Carrier, CarrierPrices, FixedCostPolicy};
use crate::statistics::{mean, net_present_value};
use indexmap::IndexMap;
use serde::Serialize;

/// Energy exchanged over a simulated year for one carrier, in MWh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct AnnualEnergyFlow {
    pub sold: f64,
    pub self_consumption: f64,
    pub purchased: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PricedEnergyFlow {
    pub flow: AnnualEnergyFlow,
    pub prices: CarrierPrices,
}

/// Financial results over the investment horizon. Yearly series have `time_horizon + 1` entries,
/// entry 0 being the year of the investment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EconomicPerformance {
    pub npv: f64,
    /// years
    pub payback_period: f64,
    pub capex: f64,
    pub rev_from_sale: Vec<f64>,
    pub rev_savings: Vec<f64>,
    pub rev_incentives: Vec<f64>,
    pub rev_others: Vec<f64>,
    pub cost_resources: Vec<f64>,
    pub cost_opex: Vec<f64>,
    pub cost_taxes: Vec<f64>,
    pub cost_taxes_on_sale: Vec<f64>,
    pub cost_others: Vec<f64>,
    pub cashflow: Vec<f64>,
    pub cashflow_cumulative: Vec<f64>,
}

impl EconomicPerformance {
    fn zeroed(years: usize) -> Self {
        Self {
            npv: 0.,
            payback_period: 0.,
            capex: 0.,
            rev_from_sale: vec![0.; years],
            rev_savings: vec![0.; years],
            rev_incentives: vec![0.; years],
            rev_others: vec![0.; years],
            cost_resources: vec![0.; years],
            cost_opex: vec![0.; years],
            cost_taxes: vec![0.; years],
            cost_taxes_on_sale: vec![0.; years],
            cost_others: vec![0.; years],
            cashflow: vec![0.; years],
            cashflow_cumulative: vec![0.; years],
        }
    }

    /// Yearly series in output order, under their output names.
    pub fn yearly_series(&self) -> [(&'static str, &[f64]); 9] {
        [
            ("rev_from_sale", self.rev_from_sale.as_slice()),
            ("rev_savings", self.rev_savings.as_slice()),
            ("rev_incentives", self.rev_incentives.as_slice()),
            ("rev_others", self.rev_others.as_slice()),
            ("cost_resources", self.cost_resources.as_slice()),
            ("cost_opex", self.cost_opex.as_slice()),
            ("cost_taxes", self.cost_taxes.as_slice()),
            ("cost_taxes_on_sale", self.cost_taxes_on_sale.as_slice()),
            ("cost_others", self.cost_others.as_slice()),
        ]
    }
}

/// Yearly cashflows of a set of assets and the energy they sell and save.
pub struct CashflowEngine<'a> {
    assets: Vec<&'a dyn Asset>,
    energy_flows: IndexMap<Carrier, PricedEnergyFlow>,
    fixed_costs: FixedCostPolicy,
}

impl<'a> CashflowEngine<'a> {
    pub fn new(
        assets: Vec<&'a dyn Asset>,
        energy_flows: IndexMap<Carrier, PricedEnergyFlow>,
        fixed_costs: FixedCostPolicy,
    ) -> Self {
        Self {
            assets,
            energy_flows,
            fixed_costs,
        }
    }

    /// Calculate cashflows, net present value and payback period.
    ///
    /// Arguments:
    /// * `time_horizon` - years of operation after the investment
    /// * `tax_rate` - tax on revenue from sold energy, as a fraction
    /// * `interest_rate` - discount rate for the net present value
    /// * `other_capex_fractions` - further capital costs, each as a fraction of the total capex
    pub fn compute_cashflow(
        &self,
        time_horizon: usize,
        tax_rate: f64,
        interest_rate: f64,
        other_capex_fractions: &[f64],
    ) -> Result<EconomicPerformance, DomainViolation> {
        if time_horizon == 0 {
            return Err(DomainViolation::EmptyTimeHorizon);
        }
        let other_capex_total: f64 = other_capex_fractions.iter().sum();
        if other_capex_total >= 1. {
            return Err(DomainViolation::OtherCapexFractionsTooLarge(
                other_capex_total,
            ));
        }

        let asset_capex: f64 = self.assets.iter().map(|asset| asset.capital_cost()).sum();
        let capex = asset_capex / (1. - other_capex_total);

        let (annual_opex, annual_tax): (f64, f64) = match self.fixed_costs {
            FixedCostPolicy::Included => (
                self.assets
                    .iter()
                    .map(|asset| asset.annual_operating_cost())
                    .sum(),
                self.assets.iter().map(|asset| asset.annual_tax()).sum(),
            ),
            FixedCostPolicy::Excluded => (0., 0.),
        };

        let mut performance = EconomicPerformance::zeroed(time_horizon + 1);
        performance.capex = capex;
        performance.cashflow[0] = -capex;

        for year in 1..=time_horizon {
            for PricedEnergyFlow { flow, prices } in self.energy_flows.values() {
                let decay = (1. - prices.decay).powi(year as i32 - 1);
                performance.rev_from_sale[year] += flow.sold * prices.price_sold * decay;
                performance.rev_savings[year] += flow.self_consumption * prices.price_buy * decay;
                performance.cost_resources[year] += flow.purchased * prices.price_buy;
            }
            performance.cost_taxes_on_sale[year] = performance.rev_from_sale[year] * tax_rate;
            performance.cost_opex[year] = annual_opex;
            performance.cost_taxes[year] = annual_tax;

            for asset in &self.assets {
                performance.rev_incentives[year] += asset.incentive_for_year(year as u32);
                let other = asset.other_flows_for_year(year as u32);
                performance.rev_others[year] += other.revenue;
                performance.cost_others[year] += other.cost;
            }

            let inflow = performance.rev_from_sale[year]
                + performance.rev_savings[year]
                + performance.rev_incentives[year]
                + performance.rev_others[year];
            let outflow = performance.cost_resources[year]
                + performance.cost_opex[year]
                + performance.cost_taxes[year]
                + performance.cost_taxes_on_sale[year]
                + performance.cost_others[year];
            performance.cashflow[year] = inflow - outflow;
            performance.cashflow_cumulative[year] =
                performance.cashflow_cumulative[year - 1] + performance.cashflow[year];
        }

        performance.npv = net_present_value(interest_rate, &performance.cashflow);
        performance.payback_period = capex / mean(&performance.cashflow[1..]);

        Ok(performance)
    }
}
