use crate::errors::DomainViolation;
use crate::input::{AssetEconomics, Carrier, ScheduledItem};
use indexmap::IndexMap;

/// Capacity and cost schedule shared by every physical asset (PV arrays, batteries).
#[derive(Clone, Debug, PartialEq)]
pub struct EconomicAsset {
    id: String,
    carriers: Vec<Carrier>,
    /// rated capacity, e.g. kW or kWh
    capacity: f64,
    /// the part of the capacity that carries an operating cost
    operating_capacity: f64,
    economics: AssetEconomics,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OtherFlows {
    pub revenue: f64,
    pub cost: f64,
}

impl EconomicAsset {
    pub fn new(
        id: &str,
        carriers: Vec<Carrier>,
        capacity: f64,
        operating_capacity: f64,
        economics: AssetEconomics,
    ) -> Result<Self, DomainViolation> {
        let negative = |field: &'static str, value: f64| DomainViolation::NegativeValue {
            entity: id.to_string(),
            field,
            value,
        };
        for (field, value) in [
            ("capacity", capacity),
            ("operating capacity", operating_capacity),
            ("cap_cost", economics.cap_cost),
            ("opex_cost", economics.opex_cost),
        ] {
            if value < 0. {
                return Err(negative(field, value));
            }
        }
        for item in economics.other_cost.values().chain(economics.other_rev.values()) {
            if item.quantity < 0. {
                return Err(negative("quantity of scheduled item", item.quantity));
            }
            if item.unit_price < 0. {
                return Err(negative("unit price of scheduled item", item.unit_price));
            }
        }

        Ok(Self {
            id: id.to_string(),
            carriers,
            capacity,
            operating_capacity,
            economics,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn carriers(&self) -> &[Carrier] {
        &self.carriers
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn operating_capacity(&self) -> f64 {
        self.operating_capacity
    }

    pub fn capital_cost(&self) -> f64 {
        self.capacity * self.economics.cap_cost
    }

    pub fn annual_operating_cost(&self) -> f64 {
        self.operating_capacity * self.economics.opex_cost
    }

    pub fn annual_tax(&self) -> f64 {
        self.economics.tax_year
    }

    pub fn incentive_for_year(&self, year: u32) -> f64 {
        if self.economics.inc_start_end.contains(year) {
            self.economics.inc_year
        } else {
            0.
        }
    }

    /// Sum of the other revenue items and of the other cost items active in the given year.
    pub fn other_flows_for_year(&self, year: u32) -> OtherFlows {
        let active_total = |items: &IndexMap<String, ScheduledItem>| {
            items
                .values()
                .filter(|item| item.years.contains(year))
                .map(|item| item.annual_amount())
                .sum::<f64>()
        };

        OtherFlows {
            revenue: active_total(&self.economics.other_rev),
            cost: active_total(&self.economics.other_cost),
        }
    }
}

/// Anything carrying an [`EconomicAsset`] that can take part in a cashflow calculation.
pub trait Asset {
    fn economic_asset(&self) -> &EconomicAsset;

    fn capital_cost(&self) -> f64 {
        self.economic_asset().capital_cost()
    }

    fn annual_operating_cost(&self) -> f64 {
        self.economic_asset().annual_operating_cost()
    }

    fn annual_tax(&self) -> f64 {
        self.economic_asset().annual_tax()
    }

    fn incentive_for_year(&self, year: u32) -> f64 {
        self.economic_asset().incentive_for_year(year)
    }

    fn other_flows_for_year(&self, year: u32) -> OtherFlows {
        self.economic_asset().other_flows_for_year(year)
    }
}

impl Asset for EconomicAsset {
    fn economic_asset(&self) -> &EconomicAsset {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::YearRange;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn economics() -> AssetEconomics {
        AssetEconomics {
            cap_cost: 1500.,
            opex_cost: 40.,
            inc_year: 900.,
            inc_start_end: YearRange::new(1, 10),
            tax_year: 12.,
            other_cost: IndexMap::from([(
                "inverter".to_string(),
                ScheduledItem {
                    quantity: 4.,
                    unit_price: 350.,
                    years: YearRange::new(10, 10),
                },
            )]),
            other_rev: IndexMap::from([
                (
                    "grant".to_string(),
                    ScheduledItem {
                        quantity: 50.,
                        unit_price: 4.,
                        years: YearRange::new(1, 2),
                    },
                ),
                (
                    "service".to_string(),
                    ScheduledItem {
                        quantity: 1.,
                        unit_price: 25.,
                        years: YearRange::new(2, 3),
                    },
                ),
            ]),
        }
    }

    #[fixture]
    fn asset(economics: AssetEconomics) -> EconomicAsset {
        EconomicAsset::new("pv1", vec![Carrier::Electricity], 10., 8., economics).unwrap()
    }

    #[rstest]
    fn test_costs(asset: EconomicAsset) {
        assert_eq!(asset.capital_cost(), 15000.);
        assert_eq!(asset.annual_operating_cost(), 320.);
        assert_eq!(asset.annual_tax(), 12.);
        assert_eq!(asset.carriers(), &[Carrier::Electricity]);
    }

    #[rstest]
    fn test_incentive_range_is_inclusive(asset: EconomicAsset) {
        assert_eq!(asset.incentive_for_year(0), 0.);
        assert_eq!(asset.incentive_for_year(1), 900.);
        assert_eq!(asset.incentive_for_year(10), 900.);
        assert_eq!(asset.incentive_for_year(11), 0.);
    }

    #[rstest]
    fn test_other_flows_use_their_own_ranges(asset: EconomicAsset) {
        assert_eq!(
            asset.other_flows_for_year(1),
            OtherFlows {
                revenue: 200.,
                cost: 0.
            }
        );
        assert_eq!(
            asset.other_flows_for_year(2),
            OtherFlows {
                revenue: 225.,
                cost: 0.
            }
        );
        assert_eq!(
            asset.other_flows_for_year(10),
            OtherFlows {
                revenue: 0.,
                cost: 1400.
            }
        );
    }

    #[rstest]
    fn test_rejects_negative_costs(mut economics: AssetEconomics) {
        economics.cap_cost = -1.;

        assert_eq!(
            EconomicAsset::new("pv1", vec![Carrier::Electricity], 10., 10., economics),
            Err(DomainViolation::NegativeValue {
                entity: "pv1".into(),
                field: "cap_cost",
                value: -1.
            })
        );
    }
}
