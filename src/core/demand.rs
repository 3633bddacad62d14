use crate::input::Carrier;
use indexmap::IndexMap;

/// A consumer's demand in kW, per carrier.
#[derive(Clone, Debug, PartialEq)]
pub struct DemandSource {
    id: String,
    demand: IndexMap<Carrier, Vec<f64>>,
}

impl DemandSource {
    pub fn new(id: &str, demand: IndexMap<Carrier, Vec<f64>>) -> Self {
        Self {
            id: id.to_string(),
            demand,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn carriers(&self) -> impl Iterator<Item = Carrier> + '_ {
        self.demand.keys().copied()
    }

    pub fn provides(&self, carrier: Carrier) -> bool {
        self.demand.contains_key(&carrier)
    }

    pub fn demand_for(&self, carrier: Carrier) -> Option<&[f64]> {
        self.demand.get(&carrier).map(Vec::as_slice)
    }
}
