pub mod asset;
pub mod balance;
pub mod community;
pub mod demand;
pub mod economics;
pub mod energy_supply;
pub mod prosumer;
pub(crate) mod solvers;
pub mod units;
