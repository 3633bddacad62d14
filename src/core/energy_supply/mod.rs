pub mod dispatch_controller;
pub mod elec_battery;
pub mod pv;
