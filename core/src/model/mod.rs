pub mod calibration;
pub mod ledger;
pub mod sample;
