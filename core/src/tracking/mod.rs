pub mod accumulator;
pub mod units;

pub use accumulator::{DistanceAccumulator, SharedAccumulator};
pub use units::{to_physical, DistanceUnit};
