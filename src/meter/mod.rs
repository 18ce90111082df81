pub mod source;
pub mod synthetic;

pub use source::{Level, MeterError, MeteringSource};
pub use synthetic::{SyntheticMeter, SyntheticMeterConfig};
