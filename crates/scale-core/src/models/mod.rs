//! Measurement models

mod reading;
mod unit;

pub use reading::*;
pub use unit::*;
