//! Command implementations for scale-cli

pub mod monitor;
pub mod parse;
pub mod ports;

pub use monitor::monitor;
pub use parse::parse;
pub use ports::ports;
