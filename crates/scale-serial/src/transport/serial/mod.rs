//! Serial port transport backed by the `serialport` crate

mod adapter;
pub mod scanner;

pub use adapter::{SerialChunkReader, SerialPortProvider, SerialPortTransport};
