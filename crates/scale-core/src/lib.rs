//! scale-core - Core types and decoding for live scale telemetry
//!
//! This crate holds the pure, I/O-free half of the scale reader: the
//! [`Reading`] model, the [`LineBuffer`] that reassembles frames from an
//! arbitrarily chunked text stream, the [`ChunkDecoder`] that turns raw
//! byte chunks into text, and the heuristic frame parser.
//!
//! ```text
//!   bytes ──► ChunkDecoder ──► LineBuffer ──► parse_frame ──► Reading
//!            (UTF-8, lossy)   (CR/LF split)   (heuristics)
//! ```

pub mod decoder;
pub mod error;
pub mod line_buffer;
pub mod models;
pub mod parser;

pub use decoder::ChunkDecoder;
pub use error::UnitParseError;
pub use line_buffer::LineBuffer;
pub use models::*;
pub use parser::{parse_frame, parse_frame_at};
