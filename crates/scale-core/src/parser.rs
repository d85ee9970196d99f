//! Heuristic decoding of scale frames into readings
//!
//! Scales in the field print weights in several textual layouts. The parser
//! tries them in order and the first one that yields a finite number wins:
//!
//! 1. Trim the frame. An empty frame decodes to nothing.
//! 2. If the frame contains a comma it is treated as a delimited record.
//!    The unit is the first field equal to a unit token (`kg`, `g`, `lb`,
//!    `oz`, `t`, any case), defaulting to `kg`. A two-field record carries
//!    the weight in field 0; a record with three or more fields carries it in
//!    field 2 (`id,status,weight,...,unit`). That field must be a plain
//!    number, optionally signed, with `.` or `,` as decimal separator.
//! 3. Otherwise, or if the record layout did not produce a number, the first
//!    number anywhere in the frame is taken, together with a unit token that
//!    immediately follows it (whitespace allowed).
//!
//! The record layout rule was derived from one family of devices and is kept
//! exactly as is. New device formats belong in additional, separately tested
//! branches rather than changes to the existing ones.
//!
//! Parsing is stateless; a frame's result never depends on earlier frames.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::models::{Reading, WeightUnit};

/// Decode one frame, stamping the reading with the current time
pub fn parse_frame(frame: &str) -> Option<Reading> {
    parse_frame_at(frame, Utc::now())
}

/// Decode one frame with an explicit capture time
pub fn parse_frame_at(frame: &str, timestamp: DateTime<Utc>) -> Option<Reading> {
    let trimmed = frame.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains(',') {
        if let Some(reading) = parse_delimited(trimmed, timestamp) {
            return Some(reading);
        }
        trace!(frame = trimmed, "Record layout gave no weight, scanning free text");
    }

    parse_free_text(trimmed, timestamp)
}

fn parse_delimited(frame: &str, timestamp: DateTime<Utc>) -> Option<Reading> {
    let fields: Vec<&str> = frame.split(',').map(str::trim).collect();

    let unit = fields
        .iter()
        .find_map(|field| WeightUnit::from_token(field))
        .unwrap_or_default();

    let candidate = match fields.len() {
        2 => fields[0],
        n if n >= 3 => fields[2],
        _ => return None,
    };

    let value = parse_weight_field(candidate)?;
    Reading::new(value, unit, frame, timestamp)
}

fn parse_free_text(frame: &str, timestamp: DateTime<Utc>) -> Option<Reading> {
    let bytes = frame.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let negative = start > 0 && bytes[start - 1] == b'-';

    let number = scan_number(frame, start)?;
    let unit = unit_suffix(&frame[number.end..]).unwrap_or_default();
    let value = number.to_f64(negative)?;

    Reading::new(value, unit, frame, timestamp)
}

/// Whole-field match of an optionally signed decimal number
///
/// Spaces are allowed between the sign and the digits, and a trailing
/// separator without fraction digits is accepted (`"12,"`).
fn parse_weight_field(field: &str) -> Option<f64> {
    let bytes = field.as_bytes();
    let (negative, mut pos) = match bytes.first() {
        Some(b'-') => (true, 1),
        Some(b'+') => (false, 1),
        _ => (false, 0),
    };
    while bytes.get(pos) == Some(&b' ') {
        pos += 1;
    }

    let number = scan_number(field, pos)?;
    let mut end = number.end;
    if matches!(bytes.get(end), Some(b'.' | b',')) {
        end += 1;
    }
    if end != bytes.len() {
        return None;
    }

    number.to_f64(negative)
}

/// Digits with an optional fraction, located inside a frame
struct NumberMatch<'a> {
    integer: &'a str,
    fraction: &'a str,
    /// Byte offset just past the match
    end: usize,
}

impl NumberMatch<'_> {
    fn to_f64(&self, negative: bool) -> Option<f64> {
        let sign = if negative { "-" } else { "" };
        let fraction = if self.fraction.is_empty() {
            "0"
        } else {
            self.fraction
        };
        format!("{}{}.{}", sign, self.integer, fraction)
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Match `\d+([.,]\d+)?` starting exactly at `start`
fn scan_number(text: &str, start: usize) -> Option<NumberMatch<'_>> {
    let bytes = text.as_bytes();
    let int_len = count_digits(bytes.get(start..)?);
    if int_len == 0 {
        return None;
    }
    let int_end = start + int_len;

    let mut fraction = "";
    let mut end = int_end;
    if matches!(bytes.get(int_end), Some(b'.' | b',')) {
        let frac_len = count_digits(&bytes[int_end + 1..]);
        if frac_len > 0 {
            fraction = &text[int_end + 1..int_end + 1 + frac_len];
            end = int_end + 1 + frac_len;
        }
    }

    Some(NumberMatch {
        integer: &text[start..int_end],
        fraction,
        end,
    })
}

/// Unit token directly after a number, not followed by another letter
fn unit_suffix(rest: &str) -> Option<WeightUnit> {
    let rest = rest.trim_start_matches([' ', '\t']);
    WeightUnit::ALL.into_iter().find(|unit| {
        let symbol = unit.symbol();
        let matches_token = rest
            .get(..symbol.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(symbol));
        let followed_by_letter = rest
            .as_bytes()
            .get(symbol.len())
            .is_some_and(u8::is_ascii_alphabetic);
        matches_token && !followed_by_letter
    })
}
