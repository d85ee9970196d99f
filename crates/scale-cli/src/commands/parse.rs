//! Parse command - decode frames without a device

use anyhow::{Context, Result};
use scale_core::{parse_frame, LineBuffer};
use std::io::Read;

use crate::output::{OutputContext, ParseRow};

/// Decode frames given on the command line, or every line of stdin
pub fn parse(frames: &[String], ctx: &OutputContext) -> Result<()> {
    let frames = if frames.is_empty() {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read frames from stdin")?;
        split_frames(&input)
    } else {
        frames.to_vec()
    };

    let rows: Vec<ParseRow> = frames.iter().map(|frame| decode(frame)).collect();
    ctx.print(&rows);
    Ok(())
}

/// Split captured text the way the reader loop does, keeping a final
/// unterminated frame
fn split_frames(input: &str) -> Vec<String> {
    let mut buffer = LineBuffer::new();
    let mut frames = buffer.append(input);
    if !buffer.is_empty() {
        frames.push(buffer.tail().to_string());
    }
    frames
}

fn decode(frame: &str) -> ParseRow {
    let reading = parse_frame(frame);
    ParseRow {
        frame: frame.trim().to_string(),
        value: reading.as_ref().map(|r| r.value()),
        unit: reading.as_ref().map(|r| r.unit().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_frames_keeps_unterminated_tail() {
        let frames = split_frames("1,ST,100,0,kg\r\n12.50 kg\r\n\r\n5,lb");
        assert_eq!(frames, vec!["1,ST,100,0,kg", "12.50 kg", "5,lb"]);
    }

    #[test]
    fn test_decode_rows() {
        let row = decode("  12.50 kg ");
        assert_eq!(row.frame, "12.50 kg");
        assert_eq!(row.value, Some(12.5));
        assert_eq!(row.unit.as_deref(), Some("kg"));

        let row = decode("OVERLOAD");
        assert_eq!(row.value, None);
        assert_eq!(row.unit, None);
    }
}
