//! Output formatting for scale-cli (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use scale_serial::{PortInfo, Reading};
use serde::Serialize;
use std::borrow::Cow;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    let table = Table::new(data).to_string();
                    println!("{}", table);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => {
                print!("{}", csv_rows(data, true));
            }
        }
    }
}

/// Render items as CSV using the table columns
pub fn csv_rows<T: Tabled>(data: &[T], header: bool) -> String {
    let mut out = String::new();
    if header {
        push_csv_line(&mut out, &T::headers());
    }
    for item in data {
        push_csv_line(&mut out, &item.fields());
    }
    out
}

fn push_csv_line(out: &mut String, cells: &[Cow<'_, str>]) {
    let values: Vec<String> = cells.iter().map(|cell| escape_csv(cell)).collect();
    out.push_str(&values.join(","));
    out.push('\n');
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Display types for the commands
// =============================================================================

/// Port display for ports command
#[derive(Debug, Tabled, Serialize)]
pub struct PortRow {
    #[tabled(rename = "Port")]
    pub name: String,
    #[tabled(rename = "Type")]
    pub kind: String,
    #[tabled(rename = "VID:PID")]
    pub usb_id: String,
    #[tabled(rename = "Manufacturer")]
    pub manufacturer: String,
    #[tabled(rename = "Product")]
    pub product: String,
}

impl From<PortInfo> for PortRow {
    fn from(port: PortInfo) -> Self {
        let usb_id = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!("{:04x}:{:04x}", vid, pid),
            _ => "-".to_string(),
        };
        Self {
            name: port.name,
            kind: format!("{:?}", port.kind).to_lowercase(),
            usb_id,
            manufacturer: port.manufacturer.unwrap_or_else(|| "-".to_string()),
            product: port.product.unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Reading display for monitor command
#[derive(Debug, Tabled, Serialize)]
pub struct ReadingRow {
    #[tabled(rename = "Time")]
    pub timestamp: String,
    #[tabled(rename = "Weight")]
    pub value: String,
    #[tabled(rename = "Unit")]
    pub unit: String,
    #[tabled(rename = "Frame")]
    pub raw_frame: String,
}

impl From<&Reading> for ReadingRow {
    fn from(reading: &Reading) -> Self {
        Self {
            timestamp: reading.timestamp().to_rfc3339(),
            value: reading.value().to_string(),
            unit: reading.unit().to_string(),
            raw_frame: reading.raw_frame().to_string(),
        }
    }
}

/// Decode result for parse command
#[derive(Debug, Tabled, Serialize)]
pub struct ParseRow {
    #[tabled(rename = "Frame")]
    pub frame: String,
    #[tabled(rename = "Weight", display_with = "display_option")]
    pub value: Option<f64>,
    #[tabled(rename = "Unit", display_with = "display_option")]
    pub unit: Option<String>,
}

fn display_option<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scale_serial::PortKind;

    #[test]
    fn test_csv_escapes_delimited_frames() {
        let rows = vec![ParseRow {
            frame: "1,ST,100,0,kg".to_string(),
            value: Some(100.0),
            unit: Some("kg".to_string()),
        }];
        assert_eq!(
            csv_rows(&rows, true),
            "Frame,Weight,Unit\n\"1,ST,100,0,kg\",100,kg\n"
        );
    }

    #[test]
    fn test_csv_marks_missing_values() {
        let rows = vec![ParseRow {
            frame: "OVERLOAD".to_string(),
            value: None,
            unit: None,
        }];
        assert_eq!(csv_rows(&rows, false), "OVERLOAD,-,-\n");
    }

    #[test]
    fn test_port_row_from_usb_port() {
        let row = PortRow::from(PortInfo {
            name: "/dev/ttyUSB0".to_string(),
            kind: PortKind::Usb,
            vid: Some(0x0403),
            pid: Some(0x6001),
            manufacturer: Some("FTDI".to_string()),
            product: None,
            serial_number: None,
        });
        assert_eq!(row.kind, "usb");
        assert_eq!(row.usb_id, "0403:6001");
        assert_eq!(row.product, "-");
    }
}
