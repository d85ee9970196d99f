//! Configuration file handling for scale-cli

use anyhow::{Context, Result};
use clap::ValueEnum;
use scale_serial::config::{MockConfig, SerialPortConfig};
use scale_serial::{ScaleConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::output::OutputFormat;

/// Configuration for the CLI tool
///
/// The scale settings sit at the top level of the file next to the display
/// options:
///
/// ```toml
/// baud_rate = 9600
/// output = "json"
///
/// [transport]
/// type = "serial"
/// port = "/dev/ttyUSB0"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Scale connection settings
    #[serde(flatten)]
    pub scale: ScaleConfig,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load the default config file, ignoring one that cannot be read
    pub fn load_or_default() -> Self {
        match Self::config_path() {
            Ok(path) if path.exists() => Self::load_or_warn(&path),
            _ => Self::default(),
        }
    }

    fn load_or_warn(path: &Path) -> Self {
        Self::load_from(path).unwrap_or_else(|e| {
            warn!(error = %format!("{:#}", e), "Ignoring config file");
            Self::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("scale-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        port: Option<&str>,
        baud_rate: Option<u32>,
        mock: bool,
        output: Option<OutputFormat>,
        no_color: bool,
    ) -> MergedConfig {
        let mut scale = self.scale.clone();

        if mock {
            if !matches!(scale.transport, TransportConfig::Mock(_)) {
                scale.transport = TransportConfig::Mock(MockConfig::demo());
            }
        } else if let Some(port) = port {
            let mut serial = match &scale.transport {
                TransportConfig::Serial(serial) => serial.clone(),
                TransportConfig::Mock(_) => SerialPortConfig::default(),
            };
            serial.port = Some(port.to_string());
            scale.transport = TransportConfig::Serial(serial);
        }

        if let Some(baud_rate) = baud_rate {
            scale.baud_rate = baud_rate;
        }

        MergedConfig {
            scale,
            output: output
                .or_else(|| {
                    self.output
                        .as_deref()
                        .and_then(|s| OutputFormat::from_str(s, true).ok())
                })
                .unwrap_or_default(),
            no_color: no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub scale: ScaleConfig,
    pub output: OutputFormat,
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> Config {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_empty_file() {
        let merged = parse("").merge_with_args(None, None, false, None, false);

        assert_eq!(merged.scale.baud_rate, 9600);
        assert_eq!(merged.output, OutputFormat::Table);
        assert!(!merged.no_color);
        assert!(matches!(merged.scale.transport, TransportConfig::Serial(_)));
    }

    #[test]
    fn test_file_values_are_used() {
        let config = parse(
            r#"
            baud_rate = 4800
            output = "csv"
            no_color = true

            [transport]
            type = "serial"
            port = "COM3"
            "#,
        );
        let merged = config.merge_with_args(None, None, false, None, false);

        assert_eq!(merged.scale.baud_rate, 4800);
        assert_eq!(merged.output, OutputFormat::Csv);
        assert!(merged.no_color);
        match merged.scale.transport {
            TransportConfig::Serial(serial) => assert_eq!(serial.port.as_deref(), Some("COM3")),
            other => panic!("Expected serial transport, got {:?}", other),
        }
    }

    #[test]
    fn test_args_override_file() {
        let config = parse(
            r#"
            baud_rate = 4800
            output = "csv"

            [transport]
            type = "serial"
            port = "COM3"
            read_timeout_ms = 250
            "#,
        );
        let merged = config.merge_with_args(
            Some("/dev/ttyUSB1"),
            Some(19200),
            false,
            Some(OutputFormat::Json),
            false,
        );

        assert_eq!(merged.scale.baud_rate, 19200);
        assert_eq!(merged.output, OutputFormat::Json);
        match merged.scale.transport {
            TransportConfig::Serial(serial) => {
                assert_eq!(serial.port.as_deref(), Some("/dev/ttyUSB1"));
                assert_eq!(serial.read_timeout_ms, 250);
            }
            other => panic!("Expected serial transport, got {:?}", other),
        }
    }

    #[test]
    fn test_mock_flag_selects_demo_device() {
        let merged = Config::default().merge_with_args(Some("COM3"), None, true, None, false);
        match merged.scale.transport {
            TransportConfig::Mock(mock) => assert!(!mock.frames.is_empty()),
            other => panic!("Expected mock transport, got {:?}", other),
        }
    }

    #[test]
    fn test_broken_default_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"baud_rate = \"fast\"").unwrap();

        assert!(Config::load_from(file.path()).is_err());
        let config = Config::load_or_warn(file.path());
        assert_eq!(config.scale.baud_rate, 9600);
        assert_eq!(config.output, None);
    }

    #[test]
    fn test_unknown_output_in_file_falls_back() {
        let merged = parse("output = \"xml\"").merge_with_args(None, None, false, None, false);
        assert_eq!(merged.output, OutputFormat::Table);
    }
}
