//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use catalog_decoder::{DecoderConfig, FramerConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filtering: FilteringConfig,
    /// Overrides the catalog's `[meta.serial]` framing
    #[serde(default)]
    pub framing: Option<FramerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    pub catalog: PathBuf,
    /// candump-style CAN logs
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Raw serial captures
    #[serde(default)]
    pub serial_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    pub path: Option<PathBuf>,
    /// Print catalog statistics before decoding
    #[serde(default)]
    pub include_summary: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilteringConfig {
    pub buses: Option<Vec<u8>>,
    pub frame_ids: Option<Vec<u32>>,
    #[serde(default)]
    pub emit_unknown: bool,
}

impl FilteringConfig {
    pub fn decoder_config(&self) -> DecoderConfig {
        let mut config = DecoderConfig::new().with_unknown_frames(self.emit_unknown);
        if let Some(buses) = &self.buses {
            config = config.with_bus_filter(buses.clone());
        }
        if let Some(ids) = &self.frame_ids {
            config = config.with_frame_filter(ids.clone());
        }
        config
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate(&config).with_context(|| format!("Invalid config file: {:?}", path))?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.input.files.is_empty() && config.input.serial_files.is_empty() {
        bail!("no input files: set input.files or input.serial_files");
    }
    if let Some(framing) = &config.framing {
        if framing.max_frame_length == 0 {
            bail!("framing.max_frame_length must be greater than 0");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_decoder::FramingEncoding;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            catalog = "vehicle.toml"
            files = ["trace.log"]

            [output]
            format = "json"

            [filtering]
            buses = [0]
            emit_unknown = true

            [framing]
            encoding = "modbus_rtu"
            device_address = 17
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.files.len(), 1);
        assert_eq!(config.output.format, OutputFormat::Json);
        let framing = config.framing.unwrap();
        assert_eq!(framing.encoding, FramingEncoding::ModbusRtu);
        assert_eq!(framing.device_address, Some(17));

        let decoder_config = config.filtering.decoder_config();
        assert!(decoder_config.emit_unknown_frames);
        assert!(!decoder_config.should_process_bus(Some(1)));
    }

    #[test]
    fn test_load_config_requires_inputs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[input]\ncatalog = \"vehicle.toml\"").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("no input files"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
