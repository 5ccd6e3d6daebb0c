//! Transcoder configuration
//!
//! Every setting has a default, so running without a configuration file
//! produces stereo AAC at 48 kbit/s. A TOML file may override any subset:
//!
//! ```toml
//! [output]
//! channels = 2
//! bit_rate = 96000
//! sample_format = "fltp"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, TranscodeError};
use crate::media::SampleFormat;

/// Default output channel count (stereo)
pub const OUTPUT_CHANNELS: u16 = 2;
/// Default AAC bit rate in bps
pub const OUTPUT_BIT_RATE: u64 = 48_000;

/// Encoder output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output channel count
    pub channels: u16,

    /// AAC bit rate in bps
    pub bit_rate: u64,

    /// Preferred encoder input format. `None` uses the encoder's native
    /// format; an unsupported choice falls back to it with a warning.
    pub sample_format: Option<SampleFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            channels: OUTPUT_CHANNELS,
            bit_rate: OUTPUT_BIT_RATE,
            sample_format: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or a full
    /// `tracing-subscriber` filter string)
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Top-level transcoder configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl TranscodeConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TranscodeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| TranscodeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        let config: TranscodeConfig = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| TranscodeError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !(1..=8).contains(&self.output.channels) {
            return Err(format!(
                "output.channels must be between 1 and 8, got {}",
                self.output.channels
            ));
        }
        if self.output.bit_rate == 0 {
            return Err("output.bit_rate must be positive".to_string());
        }
        if self.logging.level.trim().is_empty() {
            return Err("logging.level must not be empty".to_string());
        }
        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            return Err(format!(
                "logging.level {:?} is not a valid filter: {}",
                self.logging.level, e
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = TranscodeConfig::default();
        assert_eq!(config.output.channels, 2);
        assert_eq!(config.output.bit_rate, 48_000);
        assert_eq!(config.output.sample_format, None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TranscodeConfig::from_toml("[output]\nbit_rate = 128000\n").unwrap();
        assert_eq!(config.output.bit_rate, 128_000);
        assert_eq!(config.output.channels, 2);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_full_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            "[output]\nchannels = 1\nbit_rate = 64000\nsample_format = \"s16\"\n\n\
             [logging]\nlevel = \"debug\"\nformat = \"json\"\n"
        )
        .unwrap();

        let config = TranscodeConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.output.channels, 1);
        assert_eq!(config.output.sample_format, Some(SampleFormat::S16));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(TranscodeConfig::from_toml("[output]\nchannels = 0\n").is_err());
        assert!(TranscodeConfig::from_toml("[output]\nchannels = 9\n").is_err());
        assert!(TranscodeConfig::from_toml("[output]\nbit_rate = 0\n").is_err());
        assert!(TranscodeConfig::from_toml("[logging]\nformat = \"xml\"\n").is_err());
        assert!(TranscodeConfig::from_toml("[output]\nsample_format = \"s24\"\n").is_err());
    }

    #[test]
    fn test_log_level_must_be_a_filter_directive() {
        let config =
            TranscodeConfig::from_toml("[logging]\nlevel = \"warn,aac_transcode=trace\"\n")
                .unwrap();
        assert_eq!(config.logging.level, "warn,aac_transcode=trace");

        let err = TranscodeConfig::from_toml("[logging]\nlevel = \"aac_transcode=loud\"\n")
            .unwrap_err();
        assert!(err.contains("logging.level"), "{}", err);

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[logging]\nlevel = \"aac_transcode=loud\"\n").unwrap();
        let err = TranscodeConfig::from_file(temp_file.path()).unwrap_err();
        assert!(matches!(err, TranscodeError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = TranscodeConfig::from_file("/nonexistent/transcode.toml").unwrap_err();
        assert!(matches!(err, TranscodeError::Config(_)));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let config = TranscodeConfig {
            output: OutputConfig {
                channels: 1,
                bit_rate: 96_000,
                sample_format: Some(SampleFormat::F32P),
            },
            ..Default::default()
        };
        let temp_file = NamedTempFile::new().unwrap();
        config.to_file(temp_file.path()).unwrap();

        let loaded = TranscodeConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
