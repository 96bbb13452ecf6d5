//! Board description file
//!
//! Parses board files in TOML format. Every section and field is optional;
//! missing values fall back to the STM32F107 layout and the stock timings.
//!
//! ```toml
//! [flash]
//! base = 0x08000000
//! page_size = "0x800"
//! page_count = 128
//! user_base = 0x08004000
//!
//! [media]
//! firmware_name = "ch.hex"
//! connect_timeout_ms = 500
//!
//! [indicator]
//! blink_ms = 500
//! busy_blink_ms = 100
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hexboot_core::geometry::{FlashGeometry, GeometryError};
use serde::Deserialize;
use thiserror::Error;

/// Errors loading a board file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Board file could not be read
    #[error("Failed to read board file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Board file is not valid TOML or has unexpected fields
    #[error("Failed to parse board file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Flash section describes an impossible layout
    #[error("Invalid flash layout: {0}")]
    Geometry(#[from] GeometryError),
}

/// Complete board description
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    pub flash: FlashSection,
    pub media: MediaSection,
    pub indicator: IndicatorSection,
}

/// `[flash]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashSection {
    #[serde(deserialize_with = "deserialize_hex_u32")]
    pub base: u32,
    #[serde(deserialize_with = "deserialize_hex_u32")]
    pub page_size: u32,
    #[serde(deserialize_with = "deserialize_hex_u32")]
    pub page_count: u32,
    #[serde(deserialize_with = "deserialize_hex_u32")]
    pub user_base: u32,
}

impl Default for FlashSection {
    fn default() -> Self {
        let g = FlashGeometry::STM32F107;
        Self {
            base: g.base(),
            page_size: g.page_size(),
            page_count: g.page_count() as u32,
            user_base: g.user_base(),
        }
    }
}

/// `[media]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaSection {
    /// Firmware file looked up on the medium
    pub firmware_name: String,
    /// How long to wait for the medium to appear
    pub connect_timeout_ms: u64,
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            firmware_name: "ch.hex".to_string(),
            connect_timeout_ms: 500,
        }
    }
}

/// `[indicator]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndicatorSection {
    /// On and off time of each error blink
    pub blink_ms: u64,
    /// Toggle period while flashing
    pub busy_blink_ms: u64,
}

impl Default for IndicatorSection {
    fn default() -> Self {
        Self {
            blink_ms: 500,
            busy_blink_ms: 100,
        }
    }
}

impl BoardConfig {
    /// Load a board file, or the defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_toml_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Load a board file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded board file {:?}", path);
        Ok(config)
    }

    /// Parse a board description
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        // Reject bad layouts at load time rather than on first use
        config.geometry()?;
        Ok(config)
    }

    /// Validated flash layout
    pub fn geometry(&self) -> Result<FlashGeometry, GeometryError> {
        let f = &self.flash;
        FlashGeometry::new(f.base, f.page_size, f.page_count, f.user_base)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.media.connect_timeout_ms)
    }

    pub fn blink_period(&self) -> Duration {
        Duration::from_millis(self.indicator.blink_ms)
    }

    pub fn busy_blink_period(&self) -> Duration {
        Duration::from_millis(self.indicator.busy_blink_ms)
    }
}

/// Deserialize a u32 that can be hex (0x...) or decimal
fn deserialize_hex_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(&hex.replace('_', ""), 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_stm32f107() {
        let config = BoardConfig::load(None).unwrap();
        assert_eq!(config.geometry().unwrap(), FlashGeometry::STM32F107);
        assert_eq!(config.media.firmware_name, "ch.hex");
        assert_eq!(config.connect_timeout(), Duration::from_millis(500));
        assert_eq!(config.blink_period(), Duration::from_millis(500));
        assert_eq!(config.busy_blink_period(), Duration::from_millis(100));
    }

    #[test]
    fn test_full_board_file() {
        let config = BoardConfig::from_toml_str(
            r#"
            [flash]
            base = 0x08000000
            page_size = "0x400"
            page_count = 64
            user_base = "0x0800_2000"

            [media]
            firmware_name = "app.hex"
            connect_timeout_ms = 50

            [indicator]
            blink_ms = 10
            busy_blink_ms = 5
            "#,
        )
        .unwrap();

        let g = config.geometry().unwrap();
        assert_eq!(g.page_size(), 1024);
        assert_eq!(g.page_count(), 64);
        assert_eq!(g.user_base(), 0x0800_2000);
        assert_eq!(config.media.firmware_name, "app.hex");
        assert_eq!(config.busy_blink_period(), Duration::from_millis(5));
    }

    #[test]
    fn test_partial_board_file() {
        let config = BoardConfig::from_toml_str("[media]\nfirmware_name = \"fw.hex\"\n").unwrap();
        assert_eq!(config.geometry().unwrap(), FlashGeometry::STM32F107);
        assert_eq!(config.media.connect_timeout_ms, 500);
    }

    #[test]
    fn test_rejects_bad_layout() {
        let err = BoardConfig::from_toml_str("[flash]\nuser_base = 0x08000100\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Geometry(GeometryError::InvalidUserBase(0x0800_0100))
        ));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            BoardConfig::from_toml_str("[flash]\nsector_size = 4096\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x800"), Ok(0x800));
        assert_eq!(parse_number(" 2048 "), Ok(2048));
        assert_eq!(parse_number("0X0800_4000"), Ok(0x0800_4000));
        assert!(parse_number("0xZZ").is_err());
        assert!(parse_number("12k").is_err());
    }
}
