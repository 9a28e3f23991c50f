//! Configuration for mbox-rs

use crate::error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-file ceiling applied inside archives (2 GiB).
pub const DEFAULT_ARCHIVE_SIZE_CEILING: u64 = 2 * 1024 * 1024 * 1024;

/// Largest contiguous chunk kept in memory for one output file (1 GiB).
pub const DEFAULT_SEGMENT_SIZE: usize = 1024 * 1024 * 1024;

/// Largest archive entry the importer will hand back.
pub const DEFAULT_MAX_IMPORT_ENTRY_SIZE: u64 = 50_830_578;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Maximum size of one mboxrd file inside an archive, 0 = unbounded
    #[serde(default = "default_archive_size_ceiling")]
    pub archive_size_ceiling: u64,
    /// Deflate level (0-9) used for archive entries
    #[serde(default = "default_compression_level")]
    pub compression_level: i64,
    /// Segment size of in-memory output buffers
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Entries at or above this size are skipped when picking a payload
    #[serde(default = "default_max_import_entry_size")]
    pub max_entry_size: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub maildir_path: String,
    /// Messages returned per listing page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

fn default_archive_size_ceiling() -> u64 {
    DEFAULT_ARCHIVE_SIZE_CEILING
}

fn default_compression_level() -> i64 {
    6
}

fn default_segment_size() -> usize {
    DEFAULT_SEGMENT_SIZE
}

fn default_max_import_entry_size() -> u64 {
    DEFAULT_MAX_IMPORT_ENTRY_SIZE
}

fn default_page_size() -> usize {
    100
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            archive_size_ceiling: default_archive_size_ceiling(),
            compression_level: default_compression_level(),
            segment_size: default_segment_size(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_entry_size: default_max_import_entry_size(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            maildir_path: "/tmp/maildir".to_string(),
            page_size: default_page_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ExportError::Config(e.to_string()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| ExportError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0..=9).contains(&self.export.compression_level) {
            return Err(ExportError::Config(format!(
                "compression_level must be between 0 and 9, got {}",
                self.export.compression_level
            )));
        }
        if self.export.segment_size == 0 {
            return Err(ExportError::Config("segment_size must be positive".to_string()));
        }
        if self.store.page_size == 0 {
            return Err(ExportError::Config("page_size must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.export.archive_size_ceiling, DEFAULT_ARCHIVE_SIZE_CEILING);
        assert_eq!(config.export.compression_level, 6);
        assert_eq!(config.import.max_entry_size, DEFAULT_MAX_IMPORT_ENTRY_SIZE);
        assert_eq!(config.store.page_size, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [export]
            archive_size_ceiling = 1048576
            compression_level = 9

            [store]
            maildir_path = "/var/mail/alice"
            "#,
        )
        .unwrap();

        assert_eq!(config.export.archive_size_ceiling, 1_048_576);
        assert_eq!(config.export.compression_level, 9);
        assert_eq!(config.export.segment_size, DEFAULT_SEGMENT_SIZE);
        assert_eq!(config.store.maildir_path, "/var/mail/alice");
        assert_eq!(config.store.page_size, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_toml("[export]\ncompression_level = 12").is_err());
        assert!(Config::from_toml("[export]\nsegment_size = 0").is_err());
        assert!(Config::from_toml("[store]\nmaildir_path = \"/m\"\npage_size = 0").is_err());
        assert!(Config::from_toml("[export\n").is_err());
    }
}
