//! Configuration file support for the `pws-analyze` tool.
//!
//! The tool configuration covers everything that is not part of an analysis
//! itself: log verbosity, worker count and where refractive index tables
//! come from. Analysis parameters live in [`crate::analysis::AnalysisSettings`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::reflection::{Material, RefractiveIndexTable};

/// Log level setting for the tool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Get the display name for this log level.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Where the refractive index of one material comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexSource {
    /// CSV table with columns `wavelength_um,n[,k]`, relative to the config file
    Table { table: PathBuf },
    /// Wavelength-independent real index
    Constant { index: f64 },
}

/// Refractive index configuration for one material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefractiveIndexEntry {
    pub material: Material,
    #[serde(flatten)]
    pub source: IndexSource,
}

impl RefractiveIndexEntry {
    pub fn constant(material: Material, index: f64) -> Self {
        Self {
            material,
            source: IndexSource::Constant { index },
        }
    }
}

/// Tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Worker threads for batch analysis; all cores when absent
    #[serde(default)]
    pub threads: Option<usize>,

    /// Refractive index sources used for theoretical reflectance
    #[serde(default = "default_refractive_indices")]
    pub refractive_indices: Vec<RefractiveIndexEntry>,
}

/// Visible-range refractive indices of the common reference materials.
fn default_refractive_indices() -> Vec<RefractiveIndexEntry> {
    vec![
        RefractiveIndexEntry::constant(Material::Glass, 1.52),
        RefractiveIndexEntry::constant(Material::Water, 1.333),
        RefractiveIndexEntry::constant(Material::Air, 1.0),
        RefractiveIndexEntry::constant(Material::Oil1_7, 1.7),
        RefractiveIndexEntry::constant(Material::Oil1_4, 1.4),
        RefractiveIndexEntry::constant(Material::Ipa, 1.377),
        RefractiveIndexEntry::constant(Material::Ethanol, 1.361),
    ]
}

impl ToolConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            log_level: LogLevel::default(),
            threads: None,
            refractive_indices: default_refractive_indices(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }
        if config.threads == Some(0) {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }

        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Build the refractive index table, resolving relative table paths
    /// against `base_dir`.
    pub fn build_lookup(&self, base_dir: &Path) -> Result<RefractiveIndexTable, ConfigError> {
        let mut table = RefractiveIndexTable::new();
        for entry in &self.refractive_indices {
            match &entry.source {
                IndexSource::Constant { index } => {
                    table = table.with_constant(entry.material, *index);
                }
                IndexSource::Table { table: path } => {
                    let path = base_dir.join(path);
                    let file = std::fs::File::open(&path)?;
                    table.load_csv(entry.material, file).map_err(|e| {
                        ConfigError::Invalid(format!(
                            "refractive index table {:?}: {}",
                            path, e
                        ))
                    })?;
                }
            }
        }
        Ok(table)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading config or its tables
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A value that cannot be used
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
