//! Configuration file support.
//!
//! Preferences and the model registry are stored as versioned JSON in the
//! user's config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DEVICE, DEFAULT_IMAGE_EXTENSIONS, DEFAULT_MARKER_SIZE, DEFAULT_MAX_MASKS_PER_OBJECT,
};
use crate::inference::MaskOutputOptions;
use crate::state::ExtensionFilter;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
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

/// What a registered model can segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Image,
    Video,
}

/// A model the user can load: its type name and where its weights live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub kind: ModelKind,
    pub name: String,
    pub path: PathBuf,
}

/// User preferences section of the config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Device string handed to the model on load
    #[serde(default = "default_device")]
    pub device: String,

    /// Image extensions accepted when opening files and folders
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Accept every file the image decoder can read
    #[serde(default)]
    pub all_extensions: bool,

    #[serde(default = "default_max_masks_per_object")]
    pub max_masks_per_object: usize,

    /// Marker size for newly created instances
    #[serde(default = "default_marker_size")]
    pub marker_size: u32,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

fn default_extensions() -> Vec<String> {
    DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_max_masks_per_object() -> usize {
    DEFAULT_MAX_MASKS_PER_OBJECT
}

fn default_marker_size() -> u32 {
    DEFAULT_MARKER_SIZE
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            device: default_device(),
            extensions: default_extensions(),
            all_extensions: false,
            max_masks_per_object: default_max_masks_per_object(),
            marker_size: default_marker_size(),
        }
    }
}

impl UserPreferences {
    pub fn extension_filter(&self) -> ExtensionFilter {
        if self.all_extensions {
            ExtensionFilter::All
        } else {
            ExtensionFilter::allow(&self.extensions)
        }
    }

    /// Mask output options, clamped to at least one mask per object.
    pub fn mask_options(&self) -> MaskOutputOptions {
        MaskOutputOptions {
            max_masks_per_object: self.max_masks_per_object.max(1),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    pub version: u32,

    #[serde(default)]
    pub preferences: UserPreferences,

    /// Models available for loading
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            preferences: UserPreferences::default(),
            models: Vec::new(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Registered model by type name.
    pub fn model(&self, name: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn models_of_kind(&self, kind: ModelKind) -> impl Iterator<Item = &ModelEntry> {
        self.models.iter().filter(move |m| m.kind == kind)
    }

    /// Add a model, replacing any entry with the same name.
    pub fn register_model(&mut self, entry: ModelEntry) {
        self.models.retain(|m| m.name != entry.name);
        self.models.push(entry);
    }

    pub fn default_filename() -> &'static str {
        "samnotator-config.json"
    }

    /// Default config file location, `None` if no home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("samnotator").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("samnotator")
                    .join(Self::default_filename())
            })
        }
    }

    /// Try to load configuration from `path`.
    /// Returns None if the file doesn't exist or can't be read.
    pub fn load_from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    log::info!("Loaded configuration from {:?}", path);
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse config file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read config file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn load_from_default_path() -> Option<Self> {
        Self::load_from_path(&Self::default_path()?)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        std::fs::write(path, json)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;
        self.save_to_path(&path)
    }
}

impl Default for AppConfig {
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

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
