use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::focus::FocusKeywords;
use crate::logging::{LogConfig, LogFormat, LogLevel};
use crate::schedule::WeekdayLocale;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    pub settings: AppSettings,

    /// Routine oracle connection
    #[serde(default)]
    pub oracle: OracleConfig,

    /// What the oracle is told about the athlete
    #[serde(default)]
    pub athlete: AthleteSettings,

    /// Focus classifier keywords
    #[serde(default)]
    pub focus: FocusKeywords,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Data directory path
    pub data_dir: PathBuf,

    /// SQLite file name inside the data directory
    pub database_file: String,

    /// Owner of the profile, session slot and history
    pub user_id: String,

    /// Locale used to name weekdays when resolving today's plan
    #[serde(default)]
    pub locale: WeekdayLocale,
}

/// Routine oracle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// API base URL
    pub endpoint: String,

    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Attempts per call, including the first
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    pub initial_backoff_ms: u64,

    /// Per-request timeout
    pub timeout_secs: u64,
}

/// Athlete description sent with routine requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AthleteSettings {
    pub objective: String,
    pub equipment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata { version: "1.0".to_string(), created_at: now, updated_at: now },
            settings: AppSettings::default(),
            oracle: OracleConfig::default(),
            athlete: AthleteSettings::default(),
            focus: FocusKeywords::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            data_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".fittrack")
                .join("data"),
            database_file: "fittrack.db".to_string(),
            user_id: "default".to_string(),
            locale: WeekdayLocale::default(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            max_attempts: 3,
            initial_backoff_ms: 1000,
            timeout_secs: 60,
        }
    }
}

impl Default for AthleteSettings {
    fn default() -> Self {
        AthleteSettings {
            objective: "ganar masa muscular, mejorar la potencia y mantenerme saludable".to_string(),
            equipment: "mancuernas de 3 kg y 6 kg, una barra sin discos y peso corporal; sin banco".to_string(),
        }
    }
}

impl AppSettings {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fittrack")
            .join("config.toml")
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                if config_path.exists() {
                    tracing::warn!(path = %config_path.display(), error = %e, "Ignoring unreadable config");
                } else {
                    tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
                }
                Self::default()
            }
        }
    }

    /// Save to the default location
    pub fn save(&mut self) -> Result<()> {
        self.save_to_file(Self::default_config_path())
    }

    /// Every settable key with its current value
    pub fn list_values(&self) -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get_value(key).ok().map(|value| (*key, value)))
            .collect()
    }

    pub const KEYS: &'static [&'static str] = &[
        "settings.data_dir",
        "settings.database_file",
        "settings.user_id",
        "settings.locale",
        "oracle.endpoint",
        "oracle.model",
        "oracle.api_key_env",
        "oracle.max_attempts",
        "oracle.initial_backoff_ms",
        "oracle.timeout_secs",
        "athlete.objective",
        "athlete.equipment",
        "logging.level",
        "logging.format",
        "logging.file_path",
    ];

    /// Read a value by dotted key
    pub fn get_value(&self, key: &str) -> Result<String> {
        let value = match key {
            "settings.data_dir" => self.settings.data_dir.display().to_string(),
            "settings.database_file" => self.settings.database_file.clone(),
            "settings.user_id" => self.settings.user_id.clone(),
            "settings.locale" => match self.settings.locale {
                WeekdayLocale::Es => "es".to_string(),
                WeekdayLocale::En => "en".to_string(),
            },
            "oracle.endpoint" => self.oracle.endpoint.clone(),
            "oracle.model" => self.oracle.model.clone(),
            "oracle.api_key_env" => self.oracle.api_key_env.clone(),
            "oracle.max_attempts" => self.oracle.max_attempts.to_string(),
            "oracle.initial_backoff_ms" => self.oracle.initial_backoff_ms.to_string(),
            "oracle.timeout_secs" => self.oracle.timeout_secs.to_string(),
            "athlete.objective" => self.athlete.objective.clone(),
            "athlete.equipment" => self.athlete.equipment.clone(),
            "logging.level" => self.logging.level.to_filter().to_string(),
            "logging.format" => format!("{:?}", self.logging.format).to_lowercase(),
            "logging.file_path" => self
                .logging
                .file_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        };
        Ok(value)
    }

    /// Set a value by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let number = |v: &str| -> Result<u64> {
            v.trim().parse::<u64>().with_context(|| format!("{} expects a number, got '{}'", key, v))
        };

        match key {
            "settings.data_dir" => self.settings.data_dir = PathBuf::from(value),
            "settings.database_file" => self.settings.database_file = value.to_string(),
            "settings.user_id" => {
                if value.trim().is_empty() || value.contains('/') {
                    return Err(anyhow!("user_id must be non-empty and must not contain '/'"));
                }
                self.settings.user_id = value.trim().to_string();
            }
            "settings.locale" => {
                self.settings.locale = match value.trim().to_lowercase().as_str() {
                    "es" => WeekdayLocale::Es,
                    "en" => WeekdayLocale::En,
                    other => return Err(anyhow!("Unsupported locale: {}", other)),
                }
            }
            "oracle.endpoint" => self.oracle.endpoint = value.to_string(),
            "oracle.model" => self.oracle.model = value.to_string(),
            "oracle.api_key_env" => self.oracle.api_key_env = value.to_string(),
            "oracle.max_attempts" => {
                let attempts = number(value)?;
                if attempts == 0 {
                    return Err(anyhow!("oracle.max_attempts must be at least 1"));
                }
                self.oracle.max_attempts = u32::try_from(attempts)?;
            }
            "oracle.initial_backoff_ms" => self.oracle.initial_backoff_ms = number(value)?,
            "oracle.timeout_secs" => self.oracle.timeout_secs = number(value)?,
            "athlete.objective" => self.athlete.objective = value.to_string(),
            "athlete.equipment" => self.athlete.equipment = value.to_string(),
            "logging.level" => self.logging.level = value.parse::<LogLevel>().map_err(|e| anyhow!(e))?,
            "logging.format" => self.logging.format = value.parse::<LogFormat>().map_err(|e| anyhow!(e))?,
            "logging.file_path" => {
                self.logging.file_path = if value.trim().is_empty() { None } else { Some(PathBuf::from(value)) }
            }
            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        }

        self.metadata.updated_at = Utc::now();
        Ok(())
    }
}
