//src/config.rs
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_CONFIG_DIR: &str = "gym-app";
const CONFIG_ENV_VAR: &str = "GYM_APP_CONFIG_DIR"; // Environment variable name
const MIN_SECRET_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine configuration directory.")]
    CannotDetermineConfigDir,
    #[error("I/O error accessing config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid bind address '{0}'")]
    InvalidBindAddress(String),
    #[error("cookie_secret must be at least {MIN_SECRET_LEN} characters long")]
    SecretTooShort,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)] // Ensure defaults are used if fields are missing
pub struct Config {
    pub bind_address: String,
    /// Overrides the default database location in the data directory.
    pub database_path: Option<PathBuf>,
    /// HMAC key for session and draft cookies. Generated on first run.
    pub cookie_secret: String,
    pub draft_cookie_max_age_hours: u32, // Default 24
    pub session_max_age_days: u32,       // Default 7, only for "remember me"
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: "127.0.0.1:3000".to_string(),
            database_path: None,
            cookie_secret: String::new(),
            draft_cookie_max_age_hours: 24,
            session_max_age_days: 7,
            secure_cookies: false,
        }
    }
}

impl Config {
    pub fn draft_cookie_max_age(&self) -> Duration {
        Duration::hours(i64::from(self.draft_cookie_max_age_hours))
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::days(i64::from(self.session_max_age_days))
    }

    /// Checks the values the server can't start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddress(self.bind_address.clone()));
        }
        if self.cookie_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort);
        }
        Ok(())
    }
}

/// Fresh random secret, 64 hex characters.
pub fn generate_secret() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// Determines the path to the configuration file.
/// Exposed at crate root as get_config_path_util
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir_override = std::env::var(CONFIG_ENV_VAR).ok();

    let config_dir_path = match config_dir_override {
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.is_dir() {
                warn!(
                    "Environment variable {} points to '{}', which is not a directory. Trying to create it.",
                    CONFIG_ENV_VAR,
                    path.display()
                );
                fs::create_dir_all(&path)?;
            }
            path
        }
        None => {
            let base_config_dir =
                dirs::config_dir().ok_or(ConfigError::CannotDetermineConfigDir)?;
            base_config_dir.join(APP_CONFIG_DIR)
        }
    };

    if !config_dir_path.exists() {
        fs::create_dir_all(&config_dir_path)?;
    }

    Ok(config_dir_path.join(CONFIG_FILE_NAME))
}

/// Loads the configuration from the TOML file at the given path.
/// A missing file is created with defaults, and a missing cookie secret is
/// generated and written back.
pub fn load(config_path: &Path) -> Result<Config, ConfigError> {
    let mut config = if config_path.exists() {
        let config_content = fs::read_to_string(config_path)?;
        toml::from_str::<Config>(&config_content)?
    } else {
        Config::default()
    };

    if config.cookie_secret.is_empty() || !config_path.exists() {
        if config.cookie_secret.is_empty() {
            info!("Generating a new cookie secret in {:?}", config_path);
            config.cookie_secret = generate_secret();
        }
        save(config_path, &config)?;
    }
    Ok(config)
}

/// Saves the configuration to the TOML file.
pub fn save(config_path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let config_content = toml::to_string_pretty(config)?;
    fs::write(config_path, config_content)?;
    Ok(())
}
