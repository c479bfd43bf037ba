use std::fs;
use std::path::{Path, PathBuf};

use common::blob::BlobSnapshot;
use common::crypto::{PakdfParams, SecretKey};
use common::custom_keys::CustomKeys;
use serde::{Deserialize, Serialize};
use tracing::Level;

pub const APP_NAME: &str = "blobvault";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SESSION_FILE_NAME: &str = "session.json";
pub const KEY_FILE_NAME: &str = "key.pem";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the blob vault
    #[serde(default = "default_vault_url")]
    pub vault_url: String,
    /// Where auth info for a username is published. When unset, `pakdf`
    /// must be configured.
    #[serde(default)]
    pub auth_info_url: Option<String>,
    /// Username used when a command does not name one
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily rolling log files (disabled when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Fixed PAKDF parameters, for vaults that do not publish auth info
    #[serde(default)]
    pub pakdf: Option<PakdfParams>,
}

fn default_vault_url() -> String {
    "http://localhost:5150".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vault_url: default_vault_url(),
            auth_info_url: None,
            username: None,
            log_level: default_log_level(),
            log_dir: None,
            pakdf: None,
        }
    }
}

/// What `vault login` leaves behind for later commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub keys: CustomKeys,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_token: Option<String>,
    /// Last known decrypted state of the account's blob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<BlobSnapshot>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.blobvault)
    pub dir: PathBuf,
    /// Path to the account key PEM file
    pub key_path: PathBuf,
    /// Path to the session file
    pub session_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.blobvault)
    pub fn dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    fn at(dir: PathBuf, config: AppConfig) -> Self {
        Self {
            key_path: dir.join(KEY_FILE_NAME),
            session_path: dir.join(SESSION_FILE_NAME),
            config_path: dir.join(CONFIG_FILE_NAME),
            dir,
            config,
        }
    }

    /// Initialize a new state directory with a fresh account key
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let dir = Self::dir(custom_path)?;
        if dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&dir)?;

        let state = Self::at(dir, config.unwrap_or_default());

        let key = SecretKey::generate().map_err(|e| StateError::InvalidKey(e.to_string()))?;
        fs::write(&state.key_path, key.to_pem())?;
        state.save_config()?;

        Ok(state)
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let dir = Self::dir(custom_path)?;
        if !dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        Ok(Self::at(dir, config))
    }

    pub fn save_config(&self) -> Result<(), StateError> {
        fs::write(&self.config_path, toml::to_string_pretty(&self.config)?)?;
        Ok(())
    }

    /// Load the account key from the key file
    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        if !self.key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        let pem = fs::read_to_string(&self.key_path)?;
        SecretKey::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))
    }

    pub fn load_session(&self) -> Result<Session, StateError> {
        if !self.session_path.exists() {
            return Err(StateError::NotLoggedIn);
        }
        Ok(serde_json::from_str(&fs::read_to_string(&self.session_path)?)?)
    }

    pub fn save_session(&self, session: &Session) -> Result<(), StateError> {
        fs::write(&self.session_path, serde_json::to_string_pretty(session)?)?;
        Ok(())
    }

    /// Remove the session; returns whether there was one
    pub fn clear_session(&self) -> Result<bool, StateError> {
        if !self.session_path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.session_path)?;
        Ok(true)
    }

    pub fn log_level(&self) -> Level {
        self.config.log_level.parse().unwrap_or(Level::INFO)
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.config.log_dir.as_deref()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("blobvault directory not initialized. Run 'vault init' first")]
    NotInitialized,

    #[error("blobvault directory already initialized")]
    AlreadyInitialized,

    #[error("not logged in. Run 'vault login' first")]
    NotLoggedIn,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("session file error: {0}")]
    Session(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::auth_info::AuthInfo;
    use tempfile::TempDir;

    fn auth_info() -> AuthInfo {
        let params: PakdfParams = serde_json::from_value(serde_json::json!({
            "modulus": "c5",
            "exponent": "010001",
            "alpha": "02",
            "host": "auth.example.com",
        }))
        .unwrap();
        AuthInfo {
            username: "alice".into(),
            version: 3,
            exists: true,
            email_verified: false,
            blobvault: "http://localhost:5150".into(),
            pakdf: params,
        }
    }

    #[test]
    fn test_init_and_load() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("vault");

        let config = AppConfig {
            username: Some("alice".into()),
            log_level: "debug".into(),
            ..Default::default()
        };
        let state = AppState::init(Some(dir.clone()), Some(config.clone())).unwrap();
        assert!(state.key_path.exists());
        assert!(state.config_path.exists());

        let loaded = AppState::load(Some(dir)).unwrap();
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.log_level(), Level::DEBUG);
        assert_eq!(
            loaded.load_key().unwrap().public(),
            state.load_key().unwrap().public()
        );
    }

    #[test]
    fn test_init_twice_fails() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("vault");

        AppState::init(Some(dir.clone()), None).unwrap();
        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_config_defaults_fill_gaps() {
        let config: AppConfig = toml::from_str("vault_url = \"https://vault.example.com\"").unwrap();
        assert_eq!(config.vault_url, "https://vault.example.com");
        assert_eq!(config.log_level, "info");
        assert!(config.pakdf.is_none());
    }

    #[test]
    fn test_config_with_pakdf_round_trips() {
        let config = AppConfig {
            pakdf: Some(auth_info().pakdf),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_session_round_trip() {
        let temp = TempDir::new().unwrap();
        let state = AppState::init(Some(temp.path().join("vault")), None).unwrap();

        assert!(matches!(state.load_session(), Err(StateError::NotLoggedIn)));

        let session = Session {
            keys: CustomKeys::new(auth_info()),
            login_token: Some("token".into()),
            blob: None,
        };
        state.save_session(&session).unwrap();

        let loaded = state.load_session().unwrap();
        assert_eq!(loaded.keys, session.keys);
        assert_eq!(loaded.login_token.as_deref(), Some("token"));

        assert!(state.clear_session().unwrap());
        assert!(!state.clear_session().unwrap());
    }
}
