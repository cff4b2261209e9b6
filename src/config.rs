//! Provider configuration persisted as TOML under the user's home directory.
//!
//! The file holds one provider selection per installation. It is written by
//! `log-whisperer configure`, read by `chat` and `status`, and removed by
//! `reset`.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::cli::ProviderKind;
use crate::errors::WhisperError;
use crate::provider::TuningParams;

const CONFIG_DIR: &str = ".log-whisperer";
const CONFIG_FILE: &str = "config.toml";
/// Seconds to wait for a provider response unless `timeout_secs` is set.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// The on-disk configuration record.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Number of most recent turns sent with each question. Unset sends
    /// the whole transcript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_turns: Option<usize>,
    /// Numeric tuning parameters keyed by their provider-native names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f64>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("history_turns", &self.history_turns)
            .field("params", &self.params)
            .finish()
    }
}

/// Where the credential used for a session comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File,
    Env(&'static str),
    NotRequired,
    Missing,
}

impl Config {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Config {
            provider,
            model: model.into(),
            credential: None,
            base_url: None,
            timeout_secs: None,
            history_turns: None,
            params: BTreeMap::new(),
        }
    }

    /// Checks the fields that must hold regardless of the environment.
    pub fn validate(&self) -> Result<(), WhisperError> {
        if self.model.trim().is_empty() {
            return Err(WhisperError::InvalidConfig(
                "model must not be empty".to_string(),
            ));
        }
        if matches!(&self.credential, Some(c) if c.trim().is_empty()) {
            return Err(WhisperError::InvalidConfig(
                "credential must not be empty; remove the key to use the environment instead"
                    .to_string(),
            ));
        }
        if matches!(&self.base_url, Some(url) if url.trim().is_empty()) {
            return Err(WhisperError::InvalidConfig(
                "base_url must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(WhisperError::InvalidConfig(
                "timeout_secs must be positive".to_string(),
            ));
        }
        if self.history_turns == Some(0) {
            return Err(WhisperError::InvalidConfig(
                "history_turns must be positive; remove it to send the whole conversation"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn credential_source(&self) -> CredentialSource {
        self.credential_source_with(|key| env::var(key).ok())
    }

    fn credential_source_with<F>(&self, lookup: F) -> CredentialSource
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.credential.is_some() {
            return CredentialSource::File;
        }
        match self.provider.credential_env() {
            Some(var) if lookup(var).is_some_and(|v| !v.trim().is_empty()) => {
                CredentialSource::Env(var)
            }
            _ if !self.provider.requires_credential() => CredentialSource::NotRequired,
            _ => CredentialSource::Missing,
        }
    }

    /// Produce the runtime configuration, consulting the provider's
    /// credential environment variable when the file has none.
    pub fn resolve(&self) -> Result<ResolvedConfig, WhisperError> {
        self.resolve_with(|key| env::var(key).ok())
    }

    pub fn resolve_with<F>(&self, lookup: F) -> Result<ResolvedConfig, WhisperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.validate()?;
        let credential = match self.credential_source_with(&lookup) {
            CredentialSource::File => self.credential.clone(),
            CredentialSource::Env(var) => lookup(var),
            CredentialSource::NotRequired => None,
            CredentialSource::Missing => {
                return Err(WhisperError::MissingCredential {
                    provider: self.provider.to_string(),
                    env_var: self.provider.credential_env().unwrap_or("a credential"),
                })
            }
        };
        let base_url = self
            .base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string());
        Ok(ResolvedConfig {
            provider: self.provider,
            model: self.model.trim().to_string(),
            credential: credential.map(SecretString::new),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            history_turns: self.history_turns,
            params: TuningParams::for_provider(self.provider, &self.params),
        })
    }
}

/// Configuration ready to build a provider client from.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub credential: Option<SecretString>,
    pub base_url: String,
    pub timeout: Duration,
    pub history_turns: Option<usize>,
    pub params: TuningParams,
}

/// Reads and writes the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigStore { path: path.into() }
    }

    /// `~/.log-whisperer/config.toml`
    pub fn at_default_location() -> Result<Self, WhisperError> {
        let home = dirs::home_dir().ok_or(WhisperError::MissingHome)?;
        Ok(Self::new(home.join(CONFIG_DIR).join(CONFIG_FILE)))
    }

    pub fn from_override(path: Option<PathBuf>) -> Result<Self, WhisperError> {
        match path {
            Some(path) => Ok(Self::new(path)),
            None => Self::at_default_location(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when nothing has been configured yet.
    pub fn load(&self) -> Result<Option<Config>, WhisperError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let config: Config =
            toml::from_str(&contents).map_err(|source| WhisperError::ConfigParse {
                path: self.path.clone(),
                source,
            })?;
        config.validate()?;
        log::debug!("loaded configuration from {}", self.path.display());
        Ok(Some(config))
    }

    pub fn require(&self) -> Result<Config, WhisperError> {
        self.load()?.ok_or(WhisperError::ConfigurationMissing)
    }

    pub fn save(&self, config: &Config) -> Result<(), WhisperError> {
        config.validate()?;
        let contents = toml::to_string_pretty(config)?;
        write_atomic(&self.path, contents.as_bytes(), true)?;
        log::debug!("saved configuration to {}", self.path.display());
        Ok(())
    }

    /// Deletes the configuration file. Returns whether one existed.
    pub fn reset(&self) -> Result<bool, WhisperError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `contents` next to `path` and rename it into place so readers
/// never observe a partially written file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8], private: bool) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log-whisperer".to_string());
    let tmp = dir.join(format!(".{}.tmp", file_name));
    {
        let mut file = File::create(&tmp)?;
        if private {
            restrict_permissions(&file)?;
        }
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}
