use std::path::PathBuf;

use thiserror::Error;

use crate::provider::ProviderError;

/// log-whisperer Errors
#[derive(Debug, Error)]
pub enum WhisperError {
    #[error("No LLM provider configured. Please run `log-whisperer configure` first.")]
    ConfigurationMissing,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("No credential for {provider}. Run `log-whisperer configure` or set {env_var}.")]
    MissingCredential {
        provider: String,
        env_var: &'static str,
    },
    #[error("Provider {provider} is unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },
    #[error("Authentication with {provider} failed: {message}")]
    AuthenticationFailed { provider: String, message: String },
    #[error("Provider request failed: {0}")]
    TransientProvider(ProviderError),
    #[error("Failed to open log file: {}. Does it exist?", path.display())]
    LogFileNotFound { path: PathBuf },
    #[error("Could not locate the home directory for the configuration file.")]
    MissingHome,
    #[error("Failed to parse {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
    #[error("Failed to read conversation from {}: {source}", path.display())]
    TranscriptParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to serialize conversation: {0}")]
    TranscriptSerialize(#[from] serde_json::Error),
    #[error("Terminal error: {0}")]
    NixError(#[from] nix::Error),
    #[error(transparent)]
    StdioError(#[from] std::io::Error),
}

impl WhisperError {
    /// Classify a failed provider call: rejected credentials are fatal,
    /// anything else is worth retrying.
    pub fn from_provider(err: ProviderError) -> Self {
        if let ProviderError::Authentication { provider, .. } = &err {
            return WhisperError::AuthenticationFailed {
                provider: provider.to_string(),
                message: err.to_string(),
            };
        }
        WhisperError::TransientProvider(err)
    }
}
