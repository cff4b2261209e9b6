//! The provider capability trait and the registry that picks a backend for
//! the configured provider.
//!
//! Each backend is compiled in through its cargo feature. Selecting a
//! provider whose feature is disabled fails with
//! [`WhisperError::ProviderUnavailable`] instead of installing anything at
//! run time.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::cli::ProviderKind;
use crate::config::ResolvedConfig;
use crate::errors::WhisperError;

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Who authored a message sent to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A provider-neutral chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// `{role, content}` pair shared by the OpenAI-style and Ollama wire formats.
#[derive(Debug, Serialize)]
pub(crate) struct WireMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        WireMessage {
            role: message.role.as_str(),
            content: &message.content,
        }
    }
}

/// Errors from a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} rejected the credential (HTTP {status}): {body}")]
    Authentication {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected response from {provider}: {message}")]
    Response {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    /// Authentication failures end the session; everything else may be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProviderError::Authentication { .. })
    }
}

/// A chat-capable LLM backend.
pub trait ChatProvider {
    /// Human readable provider name used in messages.
    fn name(&self) -> &'static str;

    /// Send the conversation and return the assistant's reply text.
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

/// Numeric tuning parameters a provider understands.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TuningParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamSlot {
    Temperature,
    MaxTokens,
    TopP,
}

impl TuningParams {
    /// Keep only the parameters `provider` understands. Native names win
    /// over the generic `max_tokens`/`top_p` spellings; anything else is
    /// dropped.
    pub fn for_provider(provider: ProviderKind, params: &BTreeMap<String, f64>) -> Self {
        let native = provider.native_params();
        let mut tuning = TuningParams::default();
        for (key, &value) in params {
            let Some(slot) = provider.param_slot(key) else {
                log::debug!("ignoring parameter {key} not used by {provider}");
                continue;
            };
            let is_native = native.contains(&key.as_str());
            if !value.is_finite() || value < 0.0 {
                log::warn!("ignoring parameter {key} with invalid value {value}");
                continue;
            }
            match slot {
                ParamSlot::Temperature => tuning.temperature = Some(value as f32),
                ParamSlot::MaxTokens if is_native || tuning.max_tokens.is_none() => {
                    if value >= 1.0 {
                        tuning.max_tokens = Some(value.round().min(u32::MAX as f64) as u32);
                    }
                }
                ParamSlot::TopP if is_native || tuning.top_p.is_none() => {
                    tuning.top_p = Some(value as f32)
                }
                _ => {}
            }
        }
        tuning
    }
}

impl ProviderKind {
    /// Environment variable consulted when the configuration has no credential.
    pub fn credential_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Google => Some("GOOGLE_API_KEY"),
            ProviderKind::Cohere => Some("COHERE_API_KEY"),
            ProviderKind::HuggingFace => Some("HF_TOKEN"),
            ProviderKind::Ollama => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Cohere => "https://api.cohere.ai/compatibility/v1",
            ProviderKind::HuggingFace => "https://router.huggingface.co/v1",
            ProviderKind::Ollama => "http://localhost:11434",
        }
    }

    /// Provider-native names for temperature, output length and nucleus sampling.
    pub fn native_params(&self) -> [&'static str; 3] {
        match self {
            ProviderKind::OpenAi | ProviderKind::Anthropic => ["temperature", "max_tokens", "top_p"],
            ProviderKind::Google => ["temperature", "max_output_tokens", "top_p"],
            ProviderKind::Cohere => ["temperature", "max_tokens", "p"],
            ProviderKind::HuggingFace => ["temperature", "max_new_tokens", "top_p"],
            ProviderKind::Ollama => ["temperature", "num_predict", "top_p"],
        }
    }

    fn param_slot(&self, key: &str) -> Option<ParamSlot> {
        let [temperature, max_tokens, top_p] = self.native_params();
        match key {
            k if k == temperature => Some(ParamSlot::Temperature),
            k if k == max_tokens || k == "max_tokens" => Some(ParamSlot::MaxTokens),
            k if k == top_p || k == "top_p" => Some(ParamSlot::TopP),
            _ => None,
        }
    }
}

/// Build the client for the configured provider.
pub fn build_provider(config: &ResolvedConfig) -> Result<Box<dyn ChatProvider>, WhisperError> {
    let unavailable = |reason: String| WhisperError::ProviderUnavailable {
        provider: config.provider.to_string(),
        reason,
    };
    let client = http_client(config.timeout).map_err(|e| unavailable(e.to_string()))?;
    let provider: Box<dyn ChatProvider> = match config.provider {
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => Box::new(crate::openai::OpenAiCompatible::new(
            "OpenAI", client, config,
        )),
        #[cfg(feature = "cohere")]
        ProviderKind::Cohere => Box::new(crate::openai::OpenAiCompatible::new(
            "Cohere", client, config,
        )),
        #[cfg(feature = "huggingface")]
        ProviderKind::HuggingFace => Box::new(crate::openai::OpenAiCompatible::new(
            "HuggingFace",
            client,
            config,
        )),
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => Box::new(crate::anthropic::Anthropic::new(client, config)),
        #[cfg(feature = "google")]
        ProviderKind::Google => Box::new(crate::google::Google::new(client, config)),
        #[cfg(feature = "ollama")]
        ProviderKind::Ollama => Box::new(crate::ollama::Ollama::new(client, config)),
        #[allow(unreachable_patterns)]
        other => {
            return Err(unavailable(format!(
                "log-whisperer was built without the `{}` feature",
                other
            )))
        }
    };
    log::info!(
        "using {} model {} at {}",
        provider.name(),
        config.model,
        config.base_url
    );
    Ok(provider)
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("log-whisperer/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Copy of the configured credential for a backend to own.
pub(crate) fn owned_credential(config: &ResolvedConfig) -> Option<SecretString> {
    config
        .credential
        .as_ref()
        .map(|c| SecretString::new(c.expose_secret().clone()))
}

/// Send `body` as JSON and decode a successful JSON response.
pub(crate) fn post_json<B, T>(
    provider: &'static str,
    request: RequestBuilder,
    body: &B,
) -> Result<T, ProviderError>
where
    B: Serialize,
    T: DeserializeOwned,
{
    if log::log_enabled!(log::Level::Trace) {
        if let Ok(json) = serde_json::to_string(body) {
            log::trace!("{provider} request payload: {json}");
        }
    }
    let response = request.json(body).send()?;
    let status = response.status();
    log::debug!("{provider} HTTP status: {status}");
    let text = response.text()?;
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Authentication {
            provider,
            status: status.as_u16(),
            body: clip(&text),
        });
    }
    if !status.is_success() {
        return Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
            body: clip(&text),
        });
    }
    serde_json::from_str(&text).map_err(|e| ProviderError::Response {
        provider,
        message: format!("{e}. Raw response: {}", clip(&text)),
    })
}

fn clip(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
