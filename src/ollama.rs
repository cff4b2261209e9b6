//! Client for a local Ollama server's `/api/chat` endpoint.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::ResolvedConfig;
use crate::provider::{post_json, ChatMessage, ChatProvider, ProviderError, TuningParams, WireMessage};

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
}

pub struct Ollama {
    client: Client,
    url: String,
    model: String,
    params: TuningParams,
}

impl Ollama {
    pub fn new(client: Client, config: &ResolvedConfig) -> Self {
        Ollama {
            client,
            url: format!("{}/api/chat", config.base_url),
            model: config.model.clone(),
            params: config.params,
        }
    }
}

impl ChatProvider for Ollama {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let options = (self.params != TuningParams::default()).then_some(OllamaOptions {
            temperature: self.params.temperature,
            num_predict: self.params.max_tokens,
            top_p: self.params.top_p,
        });
        let body = OllamaChatRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            stream: false,
            options,
        };
        let response: OllamaChatResponse =
            post_json(self.name(), self.client.post(&self.url), &body)?;
        response
            .message
            .map(|m| m.content)
            .ok_or(ProviderError::Response {
                provider: self.name(),
                message: "response contained no message".to_string(),
            })
    }
}
