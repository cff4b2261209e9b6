//! Client for OpenAI-compatible chat completions endpoints.
//!
//! OpenAI, Cohere's compatibility API and the Hugging Face inference router
//! all accept the same request body, so one client serves the three
//! providers. For request/response schemas, see the [OpenAI API chat completions docs](https://platform.openai.com/docs/api-reference/chat/create).

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ResolvedConfig;
use crate::provider::{
    owned_credential, post_json, ChatMessage, ChatProvider, ProviderError, TuningParams,
    WireMessage,
};

/// A `chat/completions` request body
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

/// A `chat/completions` response message
#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// A `chat/completions` response choice
#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// A `chat/completions` response
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub struct OpenAiCompatible {
    name: &'static str,
    client: Client,
    url: String,
    api_key: Option<SecretString>,
    model: String,
    params: TuningParams,
}

impl OpenAiCompatible {
    pub fn new(name: &'static str, client: Client, config: &ResolvedConfig) -> Self {
        OpenAiCompatible {
            name,
            client,
            url: format!("{}/chat/completions", config.base_url),
            api_key: owned_credential(config),
            model: config.model.clone(),
            params: config.params,
        }
    }
}

impl ChatProvider for OpenAiCompatible {
    fn name(&self) -> &'static str {
        self.name
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            stream: false,
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            top_p: self.params.top_p,
        };
        let mut request = self.client.post(&self.url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }
        let response: ChatResponse = post_json(self.name, request, &body)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ProviderError::Response {
                provider: self.name,
                message: "response contained no message content".to_string(),
            })
    }
}
