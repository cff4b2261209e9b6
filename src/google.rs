//! Client for the Gemini `generateContent` endpoint.

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ResolvedConfig;
use crate::provider::{
    owned_credential, post_json, ChatMessage, ChatProvider, ChatRole, ProviderError, TuningParams,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

pub struct Google {
    client: Client,
    url: String,
    api_key: Option<SecretString>,
    params: TuningParams,
}

impl Google {
    pub fn new(client: Client, config: &ResolvedConfig) -> Self {
        Google {
            client,
            url: format!("{}/models/{}:generateContent", config.base_url, config.model),
            api_key: owned_credential(config),
            params: config.params,
        }
    }

    /// Roles must alternate, so consecutive turns from the same side are
    /// joined into one content entry.
    fn request_body(&self, messages: &[ChatMessage]) -> GenerateContentRequest {
        let mut system = Vec::new();
        let mut contents: Vec<Content> = Vec::new();
        for message in messages {
            let role = match message.role {
                ChatRole::System => {
                    system.push(Part {
                        text: message.content.clone(),
                    });
                    continue;
                }
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            let previous = contents
                .last_mut()
                .filter(|last| last.role.as_deref() == Some(role))
                .and_then(|last| last.parts.last_mut());
            if let Some(part) = previous {
                part.text.push_str("\n\n");
                part.text.push_str(&message.content);
                continue;
            }
            contents.push(Content {
                role: Some(role.to_string()),
                parts: vec![Part {
                    text: message.content.clone(),
                }],
            });
        }
        let TuningParams {
            temperature,
            max_tokens,
            top_p,
        } = self.params;
        let generation_config = (self.params != TuningParams::default()).then_some(GenerationConfig {
            temperature,
            max_output_tokens: max_tokens,
            top_p,
        });
        GenerateContentRequest {
            contents,
            system_instruction: (!system.is_empty()).then_some(Content {
                role: None,
                parts: system,
            }),
            generation_config,
        }
    }
}

impl ChatProvider for Google {
    fn name(&self) -> &'static str {
        "Google"
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let body = self.request_body(messages);
        let mut request = self.client.post(&self.url);
        if let Some(key) = &self.api_key {
            request = request.header("x-goog-api-key", key.expose_secret());
        }
        let response: GenerateContentResponse =
            post_json(self.name(), request, &body).map_err(|e| match e {
                // Gemini reports a bad key as 400 INVALID_ARGUMENT.
                ProviderError::Status {
                    provider,
                    status: 400,
                    body,
                } if body.contains("API_KEY_INVALID") => ProviderError::Authentication {
                    provider,
                    status: 400,
                    body,
                },
                other => other,
            })?;
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ProviderError::Response {
                provider: self.name(),
                message: "response contained no candidates".to_string(),
            });
        }
        Ok(text)
    }
}
