//! Client for the Anthropic Messages API.

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ResolvedConfig;
use crate::provider::{
    owned_credential, post_json, ChatMessage, ChatProvider, ChatRole, ProviderError, TuningParams,
};

const API_VERSION: &str = "2023-06-01";
/// `max_tokens` is mandatory for this API.
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, PartialEq, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

pub struct Anthropic {
    client: Client,
    url: String,
    api_key: Option<SecretString>,
    model: String,
    params: TuningParams,
}

impl Anthropic {
    pub fn new(client: Client, config: &ResolvedConfig) -> Self {
        Anthropic {
            client,
            url: format!("{}/messages", config.base_url),
            api_key: owned_credential(config),
            model: config.model.clone(),
            params: config.params,
        }
    }
}

/// System prompts go in a top-level field and the API expects roles to
/// alternate, so consecutive turns from the same side are joined.
fn split_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system: Vec<&str> = Vec::new();
    let mut turns: Vec<AnthropicMessage> = Vec::new();
    for message in messages {
        let role = match message.role {
            ChatRole::System => {
                system.push(&message.content);
                continue;
            }
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        if let Some(last) = turns.last_mut().filter(|last| last.role == role) {
            last.content.push_str("\n\n");
            last.content.push_str(&message.content);
            continue;
        }
        turns.push(AnthropicMessage {
            role,
            content: message.content.clone(),
        });
    }
    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, turns)
}

impl ChatProvider for Anthropic {
    fn name(&self) -> &'static str {
        "Anthropic"
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let (system, turns) = split_messages(messages);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: turns,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
        };
        let mut request = self
            .client
            .post(&self.url)
            .header("anthropic-version", API_VERSION);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose_secret());
        }
        let response: MessagesResponse = post_json(self.name(), request, &body)?;
        let text: Vec<String> = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(ProviderError::Response {
                provider: self.name(),
                message: "response contained no text content".to_string(),
            });
        }
        Ok(text.join(""))
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::cli::ProviderKind;
    use crate::provider::tests::resolved;

    #[test]
    fn system_prompt_is_lifted_and_same_roles_merged() {
        let (system, turns) = split_messages(&[
            ChatMessage::system("log context"),
            ChatMessage::user("first"),
            ChatMessage::user("second"),
            ChatMessage::assistant("answer"),
        ]);
        assert_eq!(system.as_deref(), Some("log context"));
        assert_eq!(
            turns,
            vec![
                AnthropicMessage {
                    role: "user",
                    content: "first\n\nsecond".to_string(),
                },
                AnthropicMessage {
                    role: "assistant",
                    content: "answer".to_string(),
                },
            ]
        );
    }

    #[test]
    fn sends_headers_and_default_max_tokens() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", API_VERSION)
            .match_body(Matcher::Json(json!({
                "model": "test-model",
                "max_tokens": 1024,
                "system": "log context",
                "messages": [{"role": "user", "content": "why did it crash?"}],
                "top_p": 0.5
            })))
            .with_status(200)
            .with_body(
                r#"{"content":[{"type":"text","text":"Out of "},{"type":"text","text":"memory."}]}"#,
            )
            .create();

        let config = resolved(ProviderKind::Anthropic, &server.url(), &[("top_p", 0.5)]);
        let client = Anthropic::new(Client::new(), &config);
        let reply = client
            .complete(&[
                ChatMessage::system("log context"),
                ChatMessage::user("why did it crash?"),
            ])
            .unwrap();

        assert_eq!(reply, "Out of memory.");
        mock.assert();
    }

    #[test]
    fn forbidden_is_authentication_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/messages")
            .with_status(403)
            .with_body(r#"{"type":"error"}"#)
            .create();

        let config = resolved(ProviderKind::Anthropic, &server.url(), &[]);
        let client = Anthropic::new(Client::new(), &config);
        assert!(client
            .complete(&[ChatMessage::user("hi")])
            .unwrap_err()
            .is_fatal());
    }
}
