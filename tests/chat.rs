use std::fs;
use std::io::Cursor;

use mockito::Matcher;
use tempfile::tempdir;

use log_whisperer::cli::ProviderKind;
use log_whisperer::config::{Config, ConfigStore};
use log_whisperer::errors::WhisperError;
use log_whisperer::provider::build_provider;
use log_whisperer::session::{run_chat, ChatSession, LogExcerpt};
use log_whisperer::transcript::{Transcript, TurnRole};

fn completion(content: &str) -> String {
    serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

#[test]
fn chat_round_trip_through_openai_compatible_server() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("sample.log");
    fs::write(&log, "INFO start\nWARN be careful\nERROR boom\n").unwrap();
    let save = dir.path().join("conversation.json");

    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::Regex("ERROR boom".to_string()))
        .with_status(200)
        .with_body(completion("One error: boom."))
        .expect(2)
        .create();

    let store = ConfigStore::new(dir.path().join("config.toml"));
    let mut config = Config::new(ProviderKind::OpenAi, "gpt-4o-mini");
    config.credential = Some("test-key".to_string());
    config.base_url = Some(server.url());
    store.save(&config).unwrap();

    let resolved = store.require().unwrap().resolve().unwrap();
    let provider = build_provider(&resolved).unwrap();
    let excerpt = LogExcerpt::load(&log, 10_000).unwrap();
    let mut session = ChatSession::new(provider, excerpt, Transcript::new())
        .save_to(Some(save.clone()));

    let mut out = Vec::new();
    session
        .run(
            Cursor::new("what errors are present?\nwhat errors are present?\nquit\n"),
            &mut out,
        )
        .unwrap();
    mock.assert();

    let output = String::from_utf8(out).unwrap();
    assert!(output.contains("One error: boom."));
    assert!(output.contains("Goodbye! Your conversation has been saved."));

    let saved = Transcript::load(&save).unwrap();
    let roles: Vec<TurnRole> = saved.turns().iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![
            TurnRole::User,
            TurnRole::Assistant,
            TurnRole::User,
            TurnRole::Assistant
        ]
    );
}

#[test]
fn only_the_excerpt_bound_is_sent() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("big.log");
    fs::write(&log, format!("{}{}", "A".repeat(50), "B".repeat(50))).unwrap();

    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/chat")
        .match_body(Matcher::Regex("A{50}\\.\\.\\.".to_string()))
        .with_status(200)
        .with_body(r#"{"message":{"role":"assistant","content":"only As"}}"#)
        .create();

    let mut config = Config::new(ProviderKind::Ollama, "llama3");
    config.base_url = Some(server.url());
    let resolved = config.resolve().unwrap();
    let provider = build_provider(&resolved).unwrap();
    let excerpt = LogExcerpt::load(&log, 50).unwrap();
    let mut session = ChatSession::new(provider, excerpt, Transcript::new());

    assert_eq!(session.ask("what is in the log?").unwrap(), "only As");
    mock.assert();
}

#[test]
fn resumed_session_continues_saved_transcript() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("app.log");
    fs::write(&log, "ERROR boom\n").unwrap();
    let save = dir.path().join("conv.json");

    let mut earlier = Transcript::new();
    earlier.push_user("first question");
    earlier.push_assistant("first answer");
    earlier.save(&save).unwrap();

    let mut server = mockito::Server::new();
    server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("first answer".to_string()))
        .with_status(200)
        .with_body(completion("second answer"))
        .create();

    let mut config = Config::new(ProviderKind::HuggingFace, "meta-llama/Llama-3.1-8B-Instruct");
    config.credential = Some("hf-token".to_string());
    config.base_url = Some(server.url());
    let provider = build_provider(&config.resolve().unwrap()).unwrap();
    let restored = Transcript::load(&save).unwrap();
    assert_eq!(restored, earlier);

    let mut session = ChatSession::new(provider, LogExcerpt::load(&log, 100).unwrap(), restored)
        .save_to(Some(save.clone()));
    session.run(Cursor::new("second question\n"), &mut Vec::new()).unwrap();

    let contents: Vec<String> = Transcript::load(&save)
        .unwrap()
        .turns()
        .iter()
        .map(|t| t.content.clone())
        .collect();
    assert_eq!(
        contents,
        vec!["first question", "first answer", "second question", "second answer"]
    );
}

#[test]
fn chat_after_reset_is_configuration_missing() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("app.log");
    fs::write(&log, "INFO ok\n").unwrap();
    let store = ConfigStore::new(dir.path().join("config.toml"));
    store.save(&Config::new(ProviderKind::Ollama, "llama3")).unwrap();
    store.reset().unwrap();

    assert!(matches!(
        run_chat(&store, &log, None, 10_000),
        Err(WhisperError::ConfigurationMissing)
    ));
}
