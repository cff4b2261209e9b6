use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn whisperer(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_log-whisperer"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("LOG_WHISPERER_CONFIG")
        .output()
        .expect("run log-whisperer")
}

#[test]
fn status_without_config_succeeds() {
    let dir = tempdir().unwrap();
    let output = whisperer(&dir.path().join("config.toml"), &["status"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No LLM provider configured."));
}

#[test]
fn status_masks_credential() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        "provider = \"openai\"\nmodel = \"gpt-4o-mini\"\ncredential = \"sk-test-key\"\n\n[params]\ntemperature = 0.3\n",
    )
    .unwrap();

    let output = whisperer(&config, &["status"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Current Configuration"));
    assert!(stdout.contains("gpt-4o-mini"));
    assert!(stdout.contains("0.3"));
    assert!(stdout.contains("***configured***"));
    assert!(!stdout.contains("sk-test-key"));
}

#[test]
fn chat_without_config_fails() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("app.log");
    fs::write(&log, "ERROR boom\n").unwrap();

    let output = whisperer(
        &dir.path().join("config.toml"),
        &["chat", "--log-file", log.to_str().unwrap()],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No LLM provider configured"));
}

#[test]
fn chat_with_missing_log_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "provider = \"ollama\"\nmodel = \"llama3\"\n").unwrap();

    let output = whisperer(&config, &["chat", "--log-file", "/definitely/not/here.log"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to open log file"));
}

#[test]
fn reset_with_yes_removes_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "provider = \"ollama\"\nmodel = \"llama3\"\n").unwrap();

    let output = whisperer(&config, &["reset", "--yes"]);
    assert!(output.status.success());
    assert!(!config.exists());

    let output = whisperer(&config, &["status"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("No LLM provider configured."));
}
