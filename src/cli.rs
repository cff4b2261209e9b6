use std::{
    fmt::{self, Display},
    path::PathBuf,
    str::FromStr,
};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

/// The default number of log characters handed to the provider as context.
pub const DEFAULT_MAX_CHARS: usize = 10_000;
/// Inputs that end a chat session. A leading `/` is also accepted.
pub const EXIT_WORDS: [&str; 4] = ["quit", "exit", "bye", "q"];

/// LLM providers supported by log-whisperer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    Cohere,
    HuggingFace,
    Ollama,
}

impl ProviderKind {
    pub fn all() -> [ProviderKind; 6] {
        [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Google,
            ProviderKind::Cohere,
            ProviderKind::HuggingFace,
            ProviderKind::Ollama,
        ]
    }

    pub fn all_names() -> Vec<String> {
        Self::all().iter().map(|p| p.to_string()).collect()
    }

    /// One-line description shown by the configuration wizard.
    pub fn description(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI GPT models (GPT-4o, GPT-4.1, o3, ...)",
            ProviderKind::Anthropic => "Anthropic Claude models",
            ProviderKind::Google => "Google Gemini models",
            ProviderKind::Cohere => "Cohere Command models",
            ProviderKind::HuggingFace => "Hugging Face inference router models",
            ProviderKind::Ollama => "Local Ollama models (no credential needed)",
        }
    }

    pub fn model_suggestions(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o, gpt-4o-mini, gpt-4.1",
            ProviderKind::Anthropic => "claude-3-5-sonnet-latest, claude-3-5-haiku-latest",
            ProviderKind::Google => "gemini-1.5-pro, gemini-1.5-flash",
            ProviderKind::Cohere => "command-r, command-r-plus",
            ProviderKind::HuggingFace => {
                "meta-llama/Llama-3.1-8B-Instruct, mistralai/Mistral-7B-Instruct-v0.3"
            }
            ProviderKind::Ollama => "llama3, mistral, codellama",
        }
    }

    /// Local providers run without a credential.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "claude" => Ok(ProviderKind::Anthropic),
            "google" => Ok(ProviderKind::Google),
            "gemini" => Ok(ProviderKind::Google),
            "cohere" => Ok(ProviderKind::Cohere),
            "huggingface" => Ok(ProviderKind::HuggingFace),
            "hf" => Ok(ProviderKind::HuggingFace),
            "ollama" => Ok(ProviderKind::Ollama),
            _ => Err(format!(
                "Invalid provider: {}. Choose from: {}.",
                s,
                Self::all_names().join(", ")
            )),
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::Google => write!(f, "google"),
            ProviderKind::Cohere => write!(f, "cohere"),
            ProviderKind::HuggingFace => write!(f, "huggingface"),
            ProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

/// Returns true when `input` asks to end the chat.
pub fn is_exit_word(input: &str) -> bool {
    let word = input.trim().trim_start_matches('/').to_lowercase();
    EXIT_WORDS.contains(&word.as_str())
}

/// CLI for `log-whisperer`
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Configuration file to use instead of `~/.log-whisperer/config.toml`.
    #[arg(long, global = true, env = "LOG_WHISPERER_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

/// log-whisperer subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Interactively choose a provider, model and credential.
    #[command(alias = "init")]
    Configure {
        /// Save without sending a test request to the provider.
        #[arg(long)]
        skip_test: bool,
    },
    /// Chat about a log file. The first `--max-chars` characters of the
    /// log are given to the model as context.
    #[command(alias = "c")]
    Chat {
        #[arg(short, long)]
        log_file: PathBuf,
        /// Save the conversation to this JSON file, restoring it first if
        /// it already exists.
        #[arg(short, long)]
        save: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_MAX_CHARS)]
        max_chars: usize,
    },
    /// Show the current configuration.
    #[command(alias = "s")]
    Status,
    /// Delete the configuration file.
    Reset {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_round_trip_through_display() {
        for kind in ProviderKind::all() {
            assert_eq!(kind.to_string().parse::<ProviderKind>(), Ok(kind));
        }
    }

    #[test]
    fn provider_aliases_are_accepted() {
        assert_eq!("Claude".parse(), Ok(ProviderKind::Anthropic));
        assert_eq!("gemini".parse(), Ok(ProviderKind::Google));
        assert_eq!(" HF ".parse(), Ok(ProviderKind::HuggingFace));
        assert!("".parse::<ProviderKind>().is_err());
        assert!("bard".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn exit_words_ignore_case_and_slash() {
        assert!(is_exit_word("quit"));
        assert!(is_exit_word("/exit"));
        assert!(is_exit_word("  BYE "));
        assert!(!is_exit_word("what is quitting?"));
    }

    #[test]
    fn chat_requires_log_file() {
        assert!(Args::try_parse_from(["log-whisperer", "chat"]).is_err());
        let args = Args::try_parse_from([
            "log-whisperer",
            "chat",
            "--log-file",
            "app.log",
            "--save",
            "conv.json",
        ])
        .unwrap();
        match args.command {
            Commands::Chat {
                log_file,
                save,
                max_chars,
            } => {
                assert_eq!(log_file, PathBuf::from("app.log"));
                assert_eq!(save, Some(PathBuf::from("conv.json")));
                assert_eq!(max_chars, DEFAULT_MAX_CHARS);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
