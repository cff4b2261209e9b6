//! # log-whisperer
//! Chat with an LLM about your log files!
//!
//! A command line program that hands the beginning of a log file to a large language model as
//! context and lets you ask questions about it in an interactive chat. Answers are shown in a
//! terminal panel and the conversation can be saved to, and resumed from, a JSON file.
//!
//! ## Usage
//! These are the library crate docs for `log-whisperer`. For usage of the binary see
//! ```shell
//! $ log-whisperer --help
//! $ log-whisperer configure
//! $ log-whisperer chat --log-file /var/log/app.log --save app-chat.json
//! ```
//!
//! ## Providers
//! OpenAI, Anthropic, Google Gemini, Cohere, Hugging Face and a local Ollama server are
//! supported. Each is a cargo feature (all enabled by default); a provider compiled out reports
//! itself as unavailable.
//!
//! ## Environment Variables:
//! - `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GOOGLE_API_KEY`, `COHERE_API_KEY`, `HF_TOKEN`:
//!   Optional. Used when the configuration file has no credential for the provider.
//! - `LOG_WHISPERER_CONFIG`: Optional. Configuration file to use instead of
//!   `~/.log-whisperer/config.toml`.
//! - `LOG_WHISPERER_LOG`: Optional. Log filter for diagnostics on stderr (default: `warn`).
//!
//! ## Notes:
//! - Only the first `--max-chars` characters (default 10 000) of the log are sent.
//! - The whole conversation is sent with every question unless `history_turns` is set in the
//!   configuration file.
//!
#[cfg(feature = "anthropic")]
pub mod anthropic;
pub mod cli;
pub mod config;
pub mod errors;
#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(any(feature = "openai", feature = "cohere", feature = "huggingface"))]
pub mod openai;
pub mod provider;
pub mod render;
pub mod session;
pub mod setup;
pub mod transcript;
