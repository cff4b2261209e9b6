//! The `configure`, `status` and `reset` commands.

use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::os::fd::AsFd;

use crossterm::style::Color;
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg, Termios};

use crate::cli::ProviderKind;
use crate::config::{Config, ConfigStore, CredentialSource};
use crate::errors::WhisperError;
use crate::provider::{build_provider, ChatMessage};
use crate::render::{self, tint, Panel};

/// Turns off terminal echo while a secret is typed and restores the
/// original settings when dropped.
struct EchoGuard<F: AsFd> {
    fd: F,
    orig_termios: Termios,
}

impl<F: AsFd> EchoGuard<F> {
    fn disable_echo(fd: F) -> nix::Result<Self> {
        let orig_termios = tcgetattr(fd.as_fd())?;
        let mut quiet = orig_termios.clone();
        quiet.local_flags.remove(LocalFlags::ECHO);
        tcsetattr(fd.as_fd(), SetArg::TCSANOW, &quiet)?;
        Ok(EchoGuard { fd, orig_termios })
    }
}

impl<F: AsFd> Drop for EchoGuard<F> {
    fn drop(&mut self) {
        let _ = tcsetattr(self.fd.as_fd(), SetArg::TCSANOW, &self.orig_termios);
    }
}

/// Line-oriented questions for the interactive commands.
pub struct Prompter<R, W> {
    input: R,
    out: W,
    hide_secrets: bool,
    styled: bool,
}

impl Prompter<StdinLock<'static>, Stdout> {
    /// Prompt on the process terminal.
    pub fn stdio() -> Self {
        Prompter {
            input: io::stdin().lock(),
            out: io::stdout(),
            hide_secrets: render::stdin_is_tty(),
            styled: render::stdout_is_tty(),
        }
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Prompter {
            input,
            out,
            hide_secrets: false,
            styled: false,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn say(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)
    }

    fn say_in(&mut self, text: &str, color: Color) -> io::Result<()> {
        let text = tint(text, color, self.styled);
        writeln!(self.out, "{}", text)
    }

    fn read_answer(&mut self) -> Result<String, WhisperError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed").into());
        }
        Ok(line.trim().to_string())
    }

    fn ask(&mut self, label: &str) -> Result<String, WhisperError> {
        write!(self.out, "{}: ", label)?;
        self.out.flush()?;
        self.read_answer()
    }

    fn ask_default(&mut self, label: &str, default: &str) -> Result<String, WhisperError> {
        let answer = self.ask(&format!("{} [{}]", label, default))?;
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer
        })
    }

    fn ask_secret(&mut self, label: &str) -> Result<String, WhisperError> {
        if !self.hide_secrets {
            return self.ask(label);
        }
        write!(self.out, "{}: ", label)?;
        self.out.flush()?;
        let answer = {
            let _guard = EchoGuard::disable_echo(io::stdin())?;
            self.read_answer()
        };
        writeln!(self.out)?;
        answer
    }

    /// Empty input skips the value; anything unparsable is asked again.
    fn ask_number(&mut self, label: &str) -> Result<Option<f64>, WhisperError> {
        loop {
            let answer = self.ask(label)?;
            if answer.is_empty() {
                return Ok(None);
            }
            match answer.parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => return Ok(Some(value)),
                _ => self.say_in("Please enter a non-negative number.", Color::Red)?,
            }
        }
    }

    fn confirm(&mut self, label: &str, default: bool) -> Result<bool, WhisperError> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            let answer = self.ask(&format!("{} [{}]", label, hint))?.to_lowercase();
            match answer.as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("Please answer y or n.")?,
            }
        }
    }

    fn choose_provider(&mut self) -> Result<ProviderKind, WhisperError> {
        loop {
            match self.ask("Select LLM provider")?.parse() {
                Ok(kind) => return Ok(kind),
                Err(e) => self.say_in(&e, Color::Red)?,
            }
        }
    }
}

/// Hint shown next to a tuning parameter prompt.
fn param_hint(name: &str) -> &'static str {
    match name {
        "temperature" | "top_p" | "p" => " (0.0-1.0)",
        _ => "",
    }
}

fn title_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Send a one-word request with `config` to check it works.
pub fn test_connection(config: &Config) -> Result<(), WhisperError> {
    let resolved = config.resolve()?;
    let provider = build_provider(&resolved)?;
    provider
        .complete(&[ChatMessage::user("Hello")])
        .map_err(WhisperError::from_provider)?;
    Ok(())
}

/// Interactive configuration wizard.
pub fn run_configure<R: BufRead, W: Write>(
    store: &ConfigStore,
    prompter: &mut Prompter<R, W>,
    skip_test: bool,
) -> Result<(), WhisperError> {
    let banner = Panel::new("Log Whisperer", "Configuration")
        .width(40)
        .render(prompter.styled);
    write!(prompter.out, "{}", banner)?;

    prompter.say("\nSupported LLM Providers:")?;
    for kind in ProviderKind::all() {
        let name = tint(&format!("{:<12}", kind.to_string()), Color::Cyan, prompter.styled);
        prompter.say(&format!("  {} {}", name, kind.description()))?;
    }
    prompter.say("")?;
    let provider = prompter.choose_provider()?;

    prompter.say(&format!("\nConfiguring {} provider", provider))?;
    prompter.say_in(
        &format!("Popular models: {}", provider.model_suggestions()),
        Color::DarkGrey,
    )?;
    let model = loop {
        let model = prompter.ask("Model name")?;
        if !model.is_empty() {
            break model;
        }
        prompter.say_in("A model name is required.", Color::Red)?;
    };
    let mut config = Config::new(provider, model);

    if let Some(env_var) = provider.credential_env() {
        let env_set = std::env::var(env_var).is_ok_and(|v| !v.trim().is_empty());
        let label = if env_set {
            format!("API key (leave empty to use ${})", env_var)
        } else {
            "API key".to_string()
        };
        loop {
            let credential = prompter.ask_secret(&label)?;
            if !credential.is_empty() {
                config.credential = Some(credential);
                break;
            }
            if env_set {
                break;
            }
            prompter.say_in(
                &format!("A credential is required for {} (or set ${}).", provider, env_var),
                Color::Red,
            )?;
        }
    }

    prompter.say("\nOptional Parameters (press Enter to skip):")?;
    for name in provider.native_params() {
        let label = format!("{}{}", title_case(name), param_hint(name));
        if let Some(value) = prompter.ask_number(&label)? {
            config.params.insert(name.to_string(), value);
        }
    }

    if !provider.requires_credential() {
        let default = provider.default_base_url();
        let base_url = prompter.ask_default("Base URL", default)?;
        if base_url != default {
            config.base_url = Some(base_url);
        }
    }
    config.validate()?;

    if !skip_test {
        prompter.say_in("\nTesting configuration...", Color::Yellow)?;
        match test_connection(&config) {
            Ok(()) => prompter.say_in("✓ Connection test passed", Color::Green)?,
            Err(e) => {
                log::warn!("configuration test failed: {e}");
                prompter.say_in(&format!("✗ Configuration test failed: {}", e), Color::Red)?;
                if !prompter.confirm("Save anyway?", false)? {
                    prompter.say_in("Configuration not saved.", Color::Yellow)?;
                    return Ok(());
                }
            }
        }
    }

    store.save(&config)?;
    prompter.say_in("\n✓ Configuration saved successfully!", Color::Green)?;
    prompter.say_in(
        &format!("Configuration saved to: {}", store.path().display()),
        Color::DarkGrey,
    )?;
    Ok(())
}

/// Print the stored configuration with secrets masked.
pub fn run_status<W: Write>(store: &ConfigStore, out: &mut W, styled: bool) -> Result<(), WhisperError> {
    let Some(config) = store.load()? else {
        writeln!(out, "{}", tint("No LLM provider configured.", Color::Yellow, styled))?;
        writeln!(out, "Run `log-whisperer configure` to set up a provider.")?;
        return Ok(());
    };

    let credential = match config.credential_source() {
        CredentialSource::File => "***configured***".to_string(),
        CredentialSource::Env(var) => format!("from ${}", var),
        CredentialSource::NotRequired => "not required".to_string(),
        CredentialSource::Missing => "missing".to_string(),
    };
    let mut rows = vec![
        ("Provider".to_string(), config.provider.to_string()),
        ("Model".to_string(), config.model.clone()),
        ("Credential".to_string(), credential),
    ];
    if let Some(url) = &config.base_url {
        rows.push(("Base Url".to_string(), url.clone()));
    }
    if let Some(timeout) = config.timeout_secs {
        rows.push(("Timeout Secs".to_string(), timeout.to_string()));
    }
    if let Some(turns) = config.history_turns {
        rows.push(("History Turns".to_string(), turns.to_string()));
    }
    for (name, value) in &config.params {
        rows.push((title_case(name), value.to_string()));
    }

    writeln!(out, "{}", tint("Current Configuration", Color::Magenta, styled))?;
    let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in rows {
        let key = tint(&format!("{:<width$}", key, width = key_width), Color::Cyan, styled);
        writeln!(out, "  {}  {}", key, value)?;
    }
    writeln!(
        out,
        "\n{}",
        tint(
            &format!("Configuration file: {}", store.path().display()),
            Color::DarkGrey,
            styled
        )
    )?;
    Ok(())
}

/// Delete the configuration file after confirmation.
pub fn run_reset<R: BufRead, W: Write>(
    store: &ConfigStore,
    prompter: &mut Prompter<R, W>,
    yes: bool,
) -> Result<(), WhisperError> {
    if !yes && !prompter.confirm("Are you sure you want to reset all configuration?", false)? {
        prompter.say("Reset cancelled.")?;
        return Ok(());
    }
    if store.reset()? {
        prompter.say_in("✓ Configuration reset successfully.", Color::Green)?;
    } else {
        prompter.say("Nothing to reset: no configuration file found.")?;
    }
    Ok(())
}
