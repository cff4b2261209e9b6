//! Components to run a chat session about a log file.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crossterm::style::Color;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::cli::is_exit_word;
use crate::config::ConfigStore;
use crate::errors::WhisperError;
use crate::provider::{build_provider, ChatMessage, ChatProvider, ProviderError};
use crate::render::{self, tint, Panel};
use crate::transcript::Transcript;

/// The bounded prefix of a log file given to the provider as context.
#[derive(Debug, Clone)]
pub struct LogExcerpt {
    pub path: PathBuf,
    pub text: String,
    /// Size of the whole file.
    pub total_bytes: u64,
    truncated: bool,
}

impl LogExcerpt {
    /// Read `path` and keep its first `max_chars` characters.
    pub fn load(path: &Path, max_chars: usize) -> Result<Self, WhisperError> {
        let (content, bytes_read) = get_log_content(path, max_chars)?;
        let total_bytes = fs::metadata(path)
            .map(|meta| meta.len())
            .unwrap_or(0)
            .max(bytes_read);
        let (text, truncated) = match content.char_indices().nth(max_chars) {
            Some((idx, _)) => (content[..idx].to_string(), true),
            None => (content, bytes_read < total_bytes),
        };
        Ok(LogExcerpt {
            path: path.to_path_buf(),
            text,
            total_bytes,
            truncated,
        })
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The system instruction that opens every request.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are an expert log analyst. You have been provided with a log file to analyze.
Your job is to help the user understand the log content, identify issues, patterns, errors, and provide insights.

LOG FILE PATH: {}

LOG CONTENT:
```
{}{}
```

Instructions:
- Analyze the log content thoroughly
- Provide clear, actionable insights
- Identify errors, warnings, and patterns
- Suggest solutions when possible
- Be concise but comprehensive
- If the user asks follow-up questions, maintain context from previous messages
- Focus on the most relevant information for the user's queries
",
            self.path.display(),
            self.text,
            if self.is_truncated() { "..." } else { "" }
        )
    }
}

/// Longest UTF-8 encoding of a single character.
const MAX_CHAR_BYTES: usize = 4;

/// Get the string contents of the start of the log file, reading no more
/// bytes than `max_chars` characters can occupy. Also returns the number of
/// bytes read.
fn get_log_content(path: &Path, max_chars: usize) -> Result<(String, u64), WhisperError> {
    let not_found = |_| WhisperError::LogFileNotFound {
        path: path.to_path_buf(),
    };
    let file = File::open(path).map_err(not_found)?;
    let cap = max_chars.saturating_mul(MAX_CHAR_BYTES) as u64;
    let mut reader = BufReader::new(file).take(cap);
    let mut log_vec = Vec::new();
    reader.read_to_end(&mut log_vec).map_err(not_found)?;
    let bytes_read = log_vec.len() as u64;
    Ok((String::from_utf8_lossy(&log_vec).into_owned(), bytes_read))
}

/// Where the chat loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingInput,
    Calling,
    Rendering,
    Closing,
}

/// An interactive conversation about one log excerpt.
pub struct ChatSession {
    provider: Box<dyn ChatProvider>,
    excerpt: LogExcerpt,
    transcript: Arc<Mutex<Transcript>>,
    save_path: Option<PathBuf>,
    history_turns: Option<usize>,
    state: SessionState,
    styled: bool,
    width: usize,
}

impl ChatSession {
    pub fn new(provider: Box<dyn ChatProvider>, excerpt: LogExcerpt, transcript: Transcript) -> Self {
        ChatSession {
            provider,
            excerpt,
            transcript: Arc::new(Mutex::new(transcript)),
            save_path: None,
            history_turns: None,
            state: SessionState::Idle,
            styled: false,
            width: 80,
        }
    }

    pub fn save_to(mut self, path: Option<PathBuf>) -> Self {
        self.save_path = path;
        self
    }

    /// Send only the last `turns` turns with each question.
    pub fn history_turns(mut self, turns: Option<usize>) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn styled(mut self, styled: bool, width: usize) -> Self {
        self.styled = styled;
        self.width = width;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Shared handle to the transcript, for the interrupt handler.
    pub fn transcript(&self) -> Arc<Mutex<Transcript>> {
        Arc::clone(&self.transcript)
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&mut self, next: SessionState) {
        log::trace!("session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// System instruction followed by the transcript (or its most recent
    /// `history_turns` turns).
    pub fn messages(&self) -> Vec<ChatMessage> {
        let transcript = self.lock();
        let mut messages = vec![ChatMessage::system(self.excerpt.system_prompt())];
        messages.extend(transcript.recent(self.history_turns).iter().map(|t| t.to_message()));
        messages
    }

    /// Record `question`, call the provider and record its answer. On
    /// failure the question stays in the transcript without an answer.
    pub fn ask(&mut self, question: &str) -> Result<String, ProviderError> {
        self.lock().push_user(question);
        let messages = self.messages();
        self.transition(SessionState::Calling);
        let answer = self.provider.complete(&messages)?;
        self.lock().push_assistant(answer.clone());
        Ok(answer)
    }

    /// Persist the transcript when a save path was given.
    pub fn save(&self) -> Result<(), WhisperError> {
        match &self.save_path {
            Some(path) => self.lock().save(path),
            None => Ok(()),
        }
    }

    /// Returns whether the transcript is safely on disk.
    fn save_or_warn<W: Write>(&self, out: &mut W) -> io::Result<bool> {
        if let Err(e) = self.save() {
            log::warn!("failed to save conversation: {e}");
            writeln!(
                out,
                "{}",
                tint(
                    &format!("Warning: Could not save conversation: {e}"),
                    Color::Red,
                    self.styled
                )
            )?;
            return Ok(false);
        }
        Ok(self.save_path.is_some())
    }

    fn panel<W: Write>(&self, out: &mut W, body: &str) -> io::Result<()> {
        let panel = Panel::new("Agent", body).width(self.width);
        write!(out, "{}", panel.render(self.styled))
    }

    fn welcome(&self) -> String {
        let name = self
            .excerpt
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.excerpt.path.display().to_string());
        format!(
            "Welcome to Log Whisperer!

I'm ready to help you analyze your log file: {name}

You can ask me questions like:
- What errors do you see in this log?
- Summarize the main events
- Are there any patterns or anomalies?
- What happened around timestamp X?

Type 'quit', 'exit', or press Ctrl+C to end the session."
        )
    }

    /// Read questions from `input` until an exit word or end of input,
    /// rendering each answer to `out`.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<(), WhisperError> {
        self.panel(out, &self.welcome())?;
        let mut lines = input.lines();
        loop {
            self.transition(SessionState::AwaitingInput);
            write!(out, "\n{} ", tint("You:", Color::Green, self.styled))?;
            out.flush()?;
            let line = match lines.next() {
                Some(line) => line?,
                None => {
                    writeln!(out)?;
                    break;
                }
            };
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if is_exit_word(question) {
                break;
            }
            writeln!(out, "\n{}", tint("Analyzing...", Color::DarkGrey, self.styled))?;
            match self.ask(question) {
                Ok(answer) => {
                    self.transition(SessionState::Rendering);
                    self.panel(out, &answer)?;
                    self.save_or_warn(out)?;
                }
                Err(e) if e.is_fatal() => {
                    self.close(out)?;
                    return Err(WhisperError::from_provider(e));
                }
                Err(e) => {
                    log::warn!("provider call failed: {e}");
                    writeln!(out, "{}", tint(&format!("Error: {e}"), Color::Red, self.styled))?;
                    self.save_or_warn(out)?;
                }
            }
        }
        self.close(out)
    }

    fn close<W: Write>(&mut self, out: &mut W) -> Result<(), WhisperError> {
        self.transition(SessionState::Closing);
        let goodbye = if self.save_or_warn(out)? {
            "Goodbye! Your conversation has been saved."
        } else {
            "Goodbye!"
        };
        writeln!(out, "\n{}", tint(goodbye, Color::Yellow, self.styled))?;
        out.flush()?;
        Ok(())
    }
}

/// Restore a previous conversation from `path`. An unreadable file is
/// reported and the session starts fresh.
fn restore_transcript<W: Write>(path: &Path, out: &mut W, styled: bool) -> io::Result<Transcript> {
    match Transcript::load_or_default(path) {
        Ok(transcript) => {
            if !transcript.is_empty() {
                writeln!(
                    out,
                    "{}",
                    tint(
                        &format!("✓ Loaded previous conversation with {} messages", transcript.len()),
                        Color::Green,
                        styled
                    )
                )?;
            }
            Ok(transcript)
        }
        Err(e) => {
            writeln!(
                out,
                "{}",
                tint(
                    &format!("Warning: Could not load previous conversation: {e}"),
                    Color::Yellow,
                    styled
                )
            )?;
            Ok(Transcript::new())
        }
    }
}

/// Save the transcript and exit when the user interrupts the session,
/// abandoning any provider call in flight.
fn listen_interrupts(
    transcript: Arc<Mutex<Transcript>>,
    save_path: Option<PathBuf>,
) -> Result<(), WhisperError> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            log::debug!("received signal {signal}, closing session");
            // stdout stays locked by the blocked chat loop
            let _ = farewell(&transcript, save_path.as_deref(), &mut io::stderr());
            std::process::exit(0);
        }
    });
    Ok(())
}

/// Save the transcript, if a path was given, and say goodbye.
fn farewell<W: Write>(
    transcript: &Mutex<Transcript>,
    save_path: Option<&Path>,
    out: &mut W,
) -> io::Result<()> {
    let mut saved = false;
    if let Some(path) = save_path {
        let transcript = transcript.lock().unwrap_or_else(|p| p.into_inner());
        match transcript.save(path) {
            Ok(()) => saved = true,
            Err(e) => writeln!(out, "\nWarning: Could not save conversation: {}", e)?,
        }
    }
    if saved {
        writeln!(out, "\nGoodbye! Your conversation has been saved.")
    } else {
        writeln!(out, "\nGoodbye!")
    }
}

/// Start a chat about `log_file` with the stored configuration.
pub fn run_chat(
    store: &ConfigStore,
    log_file: &Path,
    save_path: Option<PathBuf>,
    max_chars: usize,
) -> Result<(), WhisperError> {
    let config = store.require()?;
    let resolved = config.resolve()?;
    let styled = render::stdout_is_tty();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let excerpt = LogExcerpt::load(log_file, max_chars)?;
    writeln!(
        out,
        "{}",
        tint(
            &format!("✓ Loaded log file: {}", log_file.display()),
            Color::Green,
            styled
        )
    )?;
    writeln!(
        out,
        "{}",
        tint(
            &format!("Log file size: {} bytes", excerpt.total_bytes),
            Color::DarkGrey,
            styled
        )
    )?;
    if excerpt.is_truncated() {
        writeln!(
            out,
            "{}",
            tint(
                &format!("Only the first {} characters are sent as context", max_chars),
                Color::Yellow,
                styled
            )
        )?;
    }

    let provider = build_provider(&resolved)?;
    writeln!(
        out,
        "{}",
        tint(
            &format!("✓ Initialized {} with model {}", resolved.provider, resolved.model),
            Color::Green,
            styled
        )
    )?;

    let transcript = match &save_path {
        Some(path) => restore_transcript(path, &mut out, styled)?,
        None => Transcript::new(),
    };
    let mut session = ChatSession::new(provider, excerpt, transcript)
        .save_to(save_path.clone())
        .history_turns(resolved.history_turns)
        .styled(styled, render::terminal_width());
    listen_interrupts(session.transcript(), save_path)?;

    let stdin = io::stdin();
    session.run(stdin.lock(), &mut out)
}
