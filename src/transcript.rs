//! The running record of a chat session and its JSON save file.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::write_atomic;
use crate::errors::WhisperError;
use crate::provider::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One saved message: `{role, content, timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn now(role: TurnRole, content: impl Into<String>) -> Self {
        Turn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_message(&self) -> ChatMessage {
        match self.role {
            TurnRole::User => ChatMessage::user(self.content.clone()),
            TurnRole::Assistant => ChatMessage::assistant(self.content.clone()),
        }
    }
}

/// Append-only, chronologically ordered turns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::now(TurnRole::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::now(TurnRole::Assistant, content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last `limit` turns (at least one), or all of them when `limit` is
    /// `None`. The window is moved forward to start on a user turn.
    pub fn recent(&self, limit: Option<usize>) -> &[Turn] {
        let start = match limit {
            Some(n) => self.turns.len().saturating_sub(n.max(1)),
            None => 0,
        };
        let window = &self.turns[start..];
        let first_user = window
            .iter()
            .position(|turn| turn.role == TurnRole::User)
            .unwrap_or(window.len());
        &window[first_user..]
    }

    /// Read a transcript saved by [`Transcript::save`].
    pub fn load(path: &Path) -> Result<Self, WhisperError> {
        let data = fs::read(path)?;
        let turns: Vec<Turn> =
            serde_json::from_slice(&data).map_err(|source| WhisperError::TranscriptParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Transcript { turns })
    }

    /// Like [`Transcript::load`] but a missing file is an empty transcript.
    pub fn load_or_default(path: &Path) -> Result<Self, WhisperError> {
        match Self::load(path) {
            Err(WhisperError::StdioError(e)) if e.kind() == io::ErrorKind::NotFound => {
                Ok(Self::new())
            }
            other => other,
        }
    }

    /// Write the turns as a pretty JSON array, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), WhisperError> {
        let json = serde_json::to_vec_pretty(&self.turns)?;
        write_atomic(path, &json, false)?;
        log::debug!("saved {} turns to {}", self.turns.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn save_and_load_keep_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chats").join("conv.json");
        let mut transcript = Transcript::new();
        transcript.push_user("what failed?");
        transcript.push_assistant("the database migration");
        transcript.push_user("why?");

        transcript.save(&path).unwrap();
        let loaded = Transcript::load(&path).unwrap();

        assert_eq!(loaded, transcript);
        let roles: Vec<TurnRole> = loaded.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![TurnRole::User, TurnRole::Assistant, TurnRole::User]
        );
    }

    #[test]
    fn saved_file_is_json_array_of_turns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conv.json");
        let mut transcript = Transcript::new();
        transcript.push_user("hello");
        transcript.save(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let turns = value.as_array().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[0]["content"], "hello");
        assert!(turns[0]["timestamp"].as_str().is_some());
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let transcript = Transcript::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert!(transcript.is_empty());
    }

    #[test]
    fn corrupt_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conv.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Transcript::load_or_default(&path),
            Err(WhisperError::TranscriptParse { .. })
        ));
    }

    #[test]
    fn recent_limits_from_the_end() {
        let mut transcript = Transcript::new();
        for i in 0..5 {
            transcript.push_user(format!("q{}", i));
        }
        let recent = transcript.recent(Some(2));
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "q3");
        assert_eq!(transcript.recent(None).len(), 5);
        assert_eq!(transcript.recent(Some(10)).len(), 5);
    }

    #[test]
    fn recent_window_starts_on_a_user_turn() {
        let mut transcript = Transcript::new();
        transcript.push_user("q1");
        transcript.push_assistant("a1");
        transcript.push_user("q2");
        transcript.push_assistant("a2");
        transcript.push_user("q3");

        let contents = |turns: &[Turn]| -> Vec<String> {
            turns.iter().map(|t| t.content.clone()).collect()
        };
        assert_eq!(contents(transcript.recent(Some(2))), vec!["q3"]);
        assert_eq!(contents(transcript.recent(Some(3))), vec!["q2", "a2", "q3"]);
        assert_eq!(contents(transcript.recent(Some(0))), vec!["q3"]);
    }

    #[test]
    fn recent_skips_leading_assistant_turns() {
        let mut transcript = Transcript::new();
        transcript.push_assistant("greeting");
        transcript.push_user("q1");
        assert_eq!(transcript.recent(None).len(), 1);
        assert_eq!(transcript.recent(None)[0].role, TurnRole::User);
    }
}
