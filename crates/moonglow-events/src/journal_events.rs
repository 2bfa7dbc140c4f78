//! Journal event types
//!
//! The journal is the game's textual event log. Every line the client
//! receives (speech, emotes, system notices, object labels) is represented
//! as a [`JournalEntry`] and fanned out to interested consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a journal line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalKind {
    /// Speech by a player or NPC
    Say,
    /// An emote ("*bows*")
    Emote,
    /// A system notice from the server or client
    System,
    /// An object label (single-click name)
    Label,
    /// A line spoken by a party member
    Party,
}

/// One line of the game's journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// The text of the line
    pub text: String,
    /// Name of the speaker, empty for system lines
    pub author: String,
    /// Category of the line
    pub kind: JournalKind,
    /// When the line was received
    pub timestamp: DateTime<Utc>,
}

impl JournalEntry {
    /// Create a new journal entry timestamped now
    pub fn new(text: impl Into<String>, author: impl Into<String>, kind: JournalKind) -> Self {
        Self {
            text: text.into(),
            author: author.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Create a system entry (no author)
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, "", JournalKind::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_entry_has_no_author() {
        let entry = JournalEntry::system("connection lost");
        assert_eq!(entry.author, "");
        assert_eq!(entry.kind, JournalKind::System);
        assert_eq!(entry.text, "connection lost");
    }
}
