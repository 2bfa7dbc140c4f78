//! Per-script journal buffers
//!
//! Every running script owns an independent bounded copy of the journal
//! stream. Patterns are literal substrings, or regular expressions when
//! prefixed with `$`. Consume mode marks matched lines so later searches
//! skip them without removing them from view.

use std::collections::VecDeque;
use std::sync::Mutex;

use regex::Regex;
use tracing::warn;

use moonglow_events::JournalEntry;

/// Default per-script buffer capacity
pub const DEFAULT_JOURNAL_CAPACITY: usize = 200;

/// Sigil marking a pattern as a regular expression
const REGEX_SIGIL: char = '$';

struct BufferedLine {
    entry: JournalEntry,
    consumed: bool,
}

/// One script's bounded journal buffer
pub struct JournalBuffer {
    lines: Mutex<VecDeque<BufferedLine>>,
    capacity: usize,
}

impl Default for JournalBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }
}

/// Match one line of text against a pattern, honoring the regex sigil.
/// An invalid regex matches nothing (and is logged once per call site use).
pub fn matches(pattern: &str, text: &str) -> bool {
    match pattern.strip_prefix(REGEX_SIGIL) {
        Some(expr) => match Regex::new(expr) {
            Ok(re) => re.is_match(text),
            Err(e) => {
                warn!(target: "scripting", "bad journal regex {:?}: {}", expr, e);
                false
            }
        },
        None => text.contains(pattern),
    }
}

impl JournalBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a line, dropping the oldest once over capacity
    pub fn push(&self, entry: JournalEntry) {
        let mut lines = self.lines.lock().unwrap();
        lines.push_back(BufferedLine {
            entry,
            consumed: false,
        });
        while lines.len() > self.capacity {
            lines.pop_front();
        }
    }

    /// Search unconsumed lines for a pattern. With `consume`, every matched
    /// line is marked so subsequent searches skip it.
    pub fn search(&self, pattern: &str, consume: bool) -> bool {
        let mut lines = self.lines.lock().unwrap();
        let mut found = false;
        for line in lines.iter_mut() {
            if line.consumed {
                continue;
            }
            if matches(pattern, &line.entry.text) {
                found = true;
                if consume {
                    line.consumed = true;
                } else {
                    break;
                }
            }
        }
        found
    }

    /// Snapshot of the texts currently buffered, consumed lines included
    pub fn texts(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|l| l.entry.text.clone())
            .collect()
    }

    /// Empty this buffer only
    pub fn clear(&self) {
        self.lines.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> JournalEntry {
        JournalEntry::system(text)
    }

    #[test]
    fn capacity_drops_oldest() {
        let buffer = JournalBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(entry(&format!("line {i}")));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.texts(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn substring_and_regex_matching() {
        let buffer = JournalBuffer::default();
        buffer.push(entry("You see: a pile of 300 gold coins"));

        assert!(buffer.search("gold", false));
        assert!(!buffer.search("silver", false));
        assert!(buffer.search(r"$\d+ gold", false));
        assert!(!buffer.search(r"$\d+ silver", false));
        // Broken regex matches nothing rather than erroring
        assert!(!buffer.search("$[unclosed", false));
    }

    #[test]
    fn consume_hides_from_later_searches() {
        let buffer = JournalBuffer::default();
        buffer.push(entry("it is done"));

        assert!(buffer.search("done", true));
        assert!(!buffer.search("done", false));
        // The line is still physically present
        assert_eq!(buffer.len(), 1);

        buffer.push(entry("it is done again"));
        assert!(buffer.search("done", false));
    }

    #[test]
    fn clear_empties_only_this_buffer() {
        let a = JournalBuffer::default();
        let b = JournalBuffer::default();
        a.push(entry("shared event"));
        b.push(entry("shared event"));

        a.clear();
        assert!(a.is_empty());
        assert_eq!(b.len(), 1);
    }
}
