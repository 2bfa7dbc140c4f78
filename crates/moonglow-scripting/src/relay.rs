//! Fan-out of journal lines and key events to running scripts
//!
//! The registry is the single subscriber to the session's journal stream
//! and the single consumer of the host's key events. Each running script
//! registers its run state here at play and is removed at stop; every
//! delivery copies into that script's own independent storage.

use std::sync::{Arc, Mutex};

use tracing::trace;

use moonglow_client::JournalSink;
use moonglow_events::{JournalEntry, KeyCombo};

use crate::bridge::RunState;

/// Registry of currently-running scripts' shared run state
#[derive(Default)]
pub struct RunRegistry {
    entries: Mutex<Vec<(String, Arc<RunState>)>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on play. Replaces any stale entry with the same name.
    pub fn register(&self, name: impl Into<String>, run: Arc<RunState>) {
        let name = name.into();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|(n, _)| *n != name);
        entries.push((name, run));
    }

    /// Called on stop/teardown
    pub fn unregister(&self, name: &str) {
        self.entries.lock().unwrap().retain(|(n, _)| n != name);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key pressed on the input thread; offered to every running script
    pub fn key_down(&self, key: KeyCombo) {
        for (name, run) in self.entries.lock().unwrap().iter() {
            if run.hotkeys.key_down(key) {
                trace!(target: "scripting", "{}: scheduled hotkey {}", name, key);
            }
        }
    }

    pub fn key_up(&self, key: KeyCombo) {
        for (_, run) in self.entries.lock().unwrap().iter() {
            run.hotkeys.key_up(key);
        }
    }
}

impl JournalSink for RunRegistry {
    fn on_journal(&self, entry: &JournalEntry) {
        for (_, run) in self.entries.lock().unwrap().iter() {
            run.journal.push(entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moonglow_events::KeyCode;

    #[test]
    fn journal_fans_out_to_every_registered_run() {
        let registry = RunRegistry::new();
        let a = Arc::new(RunState::new(8));
        let b = Arc::new(RunState::new(8));
        registry.register("a.scr", a.clone());
        registry.register("b.rhai", b.clone());

        registry.on_journal(&JournalEntry::system("an event"));
        assert_eq!(a.journal.len(), 1);
        assert_eq!(b.journal.len(), 1);

        // Clearing one buffer leaves the other alone.
        a.journal.clear();
        assert!(a.journal.is_empty());
        assert_eq!(b.journal.len(), 1);
    }

    #[test]
    fn unregistered_runs_stop_receiving() {
        let registry = RunRegistry::new();
        let a = Arc::new(RunState::new(8));
        registry.register("a.scr", a.clone());
        registry.unregister("a.scr");

        registry.on_journal(&JournalEntry::system("late event"));
        assert!(a.journal.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn keys_route_to_bound_scripts_only() {
        let registry = RunRegistry::new();
        let bound = Arc::new(RunState::new(8));
        let unbound = Arc::new(RunState::new(8));
        let key = KeyCombo::plain(KeyCode::F(1));
        bound.hotkeys.bind(key, "on_f1");
        registry.register("bound", bound.clone());
        registry.register("unbound", unbound.clone());

        registry.key_down(key);
        registry.key_up(key);
        assert_eq!(bound.hotkeys.pending(), 1);
        assert_eq!(unbound.hotkeys.pending(), 0);
    }
}
