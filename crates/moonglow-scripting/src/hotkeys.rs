//! Hotkey bindings and the deferred callback queue
//!
//! Key events arrive on an input thread. A key-down on a bound chord only
//! *schedules* the callback into the owning script's bounded queue; the
//! script drains and runs its queue when it chooses. This keeps input-thread
//! timing away from script execution and rules out re-entrant calls into a
//! script mid-instruction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use tracing::warn;

use moonglow_events::KeyCombo;

/// Cap on deferred callbacks per script; overflow drops the oldest
pub const CALLBACK_QUEUE_CAP: usize = 64;

/// A scheduled callback: the chord that fired and the script function bound
/// to it. Callbacks are named functions, never raw engine handles, so they
/// can cross from the input thread to the script thread safely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyCallback {
    pub key: KeyCombo,
    pub fn_name: String,
}

/// One script's hotkey bindings, pressed-key set and deferred queue
#[derive(Default)]
pub struct HotkeyState {
    bindings: Mutex<HashMap<KeyCombo, String>>,
    pressed: Mutex<HashSet<KeyCombo>>,
    queue: Mutex<VecDeque<HotkeyCallback>>,
}

impl HotkeyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a chord to a named script function, replacing any prior binding
    pub fn bind(&self, key: KeyCombo, fn_name: impl Into<String>) {
        self.bindings.lock().unwrap().insert(key, fn_name.into());
    }

    /// Remove a binding, returning whether one existed
    pub fn unbind(&self, key: KeyCombo) -> bool {
        self.bindings.lock().unwrap().remove(&key).is_some()
    }

    /// Key went down on the input thread. Schedules the bound callback if
    /// the chord was not already held. Returns whether a callback was
    /// scheduled.
    pub fn key_down(&self, key: KeyCombo) -> bool {
        if !self.pressed.lock().unwrap().insert(key) {
            return false; // auto-repeat while held
        }
        let Some(fn_name) = self.bindings.lock().unwrap().get(&key).cloned() else {
            return false;
        };
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= CALLBACK_QUEUE_CAP {
            let dropped = queue.pop_front();
            warn!(
                target: "scripting",
                "callback queue full, dropped oldest ({:?})",
                dropped.map(|c| c.fn_name)
            );
        }
        queue.push_back(HotkeyCallback { key, fn_name });
        true
    }

    /// Key released on the input thread
    pub fn key_up(&self, key: KeyCombo) {
        self.pressed.lock().unwrap().remove(&key);
    }

    /// Take every pending callback, in arrival order. Only the owning
    /// script calls this.
    pub fn drain(&self) -> Vec<HotkeyCallback> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moonglow_events::KeyCode;

    fn combo(c: char) -> KeyCombo {
        KeyCombo::plain(KeyCode::Char(c))
    }

    #[test]
    fn key_down_schedules_but_does_not_run() {
        let state = HotkeyState::new();
        state.bind(combo('h'), "on_heal");

        assert!(state.key_down(combo('h')));
        // Nothing happened yet except queueing.
        assert_eq!(state.pending(), 1);

        let drained = state.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].fn_name, "on_heal");
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn held_key_fires_once() {
        let state = HotkeyState::new();
        state.bind(combo('h'), "on_heal");

        assert!(state.key_down(combo('h')));
        assert!(!state.key_down(combo('h'))); // repeat while held
        state.key_up(combo('h'));
        assert!(state.key_down(combo('h')));
        assert_eq!(state.pending(), 2);
    }

    #[test]
    fn unbound_keys_are_ignored() {
        let state = HotkeyState::new();
        assert!(!state.key_down(combo('x')));
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn overflow_drops_oldest() {
        let state = HotkeyState::new();
        state.bind(combo('a'), "first");
        state.bind(combo('b'), "rest");

        state.key_down(combo('a'));
        state.key_up(combo('a'));
        for _ in 0..CALLBACK_QUEUE_CAP {
            state.key_down(combo('b'));
            state.key_up(combo('b'));
        }

        let drained = state.drain();
        assert_eq!(drained.len(), CALLBACK_QUEUE_CAP);
        assert!(drained.iter().all(|c| c.fn_name == "rest"));
    }

    #[test]
    fn unbind_removes_binding() {
        let state = HotkeyState::new();
        state.bind(combo('z'), "zap");
        assert!(state.unbind(combo('z')));
        assert!(!state.unbind(combo('z')));
        assert!(!state.key_down(combo('z')));
    }
}
