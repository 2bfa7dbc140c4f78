//! The bridge/API surface: the only door between a script and world state
//!
//! Every operation that touches the session builds a closure and submits it
//! through the invocation queue — `send` for fire-and-forget, `invoke` for
//! operations with a result. Pure per-script bookkeeping (ignore set,
//! last-found, shared variables, journal search, randomness) runs on the
//! calling thread.
//!
//! Failure is encoded in return values (`Serial::ZERO`, `false`), never in
//! errors; the only errors a bridge call produces are the stop signal and a
//! closed session.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::debug;

use moonglow_client::world::{LockState, Stat};
use moonglow_client::Serial;
use moonglow_events::KeyCombo;

use crate::error::ScriptError;
use crate::hotkeys::{HotkeyCallback, HotkeyState};
use crate::journal::JournalBuffer;
use crate::queue::MainThreadQueue;
use crate::signal::StopToken;

/// Poll interval for condition waits (wait-for-target and friends)
const WAIT_POLL: Duration = Duration::from_millis(50);

/// The cross-script shared variable map. Intentionally global mutable state:
/// one concurrency-safe container, process lifetime, shared by every script.
#[derive(Clone, Default)]
pub struct SharedVars {
    vars: Arc<Mutex<HashMap<String, String>>>,
}

impl SharedVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.lock().unwrap().insert(name.into(), value.into());
    }

    /// Empty string when unset, matching the "not found is a value" policy
    pub fn get(&self, name: &str) -> String {
        self.vars.lock().unwrap().get(name).cloned().unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.lock().unwrap().contains_key(name)
    }

    pub fn unset(&self, name: &str) -> bool {
        self.vars.lock().unwrap().remove(name).is_some()
    }
}

/// Ephemeral state for one script run. Producers differ (input thread for
/// keys, session thread for journal lines, the script's own thread for the
/// rest), hence the interior locking.
pub struct RunState {
    pub stop: StopToken,
    pub journal: JournalBuffer,
    pub hotkeys: HotkeyState,
    ignore: Mutex<HashSet<Serial>>,
    last_found: Mutex<Serial>,
}

impl RunState {
    pub fn new(journal_capacity: usize) -> Self {
        Self {
            stop: StopToken::new(),
            journal: JournalBuffer::with_capacity(journal_capacity),
            hotkeys: HotkeyState::new(),
            ignore: Mutex::new(HashSet::new()),
            last_found: Mutex::new(Serial::ZERO),
        }
    }

    pub fn ignore(&self, serial: Serial) {
        self.ignore.lock().unwrap().insert(serial);
    }

    pub fn unignore(&self, serial: Serial) {
        self.ignore.lock().unwrap().remove(&serial);
    }

    pub fn clear_ignore(&self) {
        self.ignore.lock().unwrap().clear();
    }

    pub fn is_ignored(&self, serial: Serial) -> bool {
        self.ignore.lock().unwrap().contains(&serial)
    }

    /// Snapshot for queries running on the session thread
    pub fn ignore_snapshot(&self) -> HashSet<Serial> {
        self.ignore.lock().unwrap().clone()
    }

    pub fn last_found(&self) -> Serial {
        *self.last_found.lock().unwrap()
    }

    pub fn set_last_found(&self, serial: Serial) {
        *self.last_found.lock().unwrap() = serial;
    }
}

/// Per-script handle to the session, used from worker threads
#[derive(Clone)]
pub struct ScriptBridge {
    name: String,
    queue: MainThreadQueue,
    run: Arc<RunState>,
    vars: SharedVars,
}

impl ScriptBridge {
    pub fn new(
        name: impl Into<String>,
        queue: MainThreadQueue,
        run: Arc<RunState>,
        vars: SharedVars,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            run,
            vars,
        }
    }

    pub fn script_name(&self) -> &str {
        &self.name
    }

    pub fn run_state(&self) -> &Arc<RunState> {
        &self.run
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.run.stop
    }

    // ===== Speech and messages (fire-and-forget) =====

    pub fn say(&self, text: &str) {
        let text = text.to_string();
        self.queue.send(move |core| core.session.say(text));
    }

    pub fn emote(&self, text: &str) {
        let text = text.to_string();
        self.queue.send(move |core| core.session.emote(text));
    }

    pub fn sys_msg(&self, text: &str) {
        let text = text.to_string();
        self.queue.send(move |core| core.session.sys_message(text));
    }

    pub fn head_msg(&self, serial: Serial, text: &str) {
        let text = text.to_string();
        self.queue
            .send(move |core| core.session.head_message(serial, text));
    }

    // ===== Object interaction (invoke-and-wait) =====

    pub fn use_item(&self, serial: Serial) -> Result<bool, ScriptError> {
        Ok(self
            .queue
            .invoke(&self.run.stop, move |core| core.session.use_item(serial))?)
    }

    pub fn move_item(
        &self,
        serial: Serial,
        container: Serial,
        amount: u16,
    ) -> Result<bool, ScriptError> {
        Ok(self.queue.invoke(&self.run.stop, move |core| {
            core.session.move_item(serial, container, amount)
        })?)
    }

    pub fn target(&self, serial: Serial) -> Result<bool, ScriptError> {
        Ok(self
            .queue
            .invoke(&self.run.stop, move |core| core.session.target(serial))?)
    }

    pub fn cancel_target(&self) {
        self.queue.send(|core| core.session.cancel_target());
    }

    pub fn reply_gump(&self, gump_id: u32, button: u32) -> Result<bool, ScriptError> {
        Ok(self.queue.invoke(&self.run.stop, move |core| {
            core.session.reply_gump(gump_id, button)
        })?)
    }

    pub fn pathfind_to(&self, x: i32, y: i32, z: i32) -> Result<bool, ScriptError> {
        Ok(self.queue.invoke(&self.run.stop, move |core| {
            core.session.pathfind_to(x, y, z)
        })?)
    }

    pub fn set_skill_lock(&self, skill: &str, lock: LockState) {
        let skill = skill.to_string();
        self.queue
            .send(move |core| core.session.set_skill_lock(&skill, lock));
    }

    pub fn set_stat_lock(&self, stat: Stat, lock: LockState) {
        self.queue
            .send(move |core| core.session.set_stat_lock(stat, lock));
    }

    // ===== Queries =====

    /// Find an item by graphic. `Serial::ZERO` when nothing matches; a hit
    /// also becomes the new "last found" handle.
    pub fn find_type(
        &self,
        graphic: u16,
        container: Option<Serial>,
    ) -> Result<Serial, ScriptError> {
        let ignore = self.run.ignore_snapshot();
        let found = self.queue.invoke(&self.run.stop, move |core| {
            core.session.find_type(graphic, container, &ignore)
        })?;
        if found.is_valid() {
            self.run.set_last_found(found);
        }
        Ok(found)
    }

    /// Nearest mobile to the player, `Serial::ZERO` when none
    pub fn find_nearest(&self) -> Result<Serial, ScriptError> {
        let ignore = self.run.ignore_snapshot();
        let found = self
            .queue
            .invoke(&self.run.stop, move |core| core.session.find_nearest(&ignore))?;
        if found.is_valid() {
            self.run.set_last_found(found);
        }
        Ok(found)
    }

    pub fn player_serial(&self) -> Result<Serial, ScriptError> {
        Ok(self
            .queue
            .invoke(&self.run.stop, |core| core.session.world.player)?)
    }

    pub fn backpack_serial(&self) -> Result<Serial, ScriptError> {
        Ok(self
            .queue
            .invoke(&self.run.stop, |core| core.session.world.backpack)?)
    }

    pub fn last_target(&self) -> Result<Serial, ScriptError> {
        Ok(self
            .queue
            .invoke(&self.run.stop, |core| core.session.last_target())?)
    }

    pub fn distance_to(&self, serial: Serial) -> Result<i64, ScriptError> {
        Ok(self.queue.invoke(&self.run.stop, move |core| {
            core.session.world.distance_to(serial).map(i64::from).unwrap_or(-1)
        })?)
    }

    // ===== Waits =====

    /// Sleep the calling script, unwinding promptly if stopped
    pub fn pause(&self, ms: u64) -> Result<(), ScriptError> {
        self.run.stop.pause(Duration::from_millis(ms))
    }

    /// Wait until the server offers a target cursor. `false` on timeout.
    pub fn wait_for_target(&self, timeout_ms: u64) -> Result<bool, ScriptError> {
        self.wait_until(timeout_ms, |core| core.session.has_target_cursor())
    }

    /// Wait until any gump is open. `false` on timeout.
    pub fn wait_for_gump(&self, timeout_ms: u64) -> Result<bool, ScriptError> {
        self.wait_until(timeout_ms, |core| core.session.has_gump())
    }

    /// Wait until the journal shows a matching line, consuming it on match.
    /// `false` on timeout.
    pub fn wait_for_journal(&self, pattern: &str, timeout_ms: u64) -> Result<bool, ScriptError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.run.journal.search(pattern, true) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.run.stop.pause(WAIT_POLL)?;
        }
    }

    fn wait_until(
        &self,
        timeout_ms: u64,
        condition: impl Fn(&mut crate::context::SessionCore) -> bool + Send + Clone + 'static,
    ) -> Result<bool, ScriptError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let met = self.queue.invoke(&self.run.stop, condition.clone())?;
            if met {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.run.stop.pause(WAIT_POLL)?;
        }
    }

    // ===== Local bookkeeping (no marshaling) =====

    pub fn ignore(&self, serial: Serial) {
        self.run.ignore(serial);
    }

    pub fn unignore(&self, serial: Serial) {
        self.run.unignore(serial);
    }

    pub fn clear_ignore(&self) {
        self.run.clear_ignore();
    }

    pub fn last_found(&self) -> Serial {
        self.run.last_found()
    }

    pub fn set_shared(&self, name: &str, value: &str) {
        self.vars.set(name, value);
    }

    pub fn get_shared(&self, name: &str) -> String {
        self.vars.get(name)
    }

    pub fn unset_shared(&self, name: &str) -> bool {
        self.vars.unset(name)
    }

    pub fn random(&self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    // ===== Journal =====

    pub fn journal_contains(&self, pattern: &str, consume: bool) -> bool {
        self.run.journal.search(pattern, consume)
    }

    pub fn clear_journal(&self) {
        self.run.journal.clear();
    }

    // ===== Hotkeys =====

    /// Bind a key chord to a named script function. `false` when the combo
    /// string does not parse.
    pub fn bind_hotkey(&self, combo: &str, fn_name: &str) -> bool {
        match combo.parse::<KeyCombo>() {
            Ok(key) => {
                debug!(target: "scripting", "{}: hotkey {} -> {}", self.name, key, fn_name);
                self.run.hotkeys.bind(key, fn_name);
                true
            }
            Err(_) => false,
        }
    }

    pub fn unbind_hotkey(&self, combo: &str) -> bool {
        combo
            .parse::<KeyCombo>()
            .map(|key| self.run.hotkeys.unbind(key))
            .unwrap_or(false)
    }

    /// Take the pending deferred callbacks; the script runs them itself
    pub fn drain_callbacks(&self) -> Vec<HotkeyCallback> {
        self.run.hotkeys.drain()
    }

    // ===== Lifecycle =====

    /// Stop the calling script. Resolved through the manager's
    /// thread-identity map on the session thread, since stop manipulates
    /// shared collections.
    pub fn stop_self(&self) {
        let thread_id = thread::current().id();
        self.queue
            .send(move |core| core.scripts.stop_by_thread(thread_id));
    }

    /// Worker's final act: hand teardown of this run's resources to the
    /// session thread, strictly after the worker has unwound.
    pub(crate) fn finish(&self, error: Option<String>) {
        let name = self.name.clone();
        self.queue.send(move |core| {
            let crate::context::SessionCore { session, scripts } = core;
            scripts.finalize_worker(&name, error, session);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_vars_are_one_map() {
        let vars = SharedVars::new();
        let other = vars.clone();
        vars.set("loot", "gold");
        assert_eq!(other.get("loot"), "gold");
        assert!(other.unset("loot"));
        assert_eq!(vars.get("loot"), "");
    }

    #[test]
    fn ignore_set_is_local_bookkeeping() {
        let run = RunState::new(16);
        run.ignore(Serial(5));
        assert!(run.is_ignored(Serial(5)));
        assert!(run.ignore_snapshot().contains(&Serial(5)));
        run.unignore(Serial(5));
        assert!(!run.is_ignored(Serial(5)));
    }

    #[test]
    fn random_degenerate_range() {
        let run = Arc::new(RunState::new(16));
        let (queue, _rx) = crate::queue::channel();
        let bridge = ScriptBridge::new("t", queue, run, SharedVars::new());
        assert_eq!(bridge.random(3, 3), 3);
        let v = bridge.random(1, 6);
        assert!((1..=6).contains(&v));
    }
}
