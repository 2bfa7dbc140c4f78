//! Script discovery and lifecycle
//!
//! The manager owns every known [`ScriptUnit`] and runs entirely on the
//! session thread. Play, stop, the per-tick cooperative stepping and the
//! final teardown of worker threads all happen here, so no lifecycle state
//! ever needs a lock.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::ThreadId;

use anyhow::{bail, Context};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use moonglow_client::GameSession;

use crate::bridge::{RunState, ScriptBridge, SharedVars};
use crate::coop::{CommandCtx, CommandProgram, CoopRegistry, StepOutcome};
use crate::engine::{self, EngineConfig};
use crate::queue::MainThreadQueue;
use crate::relay::RunRegistry;
use crate::unit::{ScriptMeta, ScriptMode, ScriptUnit, WorkerHandle};

/// Shared-library file importable from threaded scripts; never listed or
/// playable on its own.
pub const RESERVED_LIBRARY: &str = "lib.rhai";

const SCAN_DEPTH: usize = 3;

pub struct ScriptManager {
    units: BTreeMap<String, ScriptUnit>,
    running: Vec<String>,
    by_thread: HashMap<ThreadId, String>,
    queue: MainThreadQueue,
    vars: SharedVars,
    relay: Arc<RunRegistry>,
    coop: CoopRegistry,
    script_root: PathBuf,
    journal_capacity: usize,
    cache_modules: bool,
}

impl ScriptManager {
    pub fn new(
        queue: MainThreadQueue,
        vars: SharedVars,
        relay: Arc<RunRegistry>,
        script_root: PathBuf,
        journal_capacity: usize,
        cache_modules: bool,
    ) -> Self {
        Self {
            units: BTreeMap::new(),
            running: Vec::new(),
            by_thread: HashMap::new(),
            queue,
            vars,
            relay,
            coop: CoopRegistry::standard(),
            script_root,
            journal_capacity,
            cache_modules,
        }
    }

    pub fn script_root(&self) -> &Path {
        &self.script_root
    }

    pub fn shared_vars(&self) -> &SharedVars {
        &self.vars
    }

    // ===== Discovery =====

    /// Walk the script root and refresh the unit table. Known units keep
    /// their run state; units whose files vanished are dropped unless they
    /// are still playing. Returns the number of known scripts.
    pub fn scan(&mut self) -> usize {
        let mut seen = Vec::new();
        for entry in WalkDir::new(&self.script_root)
            .max_depth(SCAN_DEPTH)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(mode) = ScriptMode::from_path(path) else {
                continue;
            };
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('_') || file_name == RESERVED_LIBRARY {
                continue;
            }
            let Some(meta) = self.meta_for(path, file_name) else {
                continue;
            };
            let key = meta.display_name();
            seen.push(key.clone());
            self.units
                .entry(key)
                .or_insert_with(|| ScriptUnit::new(meta, mode));
        }

        self.units
            .retain(|key, unit| seen.contains(key) || unit.is_playing());
        debug!(target: "scripting", "scan found {} scripts", self.units.len());
        self.units.len()
    }

    fn meta_for(&self, path: &Path, file_name: &str) -> Option<ScriptMeta> {
        let relative = path.strip_prefix(&self.script_root).ok()?;
        let mut dirs: Vec<String> = relative
            .parent()
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        let group = if dirs.is_empty() { None } else { Some(dirs.remove(0)) };
        let sub_group = dirs.into_iter().next();
        Some(ScriptMeta {
            path: path.to_path_buf(),
            file_name: file_name.to_string(),
            group,
            sub_group,
        })
    }

    /// Resolve a user-supplied name to a unit key. Accepts the full
    /// display name or a bare file name when it is unambiguous.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if self.units.contains_key(name) {
            return Some(name.to_string());
        }
        let mut matched = None;
        for (key, unit) in &self.units {
            if unit.meta.file_name == name {
                if matched.is_some() {
                    return None;
                }
                matched = Some(key.clone());
            }
        }
        matched
    }

    pub fn list(&self) -> Vec<(String, bool)> {
        self.units
            .iter()
            .map(|(key, unit)| (key.clone(), unit.is_playing()))
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.resolve(name)
            .and_then(|key| self.units.get(&key))
            .is_some_and(|unit| unit.is_playing())
    }

    // ===== Lifecycle =====

    /// Start a script. Playing an already-playing script is a no-op.
    pub fn play(&mut self, name: &str, session: &mut GameSession) {
        let Some(key) = self.resolve(name) else {
            session.sys_message(format!("No such script: {name}"));
            return;
        };
        let unit = match self.units.get_mut(&key) {
            Some(unit) => unit,
            None => return,
        };
        // A stopped worker that has not been finalized yet still owns its
        // run resources; replay stays a no-op until teardown lands.
        if unit.is_stopping() {
            debug!(target: "scripting", "{key}: still unwinding, play ignored");
            return;
        }
        if unit.is_playing() {
            debug!(target: "scripting", "{key}: already playing");
            return;
        }

        let source = match fs::read_to_string(&unit.meta.path) {
            Ok(source) => source,
            Err(err) => {
                session.sys_message(format!("Cannot read {key}: {err}"));
                return;
            }
        };
        let run = Arc::new(RunState::new(self.journal_capacity));

        match unit.mode {
            ScriptMode::Cooperative => {
                let mut program = match CommandProgram::parse(&key, &source) {
                    Ok(program) => program,
                    Err(err) => {
                        session.sys_message(format!("Cannot play {key}: {err}"));
                        return;
                    }
                };
                program.set_playing(true);
                unit.program = Some(program);
            }
            ScriptMode::Threaded => {
                let bridge =
                    ScriptBridge::new(&key, self.queue.clone(), run.clone(), self.vars.clone());
                let config = EngineConfig {
                    module_root: Some(self.script_root.clone()),
                    cache_modules: self.cache_modules,
                };
                let join = match engine::spawn_worker(source, bridge, config) {
                    Ok(join) => join,
                    Err(err) => {
                        session.sys_message(format!("Cannot play {key}: {err}"));
                        return;
                    }
                };
                let thread_id = join.thread().id();
                self.by_thread.insert(thread_id, key.clone());
                unit.worker = Some(WorkerHandle { join, thread_id });
            }
        }

        unit.run = Some(run.clone());
        self.relay.register(&key, run);
        self.running.push(key.clone());
        info!(target: "scripting", "{key}: playing");
    }

    /// Stop a script. Stopping an idle script is a no-op. Cooperative
    /// scripts are torn down immediately; threaded scripts only get their
    /// stop token raised here and are finalized once the worker exits.
    pub fn stop(&mut self, name: &str, session: &mut GameSession) {
        let Some(key) = self.resolve(name) else {
            session.sys_message(format!("No such script: {name}"));
            return;
        };
        self.stop_key(&key);
    }

    fn stop_key(&mut self, key: &str) {
        let Some(unit) = self.units.get_mut(key) else {
            return;
        };
        if !unit.is_playing() {
            debug!(target: "scripting", "{key}: not playing");
            return;
        }
        match unit.mode {
            ScriptMode::Cooperative => {
                if let Some(program) = unit.program.as_mut() {
                    program.reset();
                }
                unit.run = None;
                self.relay.unregister(key);
                self.running.retain(|name| name != key);
                info!(target: "scripting", "{key}: stopped");
            }
            ScriptMode::Threaded => {
                if let Some(run) = &unit.run {
                    if !run.stop.is_stopped() {
                        run.stop.stop();
                        info!(target: "scripting", "{key}: stop requested");
                    }
                }
            }
        }
    }

    pub fn toggle(&mut self, name: &str, session: &mut GameSession) {
        let Some(key) = self.resolve(name) else {
            session.sys_message(format!("No such script: {name}"));
            return;
        };
        if self.units.get(&key).is_some_and(|unit| unit.is_playing()) {
            self.stop_key(&key);
        } else {
            self.play(&key, session);
        }
    }

    /// Raise every running script's stop and tear down the cooperative
    /// ones. Worker finalization still arrives through the queue.
    pub fn stop_all(&mut self) {
        for key in self.running.clone() {
            self.stop_key(&key);
        }
    }

    /// Stop the script owning the given worker thread. Runs on the
    /// session thread on behalf of a script stopping itself.
    pub fn stop_by_thread(&mut self, thread_id: ThreadId) {
        if let Some(key) = self.by_thread.get(&thread_id).cloned() {
            self.stop_key(&key);
        }
    }

    /// Final teardown of a threaded script, marshaled from the exiting
    /// worker. Joins the thread, releases run state and reports real
    /// faults to the player; a plain stop stays silent.
    pub fn finalize_worker(
        &mut self,
        key: &str,
        error: Option<String>,
        session: &mut GameSession,
    ) {
        let Some(unit) = self.units.get_mut(key) else {
            return;
        };
        if let Some(worker) = unit.worker.take() {
            self.by_thread.remove(&worker.thread_id);
            if worker.join.join().is_err() {
                warn!(target: "scripting", "{key}: worker panicked");
            }
        }
        unit.run = None;
        self.relay.unregister(key);
        self.running.retain(|name| name != key);
        match error {
            Some(message) => session.sys_message(format!("Script '{key}' error: {message}")),
            None => info!(target: "scripting", "{key}: finished"),
        }
    }

    // ===== Per-tick stepping =====

    /// Step every running cooperative script once. Finished scripts are
    /// removed quietly; faulty ones are removed with a player-visible
    /// message. Removal is deferred so one pass sees a stable set.
    pub fn tick(&mut self, session: &mut GameSession) {
        let mut finished: Vec<String> = Vec::new();
        let mut faulty: Vec<(String, String)> = Vec::new();

        for key in self.running.clone() {
            let Some(unit) = self.units.get_mut(&key) else {
                continue;
            };
            if unit.mode != ScriptMode::Cooperative {
                continue;
            }
            let (Some(program), Some(run)) = (unit.program.as_mut(), unit.run.as_deref()) else {
                continue;
            };
            let mut ctx = CommandCtx {
                session: &mut *session,
                run,
                vars: &self.vars,
            };
            match program.step(&mut ctx, &self.coop) {
                Ok(StepOutcome::Finished) => finished.push(key),
                Ok(_) => {}
                Err(err) if err.is_stop() => finished.push(key),
                Err(err) => faulty.push((key, err.to_string())),
            }
        }

        for key in finished {
            self.stop_key(&key);
        }
        for (key, message) in faulty {
            self.stop_key(&key);
            session.sys_message(format!("Script '{key}' error: {message}"));
        }
    }

    // ===== Autostart =====

    /// Play each named script, skipping unknown names with a log line
    /// instead of a player-visible error.
    pub fn autostart(&mut self, names: &[String], session: &mut GameSession) {
        for name in names {
            if self.resolve(name).is_none() {
                warn!(target: "scripting", "autostart: no such script '{name}'");
                continue;
            }
            self.play(name, session);
        }
    }

    // ===== File management =====

    fn path_in_root(&self, relative: &Path) -> anyhow::Result<PathBuf> {
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!("script path must be relative to the script folder");
        }
        Ok(self.script_root.join(relative))
    }

    /// Create a new script file and register it. Fails if the file
    /// already exists.
    pub fn create_script(&mut self, relative: &Path, contents: &str) -> anyhow::Result<()> {
        if ScriptMode::from_path(relative).is_none() {
            bail!("script files must end in .scr or .rhai");
        }
        let path = self.path_in_root(relative)?;
        if path.exists() {
            bail!("{} already exists", relative.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        self.scan();
        Ok(())
    }

    /// Rename a script file in place. The script must not be playing.
    pub fn rename_script(&mut self, name: &str, new_file_name: &str) -> anyhow::Result<()> {
        let key = self
            .resolve(name)
            .with_context(|| format!("no such script: {name}"))?;
        let unit = self.units.get(&key).context("script disappeared")?;
        if unit.is_playing() {
            bail!("cannot rename {key} while it is playing");
        }
        if ScriptMode::from_path(Path::new(new_file_name)) != Some(unit.mode) {
            bail!("renaming cannot change the script type");
        }
        let new_path = unit
            .meta
            .path
            .with_file_name(new_file_name);
        if new_path.exists() {
            bail!("{new_file_name} already exists");
        }
        fs::rename(&unit.meta.path, &new_path)
            .with_context(|| format!("renaming {}", unit.meta.path.display()))?;
        self.units.remove(&key);
        self.scan();
        Ok(())
    }

    /// Delete a script file. The script must not be playing.
    pub fn delete_script(&mut self, name: &str) -> anyhow::Result<()> {
        let key = self
            .resolve(name)
            .with_context(|| format!("no such script: {name}"))?;
        let unit = self.units.get(&key).context("script disappeared")?;
        if unit.is_playing() {
            bail!("cannot delete {key} while it is playing");
        }
        fs::remove_file(&unit.meta.path)
            .with_context(|| format!("deleting {}", unit.meta.path.display()))?;
        self.units.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue;

    fn manager_for(root: &Path) -> ScriptManager {
        let (queue, _jobs) = queue::channel();
        ScriptManager::new(
            queue,
            SharedVars::new(),
            Arc::new(RunRegistry::new()),
            root.to_path_buf(),
            16,
            false,
        )
    }

    #[test]
    fn resolve_prefers_exact_then_unique_file_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("combat")).unwrap();
        fs::write(dir.path().join("heal.scr"), "say hi\n").unwrap();
        fs::write(dir.path().join("combat/heal.scr"), "say hi\n").unwrap();
        fs::write(dir.path().join("combat/cure.scr"), "say hi\n").unwrap();

        let mut manager = manager_for(dir.path());
        manager.scan();

        assert_eq!(
            manager.resolve("combat/heal.scr"),
            Some("combat/heal.scr".to_string())
        );
        // Ambiguous bare name: two heal.scr files exist.
        assert_eq!(manager.resolve("heal.scr"), Some("heal.scr".to_string()));
        assert_eq!(
            manager.resolve("cure.scr"),
            Some("combat/cure.scr".to_string())
        );
        assert_eq!(manager.resolve("missing.scr"), None);
    }

    #[test]
    fn create_script_registers_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_for(dir.path());

        manager
            .create_script(Path::new("mining/ore.scr"), "say dig\n")
            .unwrap();
        assert!(manager.resolve("mining/ore.scr").is_some());

        assert!(manager
            .create_script(Path::new("mining/ore.scr"), "")
            .is_err());
        assert!(manager.create_script(Path::new("notes.txt"), "").is_err());
        assert!(manager
            .create_script(Path::new("../escape.scr"), "")
            .is_err());
    }

    #[test]
    fn rename_keeps_mode_and_reregisters() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.scr"), "say hi\n").unwrap();
        let mut manager = manager_for(dir.path());
        manager.scan();

        assert!(manager.rename_script("old.scr", "new.rhai").is_err());
        manager.rename_script("old.scr", "new.scr").unwrap();
        assert!(manager.resolve("old.scr").is_none());
        assert!(manager.resolve("new.scr").is_some());
        assert!(dir.path().join("new.scr").exists());
    }

    #[test]
    fn delete_script_removes_file_and_unit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("gone.scr"), "say hi\n").unwrap();
        let mut manager = manager_for(dir.path());
        manager.scan();

        manager.delete_script("gone.scr").unwrap();
        assert!(manager.resolve("gone.scr").is_none());
        assert!(!dir.path().join("gone.scr").exists());
        assert!(manager.delete_script("gone.scr").is_err());
    }
}
