//! Session-scoped wiring for the scripting runtime
//!
//! [`SessionContext`] is the single owner of everything a connected
//! character needs: the game session, the script manager, the invocation
//! queue's receiving end and the journal relay. One context per session;
//! dropping it tears the whole runtime down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use moonglow_client::commands::ConsoleCommand;
use moonglow_client::config::Settings;
use moonglow_client::GameSession;
use moonglow_events::KeyCombo;

use crate::bridge::SharedVars;
use crate::manager::ScriptManager;
use crate::queue::{self, JobReceiver, MainThreadQueue};
use crate::relay::RunRegistry;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The state every queued job operates on. Jobs get both halves so that
/// world operations and manager operations (self-stop, worker teardown)
/// run through the same queue.
pub struct SessionCore {
    pub session: GameSession,
    pub scripts: ScriptManager,
}

/// Everything owned by the session thread for one character
pub struct SessionContext {
    core: SessionCore,
    jobs: JobReceiver,
    queue: MainThreadQueue,
    relay: Arc<RunRegistry>,
}

/// Cheap cross-thread handle for feeding input into a session
#[derive(Clone)]
pub struct SessionHandle {
    queue: MainThreadQueue,
    relay: Arc<RunRegistry>,
}

impl SessionHandle {
    pub fn queue(&self) -> MainThreadQueue {
        self.queue.clone()
    }

    pub fn key_down(&self, combo: KeyCombo) {
        self.relay.key_down(combo);
    }

    pub fn key_up(&self, combo: KeyCombo) {
        self.relay.key_up(combo);
    }
}

impl SessionContext {
    pub fn new(mut session: GameSession, script_root: PathBuf, settings: &Settings) -> Self {
        let (queue, jobs) = queue::channel();
        let relay = Arc::new(RunRegistry::new());
        session.set_journal_sink(relay.clone());
        let scripts = ScriptManager::new(
            queue.clone(),
            SharedVars::new(),
            relay.clone(),
            script_root,
            settings.journal_capacity,
            settings.cache_modules,
        );
        Self {
            core: SessionCore { session, scripts },
            jobs,
            queue,
            relay,
        }
    }

    /// Offline context for unit tests
    pub fn for_tests() -> Self {
        let (session, _sink) = GameSession::offline("Tester");
        Self::new(session, std::env::temp_dir(), &Settings::default())
    }

    pub fn queue(&self) -> MainThreadQueue {
        self.queue.clone()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            queue: self.queue.clone(),
            relay: self.relay.clone(),
        }
    }

    pub fn core(&mut self) -> &mut SessionCore {
        &mut self.core
    }

    pub fn session(&self) -> &GameSession {
        &self.core.session
    }

    pub fn scripts(&mut self) -> &mut ScriptManager {
        &mut self.core.scripts
    }

    /// One frame of session work: drain queued jobs, then step every
    /// running cooperative script once.
    pub fn tick(&mut self) {
        self.jobs.service(&mut self.core);
        let SessionCore { session, scripts } = &mut self.core;
        scripts.tick(session);
    }

    /// Rescan the script folder and play the configured autostart
    /// scripts for this character.
    pub fn start_scripts(&mut self, settings: &Settings) {
        let SessionCore { session, scripts } = &mut self.core;
        let count = scripts.scan();
        info!(target: "session", "{count} scripts available");
        let names = settings.autostart.names_for(session.character_name());
        if !names.is_empty() {
            info!(target: "session", "autostarting {} scripts", names.len());
            scripts.autostart(&names, session);
        }
    }

    /// Handle one console command. Returns `false` when the session
    /// should shut down.
    pub fn handle_command(&mut self, command: ConsoleCommand) -> bool {
        let SessionCore { session, scripts } = &mut self.core;
        match command {
            ConsoleCommand::Play(name) => scripts.play(&name, session),
            ConsoleCommand::Stop(name) => scripts.stop(&name, session),
            ConsoleCommand::Toggle(name) => scripts.toggle(&name, session),
            ConsoleCommand::List => {
                scripts.scan();
                for (name, playing) in scripts.list() {
                    let marker = if playing { "*" } else { " " };
                    session.sys_message(format!("{marker} {name}"));
                }
            }
            ConsoleCommand::Press(combo) => {
                self.relay.key_down(combo);
                self.relay.key_up(combo);
            }
            ConsoleCommand::Quit => return false,
        }
        true
    }

    /// Stop everything and keep servicing the queue until every worker
    /// has been finalized or the grace period runs out.
    pub fn shutdown(&mut self) {
        self.core.scripts.stop_all();
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while self.core.scripts.running_count() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    target: "session",
                    "shutdown grace expired with {} scripts unfinished",
                    self.core.scripts.running_count()
                );
                break;
            }
            self.tick();
            std::thread::sleep(Duration::from_millis(10));
        }
        info!(target: "session", "session context shut down");
    }
}
