//! One managed script file and its per-run resources

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use crate::bridge::RunState;
use crate::coop::CommandProgram;

/// How a script executes, determined by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    /// `.scr` files run one statement per session tick with direct
    /// session access.
    Cooperative,
    /// `.rhai` files run to completion on a dedicated worker thread and
    /// reach the session through the invocation queue.
    Threaded,
}

impl ScriptMode {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("scr") => Some(ScriptMode::Cooperative),
            Some("rhai") => Some(ScriptMode::Threaded),
            _ => None,
        }
    }
}

/// Where a script file sits under the script root
#[derive(Debug, Clone)]
pub struct ScriptMeta {
    pub path: PathBuf,
    pub file_name: String,
    pub group: Option<String>,
    pub sub_group: Option<String>,
}

impl ScriptMeta {
    /// Stable user-facing name: `group/sub/file.ext`
    pub fn display_name(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(group) = &self.group {
            parts.push(group.as_str());
        }
        if let Some(sub) = &self.sub_group {
            parts.push(sub.as_str());
        }
        parts.push(&self.file_name);
        parts.join("/")
    }
}

/// Live worker thread of a threaded script
pub(crate) struct WorkerHandle {
    pub join: JoinHandle<()>,
    pub thread_id: ThreadId,
}

/// A discovered script plus whatever run resources it currently holds.
/// At most one of `program` / `worker` is populated, matching the mode;
/// a cooperative program stays cached after stop, rewound and idle.
pub struct ScriptUnit {
    pub meta: ScriptMeta,
    pub mode: ScriptMode,
    pub(crate) program: Option<CommandProgram>,
    pub(crate) worker: Option<WorkerHandle>,
    pub(crate) run: Option<Arc<RunState>>,
}

impl ScriptUnit {
    pub fn new(meta: ScriptMeta, mode: ScriptMode) -> Self {
        Self {
            meta,
            mode,
            program: None,
            worker: None,
            run: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        match self.mode {
            // A stopped program stays cached for replay; only one that
            // is mid-run counts as playing.
            ScriptMode::Cooperative => self
                .program
                .as_ref()
                .is_some_and(CommandProgram::is_playing),
            ScriptMode::Threaded => self.worker.is_some(),
        }
    }

    /// A threaded script whose stop was requested but whose worker has
    /// not yet been finalized on the session thread.
    pub fn is_stopping(&self) -> bool {
        matches!((&self.worker, &self.run), (Some(_), Some(run)) if run.stop.is_stopped())
    }
}
