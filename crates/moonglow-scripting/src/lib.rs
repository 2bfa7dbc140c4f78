//! moonglow-scripting: the embedded scripting runtime
//!
//! Scripts come in two shapes. Cooperative `.scr` command scripts run one
//! statement per session tick directly on the session thread. Threaded
//! `.rhai` scripts run to completion on dedicated worker threads and reach
//! the session through a job queue serviced every tick, so all world
//! mutation still happens on one thread.

pub mod bridge;
pub mod context;
pub mod coop;
pub mod engine;
pub mod error;
pub mod hotkeys;
pub mod journal;
pub mod manager;
pub mod queue;
pub mod relay;
pub mod runner;
pub mod signal;
pub mod unit;

pub use bridge::{RunState, ScriptBridge, SharedVars};
pub use context::{SessionContext, SessionCore, SessionHandle};
pub use error::{BridgeError, ScriptError};
pub use manager::ScriptManager;
pub use queue::MainThreadQueue;
pub use relay::RunRegistry;
pub use signal::StopToken;
pub use unit::{ScriptMeta, ScriptMode, ScriptUnit};
