//! moonglow-client: world state and session plumbing
//!
//! Everything in this crate is owned by the single session thread. Other
//! threads (script workers, the input source) never touch these types
//! directly; they go through the invocation bridge in `moonglow-scripting`.

pub mod commands;
pub mod config;
pub mod session;
pub mod world;

pub use session::{GameSession, JournalSink, NetSink, OutboundMessage, RecordingSink};
pub use world::{Serial, World};
