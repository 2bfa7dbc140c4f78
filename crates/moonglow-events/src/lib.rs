//! Core event types for moonglow
//!
//! This crate provides the foundational types shared between the client,
//! the scripting runtime and the front ends, allowing those crates to
//! exchange events without circular dependencies.

pub mod journal_events;
pub mod keyboard_events;

pub use journal_events::{JournalEntry, JournalKind};
pub use keyboard_events::{KeyCode, KeyCombo, KeyModifiers};
