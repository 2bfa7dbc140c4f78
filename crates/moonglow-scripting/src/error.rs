//! Error taxonomy for the scripting runtime
//!
//! `Stopped` is ordinary control flow for an intentionally stopped script
//! and must never be surfaced to the user as a failure; `is_stop` exists so
//! callers can tell the two apart.

use thiserror::Error;

/// Errors from a bridge submission
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// The calling script was stopped while waiting
    #[error("script stopped")]
    Stopped,
    /// The session queue has shut down
    #[error("session queue closed")]
    Closed,
}

/// Errors from script execution
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script was told to stop; unwinds the run, reported to no one
    #[error("script stopped")]
    Stopped,

    /// The source failed to parse; the script never starts
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A fault during execution, contained to the one script
    #[error("runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ScriptError {
    /// True when this is the distinguished stop signal, not a fault
    pub fn is_stop(&self) -> bool {
        matches!(
            self,
            ScriptError::Stopped | ScriptError::Bridge(BridgeError::Stopped)
        )
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_not_a_fault() {
        assert!(ScriptError::Stopped.is_stop());
        assert!(ScriptError::Bridge(BridgeError::Stopped).is_stop());
        assert!(!ScriptError::runtime("boom").is_stop());
        assert!(!ScriptError::Bridge(BridgeError::Closed).is_stop());
    }
}
