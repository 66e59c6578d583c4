//! Crate-wide error taxonomy (spec §7).
//!
//! Every public operation returns [`CoreResult<T>`] so callers can match on
//! the error *kind* uniformly instead of parsing strings. Component-local
//! error types convert into [`CoreError`] via `From` so a caller at the top
//! of the stack never has to know which subsystem produced the failure.

use std::time::Duration;

/// Structured error kind shared by every public operation in the crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("communication failure: {0}")]
    Comm(String),

    #[error("plugin error [{code:?}] loading '{plugin_path}': {diagnostic}")]
    Plugin {
        code: PluginErrorCode,
        plugin_path: String,
        diagnostic: String,
    },

    #[error("parameter rejected: {0}")]
    Param(String),

    #[error("illegal in current state: {0}")]
    State(String),

    #[error("hardware fault: {0}")]
    Hardware(String),

    #[error("aborted: {0}")]
    Abort(String),

    #[error("capability not supported: {0}")]
    NotSupported(String),

    #[error("calibration error: {0}")]
    Calibration(String),

    #[error("journal write failed: {0}")]
    Journal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Structured error code for the detector plugin loader (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginErrorCode {
    FileNotFound,
    MissingSymbol,
    VersionMismatch,
    InitFailed,
    ValidationFailed,
}

/// Error raised while loading or unloading a detector plugin.
#[derive(Debug, Clone)]
pub struct PluginError {
    pub code: PluginErrorCode,
    pub plugin_path: String,
    pub diagnostic: String,
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "plugin error [{:?}] loading '{}': {}",
            self.code, self.plugin_path, self.diagnostic
        )
    }
}

impl std::error::Error for PluginError {}

impl From<PluginError> for CoreError {
    fn from(e: PluginError) -> Self {
        CoreError::Plugin {
            code: e.code,
            plugin_path: e.plugin_path,
            diagnostic: e.diagnostic,
        }
    }
}
