//! Error types for imgsync-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from digest store persistence.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (digest store).
    #[error("digest store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a single registry client call.
///
/// These never escape a sync: the engine turns them into
/// `SyncOutcome::Failed` for the stage that issued the call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("unexpected output from `{command}`: {detail}")]
    Output { command: String, detail: String },

    /// Any other client failure, described in full by the message.
    #[error("{0}")]
    Other(String),
}

/// Webhook delivery failure. Logged and swallowed by the coordinator.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
