//! Failures reported by the git and pull-request collaborators.
//!
//! The orchestrator turns these into [`promote_core::PromoteError`] values
//! tagged with the delivery step that failed.

/// A remote or local command did not do what was asked.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from `{command}`: {reason}")]
    UnexpectedOutput { command: String, reason: String },
}

impl RemoteError {
    /// Standard error text for failed commands; empty otherwise.
    pub fn stderr(&self) -> &str {
        match self {
            RemoteError::CommandFailed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
