//! Error taxonomy for a promotion run.
//!
//! Every fatal condition maps to one [`PromoteError`] variant. The variant
//! determines the process exit code (see [`PromoteError::exit_code`]) so CI
//! callers can tell a malformed request from failing checks without parsing
//! messages.

use std::fmt;

/// Which promotion list an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemList {
    Images,
    Charts,
}

impl fmt::Display for ItemList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemList::Images => f.write_str("images"),
            ItemList::Charts => f.write_str("charts"),
        }
    }
}

/// Errors produced while validating promotion items.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("{list} input is not a valid JSON list: {reason}")]
    MalformedJson { list: ItemList, reason: String },

    #[error("{list}[{index}] is missing the required '{field}' field")]
    MissingField {
        list: ItemList,
        index: usize,
        field: &'static str,
    },

    #[error("{list}[{index}] ({name}) cannot set '{field}' when 'fromOverlay' is set")]
    ConflictingSource {
        list: ItemList,
        index: usize,
        name: String,
        field: &'static str,
    },

    #[error("{list}[{index}] ({name}) must set {expected}")]
    MissingValue {
        list: ItemList,
        index: usize,
        name: String,
        expected: &'static str,
    },

    #[error("{list}[{index}] ({name}) has an empty 'overlays' list")]
    EmptyOverlays {
        list: ItemList,
        index: usize,
        name: String,
    },

    #[error("{list}[{index}] ({name}) has a blank '{field}' value")]
    BlankValue {
        list: ItemList,
        index: usize,
        name: String,
        field: &'static str,
    },

    #[error("found duplicate {list} {field} values: {}", .values.join(" "))]
    Duplicate {
        list: ItemList,
        field: &'static str,
        values: Vec<String>,
    },

    #[error(
        "no images or charts to update; provide a JSON list via IMAGES_TO_UPDATE and/or \
         CHARTS_TO_UPDATE, e.g. [{{\"name\":\"app\",\"newTag\":\"1.2.3\",\"overlays\":[\"env/dev\"]}}]"
    )]
    NothingToPromote,
}

/// Failures reported by a manifest editor.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("overlay directory does not exist: {path}")]
    MissingOverlay { path: String },

    #[error("no kustomization file found in overlay {overlay}")]
    MissingKustomization { overlay: String },

    #[error("kustomization file {path} is invalid: {reason}")]
    InvalidKustomization { path: String, reason: String },

    #[error("chart {chart} is not declared under helmCharts in overlay {overlay}")]
    ChartNotDeclared { overlay: String, chart: String },

    #[error("`{command}` exited with {status}: {stderr}")]
    ToolFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal promotion errors.
#[derive(Debug, thiserror::Error)]
pub enum PromoteError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("source overlay {overlay} does not declare {kind} '{name}'")]
    SourceNotFound {
        overlay: String,
        kind: &'static str,
        name: String,
    },

    #[error("source overlay {overlay} could not be read: {reason}")]
    SourceUnreadable { overlay: String, reason: String },

    #[error("failed to update {item} in overlay {overlay}: {reason}")]
    Mutation {
        overlay: String,
        item: String,
        reason: String,
    },

    #[error("delivery failed at step '{step}': {reason}")]
    Delivery { step: String, reason: String },

    #[error("rebasing branch {branch} onto {onto} hit conflicts: {reason}")]
    RebaseConflict {
        branch: String,
        onto: String,
        reason: String,
    },

    #[error("status checks failed on {pull_request}: {}", .failing.join(", "))]
    ChecksFailed {
        pull_request: String,
        failing: Vec<String>,
    },

    #[error("status checks on {pull_request} did not finish after {attempts} attempts (last state: {last})")]
    PollTimeout {
        pull_request: String,
        attempts: u32,
        last: String,
    },

    #[error("run cancelled: {0}")]
    Cancelled(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PromoteError {
    /// Construct a delivery failure for the named step.
    pub fn delivery(step: impl Into<String>, reason: impl fmt::Display) -> Self {
        PromoteError::Delivery {
            step: step.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            PromoteError::Validation(_) => 2,
            PromoteError::SourceNotFound { .. } | PromoteError::SourceUnreadable { .. } => 3,
            PromoteError::Mutation { .. } => 4,
            PromoteError::Delivery { .. } => 5,
            PromoteError::RebaseConflict { .. } => 6,
            PromoteError::ChecksFailed { .. } => 7,
            PromoteError::PollTimeout { .. } => 8,
            PromoteError::Cancelled(_) => 9,
            PromoteError::Config(_)
            | PromoteError::Serialization(_)
            | PromoteError::Io(_) => 1,
        }
    }
}

/// Result type for promotion operations.
pub type Result<T> = std::result::Result<T, PromoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_item() {
        let err = ValidationError::ConflictingSource {
            list: ItemList::Images,
            index: 2,
            name: "nginx".to_string(),
            field: "newTag",
        };
        let msg = err.to_string();
        assert!(msg.contains("images[2]"));
        assert!(msg.contains("nginx"));
        assert!(msg.contains("newTag"));
    }

    #[test]
    fn duplicate_lists_every_value() {
        let err = ValidationError::Duplicate {
            list: ItemList::Charts,
            field: "name",
            values: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "found duplicate charts name values: a b");
    }

    #[test]
    fn checks_failed_and_timeout_have_distinct_codes() {
        let failed = PromoteError::ChecksFailed {
            pull_request: "https://github.com/o/r/pull/1".to_string(),
            failing: vec!["build".to_string()],
        };
        let timeout = PromoteError::PollTimeout {
            pull_request: "https://github.com/o/r/pull/1".to_string(),
            attempts: 10,
            last: "pending".to_string(),
        };
        assert_ne!(failed.exit_code(), timeout.exit_code());
        assert!(failed.to_string().contains("build"));
        assert!(timeout.to_string().contains("10 attempts"));
    }

    #[test]
    fn every_error_is_nonzero() {
        let errors = vec![
            PromoteError::from(ValidationError::NothingToPromote),
            PromoteError::delivery("push", "rejected"),
            PromoteError::Config("bad".to_string()),
            PromoteError::Cancelled("ctrl-c".to_string()),
        ];
        for err in errors {
            assert_ne!(err.exit_code(), 0, "{err}");
        }
    }
}
