//! Status-check classification and polling.
//!
//! A pull request's checks are folded into one [`CheckStatus`] by
//! [`classify`]. [`poll_checks`] re-reads them on a fixed interval until
//! the status is terminal or the attempt budget is spent.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use promote_core::{obs, PromoteError, Result};

use crate::host::PullRequestHost;

/// One check run as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    pub name: String,
    #[serde(default)]
    pub state: String,
    /// Normalised outcome: `pass`, `fail`, `pending`, `skipping` or `cancel`.
    #[serde(default)]
    pub bucket: String,
}

impl CheckRun {
    pub fn new(name: &str, bucket: &str) -> Self {
        Self {
            name: name.to_string(),
            state: bucket.to_uppercase(),
            bucket: bucket.to_string(),
        }
    }

    fn is_failure(&self) -> bool {
        matches!(self.bucket.as_str(), "fail" | "cancel")
    }

    fn is_pending(&self) -> bool {
        !matches!(self.bucket.as_str(), "pass" | "skipping") && !self.is_failure()
    }
}

/// Aggregate status of every check on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// No check has reported yet.
    Unreported,
    Pending,
    Passed,
    Failed,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Unreported => "unreported",
            CheckStatus::Pending => "pending",
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckStatus::Passed | CheckStatus::Failed)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold check runs into one status. Any failure wins over pending.
pub fn classify(runs: &[CheckRun]) -> CheckStatus {
    if runs.is_empty() {
        CheckStatus::Unreported
    } else if runs.iter().any(CheckRun::is_failure) {
        CheckStatus::Failed
    } else if runs.iter().any(CheckRun::is_pending) {
        CheckStatus::Pending
    } else {
        CheckStatus::Passed
    }
}

/// How long to wait for checks to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Number of status reads, at least 1.
    pub attempts: u32,
    /// Sleep between reads.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Result<Self> {
        if attempts == 0 {
            return Err(PromoteError::Config(
                "poll attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self { attempts, interval })
    }
}

/// Poll the checks of `branch` until they pass.
///
/// Returns the final check runs on success. Failing checks end the loop
/// with [`PromoteError::ChecksFailed`]; a spent budget with
/// [`PromoteError::PollTimeout`]. A failed read uses up an attempt.
pub async fn poll_checks(
    host: &dyn PullRequestHost,
    branch: &str,
    pull_request: &str,
    policy: &PollPolicy,
) -> Result<Vec<CheckRun>> {
    let attempts = policy.attempts.max(1);
    let mut last = String::from("unreported");

    for attempt in 1..=attempts {
        match host.checks(branch).await {
            Ok(runs) => {
                let status = classify(&runs);
                obs::emit_checks_polled(attempt, attempts, status.as_str());
                match status {
                    CheckStatus::Passed => return Ok(runs),
                    CheckStatus::Failed => {
                        return Err(PromoteError::ChecksFailed {
                            pull_request: pull_request.to_string(),
                            failing: runs
                                .iter()
                                .filter(|r| r.is_failure())
                                .map(|r| r.name.clone())
                                .collect(),
                        })
                    }
                    CheckStatus::Pending | CheckStatus::Unreported => {
                        last = status.as_str().to_string();
                    }
                }
            }
            Err(err) => {
                obs::emit_remote_tolerated("checks", &err);
                last = format!("unreadable ({err})");
            }
        }

        if attempt < attempts {
            debug!(attempt, interval_secs = policy.interval.as_secs(), "waiting for checks");
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(PromoteError::PollTimeout {
        pull_request: pull_request.to_string(),
        attempts,
        last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_unreported() {
        assert_eq!(classify(&[]), CheckStatus::Unreported);
    }

    #[test]
    fn failure_beats_pending() {
        let runs = vec![CheckRun::new("build", "pending"), CheckRun::new("lint", "fail")];
        assert_eq!(classify(&runs), CheckStatus::Failed);
    }

    #[test]
    fn cancelled_is_failure() {
        let runs = vec![CheckRun::new("deploy", "cancel")];
        assert_eq!(classify(&runs), CheckStatus::Failed);
    }

    #[test]
    fn skipped_counts_as_pass() {
        let runs = vec![CheckRun::new("build", "pass"), CheckRun::new("e2e", "skipping")];
        assert_eq!(classify(&runs), CheckStatus::Passed);
        assert!(classify(&runs).is_terminal());
    }

    #[test]
    fn unknown_bucket_is_pending() {
        let runs = vec![CheckRun::new("build", "pass"), CheckRun::new("queue", "")];
        assert_eq!(classify(&runs), CheckStatus::Pending);
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(PollPolicy::new(0, Duration::from_secs(1)).is_err());
        assert_eq!(PollPolicy::default().attempts, 10);
    }

    #[test]
    fn gh_json_deserializes() {
        let runs: Vec<CheckRun> = serde_json::from_str(
            r#"[{"name":"build","state":"SUCCESS","bucket":"pass"},{"name":"lint","state":"IN_PROGRESS","bucket":"pending"}]"#,
        )
        .unwrap();
        assert_eq!(classify(&runs), CheckStatus::Pending);
    }
}
