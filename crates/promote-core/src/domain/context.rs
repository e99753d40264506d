//! Run provenance.
//!
//! The CI host describes the triggering run through environment variables.
//! They are read once at the binary edge into a [`RunContext`] that is then
//! passed by reference through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_URL: &str = "https://github.com";

/// What the hosting CI system told us about the triggering run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Event that triggered the run (`push`, `workflow_dispatch`, ...).
    pub event_name: Option<String>,
    pub job: Option<String>,
    pub run_id: Option<String>,
    pub run_attempt: Option<String>,
    pub actor: Option<String>,
    /// Repository the promoted artifacts were built from (`owner/name`).
    pub source_repository: Option<String>,
    /// Git ref of the triggering run, e.g. `refs/heads/main`.
    pub source_ref: Option<String>,
    /// Commit SHA of the triggering run.
    pub source_sha: Option<String>,
}

/// Immutable provenance threaded through one promotion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    provenance: Provenance,
    server_url: String,
    started_at: DateTime<Utc>,
    run_key: String,
}

impl RunContext {
    pub fn new(provenance: Provenance, server_url: impl Into<String>) -> Self {
        let run_key = match (&provenance.run_id, &provenance.run_attempt) {
            (Some(id), Some(attempt)) => format!("{id}-{attempt}"),
            (Some(id), None) => id.clone(),
            _ => format!("local-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
        };
        Self {
            provenance,
            server_url: server_url.into().trim_end_matches('/').to_string(),
            started_at: Utc::now(),
            run_key,
        }
    }

    /// Context for runs outside CI.
    pub fn local() -> Self {
        Self::new(Provenance::default(), DEFAULT_SERVER_URL)
    }

    /// Pin the start time (deterministic commit messages in tests).
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Key unique to this run; used for non-aggregated branch names.
    pub fn run_key(&self) -> &str {
        &self.run_key
    }

    pub fn source_sha(&self) -> Option<&str> {
        self.provenance.source_sha.as_deref()
    }

    /// URL of the triggering CI run, when known.
    pub fn run_url(&self) -> Option<String> {
        let repo = self.provenance.source_repository.as_deref()?;
        let run_id = self.provenance.run_id.as_deref()?;
        let mut url = format!("{}/{repo}/actions/runs/{run_id}", self.server_url);
        if let Some(attempt) = &self.provenance.run_attempt {
            url.push_str(&format!("/attempts/{attempt}"));
        }
        Some(url)
    }

    /// Browsable URL of the triggering ref.
    pub fn source_ref_url(&self) -> Option<String> {
        let repo = self.provenance.source_repository.as_deref()?;
        let git_ref = self.provenance.source_ref.as_deref()?;
        let name = git_ref
            .strip_prefix("refs/heads/")
            .or_else(|| git_ref.strip_prefix("refs/tags/"))
            .unwrap_or(git_ref);
        Some(format!("{}/{repo}/tree/{name}", self.server_url))
    }

    /// URL of a commit in the given repository.
    pub fn commit_url(&self, repository: &str, sha: &str) -> String {
        format!("{}/{repository}/commit/{sha}", self.server_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ci_provenance() -> Provenance {
        Provenance {
            event_name: Some("push".to_string()),
            job: Some("promote".to_string()),
            run_id: Some("42".to_string()),
            run_attempt: Some("2".to_string()),
            actor: Some("octocat".to_string()),
            source_repository: Some("acme/web".to_string()),
            source_ref: Some("refs/heads/main".to_string()),
            source_sha: Some("0123456789abcdef0123456789abcdef01234567".to_string()),
        }
    }

    #[test]
    fn run_key_uses_run_id_and_attempt() {
        let ctx = RunContext::new(ci_provenance(), DEFAULT_SERVER_URL);
        assert_eq!(ctx.run_key(), "42-2");
    }

    #[test]
    fn local_run_key_is_random() {
        let a = RunContext::local();
        let b = RunContext::local();
        assert!(a.run_key().starts_with("local-"));
        assert_ne!(a.run_key(), b.run_key());
    }

    #[test]
    fn urls_are_derived_from_provenance() {
        let ctx = RunContext::new(ci_provenance(), "https://github.example.com/");
        assert_eq!(
            ctx.run_url().as_deref(),
            Some("https://github.example.com/acme/web/actions/runs/42/attempts/2")
        );
        assert_eq!(
            ctx.source_ref_url().as_deref(),
            Some("https://github.example.com/acme/web/tree/main")
        );
        assert_eq!(
            ctx.commit_url("acme/deploy", "abc"),
            "https://github.example.com/acme/deploy/commit/abc"
        );
    }

    #[test]
    fn urls_absent_outside_ci() {
        let ctx = RunContext::local();
        assert!(ctx.run_url().is_none());
        assert!(ctx.source_ref_url().is_none());
    }
}
