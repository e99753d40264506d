//! Pull-request host operations (GitHub through the `gh` CLI).

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::checks::CheckRun;
use crate::error::{RemoteError, RemoteResult};
use crate::process::{CommandOutput, Tool};

/// An open or recently merged pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    /// `OPEN`, `CLOSED` or `MERGED`.
    #[serde(default)]
    pub state: String,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }
}

/// Pull-request operations the delivery orchestrator needs.
///
/// Pull requests are addressed by head branch; the delivery flow owns the
/// branch and never has more than one pull request per branch open.
#[async_trait]
pub trait PullRequestHost: Send + Sync {
    /// Head branch names of every open pull request against `base`.
    async fn list_open_head_branches(&self, base: &str) -> RemoteResult<Vec<String>>;

    /// The most recent pull request whose head is `branch`, in any state;
    /// `None` when there is none.
    async fn view(&self, branch: &str) -> RemoteResult<Option<PullRequest>>;

    /// Open a pull request with title and body filled from the commits.
    async fn create(&self, branch: &str, base: &str) -> RemoteResult<PullRequest>;

    async fn add_labels(&self, branch: &str, labels: &[String]) -> RemoteResult<()>;

    /// Status checks reported for the pull request of `branch`.
    ///
    /// An empty list means no check has been reported yet.
    async fn checks(&self, branch: &str) -> RemoteResult<Vec<CheckRun>>;

    /// Squash-merge and delete the head branch.
    async fn merge(&self, branch: &str) -> RemoteResult<()>;
}

const NO_PULL_REQUESTS: &str = "no pull requests found";
const NO_CHECKS: &str = "no checks reported";

/// [`PullRequestHost`] backed by the `gh` binary.
#[derive(Debug, Clone)]
pub struct GhCli {
    tool: Tool,
    repository: Option<String>,
}

impl GhCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self::with_binary("gh", repo_dir)
    }

    pub fn with_binary(binary: impl Into<PathBuf>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool: Tool::new(binary, repo_dir),
            repository: None,
        }
    }

    /// Address `owner/name` explicitly instead of the checkout's remote.
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    fn args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut all = args.to_vec();
        if let Some(repo) = &self.repository {
            all.extend(["--repo", repo.as_str()]);
        }
        all
    }

    async fn gh(&self, args: &[&str]) -> RemoteResult<CommandOutput> {
        self.tool.run(&self.args(args)).await
    }
}

#[async_trait]
impl PullRequestHost for GhCli {
    async fn list_open_head_branches(&self, base: &str) -> RemoteResult<Vec<String>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Head {
            head_ref_name: String,
        }

        let out = self
            .gh(&[
                "pr", "list", "--state", "open", "--base", base, "--limit", "200", "--json",
                "headRefName",
            ])
            .await?;
        let heads: Vec<Head> = parse_json(&out)?;
        Ok(heads.into_iter().map(|h| h.head_ref_name).collect())
    }

    async fn view(&self, branch: &str) -> RemoteResult<Option<PullRequest>> {
        match self
            .gh(&["pr", "view", branch, "--json", "number,url,state"])
            .await
        {
            Ok(out) => parse_json(&out).map(Some),
            Err(err) if err.stderr().to_lowercase().contains(NO_PULL_REQUESTS) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create(&self, branch: &str, base: &str) -> RemoteResult<PullRequest> {
        let out = self
            .gh(&["pr", "create", "--fill", "--head", branch, "--base", base])
            .await?;
        let url = out
            .stdout
            .lines()
            .rev()
            .find(|l| l.starts_with("http"))
            .map(str::trim)
            .ok_or_else(|| RemoteError::UnexpectedOutput {
                command: out.command.clone(),
                reason: "no pull request URL printed".to_string(),
            })?
            .to_string();
        Ok(PullRequest {
            number: pull_number(&url).unwrap_or_default(),
            url,
            state: "OPEN".to_string(),
        })
    }

    async fn add_labels(&self, branch: &str, labels: &[String]) -> RemoteResult<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let joined = labels.join(",");
        self.gh(&["pr", "edit", branch, "--add-label", joined.as_str()])
            .await?;
        Ok(())
    }

    async fn checks(&self, branch: &str) -> RemoteResult<Vec<CheckRun>> {
        // gh exits non-zero while checks are pending or failing, so the JSON
        // on stdout is read regardless of the exit code.
        let out = self
            .tool
            .capture(&self.args(&["pr", "checks", branch, "--json", "name,state,bucket"]))
            .await?;
        if out.stderr.to_lowercase().contains(NO_CHECKS) {
            return Ok(Vec::new());
        }
        if out.stdout.trim().is_empty() {
            out.check()?;
            return Ok(Vec::new());
        }
        parse_json(&out)
    }

    async fn merge(&self, branch: &str) -> RemoteResult<()> {
        self.gh(&["pr", "merge", branch, "--squash", "--delete-branch"])
            .await?;
        Ok(())
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(out: &CommandOutput) -> RemoteResult<T> {
    serde_json::from_str(out.stdout.trim()).map_err(|e| RemoteError::UnexpectedOutput {
        command: out.command.clone(),
        reason: e.to_string(),
    })
}

/// Trailing number of a `.../pull/<n>` URL.
pub fn pull_number(url: &str) -> Option<u64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}
