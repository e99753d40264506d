//! Local git operations on the deployment repository.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{RemoteError, RemoteResult};
use crate::process::Tool;

/// Result of rebasing the current branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    Clean,
    /// The rebase stopped on conflicts and was aborted.
    Conflict { reason: String },
}

/// Git operations the delivery orchestrator needs.
#[async_trait]
pub trait Git: Send + Sync {
    /// Whether the working tree differs from HEAD (untracked files included).
    async fn has_changes(&self) -> RemoteResult<bool>;

    async fn head_sha(&self) -> RemoteResult<String>;

    /// Create `branch` from HEAD and switch to it.
    async fn create_branch(&self, branch: &str) -> RemoteResult<()>;

    async fn stage_all(&self) -> RemoteResult<()>;

    /// Commit the staged changes and return the new HEAD SHA.
    async fn commit(&self, title: &str, body: &str) -> RemoteResult<String>;

    /// Push HEAD to `branch` on the remote.
    async fn push(&self, branch: &str, force: bool) -> RemoteResult<()>;

    /// Stash working changes. Returns `false` when there was nothing to stash.
    async fn stash(&self) -> RemoteResult<bool>;

    async fn drop_stash(&self) -> RemoteResult<()>;

    /// Fetch `branch` from the remote and check it out, replacing any local copy.
    async fn checkout_remote_branch(&self, branch: &str) -> RemoteResult<()>;

    /// Fetch `target` and rebase the current branch onto its remote copy.
    async fn rebase_onto(&self, target: &str) -> RemoteResult<RebaseOutcome>;

    /// SHA of `branch` on the remote as of the last fetch.
    async fn remote_sha(&self, branch: &str) -> RemoteResult<String>;
}

/// [`Git`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    tool: Tool,
    remote: String,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self::with_binary("git", repo_dir)
    }

    pub fn with_binary(binary: impl Into<PathBuf>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool: Tool::new(binary, repo_dir),
            remote: "origin".to_string(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Check whether the directory is inside a git work tree.
    pub async fn is_repo(&self) -> bool {
        self.tool
            .run(&["rev-parse", "--is-inside-work-tree"])
            .await
            .is_ok()
    }
}

#[async_trait]
impl Git for GitCli {
    async fn has_changes(&self) -> RemoteResult<bool> {
        let out = self.tool.run(&["status", "--porcelain"]).await?;
        Ok(!out.stdout.trim().is_empty())
    }

    async fn head_sha(&self) -> RemoteResult<String> {
        let out = self.tool.run(&["rev-parse", "HEAD"]).await?;
        let sha = out.stdout.trim().to_string();
        if sha.is_empty() {
            return Err(RemoteError::UnexpectedOutput {
                command: out.command,
                reason: "empty output".to_string(),
            });
        }
        Ok(sha)
    }

    async fn create_branch(&self, branch: &str) -> RemoteResult<()> {
        self.tool.run(&["checkout", "-b", branch]).await?;
        Ok(())
    }

    async fn stage_all(&self) -> RemoteResult<()> {
        self.tool.run(&["add", "--all"]).await?;
        Ok(())
    }

    async fn commit(&self, title: &str, body: &str) -> RemoteResult<String> {
        self.tool.run(&["commit", "-m", title, "-m", body]).await?;
        self.head_sha().await
    }

    async fn push(&self, branch: &str, force: bool) -> RemoteResult<()> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        let mut args = vec!["push"];
        if force {
            args.push("--force");
        }
        args.extend([self.remote.as_str(), refspec.as_str()]);
        self.tool.run(&args).await?;
        Ok(())
    }

    async fn stash(&self) -> RemoteResult<bool> {
        if !self.has_changes().await? {
            return Ok(false);
        }
        self.tool
            .run(&["stash", "push", "--include-untracked", "-m", "promote"])
            .await?;
        Ok(true)
    }

    async fn drop_stash(&self) -> RemoteResult<()> {
        self.tool.run(&["stash", "drop"]).await?;
        Ok(())
    }

    async fn checkout_remote_branch(&self, branch: &str) -> RemoteResult<()> {
        let remote_ref = format!("{}/{branch}", self.remote);
        self.tool.run(&["fetch", self.remote.as_str(), branch]).await?;
        self.tool
            .run(&["checkout", "-B", branch, remote_ref.as_str()])
            .await?;
        Ok(())
    }

    async fn rebase_onto(&self, target: &str) -> RemoteResult<RebaseOutcome> {
        let upstream = format!("{}/{target}", self.remote);
        self.tool.run(&["fetch", self.remote.as_str(), target]).await?;

        let out = self.tool.capture(&["rebase", upstream.as_str()]).await?;
        if out.success() {
            return Ok(RebaseOutcome::Clean);
        }

        let reason = first_line(&out.stdout, &out.stderr);
        if let Err(err) = self.tool.run(&["rebase", "--abort"]).await {
            warn!(error = %err, "rebase --abort failed");
        }
        Ok(RebaseOutcome::Conflict { reason })
    }

    async fn remote_sha(&self, branch: &str) -> RemoteResult<String> {
        let remote_ref = format!("refs/remotes/{}/{branch}", self.remote);
        let out = self
            .tool
            .run(&["rev-parse", "--verify", remote_ref.as_str()])
            .await?;
        let sha = out.stdout.trim().to_string();
        if sha.is_empty() {
            return Err(RemoteError::UnexpectedOutput {
                command: out.command,
                reason: "empty output".to_string(),
            });
        }
        Ok(sha)
    }
}

fn first_line(stdout: &str, stderr: &str) -> String {
    stdout
        .lines()
        .chain(stderr.lines())
        .find(|l| l.contains("CONFLICT"))
        .or_else(|| stderr.lines().find(|l| !l.trim().is_empty()))
        .unwrap_or("rebase failed")
        .trim()
        .to_string()
}
