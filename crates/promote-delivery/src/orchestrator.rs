//! Delivery of overlay changes to the deployment repository.
//!
//! Two methods are supported:
//!
//! - `push`: commit on the current branch and push it to the target branch.
//! - `pull_request`: commit on a promotion branch, open (or reuse) a pull
//!   request, wait for its status checks and optionally squash-merge it.
//!
//! With aggregation enabled, a run whose unique key matches an open
//! promotion branch rebases that branch onto the target and replays the
//! run's mutations on it instead of opening a second pull request.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use promote_core::{obs, FrozenManifest, Mutator, PromoteError, ResolvedMutation, Result, RunContext};

use crate::branch::{branch_name, branch_prefix, find_reusable};
use crate::checks::{classify, poll_checks, CheckRun, CheckStatus, PollPolicy};
use crate::error::RemoteError;
use crate::git::{Git, RebaseOutcome};
use crate::host::{PullRequest, PullRequestHost};
use crate::message::CommitMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Push,
    PullRequest,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Push => "push",
            DeliveryMethod::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMethod {
    type Err = PromoteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "push" => Ok(DeliveryMethod::Push),
            "pull_request" | "pull-request" => Ok(DeliveryMethod::PullRequest),
            other => Err(PromoteError::Config(format!(
                "unknown delivery method '{other}' (expected push or pull_request)"
            ))),
        }
    }
}

/// How to deliver the changes of one run.
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    pub method: DeliveryMethod,
    /// Deployment repository, `owner/name`.
    pub repository: String,
    pub target_branch: String,
    /// Stop after the local commit.
    pub dry_run: bool,
    /// Reuse an open promotion branch with the same unique key.
    pub aggregate: bool,
    pub unique_key: Option<String>,
    pub auto_merge: bool,
    pub labels: Vec<String>,
    pub poll: PollPolicy,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            method: DeliveryMethod::Push,
            repository: String::new(),
            target_branch: "main".to_string(),
            dry_run: false,
            aggregate: false,
            unique_key: None,
            auto_merge: false,
            labels: Vec::new(),
            poll: PollPolicy::default(),
        }
    }
}

impl DeliveryOptions {
    pub fn validate(&self) -> Result<()> {
        if self.target_branch.trim().is_empty() {
            return Err(PromoteError::Config("target branch must not be empty".to_string()));
        }
        if self.poll.attempts == 0 {
            return Err(PromoteError::Config(
                "poll attempts must be at least 1".to_string(),
            ));
        }
        if self.method == DeliveryMethod::PullRequest {
            if self.repository.trim().is_empty() {
                return Err(PromoteError::Config(
                    "pull_request delivery needs the deployment repository".to_string(),
                ));
            }
            if self.aggregate && self.unique_key().is_none() {
                return Err(PromoteError::Config(
                    "aggregation needs a unique key".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn unique_key(&self) -> Option<&str> {
        self.unique_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// How a delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The working tree was clean; nothing was committed.
    NoChanges,
    /// Committed locally; nothing was pushed.
    DryRun,
    Pushed,
    PullRequestOpen,
    PullRequestMerged,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::NoChanges => "no_changes",
            DeliveryOutcome::DryRun => "dry_run",
            DeliveryOutcome::Pushed => "pushed",
            DeliveryOutcome::PullRequestOpen => "pull_request_open",
            DeliveryOutcome::PullRequestMerged => "pull_request_merged",
        }
    }
}

/// Steps of a delivery, named in logs and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStep {
    DetectChanges,
    ResolveSha,
    FindBranch,
    Stash,
    Checkout,
    Rebase,
    CreateBranch,
    Stage,
    Commit,
    Push,
    FindPullRequest,
    CreatePullRequest,
    Label,
    Merge,
}

impl DeliveryStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStep::DetectChanges => "detect-changes",
            DeliveryStep::ResolveSha => "resolve-sha",
            DeliveryStep::FindBranch => "find-branch",
            DeliveryStep::Stash => "stash",
            DeliveryStep::Checkout => "checkout",
            DeliveryStep::Rebase => "rebase",
            DeliveryStep::CreateBranch => "create-branch",
            DeliveryStep::Stage => "stage",
            DeliveryStep::Commit => "commit",
            DeliveryStep::Push => "push",
            DeliveryStep::FindPullRequest => "find-pull-request",
            DeliveryStep::CreatePullRequest => "create-pull-request",
            DeliveryStep::Label => "label",
            DeliveryStep::Merge => "merge",
        }
    }

    fn fail(self) -> impl FnOnce(RemoteError) -> PromoteError {
        move |err| PromoteError::delivery(self.as_str(), err)
    }
}

/// What a delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    pub outcome: Option<DeliveryOutcome>,
    pub branch: Option<String>,
    /// Whether an existing promotion branch was reused.
    pub reused_branch: bool,
    pub commit_sha: Option<String>,
    pub commit_url: Option<String>,
    pub pull_request: Option<PullRequest>,
    /// Whether an open pull request already existed for the branch.
    pub pr_existed: bool,
    /// Final status of the pull request's checks.
    pub checks: Option<CheckStatus>,
    pub check_runs: Vec<CheckRun>,
}

impl DeliveryReport {
    fn finished(mut self, outcome: DeliveryOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn outcome(&self) -> DeliveryOutcome {
        self.outcome.unwrap_or(DeliveryOutcome::NoChanges)
    }
}

struct PreparedBranch {
    name: String,
    reused: bool,
}

pub struct Orchestrator {
    git: Arc<dyn Git>,
    host: Arc<dyn PullRequestHost>,
    mutator: Arc<Mutator>,
}

impl Orchestrator {
    pub fn new(git: Arc<dyn Git>, host: Arc<dyn PullRequestHost>, mutator: Arc<Mutator>) -> Self {
        Self { git, host, mutator }
    }

    /// Deliver the working-tree changes described by `manifest`.
    ///
    /// `mutations` are the run's resolved mutations; they are replayed when
    /// an aggregated branch is reused. Every failure names its step.
    pub async fn deliver(
        &self,
        ctx: &RunContext,
        manifest: &FrozenManifest,
        mutations: &[ResolvedMutation],
        options: &DeliveryOptions,
    ) -> Result<DeliveryReport> {
        options.validate()?;

        let dirty = self
            .git
            .has_changes()
            .await
            .map_err(DeliveryStep::DetectChanges.fail())?;
        if !dirty {
            info!("working tree is clean; nothing to deliver");
            obs::emit_delivery_step(DeliveryStep::DetectChanges.as_str(), "no changes");
            return Ok(DeliveryReport::default().finished(DeliveryOutcome::NoChanges));
        }

        let message = CommitMessage::compose(manifest, ctx)?;
        match options.method {
            DeliveryMethod::Push => self.deliver_push(ctx, &message, options).await,
            DeliveryMethod::PullRequest => {
                self.deliver_pull_request(ctx, &message, mutations, options)
                    .await
            }
        }
    }

    async fn deliver_push(
        &self,
        ctx: &RunContext,
        message: &CommitMessage,
        options: &DeliveryOptions,
    ) -> Result<DeliveryReport> {
        let sha = self.commit(message).await?;
        let report = DeliveryReport {
            branch: Some(options.target_branch.clone()),
            commit_url: commit_url(ctx, options, &sha),
            commit_sha: Some(sha),
            ..DeliveryReport::default()
        };

        if options.dry_run {
            info!("dry run: skipping push");
            return Ok(report.finished(DeliveryOutcome::DryRun));
        }

        self.git
            .push(&options.target_branch, false)
            .await
            .map_err(DeliveryStep::Push.fail())?;
        obs::emit_delivery_step(DeliveryStep::Push.as_str(), &options.target_branch);
        Ok(report.finished(DeliveryOutcome::Pushed))
    }

    async fn deliver_pull_request(
        &self,
        ctx: &RunContext,
        message: &CommitMessage,
        mutations: &[ResolvedMutation],
        options: &DeliveryOptions,
    ) -> Result<DeliveryReport> {
        let branch = self.prepare_branch(ctx, mutations, options).await?;

        let has_diff = !branch.reused
            || self
                .git
                .has_changes()
                .await
                .map_err(DeliveryStep::DetectChanges.fail())?;
        let (sha, needs_push) = if has_diff {
            (self.commit(message).await?, true)
        } else {
            info!(branch = %branch.name, "reused branch already holds these values");
            let head = self
                .git
                .head_sha()
                .await
                .map_err(DeliveryStep::ResolveSha.fail())?;
            let remote_tip = self
                .git
                .remote_sha(&branch.name)
                .await
                .map_err(DeliveryStep::ResolveSha.fail())?;
            // The rebase rewrote the branch; the remote must follow.
            let rebased = head != remote_tip;
            if rebased {
                debug!(
                    branch = %branch.name,
                    head = %head,
                    remote = %remote_tip,
                    "rebased branch differs from remote"
                );
            }
            (head, rebased)
        };

        let mut report = DeliveryReport {
            branch: Some(branch.name.clone()),
            reused_branch: branch.reused,
            commit_url: commit_url(ctx, options, &sha),
            commit_sha: Some(sha),
            ..DeliveryReport::default()
        };

        if options.dry_run {
            info!(branch = %branch.name, "dry run: skipping push and pull request");
            return Ok(report.finished(DeliveryOutcome::DryRun));
        }

        if needs_push {
            self.git
                .push(&branch.name, true)
                .await
                .map_err(DeliveryStep::Push.fail())?;
            obs::emit_delivery_step(DeliveryStep::Push.as_str(), &branch.name);
        }

        let existing = self.find_pull_request(&branch.name).await?;
        report.pr_existed = existing.is_some();
        let pull_request = match existing {
            Some(pr) => {
                info!(url = %pr.url, "pull request already open");
                pr
            }
            None => {
                let pr = self
                    .host
                    .create(&branch.name, &options.target_branch)
                    .await
                    .map_err(DeliveryStep::CreatePullRequest.fail())?;
                obs::emit_delivery_step(DeliveryStep::CreatePullRequest.as_str(), &pr.url);
                pr
            }
        };

        if !options.labels.is_empty() {
            self.host
                .add_labels(&branch.name, &options.labels)
                .await
                .map_err(DeliveryStep::Label.fail())?;
            obs::emit_delivery_step(DeliveryStep::Label.as_str(), &options.labels.join(","));
        }

        let check_runs = poll_checks(
            self.host.as_ref(),
            &branch.name,
            &pull_request.url,
            &options.poll,
        )
        .await?;

        report.checks = Some(classify(&check_runs));
        report.check_runs = check_runs;
        report.pull_request = Some(pull_request.clone());
        if options.auto_merge {
            self.host
                .merge(&branch.name)
                .await
                .map_err(DeliveryStep::Merge.fail())?;
            obs::emit_delivery_step(DeliveryStep::Merge.as_str(), &pull_request.url);
            return Ok(report.finished(DeliveryOutcome::PullRequestMerged));
        }

        info!(url = %pull_request.url, "pull request ready");
        Ok(report.finished(DeliveryOutcome::PullRequestOpen))
    }

    async fn prepare_branch(
        &self,
        ctx: &RunContext,
        mutations: &[ResolvedMutation],
        options: &DeliveryOptions,
    ) -> Result<PreparedBranch> {
        let overlays: Vec<String> = mutations
            .iter()
            .map(|m| m.target_overlay().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let source_sha = match ctx.source_sha() {
            Some(sha) => sha.to_string(),
            None => self
                .git
                .head_sha()
                .await
                .map_err(DeliveryStep::ResolveSha.fail())?,
        };

        let key = match (options.aggregate, options.unique_key()) {
            (true, Some(key)) => key,
            _ => ctx.run_key(),
        };
        let prefix = branch_prefix(&options.repository, &options.target_branch, &overlays, key);

        if options.aggregate {
            let heads = self
                .host
                .list_open_head_branches(&options.target_branch)
                .await
                .map_err(DeliveryStep::FindBranch.fail())?;
            if let Some(existing) = find_reusable(&prefix, &heads) {
                info!(branch = %existing, "reusing open promotion branch");
                self.reuse_branch(&existing, mutations, options).await?;
                return Ok(PreparedBranch {
                    name: existing,
                    reused: true,
                });
            }
        }

        let name = branch_name(&prefix, &source_sha);
        self.git
            .create_branch(&name)
            .await
            .map_err(DeliveryStep::CreateBranch.fail())?;
        obs::emit_delivery_step(DeliveryStep::CreateBranch.as_str(), &name);
        Ok(PreparedBranch {
            name,
            reused: false,
        })
    }

    /// Move onto `branch`, rebase it and replay the mutations there.
    async fn reuse_branch(
        &self,
        branch: &str,
        mutations: &[ResolvedMutation],
        options: &DeliveryOptions,
    ) -> Result<()> {
        let stashed = self.git.stash().await.map_err(DeliveryStep::Stash.fail())?;
        self.git
            .checkout_remote_branch(branch)
            .await
            .map_err(DeliveryStep::Checkout.fail())?;

        match self
            .git
            .rebase_onto(&options.target_branch)
            .await
            .map_err(DeliveryStep::Rebase.fail())?
        {
            RebaseOutcome::Clean => {}
            RebaseOutcome::Conflict { reason } => {
                return Err(PromoteError::RebaseConflict {
                    branch: branch.to_string(),
                    onto: format!("origin/{}", options.target_branch),
                    reason,
                })
            }
        }
        obs::emit_delivery_step(DeliveryStep::Rebase.as_str(), branch);

        let replayed = self.mutator.apply(mutations).await?;
        debug!(overlays = replayed.len(), "mutations replayed on reused branch");

        if stashed {
            self.git
                .drop_stash()
                .await
                .map_err(DeliveryStep::Stash.fail())?;
        }
        Ok(())
    }

    async fn commit(&self, message: &CommitMessage) -> Result<String> {
        self.git
            .stage_all()
            .await
            .map_err(DeliveryStep::Stage.fail())?;
        let sha = self
            .git
            .commit(&message.title, &message.body)
            .await
            .map_err(DeliveryStep::Commit.fail())?;
        obs::emit_delivery_step(DeliveryStep::Commit.as_str(), &sha);
        Ok(sha)
    }

    /// Look up the open pull request of `branch`, tolerating one failed query.
    ///
    /// Closed and merged pull requests left over from an earlier branch of
    /// the same name do not count.
    async fn find_pull_request(&self, branch: &str) -> Result<Option<PullRequest>> {
        let found = match self.host.view(branch).await {
            Ok(found) => found,
            Err(err) => {
                obs::emit_remote_tolerated(DeliveryStep::FindPullRequest.as_str(), &err);
                self.host
                    .view(branch)
                    .await
                    .map_err(DeliveryStep::FindPullRequest.fail())?
            }
        };
        match found {
            Some(pr) if !pr.is_open() => {
                debug!(url = %pr.url, state = %pr.state, "ignoring pull request that is not open");
                Ok(None)
            }
            other => Ok(other),
        }
    }
}

fn commit_url(ctx: &RunContext, options: &DeliveryOptions, sha: &str) -> Option<String> {
    let repo = options.repository.trim();
    (!repo.is_empty()).then(|| ctx.commit_url(repo, sha))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parses_both_spellings() {
        assert_eq!("push".parse::<DeliveryMethod>().unwrap(), DeliveryMethod::Push);
        assert_eq!(
            "pull_request".parse::<DeliveryMethod>().unwrap(),
            DeliveryMethod::PullRequest
        );
        assert!("merge".parse::<DeliveryMethod>().is_err());
    }

    #[test]
    fn aggregation_needs_a_key() {
        let options = DeliveryOptions {
            method: DeliveryMethod::PullRequest,
            repository: "acme/deploy".to_string(),
            aggregate: true,
            unique_key: Some("  ".to_string()),
            ..DeliveryOptions::default()
        };
        assert!(matches!(options.validate(), Err(PromoteError::Config(_))));
    }

    #[test]
    fn pull_request_needs_repository() {
        let options = DeliveryOptions {
            method: DeliveryMethod::PullRequest,
            ..DeliveryOptions::default()
        };
        assert!(options.validate().is_err());
        assert!(DeliveryOptions::default().validate().is_ok());
    }

    #[test]
    fn failures_name_their_step() {
        let err = DeliveryStep::Push.fail()(RemoteError::UnexpectedOutput {
            command: "git push".to_string(),
            reason: "rejected".to_string(),
        });
        assert!(matches!(err, PromoteError::Delivery { ref step, .. } if step == "push"));
    }
}
