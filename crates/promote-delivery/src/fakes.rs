//! In-memory fakes for the git and pull-request collaborators (testing only)
//!
//! `FakeGit` treats a shared [`MemoryEditor`] as the working tree: commits
//! and stashes are snapshots of it. `FakeHost` keeps open pull requests by
//! head branch and serves scripted status checks.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use promote_core::fakes::{EditorSnapshot, MemoryEditor};

use crate::checks::CheckRun;
use crate::error::{RemoteError, RemoteResult};
use crate::git::{Git, RebaseOutcome};
use crate::host::{PullRequest, PullRequestHost};

fn injected(command: &str, stderr: &str) -> RemoteError {
    RemoteError::CommandFailed {
        command: command.to_string(),
        status: "exit code 1".to_string(),
        stderr: stderr.to_string(),
    }
}

/// A branch tip: tree, commit SHA and the target SHA it is based on.
#[derive(Debug, Clone)]
struct Tip {
    tree: EditorSnapshot,
    sha: String,
    base: Option<String>,
}

#[derive(Debug)]
struct GitState {
    current: String,
    local: BTreeMap<String, Tip>,
    remote: BTreeMap<String, Tip>,
    stash: Option<EditorSnapshot>,
    commits: Vec<(String, String)>,
    calls: Vec<String>,
    next_sha: u64,
    rebase_conflict: bool,
    fail_push: bool,
}

impl GitState {
    fn mint_sha(&mut self) -> String {
        let sha = sha(self.next_sha);
        self.next_sha += 1;
        sha
    }

    fn head(&self, command: &str) -> RemoteResult<&Tip> {
        self.local
            .get(&self.current)
            .ok_or_else(|| injected(command, "no HEAD"))
    }
}

/// In-memory git repository over a [`MemoryEditor`] working tree.
///
/// Moving the remote target (see [`FakeGit::advance_remote_branch`]) never
/// touches overlay files, so a rebase onto it keeps the tree and only
/// rewrites the SHA.
#[derive(Debug)]
pub struct FakeGit {
    worktree: Arc<MemoryEditor>,
    state: Mutex<GitState>,
}

impl FakeGit {
    /// Repository on `main` whose HEAD and `origin/main` match the worktree.
    pub fn new(worktree: Arc<MemoryEditor>) -> Self {
        let main = Tip {
            tree: worktree.snapshot(),
            sha: sha(0),
            base: None,
        };
        let mut local = BTreeMap::new();
        local.insert("main".to_string(), main.clone());
        let mut remote = BTreeMap::new();
        remote.insert("main".to_string(), main);
        Self {
            worktree,
            state: Mutex::new(GitState {
                current: "main".to_string(),
                local,
                remote,
                stash: None,
                commits: Vec::new(),
                calls: Vec::new(),
                next_sha: 1,
                rebase_conflict: false,
                fail_push: false,
            }),
        }
    }

    /// Publish a remote branch holding `snapshot`, based on the remote `main`.
    pub fn seed_remote_branch(&self, branch: &str, snapshot: EditorSnapshot) {
        let mut state = self.state.lock().unwrap();
        let base = state.remote.get("main").map(|tip| tip.sha.clone());
        let sha = state.mint_sha();
        state.remote.insert(
            branch.to_string(),
            Tip {
                tree: snapshot,
                sha,
                base,
            },
        );
    }

    /// Land an unrelated commit on the remote `branch`.
    pub fn advance_remote_branch(&self, branch: &str) {
        let mut state = self.state.lock().unwrap();
        let sha = state.mint_sha();
        if let Some(tip) = state.remote.get_mut(branch) {
            tip.sha = sha;
        }
    }

    pub fn conflict_on_rebase(&self) {
        self.state.lock().unwrap().rebase_conflict = true;
    }

    pub fn fail_push(&self) {
        self.state.lock().unwrap().fail_push = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// `(title, body)` of every commit, oldest first.
    pub fn commits(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn current_branch(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    /// Tree last pushed to `branch`.
    pub fn remote_branch(&self, branch: &str) -> Option<EditorSnapshot> {
        self.state
            .lock()
            .unwrap()
            .remote
            .get(branch)
            .map(|tip| tip.tree.clone())
    }

    /// SHA last pushed to `branch`.
    pub fn remote_tip(&self, branch: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .remote
            .get(branch)
            .map(|tip| tip.sha.clone())
    }

    pub fn remote_branches(&self) -> Vec<String> {
        self.state.lock().unwrap().remote.keys().cloned().collect()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn sha(n: u64) -> String {
    format!("{:040x}", 0xabc0_0000_u64 + n)
}

#[async_trait]
impl Git for FakeGit {
    async fn has_changes(&self) -> RemoteResult<bool> {
        self.record("has_changes".to_string());
        let state = self.state.lock().unwrap();
        let committed = state.local.get(&state.current).map(|tip| &tip.tree);
        Ok(committed != Some(&self.worktree.snapshot()))
    }

    async fn head_sha(&self) -> RemoteResult<String> {
        self.record("head_sha".to_string());
        let state = self.state.lock().unwrap();
        state
            .local
            .get(&state.current)
            .map(|tip| tip.sha.clone())
            .ok_or_else(|| injected("git rev-parse HEAD", "unknown revision"))
    }

    async fn create_branch(&self, branch: &str) -> RemoteResult<()> {
        self.record(format!("create_branch {branch}"));
        let mut state = self.state.lock().unwrap();
        if state.local.contains_key(branch) {
            return Err(injected("git checkout -b", "branch already exists"));
        }
        let head = state.head("git checkout -b")?;
        let tip = Tip {
            base: Some(head.sha.clone()),
            ..head.clone()
        };
        state.local.insert(branch.to_string(), tip);
        state.current = branch.to_string();
        Ok(())
    }

    async fn stage_all(&self) -> RemoteResult<()> {
        self.record("stage_all".to_string());
        Ok(())
    }

    async fn commit(&self, title: &str, body: &str) -> RemoteResult<String> {
        self.record(format!("commit {title}"));
        let snapshot = self.worktree.snapshot();
        let mut state = self.state.lock().unwrap();
        let base = state.head("git commit")?;
        if base.tree == snapshot {
            return Err(injected("git commit", "nothing to commit, working tree clean"));
        }
        let base = base.base.clone();
        let new_sha = state.mint_sha();
        let current = state.current.clone();
        state.local.insert(
            current,
            Tip {
                tree: snapshot,
                sha: new_sha.clone(),
                base,
            },
        );
        state.commits.push((title.to_string(), body.to_string()));
        Ok(new_sha)
    }

    async fn push(&self, branch: &str, force: bool) -> RemoteResult<()> {
        self.record(format!("push {branch} force={force}"));
        let mut state = self.state.lock().unwrap();
        if state.fail_push {
            return Err(injected("git push", "remote rejected"));
        }
        let head = state.head("git push")?.clone();
        state.remote.insert(branch.to_string(), head);
        Ok(())
    }

    async fn stash(&self) -> RemoteResult<bool> {
        self.record("stash".to_string());
        let snapshot = self.worktree.snapshot();
        let mut state = self.state.lock().unwrap();
        let committed = state.head("git stash")?.tree.clone();
        if committed == snapshot {
            return Ok(false);
        }
        state.stash = Some(snapshot);
        self.worktree.restore(&committed);
        Ok(true)
    }

    async fn drop_stash(&self) -> RemoteResult<()> {
        self.record("drop_stash".to_string());
        let mut state = self.state.lock().unwrap();
        state
            .stash
            .take()
            .map(|_| ())
            .ok_or_else(|| injected("git stash drop", "No stash entries found."))
    }

    async fn checkout_remote_branch(&self, branch: &str) -> RemoteResult<()> {
        self.record(format!("checkout_remote_branch {branch}"));
        let mut state = self.state.lock().unwrap();
        let tip = state
            .remote
            .get(branch)
            .cloned()
            .ok_or_else(|| injected("git fetch", "couldn't find remote ref"))?;
        self.worktree.restore(&tip.tree);
        state.local.insert(branch.to_string(), tip);
        state.current = branch.to_string();
        Ok(())
    }

    async fn rebase_onto(&self, target: &str) -> RemoteResult<RebaseOutcome> {
        self.record(format!("rebase_onto {target}"));
        let mut state = self.state.lock().unwrap();
        if state.rebase_conflict {
            return Ok(RebaseOutcome::Conflict {
                reason: "CONFLICT (content): Merge conflict in env/prod/kustomization.yaml"
                    .to_string(),
            });
        }
        let upstream = state
            .remote
            .get(target)
            .map(|tip| tip.sha.clone())
            .ok_or_else(|| injected("git fetch", "couldn't find remote ref"))?;
        if state.head("git rebase")?.base.as_deref() == Some(upstream.as_str()) {
            return Ok(RebaseOutcome::Clean);
        }
        let rewritten = state.mint_sha();
        let current = state.current.clone();
        if let Some(tip) = state.local.get_mut(&current) {
            tip.sha = rewritten;
            tip.base = Some(upstream);
        }
        Ok(RebaseOutcome::Clean)
    }

    async fn remote_sha(&self, branch: &str) -> RemoteResult<String> {
        self.record(format!("remote_sha {branch}"));
        self.remote_tip(branch)
            .ok_or_else(|| injected("git rev-parse", "unknown revision"))
    }
}

#[derive(Debug, Default)]
struct HostState {
    open: BTreeMap<String, PullRequest>,
    /// Merged pull requests by head branch; `view` still returns them.
    merged_prs: BTreeMap<String, PullRequest>,
    next_number: u64,
    checks: VecDeque<RemoteResult<Vec<CheckRun>>>,
    view_failures: u32,
    labels: BTreeMap<String, Vec<String>>,
    merged: Vec<String>,
    calls: Vec<String>,
}

/// In-memory pull-request host.
///
/// Checks default to a single passing run once the scripted sequence is
/// exhausted.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open pull request for `head` and return it.
    pub fn open_pull_request(&self, head: &str) -> PullRequest {
        let mut state = self.state.lock().unwrap();
        state.next_number += 1;
        let pr = PullRequest {
            number: state.next_number,
            url: format!("https://github.com/acme/deploy/pull/{}", state.next_number),
            state: "OPEN".to_string(),
        };
        state.open.insert(head.to_string(), pr.clone());
        pr
    }

    /// Register an already merged pull request for `head`.
    pub fn merged_pull_request(&self, head: &str) -> PullRequest {
        let mut state = self.state.lock().unwrap();
        state.next_number += 1;
        let pr = PullRequest {
            number: state.next_number,
            url: format!("https://github.com/acme/deploy/pull/{}", state.next_number),
            state: "MERGED".to_string(),
        };
        state.merged_prs.insert(head.to_string(), pr.clone());
        pr
    }

    /// Serve these check results in order, one per read.
    pub fn script_checks(&self, results: Vec<RemoteResult<Vec<CheckRun>>>) {
        self.state.lock().unwrap().checks.extend(results);
    }

    /// Fail the next `count` view queries with an unexpected error.
    pub fn fail_views(&self, count: u32) {
        self.state.lock().unwrap().view_failures = count;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn open_heads(&self) -> Vec<String> {
        self.state.lock().unwrap().open.keys().cloned().collect()
    }

    pub fn labels(&self, head: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .labels
            .get(head)
            .cloned()
            .unwrap_or_default()
    }

    pub fn merged(&self) -> Vec<String> {
        self.state.lock().unwrap().merged.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl PullRequestHost for FakeHost {
    async fn list_open_head_branches(&self, base: &str) -> RemoteResult<Vec<String>> {
        self.record(format!("list_open_head_branches {base}"));
        Ok(self.open_heads())
    }

    async fn view(&self, branch: &str) -> RemoteResult<Option<PullRequest>> {
        self.record(format!("view {branch}"));
        let mut state = self.state.lock().unwrap();
        if state.view_failures > 0 {
            state.view_failures -= 1;
            return Err(injected("gh pr view", "HTTP 502: Bad Gateway"));
        }
        Ok(state
            .open
            .get(branch)
            .or_else(|| state.merged_prs.get(branch))
            .cloned())
    }

    async fn create(&self, branch: &str, base: &str) -> RemoteResult<PullRequest> {
        self.record(format!("create {branch} -> {base}"));
        if self.state.lock().unwrap().open.contains_key(branch) {
            return Err(injected("gh pr create", "a pull request already exists"));
        }
        Ok(self.open_pull_request(branch))
    }

    async fn add_labels(&self, branch: &str, labels: &[String]) -> RemoteResult<()> {
        self.record(format!("add_labels {branch} {}", labels.join(",")));
        self.state
            .lock()
            .unwrap()
            .labels
            .entry(branch.to_string())
            .or_default()
            .extend(labels.iter().cloned());
        Ok(())
    }

    async fn checks(&self, branch: &str) -> RemoteResult<Vec<CheckRun>> {
        self.record(format!("checks {branch}"));
        let mut state = self.state.lock().unwrap();
        state
            .checks
            .pop_front()
            .unwrap_or_else(|| Ok(vec![CheckRun::new("build", "pass")]))
    }

    async fn merge(&self, branch: &str) -> RemoteResult<()> {
        self.record(format!("merge {branch}"));
        let mut state = self.state.lock().unwrap();
        let Some(mut pr) = state.open.remove(branch) else {
            return Err(injected("gh pr merge", "no pull requests found"));
        };
        pr.state = "MERGED".to_string();
        state.merged_prs.insert(branch.to_string(), pr);
        state.merged.push(branch.to_string());
        Ok(())
    }
}
