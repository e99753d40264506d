//! Promote Delivery Library
//!
//! Commits promoted overlays and delivers them by direct push or through a
//! pull request with branch reuse and status-check polling.

pub mod branch;
pub mod checks;
pub mod error;
pub mod fakes;
pub mod git;
pub mod host;
pub mod message;
pub mod orchestrator;
pub mod pipeline;
pub mod process;

pub use checks::{classify, poll_checks, CheckRun, CheckStatus, PollPolicy};
pub use error::{RemoteError, RemoteResult};
pub use git::{Git, GitCli, RebaseOutcome};
pub use host::{GhCli, PullRequest, PullRequestHost};
pub use message::CommitMessage;
pub use orchestrator::{
    DeliveryMethod, DeliveryOptions, DeliveryOutcome, DeliveryReport, DeliveryStep, Orchestrator,
};
pub use pipeline::{PromotionInput, PromotionPipeline, PromotionRun};
