//! Promote - kustomize overlay promotion CLI
//!
//! The `promote` command updates image and chart values across kustomize
//! overlays of a deployment repository and delivers the change by direct
//! push or through a pull request.
//!
//! Every flag can also be set through the environment, so the binary runs
//! unchanged as a GitHub Actions step. The run's output document is printed
//! on stdout and, when `$GITHUB_OUTPUT` is set, appended there as well.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};

use promote_core::{
    init_tracing, KustomizeEditor, MutatorConfig, PromoteError, PromotionOutput, Provenance,
    RunContext,
};
use promote_delivery::{
    DeliveryMethod, DeliveryOptions, GhCli, GitCli, PollPolicy, PromotionInput, PromotionPipeline,
};

#[derive(Parser, Debug)]
#[command(name = "promote")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Promote images and Helm charts between kustomize overlays", long_about = None)]
struct Cli {
    /// JSON list of images to update
    #[arg(long, env = "IMAGES_TO_UPDATE")]
    images: Option<String>,

    /// JSON list of Helm charts to update
    #[arg(long, env = "CHARTS_TO_UPDATE")]
    charts: Option<String>,

    /// How to deliver the change
    #[arg(long, value_enum, env = "PROMOTION_METHOD", default_value = "push")]
    method: MethodArg,

    /// Deployment repository (`owner/name`)
    #[arg(long, env = "GITHUB_REPOSITORY", default_value = "")]
    repository: String,

    /// Branch the promotion lands on
    #[arg(long, env = "TARGET_BRANCH", default_value = "main")]
    target_branch: String,

    /// Checkout of the deployment repository
    #[arg(long, env = "DEPLOYMENT_DIR", default_value = ".")]
    deployment_dir: PathBuf,

    /// Commit locally but do not push or open a pull request
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Reuse an open promotion pull request with the same unique key
    #[arg(long, env = "AGGREGATE_PR_CHANGES")]
    aggregate: bool,

    /// Stable key identifying aggregated promotions
    #[arg(long, env = "AGGREGATE_PR_UNIQUE_KEY")]
    unique_key: Option<String>,

    /// Squash-merge the pull request once checks pass
    #[arg(long, env = "AUTO_MERGE")]
    auto_merge: bool,

    /// Labels to add to the pull request
    #[arg(long, env = "PR_LABELS", value_delimiter = ',')]
    labels: Vec<String>,

    /// Number of status-check reads before giving up
    #[arg(long, env = "POLL_ATTEMPTS", default_value_t = 10)]
    poll_attempts: u32,

    /// Seconds between status-check reads
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 30)]
    poll_interval_secs: u64,

    /// Maximum number of overlays edited concurrently
    #[arg(long, env = "MAX_PARALLEL", default_value_t = 4)]
    max_parallel: usize,

    /// Abort the whole run after this many seconds
    #[arg(long, env = "PROMOTION_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[arg(long, env = "KUSTOMIZE_BIN", default_value = "kustomize")]
    kustomize_bin: PathBuf,

    #[arg(long, env = "GIT_BIN", default_value = "git")]
    git_bin: PathBuf,

    #[arg(long, env = "GH_BIN", default_value = "gh")]
    gh_bin: PathBuf,

    /// File to append step outputs to
    #[arg(long, env = "GITHUB_OUTPUT")]
    github_output: Option<PathBuf>,

    #[command(flatten)]
    provenance: ProvenanceArgs,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

/// What the CI host reports about the triggering run.
#[derive(clap::Args, Debug, Default)]
struct ProvenanceArgs {
    #[arg(long, env = "GITHUB_EVENT_NAME", hide = true)]
    event_name: Option<String>,

    #[arg(long, env = "GITHUB_JOB", hide = true)]
    job: Option<String>,

    #[arg(long, env = "GITHUB_RUN_ID", hide = true)]
    run_id: Option<String>,

    #[arg(long, env = "GITHUB_RUN_ATTEMPT", hide = true)]
    run_attempt: Option<String>,

    #[arg(long, env = "GITHUB_ACTOR", hide = true)]
    actor: Option<String>,

    /// Repository the promoted artifacts were built from (defaults to --repository)
    #[arg(long, env = "SOURCE_REPOSITORY", hide = true)]
    source_repository: Option<String>,

    #[arg(long, env = "GITHUB_REF", hide = true)]
    source_ref: Option<String>,

    #[arg(long, env = "GITHUB_SHA", hide = true)]
    source_sha: Option<String>,

    #[arg(long, env = "GITHUB_SERVER_URL", hide = true, default_value = promote_core::DEFAULT_SERVER_URL)]
    server_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    Push,
    #[value(name = "pull_request", alias = "pull-request")]
    PullRequest,
}

impl From<MethodArg> for DeliveryMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Push => DeliveryMethod::Push,
            MethodArg::PullRequest => DeliveryMethod::PullRequest,
        }
    }
}

impl Cli {
    fn run_context(&self) -> RunContext {
        let p = &self.provenance;
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        let provenance = Provenance {
            event_name: non_empty(&p.event_name),
            job: non_empty(&p.job),
            run_id: non_empty(&p.run_id),
            run_attempt: non_empty(&p.run_attempt),
            actor: non_empty(&p.actor),
            source_repository: non_empty(&p.source_repository)
                .or_else(|| non_empty(&Some(self.repository.clone()))),
            source_ref: non_empty(&p.source_ref),
            source_sha: non_empty(&p.source_sha),
        };
        RunContext::new(provenance, p.server_url.clone())
    }

    fn delivery_options(&self) -> Result<DeliveryOptions> {
        let poll = PollPolicy::new(
            self.poll_attempts,
            Duration::from_secs(self.poll_interval_secs),
        )?;
        Ok(DeliveryOptions {
            method: self.method.into(),
            repository: self.repository.trim().to_string(),
            target_branch: self.target_branch.trim().to_string(),
            dry_run: self.dry_run,
            aggregate: self.aggregate,
            unique_key: self.unique_key.clone(),
            auto_merge: self.auto_merge,
            labels: self
                .labels
                .iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            poll,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let github_output = cli.github_output.clone();
    match execute(cli).await {
        Ok(output) => {
            println!("{}", output.to_json()?);
            if let Some(path) = &github_output {
                write_github_output(&output, path).await?;
            }
            Ok(())
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "promotion failed");
            eprintln!("Error: {err:#}");
            // Callers read the outputs even when the run failed.
            if let Some(path) = &github_output {
                if let Err(write_err) = write_github_output(&PromotionOutput::empty(), path).await {
                    error!(error = %format!("{write_err:#}"), "failed to write empty outputs");
                }
            }
            std::process::exit(exit_code(&err));
        }
    }
}

async fn execute(cli: Cli) -> Result<PromotionOutput> {
    let ctx = cli.run_context();
    let options = cli.delivery_options()?;
    let dir = cli.deployment_dir.clone();

    if !dir.is_dir() {
        return Err(PromoteError::Config(format!(
            "deployment directory {} does not exist",
            dir.display()
        ))
        .into());
    }

    let editor = KustomizeEditor::new(&dir).with_binary(&cli.kustomize_bin);
    let version = editor.verify_available().await.map_err(|e| {
        PromoteError::Config(format!("kustomize is not available: {e}"))
    })?;
    info!(kustomize = %version, dir = %dir.display(), method = %options.method, "starting promotion");

    let git = GitCli::with_binary(&cli.git_bin, &dir);
    let mut gh = GhCli::with_binary(&cli.gh_bin, &dir);
    if !options.repository.is_empty() {
        gh = gh.with_repository(options.repository.clone());
    }

    let pipeline = PromotionPipeline::new(
        Arc::new(editor),
        Arc::new(git),
        Arc::new(gh),
        MutatorConfig {
            max_parallel: cli.max_parallel.max(1),
        },
    );
    let input = PromotionInput {
        images: cli.images.clone(),
        charts: cli.charts.clone(),
    };

    let timeout = cli.timeout_secs.map(Duration::from_secs);
    let run = tokio::select! {
        result = pipeline.run(&ctx, &input, &options) => result?,
        _ = tokio::signal::ctrl_c() => {
            return Err(PromoteError::Cancelled("interrupted".to_string()).into());
        }
        _ = deadline(timeout) => {
            return Err(PromoteError::Cancelled(format!(
                "timed out after {}s",
                cli.timeout_secs.unwrap_or_default()
            ))
            .into());
        }
    };

    info!(
        outcome = run.report.outcome().as_str(),
        branch = ?run.report.branch,
        "promotion finished"
    );
    Ok(run.output)
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

async fn write_github_output(output: &PromotionOutput, path: &Path) -> Result<()> {
    output
        .append_github_output(path)
        .await
        .with_context(|| format!("Failed to write outputs to {}", path.display()))
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PromoteError>()
        .map(PromoteError::exit_code)
        .unwrap_or(1)
}
