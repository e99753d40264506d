//! End-to-end promotion: parse, resolve, mutate, deliver, report.

use std::sync::Arc;

use tracing::info;

use promote_core::{
    obs, parse_promotion, ManifestEditor, Mutator, MutatorConfig, PromotionOutput, Resolver,
    Result, RunContext,
};

use crate::git::Git;
use crate::host::PullRequestHost;
use crate::orchestrator::{DeliveryOptions, DeliveryOutcome, DeliveryReport, Orchestrator};

/// Raw caller input of one run.
#[derive(Debug, Clone, Default)]
pub struct PromotionInput {
    /// JSON list of image items.
    pub images: Option<String>,
    /// JSON list of chart items.
    pub charts: Option<String>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PromotionRun {
    pub output: PromotionOutput,
    pub report: DeliveryReport,
}

pub struct PromotionPipeline {
    editor: Arc<dyn ManifestEditor>,
    mutator: Arc<Mutator>,
    orchestrator: Orchestrator,
}

impl PromotionPipeline {
    pub fn new(
        editor: Arc<dyn ManifestEditor>,
        git: Arc<dyn Git>,
        host: Arc<dyn PullRequestHost>,
        config: MutatorConfig,
    ) -> Self {
        let mutator = Arc::new(Mutator::new(editor.clone(), config));
        Self {
            orchestrator: Orchestrator::new(git, host, mutator.clone()),
            editor,
            mutator,
        }
    }

    pub async fn run(
        &self,
        ctx: &RunContext,
        input: &PromotionInput,
        options: &DeliveryOptions,
    ) -> Result<PromotionRun> {
        obs::PromotionSpan::new(ctx.run_key())
            .instrument(self.run_inner(ctx, input, options))
            .await
    }

    async fn run_inner(
        &self,
        ctx: &RunContext,
        input: &PromotionInput,
        options: &DeliveryOptions,
    ) -> Result<PromotionRun> {
        options.validate()?;

        let set = parse_promotion(input.images.as_deref(), input.charts.as_deref())?;
        obs::emit_promotion_started(ctx.run_key(), set.images.len(), set.charts.len());

        let mutations = Resolver::new(self.editor.clone()).resolve_set(&set).await?;
        let manifest = self.mutator.apply(&mutations).await?.freeze();
        info!(
            overlays = manifest.len(),
            digest = %manifest.digest()?,
            "manifest frozen"
        );

        let report = self
            .orchestrator
            .deliver(ctx, &manifest, &mutations, options)
            .await?;

        let outcome = report.outcome();
        let output = match outcome {
            DeliveryOutcome::NoChanges => PromotionOutput::empty(),
            _ => {
                let mut output = PromotionOutput::from_manifest(&manifest);
                if let Some(sha) = &report.commit_sha {
                    output = output.with_commit(sha, report.commit_url.clone());
                }
                output.with_pull_request(report.pull_request.as_ref().map(|pr| pr.url.clone()))
            }
        }
        .with_outcome(outcome.as_str());

        obs::emit_promotion_finished(outcome.as_str(), output.overlays.len());
        Ok(PromotionRun { output, report })
    }
}
