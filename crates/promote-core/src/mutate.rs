//! Overlay mutation.
//!
//! Groups resolved mutations by target overlay and applies each group in
//! one sequential task: images first (a single batched editor call), then
//! charts. Groups for different overlays touch disjoint files and run
//! concurrently, bounded by [`MutatorConfig::max_parallel`].

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::domain::{MutationValue, ResolvedMutation};
use crate::editor::{ChartEdit, ImageEdit, ManifestEditor};
use crate::error::{PromoteError, Result};
use crate::manifest::{AppliedChart, AppliedImage, Manifest, OverlayResult};
use crate::obs;

#[derive(Debug, Clone)]
pub struct MutatorConfig {
    /// Maximum number of overlays edited at the same time.
    pub max_parallel: usize,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self { max_parallel: 4 }
    }
}

pub struct Mutator {
    editor: Arc<dyn ManifestEditor>,
    config: MutatorConfig,
}

impl Mutator {
    pub fn new(editor: Arc<dyn ManifestEditor>, config: MutatorConfig) -> Self {
        Self { editor, config }
    }

    /// Apply every mutation and return the manifest of applied changes.
    ///
    /// Values already in place are skipped, so an overlay whose requests
    /// are all satisfied does not appear in the manifest. The first
    /// failure aborts; overlays already edited stay edited on disk.
    pub async fn apply(&self, mutations: &[ResolvedMutation]) -> Result<Manifest> {
        let mut groups: BTreeMap<&str, Vec<&ResolvedMutation>> = BTreeMap::new();
        for mutation in mutations {
            groups
                .entry(mutation.target_overlay())
                .or_default()
                .push(mutation);
        }

        let results: Vec<(String, OverlayResult)> = stream::iter(groups)
            .map(|(overlay, group)| async move {
                let result = self.apply_overlay(overlay, &group).await?;
                Ok::<_, PromoteError>((overlay.to_string(), result))
            })
            .buffer_unordered(self.config.max_parallel.max(1))
            .try_collect()
            .await?;

        let mut manifest = Manifest::new();
        for (overlay, result) in results {
            manifest.record(overlay, result);
        }
        info!(overlays = manifest.len(), "overlay mutations applied");
        Ok(manifest)
    }

    async fn apply_overlay(
        &self,
        overlay: &str,
        group: &[&ResolvedMutation],
    ) -> Result<OverlayResult> {
        let mut image_edits = Vec::new();
        let mut chart_edits = Vec::new();
        for mutation in group {
            match mutation.value() {
                MutationValue::Image(value) => image_edits.push(ImageEdit {
                    name: mutation.name().to_string(),
                    value: value.clone(),
                }),
                MutationValue::Chart(value) => chart_edits.push(ChartEdit {
                    name: mutation.name().to_string(),
                    value: value.clone(),
                }),
            }
        }

        let mut result = OverlayResult::default();

        if !image_edits.is_empty() {
            let declared = self
                .editor
                .read_images(overlay)
                .await
                .map_err(|e| mutation_error(overlay, "images", e))?;
            image_edits.retain(|edit| {
                let satisfied = declared
                    .iter()
                    .any(|d| d.name == edit.name && d.satisfies(&edit.value));
                if satisfied {
                    debug!(overlay = %overlay, image = %edit.name, "image already up to date");
                }
                !satisfied
            });

            if !image_edits.is_empty() {
                self.editor
                    .set_images(overlay, &image_edits)
                    .await
                    .map_err(|e| mutation_error(overlay, &describe_images(&image_edits), e))?;
                for edit in &image_edits {
                    obs::emit_overlay_mutated(overlay, "image", &edit.value.kustomize_arg(&edit.name));
                }
                result.images = image_edits
                    .into_iter()
                    .map(|edit| AppliedImage {
                        name: edit.name,
                        new_name: edit.value.new_name,
                        new_tag: edit.value.new_tag,
                    })
                    .collect();
            }
        }

        if !chart_edits.is_empty() {
            let declared = self
                .editor
                .read_charts(overlay)
                .await
                .map_err(|e| mutation_error(overlay, "charts", e))?;
            let mut pending = Vec::with_capacity(chart_edits.len());
            for edit in chart_edits {
                let Some(current) = declared.iter().find(|d| d.name == edit.name) else {
                    return Err(PromoteError::Mutation {
                        overlay: overlay.to_string(),
                        item: format!("chart {}", edit.name),
                        reason: "chart is not declared under helmCharts".to_string(),
                    });
                };
                if current.satisfies(&edit.value) {
                    debug!(overlay = %overlay, chart = %edit.name, "chart already up to date");
                    continue;
                }
                pending.push(edit);
            }

            if !pending.is_empty() {
                self.editor
                    .set_charts(overlay, &pending)
                    .await
                    .map_err(|e| mutation_error(overlay, &describe_charts(&pending), e))?;
                for edit in &pending {
                    obs::emit_overlay_mutated(
                        overlay,
                        "chart",
                        &format!("{}@{}", edit.name, edit.value.version),
                    );
                }
                result.charts = pending
                    .into_iter()
                    .map(|edit| AppliedChart {
                        name: edit.name,
                        version: edit.value.version,
                        release_name: edit.value.release_name,
                    })
                    .collect();
            }
        }

        Ok(result)
    }
}

fn describe_images(edits: &[ImageEdit]) -> String {
    let names: Vec<&str> = edits.iter().map(|e| e.name.as_str()).collect();
    format!("image {}", names.join(", "))
}

fn describe_charts(edits: &[ChartEdit]) -> String {
    let names: Vec<&str> = edits.iter().map(|e| e.name.as_str()).collect();
    format!("chart {}", names.join(", "))
}

fn mutation_error(overlay: &str, item: &str, err: impl std::fmt::Display) -> PromoteError {
    PromoteError::Mutation {
        overlay: overlay.to_string(),
        item: item.to_string(),
        reason: err.to_string(),
    }
}
