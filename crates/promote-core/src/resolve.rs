//! Cross-overlay resolution.
//!
//! Expands every [`PromotionRequest`] into one [`ResolvedMutation`] per
//! target overlay. `fromOverlay` requests read the value currently
//! declared by the source overlay; direct requests carry their value
//! already. Resolution is read-only and runs to completion before any
//! overlay is written, so a missing source never leaves partial edits.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{ChartValue, ImageValue, PromotionRequest, ResolvedMutation};
use crate::editor::{DeclaredChart, DeclaredImage, ManifestEditor};
use crate::error::{PromoteError, Result};
use crate::spec::PromotionSet;

pub struct Resolver {
    editor: Arc<dyn ManifestEditor>,
    images: HashMap<String, Vec<DeclaredImage>>,
    charts: HashMap<String, Vec<DeclaredChart>>,
}

impl Resolver {
    pub fn new(editor: Arc<dyn ManifestEditor>) -> Self {
        Self {
            editor,
            images: HashMap::new(),
            charts: HashMap::new(),
        }
    }

    /// Resolve every request of the set, images first.
    pub async fn resolve_set(&mut self, set: &PromotionSet) -> Result<Vec<ResolvedMutation>> {
        let mut mutations = Vec::new();
        for request in set.iter() {
            mutations.extend(self.resolve(request).await?);
        }
        info!(mutations = mutations.len(), "promotion resolved");
        Ok(mutations)
    }

    /// Resolve one request into a mutation per target overlay.
    pub async fn resolve(&mut self, request: &PromotionRequest) -> Result<Vec<ResolvedMutation>> {
        let mutations = match request {
            PromotionRequest::DirectImage {
                name,
                new_name,
                new_tag,
                overlays,
            } => {
                let value = ImageValue {
                    new_name: new_name.clone().unwrap_or_else(|| name.clone()),
                    new_tag: new_tag.clone(),
                };
                fan_out(overlays, |target| {
                    ResolvedMutation::image(name, value.clone(), target)
                })
            }
            PromotionRequest::FromOverlayImage {
                name,
                source_overlay,
                overlays,
            } => {
                let value = self.source_image(source_overlay, name).await?;
                debug!(image = %name, source = %source_overlay, value = %value.kustomize_arg(name), "copied image from overlay");
                fan_out(overlays, |target| {
                    ResolvedMutation::image(name, value.clone(), target)
                })
            }
            PromotionRequest::DirectChart {
                name,
                release_name,
                version,
                overlays,
            } => {
                let value = ChartValue {
                    version: version.clone(),
                    release_name: release_name.clone(),
                };
                fan_out(overlays, |target| {
                    ResolvedMutation::chart(name, value.clone(), target)
                })
            }
            PromotionRequest::FromOverlayChart {
                name,
                source_overlay,
                overlays,
            } => {
                let value = self.source_chart(source_overlay, name).await?;
                debug!(chart = %name, source = %source_overlay, version = %value.version, "copied chart from overlay");
                fan_out(overlays, |target| {
                    ResolvedMutation::chart(name, value.clone(), target)
                })
            }
        };
        Ok(mutations)
    }

    async fn source_image(&mut self, overlay: &str, name: &str) -> Result<ImageValue> {
        if !self.images.contains_key(overlay) {
            let declared = self
                .editor
                .read_images(overlay)
                .await
                .map_err(|e| unreadable(overlay, e))?;
            self.images.insert(overlay.to_string(), declared);
        }
        self.images
            .get(overlay)
            .and_then(|declared| declared.iter().find(|i| i.name == name))
            .and_then(DeclaredImage::value)
            .ok_or_else(|| PromoteError::SourceNotFound {
                overlay: overlay.to_string(),
                kind: "image",
                name: name.to_string(),
            })
    }

    /// Only the version is copied; the target keeps its own release name.
    async fn source_chart(&mut self, overlay: &str, name: &str) -> Result<ChartValue> {
        if !self.charts.contains_key(overlay) {
            let declared = self
                .editor
                .read_charts(overlay)
                .await
                .map_err(|e| unreadable(overlay, e))?;
            self.charts.insert(overlay.to_string(), declared);
        }
        self.charts
            .get(overlay)
            .and_then(|declared| declared.iter().find(|c| c.name == name))
            .and_then(|c| c.version.clone())
            .map(|version| ChartValue {
                version,
                release_name: None,
            })
            .ok_or_else(|| PromoteError::SourceNotFound {
                overlay: overlay.to_string(),
                kind: "chart",
                name: name.to_string(),
            })
    }
}

fn fan_out(
    overlays: &[String],
    make: impl Fn(&str) -> ResolvedMutation,
) -> Vec<ResolvedMutation> {
    overlays.iter().map(|target| make(target)).collect()
}

fn unreadable(overlay: &str, err: impl std::fmt::Display) -> PromoteError {
    PromoteError::SourceUnreadable {
        overlay: overlay.to_string(),
        reason: err.to_string(),
    }
}
