//! The promotion manifest: every applied change, keyed by overlay.
//!
//! The manifest is the unit of truth for a run. It feeds the commit
//! message and the output document, so every derived view is a pure
//! function of the stored entries and comes back sorted.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// An image change applied to one overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedImage {
    pub name: String,
    pub new_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tag: Option<String>,
}

impl AppliedImage {
    /// `name:newTag`, or just `name` when only the image name changed.
    pub fn compact(&self) -> String {
        match &self.new_tag {
            Some(tag) => format!("{}:{tag}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A chart change applied to one overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChart {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
}

/// Changes applied to a single overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<AppliedImage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<AppliedChart>,
}

impl OverlayResult {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.charts.is_empty()
    }
}

/// Overlay path → applied changes.
///
/// Invariant: no key maps to an empty [`OverlayResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    overlays: BTreeMap<String, OverlayResult>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the changes applied to `overlay`. Empty results are dropped.
    pub fn record(&mut self, overlay: impl Into<String>, result: OverlayResult) {
        if result.is_empty() {
            return;
        }
        let entry = self.overlays.entry(overlay.into()).or_default();
        entry.images.extend(result.images);
        entry.charts.extend(result.charts);
    }

    /// Fold every overlay of `other` into this manifest.
    pub fn merge(&mut self, other: Manifest) {
        for (overlay, result) in other.overlays {
            self.record(overlay, result);
        }
    }

    pub fn get(&self, overlay: &str) -> Option<&OverlayResult> {
        self.overlays.get(overlay)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OverlayResult)> {
        self.overlays.iter()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Overlay paths that received at least one change, sorted.
    pub fn overlays(&self) -> Vec<String> {
        self.overlays.keys().cloned().collect()
    }

    /// Unique image names touched, sorted.
    pub fn images(&self) -> Vec<String> {
        self.overlays
            .values()
            .flat_map(|r| r.images.iter().map(|i| i.name.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Unique chart names touched, sorted.
    pub fn charts(&self) -> Vec<String> {
        self.overlays
            .values()
            .flat_map(|r| r.charts.iter().map(|c| c.name.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Unique `name:newTag` entries for every updated image, sorted.
    pub fn images_updated(&self) -> Vec<String> {
        self.overlays
            .values()
            .flat_map(|r| r.images.iter().map(AppliedImage::compact))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Canonical JSON (keys ordered by overlay path).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// SHA-256 hex digest of the canonical JSON.
    pub fn digest(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json()?.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Freeze the manifest before delivery.
    pub fn freeze(self) -> FrozenManifest {
        FrozenManifest(Arc::new(self))
    }
}

/// Read-only, cheaply clonable manifest handed to delivery and output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenManifest(Arc<Manifest>);

impl Deref for FrozenManifest {
    type Target = Manifest;

    fn deref(&self) -> &Manifest {
        &self.0
    }
}
