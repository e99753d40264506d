//! Promotion requests as supplied by the caller.

use serde::{Deserialize, Serialize};

/// One entry of the `images` input list, exactly as deserialized.
///
/// All fields are optional here; [`crate::spec`] enforces which
/// combinations are legal before anything becomes a [`PromotionRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawImageItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_overlay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlays: Option<Vec<String>>,
}

/// One entry of the `charts` input list, exactly as deserialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawChartItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_overlay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlays: Option<Vec<String>>,
}

/// A validated promotion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionRequest {
    /// Set an image to an explicit name and/or tag.
    DirectImage {
        name: String,
        /// Defaults to `name` when absent.
        new_name: Option<String>,
        new_tag: Option<String>,
        overlays: Vec<String>,
    },
    /// Copy an image's current value from another overlay.
    FromOverlayImage {
        name: String,
        source_overlay: String,
        overlays: Vec<String>,
    },
    /// Set a chart to an explicit version.
    DirectChart {
        name: String,
        release_name: Option<String>,
        version: String,
        overlays: Vec<String>,
    },
    /// Copy a chart's current version from another overlay.
    FromOverlayChart {
        name: String,
        source_overlay: String,
        overlays: Vec<String>,
    },
}

impl PromotionRequest {
    pub fn name(&self) -> &str {
        match self {
            PromotionRequest::DirectImage { name, .. }
            | PromotionRequest::FromOverlayImage { name, .. }
            | PromotionRequest::DirectChart { name, .. }
            | PromotionRequest::FromOverlayChart { name, .. } => name,
        }
    }

    /// Target overlays this request writes to.
    pub fn overlays(&self) -> &[String] {
        match self {
            PromotionRequest::DirectImage { overlays, .. }
            | PromotionRequest::FromOverlayImage { overlays, .. }
            | PromotionRequest::DirectChart { overlays, .. }
            | PromotionRequest::FromOverlayChart { overlays, .. } => overlays,
        }
    }

    /// The overlay values are copied from, if any.
    pub fn source_overlay(&self) -> Option<&str> {
        match self {
            PromotionRequest::FromOverlayImage { source_overlay, .. }
            | PromotionRequest::FromOverlayChart { source_overlay, .. } => Some(source_overlay),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            PromotionRequest::DirectImage { .. } | PromotionRequest::FromOverlayImage { .. }
        )
    }
}
