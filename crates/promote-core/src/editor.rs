//! Manifest editor abstraction and the kustomize-backed implementation.
//!
//! The pipeline never touches overlay files directly: it reads declared
//! images/charts and requests edits through [`ManifestEditor`].
//! [`KustomizeEditor`] reads `kustomization.yaml` with `serde_yaml`, sets
//! images through `kustomize edit set image` and rewrites chart versions
//! in place followed by `kustomize cfg fmt`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::domain::{ChartValue, ImageValue};
use crate::error::EditorError;

/// File names kustomize accepts, in lookup order.
pub const KUSTOMIZATION_FILES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// An `images` entry as declared in an overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredImage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl DeclaredImage {
    /// The value this declaration pins, if it pins anything.
    pub fn value(&self) -> Option<ImageValue> {
        if self.new_name.is_none() && self.new_tag.is_none() {
            return None;
        }
        Some(ImageValue {
            new_name: self.new_name.clone().unwrap_or_else(|| self.name.clone()),
            new_tag: self.new_tag.clone(),
        })
    }

    /// Whether writing `value` would leave this declaration unchanged.
    pub fn satisfies(&self, value: &ImageValue) -> bool {
        let current_name = self.new_name.as_deref().unwrap_or(&self.name);
        if current_name != value.new_name {
            return false;
        }
        match &value.new_tag {
            Some(tag) => self.new_tag.as_deref() == Some(tag.as_str()),
            None => true,
        }
    }
}

/// A `helmCharts` entry as declared in an overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredChart {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
}

impl DeclaredChart {
    pub fn satisfies(&self, value: &ChartValue) -> bool {
        if self.version.as_deref() != Some(value.version.as_str()) {
            return false;
        }
        match &value.release_name {
            Some(release) => self.release_name.as_deref() == Some(release.as_str()),
            None => true,
        }
    }
}

/// The parts of a kustomization file the promotion cares about.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    #[serde(default)]
    pub images: Vec<DeclaredImage>,
    #[serde(default)]
    pub helm_charts: Vec<DeclaredChart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEdit {
    pub name: String,
    pub value: ImageValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartEdit {
    pub name: String,
    pub value: ChartValue,
}

/// Read and write access to overlay manifests.
///
/// Implementations must apply each `set_*` call as one unit for the
/// overlay; callers guarantee no two calls for the same overlay overlap.
#[async_trait]
pub trait ManifestEditor: Send + Sync {
    /// Images currently declared by `overlay`.
    async fn read_images(&self, overlay: &str) -> Result<Vec<DeclaredImage>, EditorError>;

    /// Helm charts currently declared by `overlay`.
    async fn read_charts(&self, overlay: &str) -> Result<Vec<DeclaredChart>, EditorError>;

    /// Set every image in `edits` inside `overlay`.
    async fn set_images(&self, overlay: &str, edits: &[ImageEdit]) -> Result<(), EditorError>;

    /// Set every chart in `edits` inside `overlay`.
    async fn set_charts(&self, overlay: &str, edits: &[ChartEdit]) -> Result<(), EditorError>;
}

/// Editor backed by the `kustomize` binary and the overlay files on disk.
#[derive(Debug, Clone)]
pub struct KustomizeEditor {
    deployment_dir: PathBuf,
    binary: PathBuf,
    format_after_write: bool,
}

impl KustomizeEditor {
    pub fn new(deployment_dir: impl Into<PathBuf>) -> Self {
        Self {
            deployment_dir: deployment_dir.into(),
            binary: PathBuf::from("kustomize"),
            format_after_write: true,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Skip `kustomize cfg fmt` after chart edits.
    pub fn without_formatting(mut self) -> Self {
        self.format_after_write = false;
        self
    }

    pub fn deployment_dir(&self) -> &Path {
        &self.deployment_dir
    }

    /// Fail early when the kustomize binary cannot be run.
    pub async fn verify_available(&self) -> Result<String, EditorError> {
        let output = self.run(&self.deployment_dir, &["version"]).await?;
        Ok(output.trim().to_string())
    }

    fn overlay_dir(&self, overlay: &str) -> Result<PathBuf, EditorError> {
        let dir = self.deployment_dir.join(overlay);
        if !dir.is_dir() {
            return Err(EditorError::MissingOverlay {
                path: dir.display().to_string(),
            });
        }
        Ok(dir)
    }

    fn kustomization_path(&self, overlay: &str) -> Result<PathBuf, EditorError> {
        let dir = self.overlay_dir(overlay)?;
        KUSTOMIZATION_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| EditorError::MissingKustomization {
                overlay: overlay.to_string(),
            })
    }

    async fn load(&self, overlay: &str) -> Result<(PathBuf, String), EditorError> {
        let path = self.kustomization_path(overlay)?;
        let content = tokio::fs::read_to_string(&path).await?;
        Ok((path, content))
    }

    async fn read(&self, overlay: &str) -> Result<Kustomization, EditorError> {
        let (path, content) = self.load(overlay).await?;
        serde_yaml::from_str(&content).map_err(|e| EditorError::InvalidKustomization {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, EditorError> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        debug!(command = %command, dir = %dir.display(), "running editor command");

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(EditorError::ToolFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ManifestEditor for KustomizeEditor {
    async fn read_images(&self, overlay: &str) -> Result<Vec<DeclaredImage>, EditorError> {
        Ok(self.read(overlay).await?.images)
    }

    async fn read_charts(&self, overlay: &str) -> Result<Vec<DeclaredChart>, EditorError> {
        Ok(self.read(overlay).await?.helm_charts)
    }

    async fn set_images(&self, overlay: &str, edits: &[ImageEdit]) -> Result<(), EditorError> {
        if edits.is_empty() {
            return Ok(());
        }
        let dir = self.overlay_dir(overlay)?;
        let pairs: Vec<String> = edits
            .iter()
            .map(|e| e.value.kustomize_arg(&e.name))
            .collect();
        let mut args = vec!["edit", "set", "image"];
        args.extend(pairs.iter().map(String::as_str));
        self.run(&dir, &args).await?;
        Ok(())
    }

    async fn set_charts(&self, overlay: &str, edits: &[ChartEdit]) -> Result<(), EditorError> {
        if edits.is_empty() {
            return Ok(());
        }
        let (path, content) = self.load(overlay).await?;
        let updated = rewrite_chart_versions(overlay, &path, &content, edits)?;
        tokio::fs::write(&path, updated).await?;

        if self.format_after_write {
            let dir = self.overlay_dir(overlay)?;
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| KUSTOMIZATION_FILES[0].to_string());
            self.run(&dir, &["cfg", "fmt", file.as_str()]).await?;
        }
        Ok(())
    }
}

/// Apply chart edits to the YAML text of a kustomization file.
///
/// Only `version` and, when given, `releaseName` of matching `helmCharts`
/// entries change; every other key is preserved.
pub fn rewrite_chart_versions(
    overlay: &str,
    path: &Path,
    content: &str,
    edits: &[ChartEdit],
) -> Result<String, EditorError> {
    let invalid = |reason: String| EditorError::InvalidKustomization {
        path: path.display().to_string(),
        reason,
    };

    let mut doc: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| invalid(e.to_string()))?;

    for edit in edits {
        let not_declared = || EditorError::ChartNotDeclared {
            overlay: overlay.to_string(),
            chart: edit.name.clone(),
        };
        let charts = doc
            .get_mut("helmCharts")
            .and_then(serde_yaml::Value::as_sequence_mut)
            .ok_or_else(not_declared)?;

        let entry = charts
            .iter_mut()
            .filter_map(serde_yaml::Value::as_mapping_mut)
            .find(|m| m.get("name").and_then(serde_yaml::Value::as_str) == Some(edit.name.as_str()))
            .ok_or_else(not_declared)?;

        entry.insert(
            serde_yaml::Value::from("version"),
            serde_yaml::Value::from(edit.value.version.as_str()),
        );
        if let Some(release) = &edit.value.release_name {
            entry.insert(
                serde_yaml::Value::from("releaseName"),
                serde_yaml::Value::from(release.as_str()),
            );
        }
    }

    serde_yaml::to_string(&doc).map_err(|e| invalid(e.to_string()))
}
