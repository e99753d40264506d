//! Output document of a promotion run.
//!
//! Callers consume the run either as one JSON document on stdout or
//! through the GitHub Actions `$GITHUB_OUTPUT` file. Every list is sorted
//! so downstream notification text is reproducible.

use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::manifest::Manifest;

/// Everything a caller may read after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PromotionOutput {
    pub manifest: Manifest,
    pub overlays: Vec<String>,
    pub images: Vec<String>,
    pub charts: Vec<String>,
    pub images_updated: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha_short: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl PromotionOutput {
    /// Output with every list empty; what a failed or no-op run reports.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            manifest: manifest.clone(),
            overlays: manifest.overlays(),
            images: manifest.images(),
            charts: manifest.charts(),
            images_updated: manifest.images_updated(),
            ..Self::default()
        }
    }

    pub fn with_commit(mut self, sha: &str, url: Option<String>) -> Self {
        self.commit_sha = Some(sha.to_string());
        self.commit_sha_short = Some(short_sha(sha).to_string());
        self.commit_url = url;
        self
    }

    pub fn with_pull_request(mut self, url: Option<String>) -> Self {
        self.pull_request_url = url;
        self
    }

    pub fn with_outcome(mut self, outcome: &str) -> Self {
        self.outcome = Some(outcome.to_string());
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `(key, value)` pairs in `$GITHUB_OUTPUT` naming.
    ///
    /// Name lists appear twice: comma-joined for display and as a JSON
    /// array under a `-json` suffix.
    pub fn github_outputs(&self) -> Result<Vec<(&'static str, String)>> {
        let mut pairs = vec![
            ("manifest", self.manifest.to_json()?),
            ("overlays", self.overlays.join(",")),
            ("overlays-json", serde_json::to_string(&self.overlays)?),
            ("images", self.images.join(",")),
            ("images-json", serde_json::to_string(&self.images)?),
            ("charts", self.charts.join(",")),
            ("charts-json", serde_json::to_string(&self.charts)?),
            ("images-updated", serde_json::to_string(&self.images_updated)?),
        ];
        let optional = [
            ("commit-sha", &self.commit_sha),
            ("commit-sha-short", &self.commit_sha_short),
            ("commit-url", &self.commit_url),
            ("pull-request-url", &self.pull_request_url),
            ("outcome", &self.outcome),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                pairs.push((key, value.clone()));
            }
        }
        Ok(pairs)
    }

    /// Render the `$GITHUB_OUTPUT` block with heredoc-delimited values.
    pub fn render_github_output(&self) -> Result<String> {
        let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4().simple());
        let mut out = String::new();
        for (key, value) in self.github_outputs()? {
            out.push_str(&format!("{key}<<{delimiter}\n{value}\n{delimiter}\n"));
        }
        Ok(out)
    }

    /// Append the rendered block to a `$GITHUB_OUTPUT` file.
    pub async fn append_github_output(&self, path: &Path) -> Result<()> {
        let rendered = self.render_github_output()?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(rendered.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// First seven characters of a commit SHA.
pub fn short_sha(sha: &str) -> &str {
    sha.char_indices().nth(7).map_or(sha, |(end, _)| &sha[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{AppliedImage, OverlayResult};

    #[test]
    fn short_sha_handles_short_and_non_ascii_input() {
        assert_eq!(short_sha("f00dfacecafebeef"), "f00dfac");
        assert_eq!(short_sha("abc"), "abc");
        assert_eq!(short_sha("abcdefé12"), "abcdefé");
        assert_eq!(short_sha("abcdef\u{1F600}x"), "abcdef\u{1F600}");
    }

    fn nginx_manifest() -> Manifest {
        let mut manifest = Manifest::new();
        manifest.record(
            "env/dev",
            OverlayResult {
                images: vec![AppliedImage {
                    name: "nginx".to_string(),
                    new_name: "nginx".to_string(),
                    new_tag: Some("1.25.0".to_string()),
                }],
                charts: vec![],
            },
        );
        manifest
    }

    #[test]
    fn empty_output_still_has_images_updated() {
        let json = PromotionOutput::empty().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["images-updated"], serde_json::json!([]));
        assert_eq!(value["manifest"], serde_json::json!({}));
    }

    #[test]
    fn github_outputs_join_and_encode_lists() {
        let output = PromotionOutput::from_manifest(&nginx_manifest())
            .with_commit("0123456789abcdef", Some("https://example.com/c".to_string()));
        let pairs = output.github_outputs().unwrap();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(get("images"), "nginx");
        assert_eq!(get("images-json"), r#"["nginx"]"#);
        assert_eq!(get("images-updated"), r#"["nginx:1.25.0"]"#);
        assert_eq!(get("commit-sha-short"), "0123456");
        assert!(!pairs.iter().any(|(k, _)| *k == "pull-request-url"));
    }

    #[test]
    fn rendered_block_uses_heredoc() {
        let rendered = PromotionOutput::empty().render_github_output().unwrap();
        let first = rendered.lines().next().unwrap();
        assert!(first.starts_with("manifest<<ghadelimiter_"));
        assert!(rendered.contains("images-updated<<"));
    }

    #[tokio::test]
    async fn append_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github_output");
        PromotionOutput::from_manifest(&nginx_manifest())
            .append_github_output(&path)
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("nginx:1.25.0"));
    }
}
