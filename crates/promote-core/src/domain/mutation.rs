//! Concrete values written into overlays.

use std::fmt;

use serde::{Deserialize, Serialize};

/// New image reference for a kustomize `images` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageValue {
    pub new_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tag: Option<String>,
}

impl ImageValue {
    /// Argument for `kustomize edit set image`, e.g. `nginx=nginx:1.25.0`.
    pub fn kustomize_arg(&self, name: &str) -> String {
        match &self.new_tag {
            Some(tag) => format!("{name}={}:{tag}", self.new_name),
            None => format!("{name}={}", self.new_name),
        }
    }
}

/// New chart reference for a kustomize `helmCharts` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartValue {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Image,
    Chart,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Image => "image",
            MutationKind::Chart => "chart",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationValue {
    Image(ImageValue),
    Chart(ChartValue),
}

/// A single write: one value into one target overlay.
///
/// Produced by the resolver once per (request × target overlay) pair.
/// Fields are private so a mutation cannot change after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedMutation {
    name: String,
    value: MutationValue,
    target_overlay: String,
}

impl ResolvedMutation {
    pub fn image(name: impl Into<String>, value: ImageValue, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: MutationValue::Image(value),
            target_overlay: target.into(),
        }
    }

    pub fn chart(name: impl Into<String>, value: ChartValue, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: MutationValue::Chart(value),
            target_overlay: target.into(),
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self.value {
            MutationValue::Image(_) => MutationKind::Image,
            MutationValue::Chart(_) => MutationKind::Chart,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &MutationValue {
        &self.value
    }

    pub fn target_overlay(&self) -> &str {
        &self.target_overlay
    }
}

impl fmt::Display for ResolvedMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            MutationValue::Image(v) => write!(
                f,
                "{} -> {}",
                v.kustomize_arg(&self.name),
                self.target_overlay
            ),
            MutationValue::Chart(v) => write!(
                f,
                "{}@{} -> {}",
                self.name, v.version, self.target_overlay
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kustomize_arg_with_and_without_tag() {
        let tagged = ImageValue {
            new_name: "quz".to_string(),
            new_tag: Some("whizbang".to_string()),
        };
        assert_eq!(tagged.kustomize_arg("foo"), "foo=quz:whizbang");

        let renamed = ImageValue {
            new_name: "quz".to_string(),
            new_tag: None,
        };
        assert_eq!(renamed.kustomize_arg("foo"), "foo=quz");
    }

    #[test]
    fn mutation_kind_follows_value() {
        let m = ResolvedMutation::chart(
            "lighthouse",
            ChartValue {
                version: "1.0.0".to_string(),
                release_name: None,
            },
            "env/dev",
        );
        assert_eq!(m.kind(), MutationKind::Chart);
        assert_eq!(m.to_string(), "lighthouse@1.0.0 -> env/dev");
    }
}
