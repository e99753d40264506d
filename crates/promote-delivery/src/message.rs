//! Structured commit message for a promotion.
//!
//! The title is for humans; the body carries a metadata block with the run
//! provenance and a copy of the manifest so a commit can be traced back to
//! the run that made it.

use promote_core::{FrozenManifest, Result, RunContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub title: String,
    pub body: String,
}

const MAX_TITLE_ITEMS: usize = 3;

impl CommitMessage {
    pub fn compose(manifest: &FrozenManifest, ctx: &RunContext) -> Result<Self> {
        Ok(Self {
            title: title(manifest),
            body: body(manifest, ctx)?,
        })
    }
}

fn title(manifest: &FrozenManifest) -> String {
    let mut items = manifest.images_updated();
    for (_, result) in manifest.iter() {
        for chart in &result.charts {
            let item = format!("{}@{}", chart.name, chart.version);
            if !items.contains(&item) {
                items.push(item);
            }
        }
    }

    let what = if items.is_empty() {
        "overlay changes".to_string()
    } else if items.len() > MAX_TITLE_ITEMS {
        format!(
            "{} and {} more",
            items[..MAX_TITLE_ITEMS].join(", "),
            items.len() - MAX_TITLE_ITEMS
        )
    } else {
        items.join(", ")
    };

    let overlays = manifest.overlays();
    if overlays.is_empty() {
        format!("Promote {what}")
    } else {
        format!("Promote {what} to {}", overlays.join(", "))
    }
}

fn body(manifest: &FrozenManifest, ctx: &RunContext) -> Result<String> {
    let p = ctx.provenance();
    let mut lines = Vec::new();

    let fields = [
        ("Trigger", p.event_name.clone()),
        ("Job", p.job.clone()),
        ("Actor", p.actor.clone()),
        ("Source-Ref", ctx.source_ref_url().or_else(|| p.source_ref.clone())),
        (
            "Source-Commit",
            match (&p.source_repository, &p.source_sha) {
                (Some(repo), Some(sha)) => Some(ctx.commit_url(repo, sha)),
                (None, sha) => sha.clone(),
                _ => None,
            },
        ),
        ("Run", ctx.run_url()),
        ("Run-Key", Some(ctx.run_key().to_string())),
        ("Started-At", Some(ctx.started_at().to_rfc3339())),
        ("Manifest-Digest", Some(format!("sha256:{}", manifest.digest()?))),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            lines.push(format!("{key}: {value}"));
        }
    }

    lines.push(String::new());
    lines.push("Manifest:".to_string());
    lines.push(serde_json::to_string_pretty(&**manifest)?);
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use promote_core::{AppliedChart, AppliedImage, Manifest, OverlayResult, Provenance};

    fn manifest() -> FrozenManifest {
        let mut manifest = Manifest::new();
        manifest.record(
            "env/dev",
            OverlayResult {
                images: vec![AppliedImage {
                    name: "nginx".to_string(),
                    new_name: "nginx".to_string(),
                    new_tag: Some("1.25.0".to_string()),
                }],
                charts: vec![AppliedChart {
                    name: "lighthouse".to_string(),
                    version: "1.1.0".to_string(),
                    release_name: None,
                }],
            },
        );
        manifest.freeze()
    }

    fn ctx() -> RunContext {
        RunContext::new(
            Provenance {
                event_name: Some("push".to_string()),
                job: Some("promote".to_string()),
                run_id: Some("42".to_string()),
                run_attempt: Some("1".to_string()),
                actor: None,
                source_repository: Some("acme/web".to_string()),
                source_ref: Some("refs/heads/main".to_string()),
                source_sha: Some("0123456789abcdef".to_string()),
            },
            "https://github.com",
        )
        .with_started_at(chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn title_names_items_and_overlays() {
        let msg = CommitMessage::compose(&manifest(), &ctx()).unwrap();
        assert_eq!(
            msg.title,
            "Promote nginx:1.25.0, lighthouse@1.1.0 to env/dev"
        );
    }

    #[test]
    fn body_embeds_provenance_and_manifest() {
        let manifest = manifest();
        let msg = CommitMessage::compose(&manifest, &ctx()).unwrap();

        assert!(msg.body.contains("Trigger: push"));
        assert!(msg.body.contains("Source-Ref: https://github.com/acme/web/tree/main"));
        assert!(msg
            .body
            .contains("Source-Commit: https://github.com/acme/web/commit/0123456789abcdef"));
        assert!(msg
            .body
            .contains("Run: https://github.com/acme/web/actions/runs/42/attempts/1"));
        assert!(msg.body.contains("Started-At: 2024-05-01T12:00:00+00:00"));
        assert!(msg
            .body
            .contains(&format!("Manifest-Digest: sha256:{}", manifest.digest().unwrap())));
        assert!(!msg.body.contains("Actor:"));

        let json = msg.body.split("Manifest:\n").nth(1).unwrap();
        let parsed: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(&parsed, &*manifest);
    }

    #[test]
    fn long_titles_are_summarised() {
        let mut m = Manifest::new();
        m.record(
            "env/dev",
            OverlayResult {
                images: ["a", "b", "c", "d", "e"]
                    .iter()
                    .map(|n| AppliedImage {
                        name: n.to_string(),
                        new_name: n.to_string(),
                        new_tag: Some("1".to_string()),
                    })
                    .collect(),
                charts: vec![],
            },
        );
        let msg = CommitMessage::compose(&m.freeze(), &RunContext::local()).unwrap();
        assert_eq!(msg.title, "Promote a:1, b:1, c:1 and 2 more to env/dev");
    }
}
