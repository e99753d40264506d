use std::sync::Arc;

use promote_core::fakes::MemoryEditor;
use promote_core::{parse_promotion, Mutator, MutatorConfig, PromoteError, Resolver};

fn editor_with_three_envs() -> Arc<MemoryEditor> {
    let editor = Arc::new(MemoryEditor::new());
    editor.declare_image("env/dev", "web", None, Some("1.4.0"));
    editor.declare_image("env/qa", "web", None, Some("1.3.0"));
    editor.declare_image("env/prod", "web", None, Some("1.2.0"));
    editor.declare_chart("env/dev", "lighthouse", Some("1.1.0"), Some("tillamook"));
    editor.declare_chart("env/prod", "lighthouse", Some("1.0.0"), Some("lighthouse-prod"));
    editor
}

async fn run(
    editor: Arc<MemoryEditor>,
    images: &str,
    charts: Option<&str>,
) -> promote_core::Result<promote_core::Manifest> {
    let set = parse_promotion(Some(images), charts)?;
    let mut resolver = Resolver::new(editor.clone());
    let mutations = resolver.resolve_set(&set).await?;
    Mutator::new(editor, MutatorConfig::default()).apply(&mutations).await
}

#[tokio::test]
async fn from_overlay_matches_direct_value() {
    let copied = editor_with_three_envs();
    run(
        copied.clone(),
        r#"[{"name":"web","fromOverlay":"env/dev","overlays":["env/prod"]}]"#,
        None,
    )
    .await
    .unwrap();

    let direct = editor_with_three_envs();
    run(
        direct.clone(),
        r#"[{"name":"web","newTag":"1.4.0","overlays":["env/prod"]}]"#,
        None,
    )
    .await
    .unwrap();

    assert_eq!(copied.snapshot(), direct.snapshot());
}

#[tokio::test]
async fn copied_chart_keeps_target_release_name() {
    let editor = editor_with_three_envs();
    let manifest = run(
        editor.clone(),
        r#"[]"#,
        Some(r#"[{"name":"lighthouse","fromOverlay":"env/dev","overlays":["env/prod"]}]"#),
    )
    .await
    .unwrap();

    let chart = editor.chart("env/prod", "lighthouse").unwrap();
    assert_eq!(chart.version.as_deref(), Some("1.1.0"));
    assert_eq!(chart.release_name.as_deref(), Some("lighthouse-prod"));
    assert_eq!(manifest.charts(), vec!["lighthouse"]);
}

#[tokio::test]
async fn manifest_keys_are_exactly_the_changed_overlays() {
    let editor = editor_with_three_envs();
    let manifest = run(
        editor,
        r#"[{"name":"web","newTag":"1.4.0","overlays":["env/dev","env/qa","env/prod"]}]"#,
        None,
    )
    .await
    .unwrap();

    // env/dev already pins 1.4.0
    assert_eq!(manifest.overlays(), vec!["env/prod", "env/qa"]);
    assert_eq!(manifest.images_updated(), vec!["web:1.4.0"]);
}

#[tokio::test]
async fn missing_source_leaves_every_overlay_untouched() {
    let editor = editor_with_three_envs();
    let before = editor.snapshot();

    let err = run(
        editor.clone(),
        r#"[
            {"name":"web","newTag":"9.9.9","overlays":["env/qa"]},
            {"name":"ghost","fromOverlay":"env/dev","overlays":["env/prod"]}
        ]"#,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PromoteError::SourceNotFound { kind: "image", .. }));
    assert_eq!(editor.snapshot(), before);
    assert!(!editor.calls().iter().any(|c| c.starts_with("set_")));
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let editor = editor_with_three_envs();
    let images = r#"[{"name":"web","newTag":"2.0.0","overlays":["env/dev","env/prod"]}]"#;

    let first = run(editor.clone(), images, None).await.unwrap();
    let second = run(editor, images, None).await.unwrap();

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
}

#[tokio::test]
async fn overlays_are_never_edited_concurrently() {
    let editor = Arc::new(MemoryEditor::new());
    for env in ["a", "b", "c", "d", "e"] {
        editor.add_overlay(&format!("env/{env}"));
    }
    let set = parse_promotion(
        Some(
            r#"[
                {"name":"web","newTag":"1","overlays":["env/a","env/b","env/c","env/d","env/e"]},
                {"name":"api","newTag":"2","overlays":["env/a","env/b","env/c","env/d","env/e"]}
            ]"#,
        ),
        Some("[]"),
    )
    .unwrap();
    let mutations = Resolver::new(editor.clone()).resolve_set(&set).await.unwrap();
    Mutator::new(editor.clone(), MutatorConfig { max_parallel: 3 })
        .apply(&mutations)
        .await
        .unwrap();

    assert!(!editor.overlapped());
    assert_eq!(
        editor.image("env/c", "api").unwrap().new_tag.as_deref(),
        Some("2")
    );
}

#[tokio::test]
async fn failing_overlay_is_a_mutation_error() {
    let editor = editor_with_three_envs();
    editor.fail_on("env/qa");

    let err = run(
        editor,
        r#"[{"name":"web","newTag":"2.0.0","overlays":["env/qa"]}]"#,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PromoteError::Mutation { ref overlay, .. } if overlay == "env/qa"));
    assert_eq!(err.exit_code(), 4);
}
