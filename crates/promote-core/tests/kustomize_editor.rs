use std::fs;
use std::path::Path;

use promote_core::{
    ChartEdit, ChartValue, EditorError, KustomizeEditor, ManifestEditor,
};

fn write_overlay(root: &Path, overlay: &str, file: &str, content: &str) {
    let dir = root.join(overlay);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), content).unwrap();
}

const DEV: &str = r#"apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
images:
  - name: nginx
    newTag: 1.25.0
helmCharts:
  - name: lighthouse
    repo: https://charts.example.com
    version: 1.0.0
    releaseName: tillamook
"#;

#[tokio::test]
async fn reads_images_and_charts_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    write_overlay(tmp.path(), "env/dev", "kustomization.yaml", DEV);
    let editor = KustomizeEditor::new(tmp.path());

    let images = editor.read_images("env/dev").await.unwrap();
    let charts = editor.read_charts("env/dev").await.unwrap();

    assert_eq!(images[0].name, "nginx");
    assert_eq!(images[0].new_tag.as_deref(), Some("1.25.0"));
    assert_eq!(charts[0].version.as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn alternate_kustomization_file_names_are_found() {
    let tmp = tempfile::tempdir().unwrap();
    write_overlay(tmp.path(), "env/qa", "Kustomization", DEV);
    let editor = KustomizeEditor::new(tmp.path());

    assert_eq!(editor.read_images("env/qa").await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_overlay_and_file_are_distinct_errors() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("env/empty")).unwrap();
    let editor = KustomizeEditor::new(tmp.path());

    let err = editor.read_images("env/nowhere").await.unwrap_err();
    assert!(matches!(err, EditorError::MissingOverlay { .. }));

    let err = editor.read_images("env/empty").await.unwrap_err();
    assert!(matches!(err, EditorError::MissingKustomization { .. }));
}

#[tokio::test]
async fn chart_version_is_rewritten_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    write_overlay(tmp.path(), "env/dev", "kustomization.yaml", DEV);
    let editor = KustomizeEditor::new(tmp.path()).without_formatting();

    editor
        .set_charts(
            "env/dev",
            &[ChartEdit {
                name: "lighthouse".to_string(),
                value: ChartValue {
                    version: "1.1.0".to_string(),
                    release_name: None,
                },
            }],
        )
        .await
        .unwrap();

    let charts = editor.read_charts("env/dev").await.unwrap();
    assert_eq!(charts[0].version.as_deref(), Some("1.1.0"));
    assert_eq!(charts[0].release_name.as_deref(), Some("tillamook"));
    let images = editor.read_images("env/dev").await.unwrap();
    assert_eq!(images[0].new_tag.as_deref(), Some("1.25.0"));
}

#[tokio::test]
async fn missing_binary_fails_verification() {
    let tmp = tempfile::tempdir().unwrap();
    let editor =
        KustomizeEditor::new(tmp.path()).with_binary("/nonexistent/kustomize-binary");

    assert!(editor.verify_available().await.is_err());
}
