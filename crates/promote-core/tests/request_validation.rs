use promote_core::{parse_promotion, ItemList, PromotionRequest, ValidationError};

#[test]
fn direct_image_parses_with_defaults() {
    let set = parse_promotion(
        Some(r#"[{"name":"nginx","newTag":"1.25.0","overlays":["env/dev"]}]"#),
        None,
    )
    .expect("valid image list");

    assert_eq!(set.len(), 1);
    assert_eq!(
        set.images[0],
        PromotionRequest::DirectImage {
            name: "nginx".to_string(),
            new_name: None,
            new_tag: Some("1.25.0".to_string()),
            overlays: vec!["env/dev".to_string()],
        }
    );
}

#[test]
fn both_lists_blank_is_nothing_to_promote() {
    for (images, charts) in [(None, None), (Some(""), Some("  ")), (Some("[]"), Some("[]"))] {
        let err = parse_promotion(images, charts).unwrap_err();
        assert_eq!(err, ValidationError::NothingToPromote);
    }
}

#[test]
fn from_overlay_with_tag_is_rejected() {
    let err = parse_promotion(
        Some(r#"[{"name":"web","newTag":"2","fromOverlay":"env/dev","overlays":["env/prod"]}]"#),
        None,
    )
    .unwrap_err();

    assert!(
        matches!(
            err,
            ValidationError::ConflictingSource { list: ItemList::Images, index: 0, field: "newTag", .. }
        ),
        "unexpected error: {err:?}"
    );
}

#[test]
fn image_without_any_value_is_rejected() {
    let err = parse_promotion(Some(r#"[{"name":"web","overlays":["env/dev"]}]"#), None)
        .unwrap_err();
    assert!(matches!(err, ValidationError::MissingValue { .. }));
}

#[test]
fn chart_needs_version_or_source() {
    let err = parse_promotion(None, Some(r#"[{"name":"redis","overlays":["env/dev"]}]"#))
        .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::MissingValue { list: ItemList::Charts, .. }
    ));

    let err = parse_promotion(
        None,
        Some(r#"[{"name":"redis","version":"1","fromOverlay":"env/dev","overlays":["env/qa"]}]"#),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::ConflictingSource { field: "version", .. }
    ));
}

#[test]
fn empty_overlays_and_unknown_fields_are_rejected() {
    let err = parse_promotion(Some(r#"[{"name":"web","newTag":"1","overlays":[]}]"#), None)
        .unwrap_err();
    assert!(matches!(err, ValidationError::EmptyOverlays { .. }));

    let err = parse_promotion(
        Some(r#"[{"name":"web","newTag":"1","overlays":["env/dev"],"tag":"x"}]"#),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::MalformedJson { .. }));
}

#[test]
fn duplicate_names_are_reported_together() {
    let err = parse_promotion(
        Some(
            r#"[
                {"name":"web","newTag":"1","overlays":["env/dev"]},
                {"name":"api","newTag":"1","overlays":["env/dev"]},
                {"name":"web","newTag":"2","overlays":["env/qa"]},
                {"name":"api","newTag":"2","overlays":["env/qa"]}
            ]"#,
        ),
        None,
    )
    .unwrap_err();

    assert_eq!(
        err,
        ValidationError::Duplicate {
            list: ItemList::Images,
            field: "name",
            values: vec!["api".to_string(), "web".to_string()],
        }
    );
}

#[test]
fn images_and_charts_combine() {
    let set = parse_promotion(
        Some(r#"[{"name":"web","fromOverlay":"env/dev","overlays":["env/prod"]}]"#),
        Some(r#"[{"name":"lighthouse","version":"1.0.0","releaseName":"tillamook","overlays":["env/dev"]}]"#),
    )
    .unwrap();

    let names: Vec<&str> = set.iter().map(PromotionRequest::name).collect();
    assert_eq!(names, vec!["web", "lighthouse"]);
    assert_eq!(set.images[0].source_overlay(), Some("env/dev"));
    assert!(!set.charts[0].is_image());
}
