//! Promotion request parsing and validation.
//!
//! Turns the caller's `images` and `charts` JSON lists into
//! [`PromotionRequest`] values. Validation is all-or-nothing: the first
//! invalid item aborts the run before any overlay or git operation.

use std::collections::BTreeSet;

use tracing::debug;

use crate::domain::{PromotionRequest, RawChartItem, RawImageItem};
use crate::error::{ItemList, ValidationError};

/// Validated images and charts of one promotion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionSet {
    pub images: Vec<PromotionRequest>,
    pub charts: Vec<PromotionRequest>,
}

impl PromotionSet {
    /// Images first, then charts.
    pub fn iter(&self) -> impl Iterator<Item = &PromotionRequest> {
        self.images.iter().chain(self.charts.iter())
    }

    pub fn len(&self) -> usize {
        self.images.len() + self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse and validate both input lists.
///
/// `None` or blank input counts as an empty list, but at least one list
/// must contain an item.
pub fn parse_promotion(
    images_json: Option<&str>,
    charts_json: Option<&str>,
) -> Result<PromotionSet, ValidationError> {
    let raw_images: Vec<RawImageItem> = parse_list(images_json, ItemList::Images)?;
    let raw_charts: Vec<RawChartItem> = parse_list(charts_json, ItemList::Charts)?;

    if raw_images.is_empty() && raw_charts.is_empty() {
        return Err(ValidationError::NothingToPromote);
    }

    let set = PromotionSet {
        images: validate_images(&raw_images)?,
        charts: validate_charts(&raw_charts)?,
    };
    debug!(
        images = set.images.len(),
        charts = set.charts.len(),
        "promotion request validated"
    );
    Ok(set)
}

fn parse_list<T: serde::de::DeserializeOwned>(
    input: Option<&str>,
    list: ItemList,
) -> Result<Vec<T>, ValidationError> {
    match input.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json).map_err(|e| ValidationError::MalformedJson {
            list,
            reason: e.to_string(),
        }),
    }
}

/// Validate image items.
pub fn validate_images(items: &[RawImageItem]) -> Result<Vec<PromotionRequest>, ValidationError> {
    let list = ItemList::Images;
    let mut requests = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let name = required_name(item.name.as_deref(), list, index)?;
        for (field, value) in [
            ("newName", &item.new_name),
            ("newTag", &item.new_tag),
            ("fromOverlay", &item.from_overlay),
        ] {
            reject_blank(value.as_deref(), list, index, name, field)?;
        }
        let overlays = required_overlays(item.overlays.as_deref(), list, index, name)?;

        let request = match &item.from_overlay {
            Some(source) => {
                if item.new_name.is_some() {
                    return Err(conflict(list, index, name, "newName"));
                }
                if item.new_tag.is_some() {
                    return Err(conflict(list, index, name, "newTag"));
                }
                PromotionRequest::FromOverlayImage {
                    name: name.to_string(),
                    source_overlay: source.clone(),
                    overlays,
                }
            }
            None => {
                if item.new_name.is_none() && item.new_tag.is_none() {
                    return Err(ValidationError::MissingValue {
                        list,
                        index,
                        name: name.to_string(),
                        expected: "newName, newTag or both (or fromOverlay)",
                    });
                }
                PromotionRequest::DirectImage {
                    name: name.to_string(),
                    new_name: item.new_name.clone(),
                    new_tag: item.new_tag.clone(),
                    overlays,
                }
            }
        };
        requests.push(request);
    }

    reject_duplicates(list, "name", items.iter().filter_map(|i| i.name.as_deref()))?;
    reject_duplicates(
        list,
        "newName",
        items.iter().filter_map(|i| i.new_name.as_deref()),
    )?;

    Ok(requests)
}

/// Validate chart items.
pub fn validate_charts(items: &[RawChartItem]) -> Result<Vec<PromotionRequest>, ValidationError> {
    let list = ItemList::Charts;
    let mut requests = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let name = required_name(item.name.as_deref(), list, index)?;
        for (field, value) in [
            ("version", &item.version),
            ("releaseName", &item.release_name),
            ("fromOverlay", &item.from_overlay),
        ] {
            reject_blank(value.as_deref(), list, index, name, field)?;
        }
        let overlays = required_overlays(item.overlays.as_deref(), list, index, name)?;

        let request = match (&item.from_overlay, &item.version) {
            (Some(_), Some(_)) => return Err(conflict(list, index, name, "version")),
            (Some(source), None) => {
                if item.release_name.is_some() {
                    return Err(conflict(list, index, name, "releaseName"));
                }
                PromotionRequest::FromOverlayChart {
                    name: name.to_string(),
                    source_overlay: source.clone(),
                    overlays,
                }
            }
            (None, Some(version)) => PromotionRequest::DirectChart {
                name: name.to_string(),
                release_name: item.release_name.clone(),
                version: version.clone(),
                overlays,
            },
            (None, None) => {
                return Err(ValidationError::MissingValue {
                    list,
                    index,
                    name: name.to_string(),
                    expected: "version (or fromOverlay)",
                })
            }
        };
        requests.push(request);
    }

    reject_duplicates(list, "name", items.iter().filter_map(|i| i.name.as_deref()))?;

    Ok(requests)
}

/// Values that occur more than once, sorted.
pub fn find_duplicates<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for value in values {
        if !seen.insert(value) {
            duplicates.insert(value.to_string());
        }
    }
    duplicates.into_iter().collect()
}

fn reject_duplicates<'a>(
    list: ItemList,
    field: &'static str,
    values: impl IntoIterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    let values = find_duplicates(values);
    if values.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Duplicate {
            list,
            field,
            values,
        })
    }
}

fn required_name(name: Option<&str>, list: ItemList, index: usize) -> Result<&str, ValidationError> {
    match name {
        Some(n) if !n.trim().is_empty() => Ok(n),
        _ => Err(ValidationError::MissingField {
            list,
            index,
            field: "name",
        }),
    }
}

fn required_overlays(
    overlays: Option<&[String]>,
    list: ItemList,
    index: usize,
    name: &str,
) -> Result<Vec<String>, ValidationError> {
    let overlays = overlays.ok_or(ValidationError::MissingField {
        list,
        index,
        field: "overlays",
    })?;
    if overlays.is_empty() {
        return Err(ValidationError::EmptyOverlays {
            list,
            index,
            name: name.to_string(),
        });
    }
    for overlay in overlays {
        reject_blank(Some(overlay), list, index, name, "overlays")?;
    }
    Ok(overlays.to_vec())
}

fn reject_blank(
    value: Option<&str>,
    list: ItemList,
    index: usize,
    name: &str,
    field: &'static str,
) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(ValidationError::BlankValue {
            list,
            index,
            name: name.to_string(),
            field,
        }),
        _ => Ok(()),
    }
}

fn conflict(list: ItemList, index: usize, name: &str, field: &'static str) -> ValidationError {
    ValidationError::ConflictingSource {
        list,
        index,
        name: name.to_string(),
        field,
    }
}
