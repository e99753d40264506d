//! In-memory fakes for the manifest editor (testing only)
//!
//! `MemoryEditor` models a deployment repo as a map of overlay states. It
//! records every call and detects overlapping edits of one overlay.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::editor::{ChartEdit, DeclaredChart, DeclaredImage, ImageEdit, ManifestEditor};
use crate::error::EditorError;

/// Declarations of one overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayState {
    pub images: Vec<DeclaredImage>,
    pub charts: Vec<DeclaredChart>,
}

/// Point-in-time copy of every overlay, used to model commits and stashes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorSnapshot(BTreeMap<String, OverlayState>);

/// In-memory editor backed by a `BTreeMap<overlay, OverlayState>`.
#[derive(Debug, Default)]
pub struct MemoryEditor {
    overlays: Mutex<BTreeMap<String, OverlayState>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<String>>,
    active: Mutex<BTreeSet<String>>,
    overlapped: AtomicBool,
}

impl MemoryEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `overlay` exist with no declarations.
    pub fn add_overlay(&self, overlay: &str) {
        self.overlays
            .lock()
            .unwrap()
            .entry(overlay.to_string())
            .or_default();
    }

    pub fn declare_image(
        &self,
        overlay: &str,
        name: &str,
        new_name: Option<&str>,
        new_tag: Option<&str>,
    ) {
        let mut overlays = self.overlays.lock().unwrap();
        let state = overlays.entry(overlay.to_string()).or_default();
        state.images.retain(|i| i.name != name);
        state.images.push(DeclaredImage {
            name: name.to_string(),
            new_name: new_name.map(str::to_string),
            new_tag: new_tag.map(str::to_string),
            digest: None,
        });
    }

    pub fn declare_chart(
        &self,
        overlay: &str,
        name: &str,
        version: Option<&str>,
        release_name: Option<&str>,
    ) {
        let mut overlays = self.overlays.lock().unwrap();
        let state = overlays.entry(overlay.to_string()).or_default();
        state.charts.retain(|c| c.name != name);
        state.charts.push(DeclaredChart {
            name: name.to_string(),
            version: version.map(str::to_string),
            release_name: release_name.map(str::to_string),
        });
    }

    /// Make every write to `overlay` fail as the kustomize binary would.
    pub fn fail_on(&self, overlay: &str) {
        self.failing.lock().unwrap().insert(overlay.to_string());
    }

    pub fn image(&self, overlay: &str, name: &str) -> Option<DeclaredImage> {
        self.overlays
            .lock()
            .unwrap()
            .get(overlay)
            .and_then(|s| s.images.iter().find(|i| i.name == name).cloned())
    }

    pub fn chart(&self, overlay: &str, name: &str) -> Option<DeclaredChart> {
        self.overlays
            .lock()
            .unwrap()
            .get(overlay)
            .and_then(|s| s.charts.iter().find(|c| c.name == name).cloned())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether two writes to the same overlay were ever in flight together.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        EditorSnapshot(self.overlays.lock().unwrap().clone())
    }

    pub fn restore(&self, snapshot: &EditorSnapshot) {
        *self.overlays.lock().unwrap() = snapshot.0.clone();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn state(&self, overlay: &str) -> Result<OverlayState, EditorError> {
        self.overlays
            .lock()
            .unwrap()
            .get(overlay)
            .cloned()
            .ok_or_else(|| EditorError::MissingOverlay {
                path: overlay.to_string(),
            })
    }

    fn check_writable(&self, overlay: &str, command: &str) -> Result<(), EditorError> {
        if self.failing.lock().unwrap().contains(overlay) {
            return Err(EditorError::ToolFailed {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("injected failure for {overlay}"),
            });
        }
        self.state(overlay).map(|_| ())
    }

    fn begin_write(&self, overlay: &str) {
        if !self.active.lock().unwrap().insert(overlay.to_string()) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
    }

    fn end_write(&self, overlay: &str) {
        self.active.lock().unwrap().remove(overlay);
    }
}

#[async_trait]
impl ManifestEditor for MemoryEditor {
    async fn read_images(&self, overlay: &str) -> Result<Vec<DeclaredImage>, EditorError> {
        self.record(format!("read_images {overlay}"));
        Ok(self.state(overlay)?.images)
    }

    async fn read_charts(&self, overlay: &str) -> Result<Vec<DeclaredChart>, EditorError> {
        self.record(format!("read_charts {overlay}"));
        Ok(self.state(overlay)?.charts)
    }

    async fn set_images(&self, overlay: &str, edits: &[ImageEdit]) -> Result<(), EditorError> {
        let args: Vec<String> = edits
            .iter()
            .map(|e| e.value.kustomize_arg(&e.name))
            .collect();
        let call = format!("set_images {overlay} {}", args.join(" "));
        self.record(call.clone());
        self.check_writable(overlay, &call)?;

        self.begin_write(overlay);
        tokio::task::yield_now().await;
        {
            let mut overlays = self.overlays.lock().unwrap();
            let state = overlays.entry(overlay.to_string()).or_default();
            for edit in edits {
                // kustomize drops newName when it equals the image name
                let new_name = (edit.value.new_name != edit.name).then(|| edit.value.new_name.clone());
                match state.images.iter_mut().find(|i| i.name == edit.name) {
                    Some(image) => {
                        image.new_name = new_name;
                        if edit.value.new_tag.is_some() {
                            image.new_tag = edit.value.new_tag.clone();
                        }
                    }
                    None => state.images.push(DeclaredImage {
                        name: edit.name.clone(),
                        new_name,
                        new_tag: edit.value.new_tag.clone(),
                        digest: None,
                    }),
                }
            }
        }
        self.end_write(overlay);
        Ok(())
    }

    async fn set_charts(&self, overlay: &str, edits: &[ChartEdit]) -> Result<(), EditorError> {
        let args: Vec<String> = edits
            .iter()
            .map(|e| format!("{}@{}", e.name, e.value.version))
            .collect();
        let call = format!("set_charts {overlay} {}", args.join(" "));
        self.record(call.clone());
        self.check_writable(overlay, &call)?;

        self.begin_write(overlay);
        tokio::task::yield_now().await;
        let result = {
            let mut overlays = self.overlays.lock().unwrap();
            let state = overlays.entry(overlay.to_string()).or_default();
            let mut updated = state.charts.clone();
            let mut result = Ok(());
            for edit in edits {
                match updated.iter_mut().find(|c| c.name == edit.name) {
                    Some(chart) => {
                        chart.version = Some(edit.value.version.clone());
                        if edit.value.release_name.is_some() {
                            chart.release_name = edit.value.release_name.clone();
                        }
                    }
                    None => {
                        result = Err(EditorError::ChartNotDeclared {
                            overlay: overlay.to_string(),
                            chart: edit.name.clone(),
                        });
                        break;
                    }
                }
            }
            if result.is_ok() {
                state.charts = updated;
            }
            result
        };
        self.end_write(overlay);
        result
    }
}
