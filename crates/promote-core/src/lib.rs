//! Promote Core Library
//!
//! Parses promotion requests, resolves cross-overlay values, edits
//! kustomize overlays and records the applied changes as a manifest.

pub mod domain;
pub mod editor;
pub mod error;
pub mod fakes;
pub mod manifest;
pub mod mutate;
pub mod obs;
pub mod output;
pub mod resolve;
pub mod spec;
pub mod telemetry;

pub use domain::{
    ChartValue, ImageValue, MutationKind, MutationValue, PromotionRequest, Provenance,
    RawChartItem, RawImageItem, ResolvedMutation, RunContext, DEFAULT_SERVER_URL,
};

pub use editor::{
    ChartEdit, DeclaredChart, DeclaredImage, ImageEdit, KustomizeEditor, ManifestEditor,
    KUSTOMIZATION_FILES,
};

pub use error::{EditorError, ItemList, PromoteError, Result, ValidationError};

pub use manifest::{AppliedChart, AppliedImage, FrozenManifest, Manifest, OverlayResult};

pub use mutate::{Mutator, MutatorConfig};

pub use output::{short_sha, PromotionOutput};

pub use resolve::Resolver;

pub use spec::{parse_promotion, PromotionSet};

pub use telemetry::init_tracing;
