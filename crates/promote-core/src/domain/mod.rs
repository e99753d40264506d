//! Domain models for a promotion run.
//!
//! - `PromotionRequest`: validated caller intent
//! - `ResolvedMutation`: one concrete value for one target overlay
//! - `RunContext`: provenance of the triggering CI run

pub mod context;
pub mod mutation;
pub mod request;

pub use context::{Provenance, RunContext, DEFAULT_SERVER_URL};
pub use mutation::{ChartValue, ImageValue, MutationKind, MutationValue, ResolvedMutation};
pub use request::{PromotionRequest, RawChartItem, RawImageItem};
