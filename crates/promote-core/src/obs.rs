//! Structured lifecycle events for a promotion run.
//!
//! Every event carries an `event` field so log pipelines can filter on it.

use std::future::Future;

use tracing::instrument::Instrumented;
use tracing::{info, warn, Instrument};

/// Run-scoped span; every event of the run is tagged with its run key.
///
/// ```ignore
/// let span = PromotionSpan::new("42-1");
/// span.instrument(async { /* ... */ }).await;
/// ```
#[derive(Debug, Clone)]
pub struct PromotionSpan {
    span: tracing::Span,
}

impl PromotionSpan {
    pub fn new(run_key: &str) -> Self {
        Self {
            span: tracing::info_span!("promote.run", run_key = %run_key),
        }
    }

    pub fn instrument<F: Future>(&self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

pub fn emit_promotion_started(run_key: &str, images: usize, charts: usize) {
    info!(event = "promotion.started", run_key = %run_key, images, charts);
}

pub fn emit_overlay_mutated(overlay: &str, kind: &str, change: &str) {
    info!(event = "overlay.mutated", overlay = %overlay, kind = %kind, change = %change);
}

pub fn emit_delivery_step(step: &str, detail: &str) {
    info!(event = "delivery.step", step = %step, detail = %detail);
}

pub fn emit_checks_polled(attempt: u32, attempts: u32, state: &str) {
    info!(event = "checks.polled", attempt, attempts, state = %state);
}

pub fn emit_promotion_finished(outcome: &str, overlays: usize) {
    info!(event = "promotion.finished", outcome = %outcome, overlays);
}

/// Warning-level event for a tolerated remote failure.
pub fn emit_remote_tolerated(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "remote.tolerated", step = %step, error = %error);
}

#[cfg(test)]
mod tests {
    use super::{emit_delivery_step, PromotionSpan};

    #[tokio::test]
    async fn promotion_span_wraps_future() {
        let span = PromotionSpan::new("test-run");
        let value = span
            .instrument(async {
                emit_delivery_step("commit", "abc");
                7
            })
            .await;
        assert_eq!(value, 7);
    }
}
