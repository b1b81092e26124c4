// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::handler::TerminateReason;
use crate::models::AckStatus;

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for long-poll sessions
// ============================================================================
//
// - Session lifecycle (started, rejected, active, terminated by reason)
// - Dispatch acknowledgments by status
// - Flush outcomes and how many frames each delivered flush carried
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Flush outcomes, used as the `outcome` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcomeLabel {
    Delivered,
    Parked,
    Superseded,
}

impl FlushOutcomeLabel {
    fn as_str(&self) -> &'static str {
        match self {
            FlushOutcomeLabel::Delivered => "delivered",
            FlushOutcomeLabel::Parked => "parked",
            FlushOutcomeLabel::Superseded => "superseded",
        }
    }
}

pub struct Metrics {
    registry: Registry,

    pub sessions_started: IntCounter,
    pub sessions_rejected: IntCounter,
    pub sessions_active: IntGauge,
    pub sessions_terminated: IntCounterVec,

    pub dispatch_total: IntCounterVec,
    pub flush_total: IntCounterVec,
    pub frames_flushed: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let sessions_started = IntCounter::new(
            "longpoll_sessions_started_total",
            "Sessions that completed the handshake",
        )?;
        registry.register(Box::new(sessions_started.clone()))?;

        let sessions_rejected = IntCounter::new(
            "longpoll_sessions_rejected_total",
            "Sessions refused by the handler during the handshake",
        )?;
        registry.register(Box::new(sessions_rejected.clone()))?;

        let sessions_active = IntGauge::new("longpoll_sessions_active", "Running session actors")?;
        registry.register(Box::new(sessions_active.clone()))?;

        let sessions_terminated = IntCounterVec::new(
            Opts::new("longpoll_sessions_terminated_total", "Sessions terminated, by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(sessions_terminated.clone()))?;

        let dispatch_total = IntCounterVec::new(
            Opts::new("longpoll_dispatch_total", "Dispatch acknowledgments, by status"),
            &["status"],
        )?;
        registry.register(Box::new(dispatch_total.clone()))?;

        let flush_total = IntCounterVec::new(
            Opts::new("longpoll_flush_total", "Flush requests, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(flush_total.clone()))?;

        let frames_flushed = Histogram::with_opts(
            HistogramOpts::new("longpoll_frames_flushed", "Frames returned per delivered flush")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        )?;
        registry.register(Box::new(frames_flushed.clone()))?;

        Ok(Self {
            registry,
            sessions_started,
            sessions_rejected,
            sessions_active,
            sessions_terminated,
            dispatch_total,
            flush_total,
            frames_flushed,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_session_started(&self) {
        self.sessions_started.inc();
        self.sessions_active.inc();
    }

    pub fn record_session_rejected(&self) {
        self.sessions_rejected.inc();
    }

    pub fn record_session_terminated(&self, reason: &TerminateReason) {
        self.sessions_active.dec();
        self.sessions_terminated.with_label_values(&[reason.label()]).inc();
    }

    pub fn record_dispatch(&self, status: AckStatus) {
        self.dispatch_total.with_label_values(&[status.as_str()]).inc();
    }

    pub fn record_flush(&self, outcome: FlushOutcomeLabel, frames: usize) {
        self.flush_total.with_label_values(&[outcome.as_str()]).inc();
        if outcome == FlushOutcomeLabel::Delivered {
            self.frames_flushed.observe(frames as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_session_lifecycle_gauges() {
        let metrics = Metrics::new().unwrap();
        metrics.record_session_started();
        metrics.record_session_started();
        metrics.record_session_terminated(&TerminateReason::Inactive);

        assert_eq!(metrics.sessions_active.get(), 1);
        assert_eq!(
            metrics.sessions_terminated.with_label_values(&["inactive"]).get(),
            1
        );
    }

    #[test]
    fn test_flush_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_flush(FlushOutcomeLabel::Delivered, 3);
        metrics.record_flush(FlushOutcomeLabel::Parked, 0);

        assert_eq!(metrics.frames_flushed.get_sample_count(), 1);
        assert_eq!(metrics.frames_flushed.get_sample_sum(), 3.0);
        assert_eq!(metrics.flush_total.with_label_values(&["parked"]).get(), 1);
    }
}
