//! # Session Metrics
//!
//! Per-session accounting of how much audio arrived and how much was actually
//! forwarded to the transcription capability. The difference is the cost the
//! pipeline saved, and it must be consistent at every instant, not just at
//! session end.
//!
//! ## Invariants:
//! - `total_audio_seconds` and `processed_audio_seconds` are monotonically
//!   non-decreasing.
//! - `processed_audio_seconds <= total_audio_seconds` at every observable
//!   instant. The single-writer controller guarantees this by ordering:
//!   ingested audio is counted before any segment cut from it can be
//!   processed.
//! - `optimization_percentage` lies in `[0, 100]`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::RwLock;

/// Accumulator owned by one session.
///
/// ## Thread Safety:
/// Written only by the session's controller task; read concurrently by
/// metrics queries through the registry. RwLock snapshots keep reads
/// consistent without blocking the writer for long.
pub struct SessionMetrics {
    inner: RwLock<MetricsInner>,

    /// When the session was opened
    opened_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Seconds of audio received from the client
    total_audio_seconds: f64,

    /// Seconds of audio forwarded to the transcription capability
    processed_audio_seconds: f64,

    /// Wall-clock session duration, captured once at close
    frozen_duration: Option<f64>,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MetricsInner::default()),
            opened_at: Utc::now(),
        }
    }

    /// Count a frame's duration the moment it is ingested. Accounting never
    /// waits for downstream classification.
    pub fn record_ingested(&self, seconds: f64) {
        let mut inner = self.inner.write().unwrap();
        inner.total_audio_seconds += seconds;
    }

    /// Count a segment once it is accepted after noise reduction, whatever
    /// the later transcription outcome.
    pub fn record_processed(&self, seconds: f64) {
        let mut inner = self.inner.write().unwrap();
        inner.processed_audio_seconds += seconds;
        debug_assert!(inner.processed_audio_seconds <= inner.total_audio_seconds + 1e-9);
    }

    /// Freeze the session duration; snapshots taken afterwards are stable.
    /// Idempotent.
    pub fn freeze(&self) {
        let mut inner = self.inner.write().unwrap();
        if inner.frozen_duration.is_none() {
            inner.frozen_duration = Some(self.elapsed_seconds());
        }
    }

    fn elapsed_seconds(&self) -> f64 {
        let elapsed = Utc::now().signed_duration_since(self.opened_at);
        elapsed.num_milliseconds() as f64 / 1000.0
    }

    /// Consistent point-in-time view with the derived optimization figures.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().unwrap();

        let total = inner.total_audio_seconds;
        let processed = inner.processed_audio_seconds;

        let (seconds_saved, optimization_percentage) = if total > 0.0 {
            let saved = (total - processed).max(0.0);
            (saved, (saved / total * 100.0).clamp(0.0, 100.0))
        } else {
            (0.0, 0.0)
        };

        MetricsSnapshot {
            total_audio_seconds: round2(total),
            processed_audio_seconds: round2(processed),
            optimization_percentage: round2(optimization_percentage),
            seconds_saved: round2(seconds_saved),
            session_duration: round2(inner.frozen_duration.unwrap_or_else(|| self.elapsed_seconds())),
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire form of the per-session optimization metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_audio_seconds: f64,
    pub processed_audio_seconds: f64,
    pub optimization_percentage: f64,
    pub seconds_saved: f64,
    pub session_duration: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_session_reports_zeros() {
        let metrics = SessionMetrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.total_audio_seconds, 0.0);
        assert_eq!(snap.processed_audio_seconds, 0.0);
        assert_eq!(snap.optimization_percentage, 0.0);
        assert_eq!(snap.seconds_saved, 0.0);
    }

    #[test]
    fn test_optimization_for_partial_speech() {
        let metrics = SessionMetrics::new();
        metrics.record_ingested(10.0);
        metrics.record_processed(3.0);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_audio_seconds, 10.0);
        assert_eq!(snap.processed_audio_seconds, 3.0);
        assert_eq!(snap.seconds_saved, 7.0);
        assert_eq!(snap.optimization_percentage, 70.0);
    }

    #[test]
    fn test_processed_never_exceeds_total_in_snapshots() {
        let metrics = SessionMetrics::new();
        for _ in 0..100 {
            metrics.record_ingested(0.5);
            metrics.record_processed(0.25);
            let snap = metrics.snapshot();
            assert!(snap.processed_audio_seconds <= snap.total_audio_seconds);
            assert!((0.0..=100.0).contains(&snap.optimization_percentage));
        }
    }

    #[test]
    fn test_all_speech_session_saves_nothing() {
        let metrics = SessionMetrics::new();
        metrics.record_ingested(4.0);
        metrics.record_processed(4.0);

        let snap = metrics.snapshot();
        assert_eq!(snap.optimization_percentage, 0.0);
        assert_eq!(snap.seconds_saved, 0.0);
    }

    #[test]
    fn test_freeze_stabilizes_snapshot() {
        let metrics = SessionMetrics::new();
        metrics.record_ingested(2.0);
        metrics.freeze();

        let first = metrics.snapshot();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let second = metrics.snapshot();
        assert_eq!(first, second);
    }
}
