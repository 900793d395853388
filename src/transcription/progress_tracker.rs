//! Cumulative segment counters and linear time-remaining estimation.

use super::log_parser::ProgressEvent;
use core::fmt::{Display, Formatter, Result as FmtResult};
use core::time::Duration;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const NANOS_PER_SEC: u128 = 1_000_000_000;

#[derive(Debug, Default)]
struct TrackerState {
    start_time: Option<Instant>,
    total_segments: u64,
    processed_segments: u64,
}

impl TrackerState {
    fn estimate_at(&self, now: Instant) -> Option<Duration> {
        let start_time = self.start_time?;
        if self.processed_segments == 0 {
            return None;
        }

        let elapsed = now.saturating_duration_since(start_time).as_nanos();
        let estimated_total = elapsed * u128::from(self.total_segments) / u128::from(self.processed_segments);
        let remaining_secs = estimated_total.saturating_sub(elapsed) / NANOS_PER_SEC;

        Some(Duration::from_secs(u64::try_from(remaining_secs).unwrap_or(u64::MAX)))
    }
}

/// Shared progress state for one transcription run.
///
/// The tracker is cheap to clone; all clones observe the same counters. Every operation takes
/// the internal lock exactly once, so readers always see a consistent view of the counters.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters and stamp the start of a new run.
    pub fn start(&self) {
        self.start_at(Instant::now());
    }

    /// Reset all counters and stamp the start of a new run at `now`.
    pub fn start_at(&self, now: Instant) {
        let mut state = self.state.lock().expect("lock poisoned");
        *state = TrackerState {
            start_time: Some(now),
            ..TrackerState::default()
        };
    }

    /// Clear all counters and the start time.
    pub fn reset(&self) {
        *self.state.lock().expect("lock poisoned") = TrackerState::default();
    }

    /// Fold one parsed event into the counters.
    ///
    /// A declared total overwrites any previous declaration; the most recent one wins.
    pub fn apply(&self, event: ProgressEvent) {
        self.apply_all([event]);
    }

    /// Fold all events parsed from a single line into the counters under one lock.
    pub fn apply_all(&self, events: impl IntoIterator<Item = ProgressEvent>) {
        let mut state = self.state.lock().expect("lock poisoned");
        for event in events {
            match event {
                ProgressEvent::TotalDeclared(total) => state.total_segments = total,
                ProgressEvent::SegmentCompleted => state.processed_segments += 1,
            }
        }
    }

    #[must_use]
    pub fn total_segments(&self) -> u64 {
        self.state.lock().expect("lock poisoned").total_segments
    }

    #[must_use]
    pub fn processed_segments(&self) -> u64 {
        self.state.lock().expect("lock poisoned").processed_segments
    }

    #[must_use]
    pub fn start_time(&self) -> Option<Instant> {
        self.state.lock().expect("lock poisoned").start_time
    }

    /// Estimate the remaining run time, truncated to whole seconds.
    ///
    /// This is a plain linear extrapolation from the average time per completed segment, so the
    /// value can move in either direction between calls. Returns `None` until at least one
    /// segment has completed after [`start`](Self::start).
    #[must_use]
    pub fn estimate(&self) -> Option<Duration> {
        self.estimate_at(Instant::now())
    }

    /// Same as [`estimate`](Self::estimate), evaluated at `now`.
    #[must_use]
    pub fn estimate_at(&self, now: Instant) -> Option<Duration> {
        self.state.lock().expect("lock poisoned").estimate_at(now)
    }

    /// Fraction of declared segments completed, or `None` while no total has been declared.
    ///
    /// The value is not clamped: it exceeds 1.0 if more segments complete than were declared.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        self.snapshot().fraction()
    }

    /// Capture a consistent view of the tracker.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Capture a consistent view of the tracker, evaluated at `now`.
    #[must_use]
    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let state = self.state.lock().expect("lock poisoned");
        ProgressSnapshot {
            total_segments: state.total_segments,
            processed_segments: state.processed_segments,
            remaining: state.estimate_at(now),
        }
    }
}

/// An immutable copy of the tracker state, suitable for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_segments: u64,
    pub processed_segments: u64,
    pub remaining: Option<Duration>,
}

impl ProgressSnapshot {
    /// No total has been declared yet, so no ratio can be shown.
    #[must_use]
    pub const fn is_preparing(&self) -> bool {
        self.total_segments == 0
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "segment counts stay far below 2^52")]
    pub fn fraction(&self) -> Option<f64> {
        (!self.is_preparing()).then(|| self.processed_segments as f64 / self.total_segments as f64)
    }
}

impl Display for ProgressSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.is_preparing() {
            return write!(f, "Preparing...");
        }

        write!(f, "Progress: {}/{}", self.processed_segments, self.total_segments)?;
        if let Some(remaining) = self.remaining {
            write!(f, " | Remaining time: {}", format_hms(remaining))?;
        }

        Ok(())
    }
}

/// Render a duration as `H:MM:SS`, dropping sub-second precision.
#[must_use]
pub fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
