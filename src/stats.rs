use crate::event::epoch_seconds;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of an interceptor's counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Lines that passed the filters.
    pub lines_captured: u64,
    /// Non-debounced notifications that captured at least one line.
    pub events_processed: u64,
    /// Epoch seconds of the most recent `start()`, or 0.0 if never started.
    pub start_time: f64,
    /// Seconds since `start_time`, or 0.0 if never started.
    pub uptime_seconds: f64,
}

/// Counters owned by one interceptor. They only ever grow.
#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    lines_captured: AtomicU64,
    events_processed: AtomicU64,
    start_time: Mutex<Option<f64>>,
}

impl StatsCollector {
    pub(crate) fn mark_started(&self) {
        *self.start_guard() = Some(epoch_seconds());
    }

    pub(crate) fn add_lines(&self, n: u64) {
        self.lines_captured.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_event(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Stats {
        let start_time = *self.start_guard();
        Stats {
            lines_captured: self.lines_captured.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            start_time: start_time.unwrap_or(0.0),
            uptime_seconds: start_time.map_or(0.0, |t| (epoch_seconds() - t).max(0.0)),
        }
    }

    fn start_guard(&self) -> std::sync::MutexGuard<'_, Option<f64>> {
        self.start_time
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
