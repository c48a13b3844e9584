//! Logging utilities for formatted output.
//!
//! Helpers for consistent human-readable counts, durations and rates in
//! summary log lines, plus per-batch timed-event instrumentation used by
//! every pipeline stage.

use std::time::{Duration, Instant};

/// Formats a count with thousands separators (e.g. `1,234,567`).
#[must_use]
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a duration in human-readable form (e.g. "2m 15s", "1h 30m").
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 { format!("{mins}m") } else { format!("{mins}m {remaining_secs}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a rate (items per second) with appropriate units.
#[must_use]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} items/s", format_count(count));
    }
    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} items/s", format_count(rate as u64))
    } else {
        let items_per_min = count as f64 / (secs / 60.0);
        format!("{items_per_min:.1} items/min")
    }
}

/// Converts a bit count to gigabytes for budget log lines.
#[must_use]
pub fn bits_to_gb(bits: u64) -> f64 {
    bits as f64 / 8.0 / 1024.0 / 1024.0 / 1024.0
}

/// Operation timing and summary helper.
///
/// ```no_run
/// use sbwtq_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Running queries");
/// // ... do work ...
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Logs the completion with item count and rate.
    pub fn log_completion(&self, count: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} in {} ({})",
            self.operation,
            format_count(count),
            format_duration(duration),
            format_rate(count, duration)
        );
    }
}

/// Per-batch instrumentation shared by every pipeline stage.
///
/// Emits matching start/stop lines at `debug` so a run can be profiled from
/// its log alone.
pub struct TimedEvent {
    label: String,
    start_time: Instant,
}

impl TimedEvent {
    /// Start a timed event for `label` (e.g. `"Searcher_0"`) and `batch_id`.
    #[must_use]
    pub fn start(label: &str, batch_id: u64) -> Self {
        log::debug!("{label}: batch {batch_id} start");
        Self { label: format!("{label}: batch {batch_id}"), start_time: Instant::now() }
    }
}

impl Drop for TimedEvent {
    fn drop(&mut self) {
        log::debug!("{}: stop ({:.3}ms)", self.label, self.start_time.elapsed().as_secs_f64() * 1e3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m");
        assert_eq!(format_duration(Duration::from_secs(135)), "2m 15s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h 30m");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(1000, Duration::from_secs(1)), "1,000 items/s");
        assert_eq!(format_rate(30, Duration::from_secs(60)), "30.0 items/min");
    }

    #[test]
    fn test_bits_to_gb() {
        let one_gb_in_bits = 8 * 1024 * 1024 * 1024;
        assert!((bits_to_gb(one_gb_in_bits) - 1.0).abs() < f64::EPSILON);
    }
}
