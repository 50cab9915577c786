use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One completed scan as seen by the performance monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub scan_duration_ms: u64,
    pub sample_index: u64,
}

/// Figures reported in the status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub scan_count: u64,
    pub last_scan_ms: Option<u64>,
    pub average_scan_ms: Option<f64>,
    pub last_scan_at: Option<DateTime<Utc>>,
}

/// Exponentially weighted scan duration tracker.
///
/// Samples from different engines are not comparable, so the session resets
/// the monitor on every fallback transition.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    enabled: bool,
    weight: f64,
    scan_count: u64,
    last_scan_ms: Option<u64>,
    average_scan_ms: Option<f64>,
    last_scan_at: Option<DateTime<Utc>>,
}

impl PerformanceMonitor {
    /// `weight` is the share kept from the previous average
    pub fn new(enabled: bool, weight: f64) -> Self {
        Self {
            enabled,
            weight,
            scan_count: 0,
            last_scan_ms: None,
            average_scan_ms: None,
            last_scan_at: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, duration: Duration) -> Option<PerformanceSample> {
        if !self.enabled {
            return None;
        }

        let ms = duration.as_millis() as u64;
        self.scan_count += 1;
        self.last_scan_ms = Some(ms);
        self.last_scan_at = Some(Utc::now());
        self.average_scan_ms = Some(match self.average_scan_ms {
            Some(average) => average * self.weight + ms as f64 * (1.0 - self.weight),
            None => ms as f64,
        });

        debug!(
            "Scan #{} took {} ms (average {:.1} ms)",
            self.scan_count,
            ms,
            self.average_scan_ms.unwrap_or_default()
        );

        Some(PerformanceSample {
            scan_duration_ms: ms,
            sample_index: self.scan_count,
        })
    }

    pub fn reset(&mut self) {
        self.scan_count = 0;
        self.last_scan_ms = None;
        self.average_scan_ms = None;
        self.last_scan_at = None;
    }

    pub fn summary(&self) -> Option<PerformanceSummary> {
        self.enabled.then(|| PerformanceSummary {
            scan_count: self.scan_count,
            last_scan_ms: self.last_scan_ms,
            average_scan_ms: self.average_scan_ms,
            last_scan_at: self.last_scan_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_average() {
        let mut monitor = PerformanceMonitor::new(true, 0.7);

        let first = monitor.record(Duration::from_millis(100)).unwrap();
        assert_eq!(first.sample_index, 1);
        assert_eq!(monitor.summary().unwrap().average_scan_ms, Some(100.0));

        monitor.record(Duration::from_millis(200)).unwrap();
        let summary = monitor.summary().unwrap();
        assert_eq!(summary.scan_count, 2);
        assert_eq!(summary.last_scan_ms, Some(200));
        let average = summary.average_scan_ms.unwrap();
        assert!((average - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_samples() {
        let mut monitor = PerformanceMonitor::new(true, 0.7);
        monitor.record(Duration::from_millis(50));
        monitor.reset();

        let summary = monitor.summary().unwrap();
        assert_eq!(summary.scan_count, 0);
        assert_eq!(summary.average_scan_ms, None);
        assert!(summary.last_scan_at.is_none());
    }

    #[test]
    fn test_disabled_monitor_reports_nothing() {
        let mut monitor = PerformanceMonitor::new(false, 0.7);
        assert!(monitor.record(Duration::from_millis(10)).is_none());
        assert!(monitor.summary().is_none());
    }
}
