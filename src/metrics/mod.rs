//! Metrics collection and monitoring module
//!
//! Counts what the merge engine does with stream and backfill events and keeps
//! message latency samples. Everything is also reported through the `metrics`
//! facade, which is a no-op unless a recorder is installed.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::binance::types::ConnectionStatus;
use crate::market_data::{MergeOutcome, WindowKey};

/// Event counters for the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowCounters {
    pub merges: u64,
    pub appends: u64,
    pub evictions: u64,
    pub malformed_dropped: u64,
    pub stale_dropped: u64,
    pub reconnects: u64,
    pub backfills_loaded: u64,
    pub backfills_failed: u64,
}

/// Point-in-time view of the stream metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub status: ConnectionStatus,
    pub counters: WindowCounters,
    pub latency_p50: u64,
    pub latency_p95: u64,
    pub latency_p99: u64,
    pub messages_per_second: f64,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            counters: WindowCounters::default(),
            latency_p50: 0,
            latency_p95: 0,
            latency_p99: 0,
            messages_per_second: 0.0,
        }
    }
}

/// Latency sample collector
pub struct MetricsCollector {
    latency_samples: Vec<u64>,
    message_count: u64,
    started_at: SystemTime,
    max_samples: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new(max_samples: usize) -> Self {
        Self {
            latency_samples: Vec::with_capacity(max_samples),
            message_count: 0,
            started_at: SystemTime::now(),
            max_samples: max_samples.max(1),
        }
    }

    /// Record message latency against the exchange event time
    pub fn record_message_latency(&mut self, event_time: u64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(event_time);
        let latency = now.saturating_sub(event_time);

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.remove(0);
        }
        self.latency_samples.push(latency);

        metrics::histogram!("xcandle_message_latency_ms", latency as f64);
    }

    /// Count a message that carried no event time
    pub fn record_message(&mut self) {
        self.message_count += 1;
    }

    /// Calculate latency percentiles
    pub fn calculate_percentiles(&self) -> (u64, u64, u64) {
        if self.latency_samples.is_empty() {
            return (0, 0, 0);
        }

        let mut sorted = self.latency_samples.clone();
        sorted.sort_unstable();

        let len = sorted.len();
        let p50_idx = (len * 50) / 100;
        let p95_idx = (len * 95) / 100;
        let p99_idx = (len * 99) / 100;

        let p50 = sorted.get(p50_idx).copied().unwrap_or(0);
        let p95 = sorted.get(p95_idx.min(len - 1)).copied().unwrap_or(0);
        let p99 = sorted.get(p99_idx.min(len - 1)).copied().unwrap_or(0);

        (p50, p95, p99)
    }

    /// Calculate messages per second since the collector was created
    pub fn messages_per_second(&self) -> f64 {
        let duration = self.started_at.elapsed().unwrap_or_default();
        if duration.as_secs() == 0 {
            return 0.0;
        }
        self.message_count as f64 / duration.as_secs_f64()
    }

}

/// Session-level metrics: counters, latency and connection status
pub struct StreamMetrics {
    collector: MetricsCollector,
    counters: WindowCounters,
    status: ConnectionStatus,
}

impl StreamMetrics {
    pub fn new(max_samples: usize) -> Self {
        Self {
            collector: MetricsCollector::new(max_samples),
            counters: WindowCounters::default(),
            status: ConnectionStatus::Disconnected,
        }
    }

    pub fn record_merge(&mut self, key: &WindowKey, outcome: MergeOutcome, event_time: Option<u64>) {
        self.counters.merges += 1;
        self.collector.record_message();
        if let Some(event_time) = event_time {
            self.collector.record_message_latency(event_time);
        }

        match outcome {
            MergeOutcome::Updated => {}
            MergeOutcome::Appended => self.counters.appends += 1,
            MergeOutcome::Evicted { .. } => {
                self.counters.appends += 1;
                self.counters.evictions += 1;
                metrics::increment_counter!("xcandle_evictions_total", "window" => key.to_string());
            }
        }
        metrics::increment_counter!("xcandle_merges_total", "window" => key.to_string());
    }

    pub fn record_malformed(&mut self, key: &WindowKey) {
        self.counters.malformed_dropped += 1;
        metrics::increment_counter!("xcandle_malformed_total", "window" => key.to_string());
    }

    pub fn record_stale(&mut self) {
        self.counters.stale_dropped += 1;
        metrics::increment_counter!("xcandle_stale_dropped_total");
    }

    pub fn record_reconnect(&mut self, key: &WindowKey) {
        self.counters.reconnects += 1;
        metrics::increment_counter!("xcandle_reconnects_total", "window" => key.to_string());
    }

    pub fn record_backfill(&mut self, key: &WindowKey, success: bool) {
        if success {
            self.counters.backfills_loaded += 1;
            metrics::increment_counter!("xcandle_backfills_total", "window" => key.to_string(), "result" => "ok");
        } else {
            self.counters.backfills_failed += 1;
            metrics::increment_counter!("xcandle_backfills_total", "window" => key.to_string(), "result" => "error");
        }
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    pub fn counters(&self) -> &WindowCounters {
        &self.counters
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (latency_p50, latency_p95, latency_p99) = self.collector.calculate_percentiles();
        MetricsSnapshot {
            status: self.status.clone(),
            counters: self.counters.clone(),
            latency_p50,
            latency_p95,
            latency_p99,
            messages_per_second: self.collector.messages_per_second(),
        }
    }
}
