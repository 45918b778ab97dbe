//! Request IDs and rolling latency windows.
//! Each named metric keeps its most recent samples (whole milliseconds);
//! `status` reports p50/p95 per metric.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

/// Identifier attached to every translation and its log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIds {
    pub request_id: String,
    pub generation: u64,
}

impl RequestIds {
    pub fn new(generation: u64) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            generation,
        }
    }
}

/// Measures from creation to `finish`.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// Record and return elapsed milliseconds.
    pub fn finish(self) -> u64 {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        self.registry.record(self.name, elapsed_ms);
        elapsed_ms
    }
}

/// Most recent samples, oldest first.
struct LatencyWindow {
    samples: VecDeque<u64>,
    limit: usize,
    total: u64,
}

impl LatencyWindow {
    fn new(limit: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(limit),
            limit,
            total: 0,
        }
    }

    fn push(&mut self, ms: u64) {
        if self.samples.len() == self.limit {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
        self.total += 1;
    }

    /// Nearest-rank percentile over the window.
    fn nearest_rank(sorted: &[u64], p: u32) -> u64 {
        let rank = (p as usize * sorted.len()).div_ceil(100).max(1);
        sorted[rank - 1]
    }

    fn summarize(&self) -> Option<LatencySummary> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        Some(LatencySummary {
            p50_ms: Self::nearest_rank(&sorted, 50),
            p95_ms: Self::nearest_rank(&sorted, 95),
            max_ms: sorted[sorted.len() - 1],
            window: sorted.len(),
            total: self.total,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
    /// Samples the percentiles were computed from.
    pub window: usize,
    /// Samples ever recorded.
    pub total: u64,
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p50 {}ms p95 {}ms (n={})",
            self.p50_ms, self.p95_ms, self.total
        )
    }
}

pub struct MetricsRegistry {
    windows: Mutex<BTreeMap<&'static str, LatencyWindow>>,
    window_limit: usize,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_window(128)
    }

    pub fn with_window(window_limit: usize) -> Self {
        Self {
            windows: Mutex::new(BTreeMap::new()),
            window_limit: window_limit.max(1),
        }
    }

    pub fn record(&self, name: &'static str, ms: u64) {
        self.windows
            .lock()
            .entry(name)
            .or_insert_with(|| LatencyWindow::new(self.window_limit))
            .push(ms);
        tracing::debug!(metric = name, ms, "metric_recorded");
    }

    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    pub fn summary(&self, name: &str) -> Option<LatencySummary> {
        self.windows.lock().get(name).and_then(LatencyWindow::summarize)
    }

    /// `name: p50 ..` for every metric with samples, in name order.
    pub fn report_lines(&self) -> Vec<String> {
        self.windows
            .lock()
            .iter()
            .filter_map(|(name, window)| {
                window
                    .summarize()
                    .map(|s| format!("{}: {}", metric_names::label(name), s))
            })
            .collect()
    }
}

/// Well-known metric names.
pub mod metric_names {
    pub const TRANSLATE_TEXT: &str = "translate_text_ms";
    pub const TRANSLATE_HTML: &str = "translate_html_ms";
    pub const HEALTH_PROBE: &str = "health_probe_ms";

    /// Human label for report output.
    pub fn label(name: &str) -> &str {
        match name {
            TRANSLATE_TEXT => "Translate (text)",
            TRANSLATE_HTML => "Translate (html)",
            HEALTH_PROBE => "Health probe",
            other => other,
        }
    }
}
