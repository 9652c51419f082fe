//! In-process metrics.
//!
//! A small counter/gauge/histogram registry with a Prometheus text-format
//! exporter. Written directly against the exposition format so the gateway
//! carries no exporter dependency; scrape handlers just return
//! [`MetricsRegistry::export_prometheus`].

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Instant;

/// Sorted label set; `BTreeMap` keeps series identity order-independent.
type Labels = BTreeMap<String, String>;

#[derive(Debug, Default, Clone, Copy)]
struct Histogram {
    sum: f64,
    count: u64,
}

/// Counter, gauge and histogram series with labels.
pub struct MetricsRegistry {
    counters: DashMap<String, DashMap<Labels, f64>>,
    gauges: DashMap<String, DashMap<Labels, f64>>,
    histograms: DashMap<String, DashMap<Labels, Histogram>>,
    started: Instant,
}

impl MetricsRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
            started: Instant::now(),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(&self, name: &str, labels: &[(&str, &str)]) {
        self.inc_by(name, labels, 1.0);
    }

    /// Increment a counter by an arbitrary amount.
    pub fn inc_by(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let series = self.counters.entry(name.to_string()).or_default();
        *series.entry(to_labels(labels)).or_insert(0.0) += value;
    }

    /// Set a gauge.
    pub fn gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let series = self.gauges.entry(name.to_string()).or_default();
        series.insert(to_labels(labels), value);
    }

    /// Record a histogram observation.
    pub fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let series = self.histograms.entry(name.to_string()).or_default();
        let mut bucket = series.entry(to_labels(labels)).or_default();
        bucket.sum += value;
        bucket.count += 1;
    }

    /// Current counter value (0 when the series does not exist).
    #[must_use]
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.counters
            .get(name)
            .and_then(|series| series.get(&to_labels(labels)).map(|v| *v))
            .unwrap_or(0.0)
    }

    /// Current gauge value (0 when the series does not exist).
    #[must_use]
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.gauges
            .get(name)
            .and_then(|series| series.get(&to_labels(labels)).map(|v| *v))
            .unwrap_or(0.0)
    }

    /// Render the Prometheus text exposition format.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();
        out.push_str("# HELP process_uptime_seconds Seconds since gateway started\n");
        out.push_str("# TYPE process_uptime_seconds gauge\n");
        let _ = writeln!(
            out,
            "process_uptime_seconds {:.3}",
            self.started.elapsed().as_secs_f64()
        );

        for entry in self.counters.iter() {
            let name = entry.key();
            let _ = writeln!(out, "# HELP {name} Counter");
            let _ = writeln!(out, "# TYPE {name} counter");
            for series in entry.value().iter() {
                let _ = writeln!(out, "{name}{} {}", fmt_labels(series.key()), series.value());
            }
        }
        for entry in self.gauges.iter() {
            let name = entry.key();
            let _ = writeln!(out, "# HELP {name} Gauge");
            let _ = writeln!(out, "# TYPE {name} gauge");
            for series in entry.value().iter() {
                let _ = writeln!(out, "{name}{} {}", fmt_labels(series.key()), series.value());
            }
        }
        for entry in self.histograms.iter() {
            let name = entry.key();
            let _ = writeln!(out, "# HELP {name} Histogram");
            let _ = writeln!(out, "# TYPE {name} histogram");
            for series in entry.value().iter() {
                let labels = fmt_labels(series.key());
                let _ = writeln!(out, "{name}_sum{labels} {}", series.value().sum);
                let _ = writeln!(out, "{name}_count{labels} {}", series.value().count);
            }
        }
        out
    }

    /// Clear every series (tests).
    pub fn reset(&self) {
        self.counters.clear();
        self.gauges.clear();
        self.histograms.clear();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("counters", &self.counters.len())
            .field("gauges", &self.gauges.len())
            .finish_non_exhaustive()
    }
}

fn to_labels(labels: &[(&str, &str)]) -> Labels {
    labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn fmt_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    format!("{{{}}}", parts.join(","))
}
