//! Prometheus-style telemetry for the responder
//!
//! Thread-safe metric registry built from a [`TelemetryConfig`]. Every
//! metric has to be declared up front; touching an undeclared name is an
//! error rather than a silent no-op.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Histogram bucket bounds, in milliseconds.
pub const DURATION_BUCKETS: [f64; 9] = [0.1, 1.0, 10.0, 25.0, 50.0, 75.0, 90.0, 97.5, 99.0];

pub const METRIC_REQUESTS: &str = "bitswap-requests";
pub const METRIC_TOTAL_ENTRIES: &str = "bitswap-total-entries";
pub const METRIC_SENT_BLOCKS: &str = "bitswap-sent-blocks";
pub const METRIC_SENT_PRESENCES: &str = "bitswap-sent-presences";
pub const METRIC_SENT_MESSAGES: &str = "bitswap-sent-messages";
pub const METRIC_SOURCE_ERRORS: &str = "bitswap-source-errors";
pub const METRIC_ACTIVE_REQUESTS: &str = "bitswap-active-requests";
pub const METRIC_HANDLE_DURATION: &str = "bitswap-handle-duration";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Metric {0} not found")]
    NotFound(String),

    #[error("Metric {name} is not a {expected}")]
    WrongKind { name: String, expected: &'static str },

    #[error("Metric {name} expects {expected} labels, got {actual}")]
    LabelMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Declaration of one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDef {
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl MetricDef {
    fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            labels: Vec::new(),
        }
    }

    fn with_labels(description: &str, labels: &[&str]) -> Self {
        Self {
            description: description.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Metric declarations grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub count: BTreeMap<String, MetricDef>,
    #[serde(default)]
    pub label_count: BTreeMap<String, MetricDef>,
    #[serde(default)]
    pub gauge: BTreeMap<String, MetricDef>,
    #[serde(default)]
    pub durations: BTreeMap<String, MetricDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub component: String,
    pub version: String,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl TelemetryConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, TelemetryError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// The metrics the responder records.
impl Default for TelemetryConfig {
    fn default() -> Self {
        let mut metrics = MetricsConfig::default();

        metrics.label_count.insert(
            METRIC_REQUESTS.to_string(),
            MetricDef::with_labels("Inbound messages handled, by protocol", &["protocol"]),
        );
        for (name, description) in [
            (METRIC_TOTAL_ENTRIES, "Want-list entries received"),
            (METRIC_SENT_BLOCKS, "Blocks sent to peers"),
            (METRIC_SENT_PRESENCES, "Block presences sent to peers"),
            (METRIC_SENT_MESSAGES, "Messages sent to peers"),
            (METRIC_SOURCE_ERRORS, "Failed block source lookups"),
        ] {
            metrics.count.insert(name.to_string(), MetricDef::new(description));
        }
        metrics.gauge.insert(
            METRIC_ACTIVE_REQUESTS.to_string(),
            MetricDef::new("Inbound messages being handled"),
        );
        metrics.durations.insert(
            METRIC_HANDLE_DURATION.to_string(),
            MetricDef::new("Time to handle an inbound message (ms)"),
        );

        Self {
            component: "bitswap-peer".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            metrics,
        }
    }
}

struct Histogram {
    buckets: [AtomicU64; DURATION_BUCKETS.len()],
    count: AtomicU64,
    sum_nanos: AtomicU64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            buckets: Default::default(),
            count: AtomicU64::new(0),
            sum_nanos: AtomicU64::new(0),
        }
    }

    fn observe(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        for (bound, bucket) in DURATION_BUCKETS.iter().zip(&self.buckets) {
            if ms <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    fn sum_ms(&self) -> f64 {
        self.sum_nanos.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Relaxed);
        self.sum_nanos.store(0, Ordering::Relaxed);
    }
}

enum Kind {
    Count(AtomicU64),
    LabelCount {
        labels: Vec<String>,
        values: Mutex<BTreeMap<Vec<String>, u64>>,
    },
    Gauge(AtomicI64),
    Durations(Histogram),
}

struct Metric {
    export_name: String,
    help: String,
    kind: Kind,
}

struct TelemetryInner {
    component: String,
    version: String,
    metrics: BTreeMap<String, Metric>,
}

/// Metric registry shared by every clone.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<TelemetryInner>,
}

impl Telemetry {
    pub fn new(config: TelemetryConfig) -> Self {
        let mut metrics = BTreeMap::new();
        let categories = [
            ("count", config.metrics.count),
            ("label_count", config.metrics.label_count),
            ("gauge", config.metrics.gauge),
            ("durations", config.metrics.durations),
        ];

        for (category, defs) in categories {
            for (name, def) in defs {
                let kind = match category {
                    "count" => Kind::Count(AtomicU64::new(0)),
                    "label_count" => Kind::LabelCount {
                        labels: def.labels.clone(),
                        values: Mutex::new(BTreeMap::new()),
                    },
                    "gauge" => Kind::Gauge(AtomicI64::new(0)),
                    _ => Kind::Durations(Histogram::new()),
                };
                let metric = Metric {
                    export_name: export_name(&name),
                    help: def.description,
                    kind,
                };
                if metrics.insert(name.clone(), metric).is_some() {
                    warn!("Metric {} declared twice, keeping the {} one", name, category);
                }
            }
        }

        info!(
            "Telemetry for {} {} with {} metrics",
            config.component,
            config.version,
            metrics.len()
        );

        Self {
            inner: Arc::new(TelemetryInner {
                component: config.component,
                version: config.version,
                metrics,
            }),
        }
    }

    pub fn component(&self) -> &str {
        &self.inner.component
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    fn get(&self, name: &str) -> Result<&Kind, TelemetryError> {
        self.inner
            .metrics
            .get(name)
            .map(|m| &m.kind)
            .ok_or_else(|| TelemetryError::NotFound(name.to_string()))
    }

    fn wrong_kind(name: &str, expected: &'static str) -> TelemetryError {
        TelemetryError::WrongKind {
            name: name.to_string(),
            expected,
        }
    }

    pub fn increase_count(&self, name: &str, amount: u64) -> Result<(), TelemetryError> {
        match self.get(name)? {
            Kind::Count(value) => {
                value.fetch_add(amount, Ordering::Relaxed);
                Ok(())
            }
            _ => Err(Self::wrong_kind(name, "count")),
        }
    }

    pub fn increase_label_count(
        &self,
        name: &str,
        label_values: &[&str],
        amount: u64,
    ) -> Result<(), TelemetryError> {
        match self.get(name)? {
            Kind::LabelCount { labels, values } => {
                if labels.len() != label_values.len() {
                    return Err(TelemetryError::LabelMismatch {
                        name: name.to_string(),
                        expected: labels.len(),
                        actual: label_values.len(),
                    });
                }
                let key = label_values.iter().map(|v| v.to_string()).collect();
                let mut values = values.lock().unwrap_or_else(|e| e.into_inner());
                *values.entry(key).or_insert(0) += amount;
                Ok(())
            }
            _ => Err(Self::wrong_kind(name, "label count")),
        }
    }

    fn gauge(&self, name: &str) -> Result<&AtomicI64, TelemetryError> {
        match self.get(name)? {
            Kind::Gauge(value) => Ok(value),
            _ => Err(Self::wrong_kind(name, "gauge")),
        }
    }

    pub fn increase_gauge(&self, name: &str, amount: i64) -> Result<(), TelemetryError> {
        self.gauge(name)?.fetch_add(amount, Ordering::Relaxed);
        Ok(())
    }

    pub fn decrease_gauge(&self, name: &str, amount: i64) -> Result<(), TelemetryError> {
        self.gauge(name)?.fetch_sub(amount, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_gauge(&self, name: &str, value: i64) -> Result<(), TelemetryError> {
        self.gauge(name)?.store(value, Ordering::Relaxed);
        Ok(())
    }

    pub fn gauge_value(&self, name: &str) -> Option<i64> {
        self.gauge(name).ok().map(|v| v.load(Ordering::Relaxed))
    }

    pub fn count_value(&self, name: &str) -> Option<u64> {
        match self.get(name).ok()? {
            Kind::Count(value) => Some(value.load(Ordering::Relaxed)),
            _ => None,
        }
    }

    pub fn label_count_value(&self, name: &str, label_values: &[&str]) -> Option<u64> {
        match self.get(name).ok()? {
            Kind::LabelCount { values, .. } => {
                let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();
                let values = values.lock().unwrap_or_else(|e| e.into_inner());
                Some(values.get(&key).copied().unwrap_or(0))
            }
            _ => None,
        }
    }

    fn histogram(&self, name: &str) -> Result<&Histogram, TelemetryError> {
        match self.get(name)? {
            Kind::Durations(histogram) => Ok(histogram),
            _ => Err(Self::wrong_kind(name, "duration histogram")),
        }
    }

    /// Sum of recorded durations in milliseconds.
    pub fn histogram_sum(&self, name: &str) -> Option<f64> {
        self.histogram(name).ok().map(Histogram::sum_ms)
    }

    pub fn histogram_count(&self, name: &str) -> Option<u64> {
        self.histogram(name)
            .ok()
            .map(|h| h.count.load(Ordering::Relaxed))
    }

    pub fn record_duration(&self, name: &str, elapsed: Duration) -> Result<(), TelemetryError> {
        self.histogram(name)?.observe(elapsed);
        Ok(())
    }

    /// Await `future`, recording how long it took under `name`.
    ///
    /// The metric is checked before the future is polled.
    pub async fn track_duration<F>(&self, name: &str, future: F) -> Result<F::Output, TelemetryError>
    where
        F: Future,
    {
        let histogram = self.histogram(name)?;
        let start = Instant::now();
        let output = future.await;
        histogram.observe(start.elapsed());
        Ok(output)
    }

    fn reset_where(&self, filter: impl Fn(&Kind) -> bool) {
        for metric in self.inner.metrics.values().filter(|m| filter(&m.kind)) {
            match &metric.kind {
                Kind::Count(value) => value.store(0, Ordering::Relaxed),
                Kind::LabelCount { values, .. } => {
                    values.lock().unwrap_or_else(|e| e.into_inner()).clear()
                }
                Kind::Gauge(value) => value.store(0, Ordering::Relaxed),
                Kind::Durations(histogram) => histogram.reset(),
            }
        }
    }

    pub fn reset_all(&self) {
        self.reset_where(|_| true);
    }

    pub fn reset_counters(&self) {
        self.reset_where(|k| matches!(k, Kind::Count(_) | Kind::LabelCount { .. }));
    }

    pub fn reset_durations(&self) {
        self.reset_where(|k| matches!(k, Kind::Durations(_)));
    }

    pub fn reset_gauges(&self) {
        self.reset_where(|k| matches!(k, Kind::Gauge(_)));
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn export(&self) -> String {
        let mut out = String::new();

        for metric in self.inner.metrics.values() {
            let name = &metric.export_name;
            let type_name = match metric.kind {
                Kind::Count(_) | Kind::LabelCount { .. } => "counter",
                Kind::Gauge(_) => "gauge",
                Kind::Durations(_) => "histogram",
            };
            let _ = writeln!(out, "# HELP {} {}", name, metric.help);
            let _ = writeln!(out, "# TYPE {} {}", name, type_name);

            match &metric.kind {
                Kind::Count(value) => {
                    let _ = writeln!(out, "{} {}", name, value.load(Ordering::Relaxed));
                }
                Kind::LabelCount { labels, values } => {
                    let values = values.lock().unwrap_or_else(|e| e.into_inner());
                    for (label_values, value) in values.iter() {
                        let pairs: Vec<String> = labels
                            .iter()
                            .zip(label_values)
                            .map(|(l, v)| format!("{}=\"{}\"", l, v))
                            .collect();
                        let _ = writeln!(out, "{}{{{}}} {}", name, pairs.join(","), value);
                    }
                }
                Kind::Gauge(value) => {
                    let _ = writeln!(out, "{} {}", name, value.load(Ordering::Relaxed));
                }
                Kind::Durations(histogram) => {
                    for (bound, bucket) in DURATION_BUCKETS.iter().zip(&histogram.buckets) {
                        let _ = writeln!(
                            out,
                            "{}_bucket{{le=\"{}\"}} {}",
                            name,
                            bound,
                            bucket.load(Ordering::Relaxed)
                        );
                    }
                    let count = histogram.count.load(Ordering::Relaxed);
                    let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, count);
                    let _ = writeln!(out, "{}_sum {}", name, histogram.sum_ms());
                    let _ = writeln!(out, "{}_count {}", name, count);
                }
            }
            out.push('\n');
        }

        out
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

fn export_name(name: &str) -> String {
    name.replace('-', "_")
}
