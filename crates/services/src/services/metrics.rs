//! In-memory request counters and latency histograms rendered in the
//! Prometheus text exposition format (version 0.0.4).
//!
//! Everything lives for the lifetime of the process: no eviction, no
//! windowing, no persistence.

use std::{
    fmt::Write as _,
    time::{Duration, Instant},
};

use dashmap::DashMap;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Upper bounds (seconds) of the request duration histogram buckets.
pub const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Application counters with their help text.
pub const CART_ITEMS_ADDED: &str = "cart_items_added_total";
pub const CART_ITEMS_REMOVED: &str = "cart_items_removed_total";
pub const PAYMENTS: &str = "payments_total";
pub const PAYMENT_NOTIFICATIONS: &str = "payment_notifications_total";
pub const LEGAL_DOCUMENTS_SIGNED: &str = "legal_documents_signed_total";

const KNOWN_COUNTERS: &[(&str, &str)] = &[
    (CART_ITEMS_ADDED, "Cart add operations."),
    (CART_ITEMS_REMOVED, "Cart remove operations."),
    (PAYMENTS, "Payments created or settled, by provider and status."),
    (PAYMENT_NOTIFICATIONS, "Payment provider notifications received, by outcome."),
    (LEGAL_DOCUMENTS_SIGNED, "Legal documents signed."),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RequestKey {
    method: String,
    route: String,
    status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RouteKey {
    method: String,
    route: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CounterKey {
    name: String,
    labels: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
struct Histogram {
    // Per-bucket (non-cumulative) counts; the last slot is the +Inf overflow.
    buckets: [u64; DURATION_BUCKETS.len() + 1],
    sum_seconds: f64,
    count: u64,
}

impl Histogram {
    fn observe(&mut self, seconds: f64) {
        let idx = DURATION_BUCKETS
            .iter()
            .position(|bound| seconds <= *bound)
            .unwrap_or(DURATION_BUCKETS.len());
        self.buckets[idx] += 1;
        self.sum_seconds += seconds;
        self.count += 1;
    }
}

#[derive(Debug)]
pub struct MetricsRegistry {
    started: Instant,
    requests: DashMap<RequestKey, u64>,
    durations: DashMap<RouteKey, Histogram>,
    counters: DashMap<CounterKey, u64>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: DashMap::new(),
            durations: DashMap::new(),
            counters: DashMap::new(),
        }
    }

    /// Record one finished HTTP request.
    pub fn record_request(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        *self
            .requests
            .entry(RequestKey {
                method: method.to_string(),
                route: route.to_string(),
                status,
            })
            .or_insert(0) += 1;

        self.durations
            .entry(RouteKey {
                method: method.to_string(),
                route: route.to_string(),
            })
            .or_default()
            .observe(elapsed.as_secs_f64());
    }

    pub fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_by(name, labels, 1);
    }

    pub fn increment_by(&self, name: &str, labels: &[(&str, &str)], by: u64) {
        *self.counters.entry(counter_key(name, labels)).or_insert(0) += by;
    }

    pub fn request_count(&self, method: &str, route: &str, status: u16) -> u64 {
        self.requests
            .get(&RequestKey {
                method: method.to_string(),
                route: route.to_string(),
                status,
            })
            .map(|v| *v)
            .unwrap_or(0)
    }

    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .get(&counter_key(name, labels))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Render every series. Families and series are sorted so the output is stable.
    pub fn render(&self) -> String {
        let mut body = String::new();

        push_header(
            &mut body,
            "process_uptime_seconds",
            "Seconds since the process started serving.",
            "gauge",
        );
        let _ = writeln!(
            body,
            "process_uptime_seconds {:.3}",
            self.started.elapsed().as_secs_f64()
        );

        let mut requests: Vec<(RequestKey, u64)> = self
            .requests
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        requests.sort();
        push_header(
            &mut body,
            "http_requests_total",
            "Total HTTP requests by method, route and status.",
            "counter",
        );
        for (key, count) in requests {
            let _ = writeln!(
                body,
                "http_requests_total{{method=\"{}\",route=\"{}\",status=\"{}\"}} {}",
                escape_label(&key.method),
                escape_label(&key.route),
                key.status,
                count
            );
        }

        let mut durations: Vec<(RouteKey, Histogram)> = self
            .durations
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        durations.sort_by(|a, b| a.0.cmp(&b.0));
        push_header(
            &mut body,
            "http_request_duration_seconds",
            "HTTP request latency by method and route.",
            "histogram",
        );
        for (key, histogram) in durations {
            let labels = format!(
                "method=\"{}\",route=\"{}\"",
                escape_label(&key.method),
                escape_label(&key.route)
            );
            let mut cumulative = 0_u64;
            for (i, bound) in DURATION_BUCKETS.iter().enumerate() {
                cumulative += histogram.buckets[i];
                let _ = writeln!(
                    body,
                    "http_request_duration_seconds_bucket{{{labels},le=\"{bound}\"}} {cumulative}"
                );
            }
            let _ = writeln!(
                body,
                "http_request_duration_seconds_bucket{{{labels},le=\"+Inf\"}} {}",
                histogram.count
            );
            let _ = writeln!(
                body,
                "http_request_duration_seconds_sum{{{labels}}} {:.6}",
                histogram.sum_seconds
            );
            let _ = writeln!(
                body,
                "http_request_duration_seconds_count{{{labels}}} {}",
                histogram.count
            );
        }

        let mut counters: Vec<(CounterKey, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        counters.sort();
        let mut current_family: Option<String> = None;
        for (key, value) in counters {
            if current_family.as_deref() != Some(key.name.as_str()) {
                push_header(&mut body, &key.name, counter_help(&key.name), "counter");
                current_family = Some(key.name.clone());
            }
            if key.labels.is_empty() {
                let _ = writeln!(body, "{} {}", key.name, value);
            } else {
                let labels = key
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                let _ = writeln!(body, "{}{{{}}} {}", key.name, labels, value);
            }
        }

        body
    }
}

fn counter_key(name: &str, labels: &[(&str, &str)]) -> CounterKey {
    let mut labels: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    labels.sort();
    CounterKey {
        name: name.to_string(),
        labels,
    }
}

fn counter_help(name: &str) -> &'static str {
    KNOWN_COUNTERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, help)| *help)
        .unwrap_or("Application counter.")
}

fn push_header(body: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(body, "# HELP {name} {help}");
    let _ = writeln!(body, "# TYPE {name} {kind}");
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
