use std::sync::{Arc, OnceLock};

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    worker_selections: CounterVec,
    selection_failures: CounterVec,
    available_workers: GaugeVec,
    pipeline_dop: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// `mode` is one of `explicit`, `round_robin`, `all_compute_nodes`;
    /// `kind` is the worker kind label.
    pub fn inc_worker_selections(&self, mode: &str, kind: &str, n: u64) {
        self.inner
            .worker_selections
            .with_label_values(&[mode, kind])
            .inc_by(n as f64);
    }

    pub fn inc_selection_failures(&self, error: &str) {
        self.inner
            .selection_failures
            .with_label_values(&[error])
            .inc();
    }

    pub fn set_available_workers(&self, kind: &str, count: u64) {
        self.inner
            .available_workers
            .with_label_values(&[kind])
            .set(count as f64);
    }

    pub fn observe_pipeline_dop(&self, fragment_kind: &str, dop: u32) {
        self.inner
            .pipeline_dop
            .with_label_values(&[fragment_kind])
            .observe(f64::from(dop));
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let worker_selections = counter_vec(
            &registry,
            "pdq_scheduler_worker_selections_total",
            "Workers handed out to query plans",
            &["mode", "kind"],
        );
        let selection_failures = counter_vec(
            &registry,
            "pdq_scheduler_selection_failures_total",
            "Worker selections that raised an error",
            &["error"],
        );
        let available_workers = gauge_vec(
            &registry,
            "pdq_scheduler_available_workers",
            "Workers in the most recent availability snapshot",
            &["kind"],
        );
        let pipeline_dop = histogram_vec(
            &registry,
            "pdq_scheduler_pipeline_dop",
            "Pipeline DOP chosen per fragment",
            &["fragment_kind"],
            vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0],
        );

        Self {
            registry,
            worker_selections,
            selection_failures,
            available_workers,
            pipeline_dop,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let g = GaugeVec::new(Opts::new(name, help), labels).expect("gauge vec");
    registry
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

fn histogram_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
    buckets: Vec<f64>,
) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
        .expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
