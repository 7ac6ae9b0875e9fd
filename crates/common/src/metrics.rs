use std::sync::{Arc, OnceLock};

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    queries_compiled: CounterVec,
    queries_started: CounterVec,
    compile_seconds: HistogramVec,
    function_invocations: CounterVec,
    function_errors: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Record the outcome of one statement compile. `result` is `"ok"` or the
    /// failing pipeline stage name.
    pub fn inc_compiled(&self, result: &str) {
        self.inner
            .queries_compiled
            .with_label_values(&[result])
            .inc();
    }

    pub fn inc_started(&self, query_id: &str) {
        self.inner
            .queries_started
            .with_label_values(&[query_id])
            .inc();
    }

    pub fn observe_compile_seconds(&self, stage: &str, secs: f64) {
        self.inner
            .compile_seconds
            .with_label_values(&[stage])
            .observe(secs.max(0.0));
    }

    pub fn inc_function_invocation(&self, function: &str) {
        self.inner
            .function_invocations
            .with_label_values(&[function])
            .inc();
    }

    pub fn inc_function_error(&self, function: &str) {
        self.inner
            .function_errors
            .with_label_values(&[function])
            .inc();
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

        let queries_compiled = counter_vec(
            &registry,
            "csql_queries_compiled_total",
            "Statement compiles by outcome",
            &["result"],
        );
        let queries_started = counter_vec(
            &registry,
            "csql_queries_started_total",
            "Queries handed to the execution substrate",
            &["query_id"],
        );
        let compile_seconds = histogram_vec(
            &registry,
            "csql_compile_seconds",
            "Time spent per compilation stage",
            &["stage"],
        );
        let function_invocations = counter_vec(
            &registry,
            "csql_function_invocations_total",
            "Registered-function invocations",
            &["function"],
        );
        let function_errors = counter_vec(
            &registry,
            "csql_function_errors_total",
            "Registered-function invocations downgraded to null",
            &["function"],
        );

        Self {
            registry,
            queries_compiled,
            queries_started,
            compile_seconds,
            function_invocations,
            function_errors,
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

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
