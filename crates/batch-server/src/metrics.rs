use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Prometheus metrics for the batch server
pub struct ServerMetrics {
    pub registry: Registry,

    // Requests by kind
    pub requests_total: IntCounterVec,

    // Decode failures by error kind
    pub decode_errors_total: IntCounterVec,

    pub connections_active: IntGauge,
}

impl ServerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("bq_requests_total", "Total number of requests by type"),
            &["request_type"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let decode_errors_total = IntCounterVec::new(
            Opts::new("bq_decode_errors_total", "Requests that failed to decode"),
            &["kind"],
        )?;
        registry.register(Box::new(decode_errors_total.clone()))?;

        let connections_active =
            IntGauge::new("bq_connections_active", "Number of open client connections")?;
        registry.register(Box::new(connections_active.clone()))?;

        Ok(ServerMetrics {
            registry,
            requests_total,
            decode_errors_total,
            connections_active,
        })
    }

    pub fn inc_requests(&self, request_type: &str) {
        self.requests_total.with_label_values(&[request_type]).inc();
    }

    pub fn inc_decode_errors(&self, kind: &str) {
        self.decode_errors_total.with_label_values(&[kind]).inc();
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
