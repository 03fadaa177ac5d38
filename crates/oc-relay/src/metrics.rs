//! Metrics collection and export

use prometheus::{Counter, Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Relay counters. Only event kinds and sizes are recorded.
pub struct RelayMetrics {
    uploads_received: Counter,
    uploads_forwarded: Counter,
    bytes_received: Counter,
    bytes_forwarded: Counter,
    rejections: IntCounterVec,
    forward_duration: Histogram,
    registry: Registry,
}

impl RelayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let uploads_received = Counter::with_opts(Opts::new(
            "oc_relay_uploads_received_total",
            "Total uploads received",
        ))?;
        registry.register(Box::new(uploads_received.clone()))?;

        let uploads_forwarded = Counter::with_opts(Opts::new(
            "oc_relay_uploads_forwarded_total",
            "Total uploads accepted by the next hop",
        ))?;
        registry.register(Box::new(uploads_forwarded.clone()))?;

        let bytes_received = Counter::with_opts(Opts::new(
            "oc_relay_bytes_received_total",
            "Total payload bytes received",
        ))?;
        registry.register(Box::new(bytes_received.clone()))?;

        let bytes_forwarded = Counter::with_opts(Opts::new(
            "oc_relay_bytes_forwarded_total",
            "Total payload bytes forwarded",
        ))?;
        registry.register(Box::new(bytes_forwarded.clone()))?;

        let rejections = IntCounterVec::new(
            Opts::new("oc_relay_rejections_total", "Rejected uploads by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(rejections.clone()))?;

        let forward_duration = Histogram::with_opts(HistogramOpts::new(
            "oc_relay_forward_duration_seconds",
            "Round-trip time of the next-hop call in seconds",
        ))?;
        registry.register(Box::new(forward_duration.clone()))?;

        Ok(Self {
            uploads_received,
            uploads_forwarded,
            bytes_received,
            bytes_forwarded,
            rejections,
            forward_duration,
            registry,
        })
    }

    pub fn record_received(&self, bytes: usize) {
        self.uploads_received.inc();
        self.bytes_received.inc_by(bytes as f64);
    }

    pub fn record_forward(&self, bytes: usize, duration: std::time::Duration) {
        self.uploads_forwarded.inc();
        self.bytes_forwarded.inc_by(bytes as f64);
        self.forward_duration.observe(duration.as_secs_f64());
    }

    pub fn record_rejection(&self, reason: &str) {
        self.rejections.with_label_values(&[reason]).inc();
    }

    pub fn uploads_received(&self) -> f64 {
        self.uploads_received.get()
    }

    pub fn uploads_forwarded(&self) -> f64 {
        self.uploads_forwarded.get()
    }

    pub fn rejections(&self, reason: &str) -> u64 {
        self.rejections.with_label_values(&[reason]).get()
    }

    /// Export Prometheus format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
