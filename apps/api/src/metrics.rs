use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub struct AppMetrics {
    registry: Registry,
    request_counter: IntCounterVec,
    request_duration: HistogramVec,
}

impl AppMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let request_counter = IntCounterVec::new(
            Opts::new(
                "playground_requests_total",
                "Total playground requests by action and response status",
            ),
            &["action", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "playground_request_duration_seconds",
                "Latency of playground request handling in seconds",
            ),
            &["action"],
        )?;
        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        Ok(Self {
            registry,
            request_counter,
            request_duration,
        })
    }

    pub fn record_request(&self, action: &str, status: u16, duration: Duration) {
        self.request_counter
            .with_label_values(&[action, &status.to_string()])
            .inc();
        self.request_duration
            .with_label_values(&[action])
            .observe(duration.as_secs_f64());
    }

    pub fn render(&self) -> anyhow::Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
