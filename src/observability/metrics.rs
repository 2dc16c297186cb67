use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub accept_requests_total: IntCounterVec,
    pub status_updates_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub tasks_assigned_total: IntCounter,
    pub notification_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let accept_requests_total = IntCounterVec::new(
            Opts::new("accept_requests_total", "Task acceptance requests by outcome"),
            &["outcome"],
        )
        .expect("valid accept_requests_total metric");

        let status_updates_total = IntCounterVec::new(
            Opts::new("status_updates_total", "Status update requests by outcome"),
            &["outcome"],
        )
        .expect("valid status_updates_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch operations in seconds",
            ),
            &["operation", "outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let tasks_assigned_total = IntCounter::new(
            "tasks_assigned_total",
            "Delivery tasks assigned to riders, counting every stop of a route",
        )
        .expect("valid tasks_assigned_total metric");

        let notification_failures_total = IntCounter::new(
            "notification_failures_total",
            "Notifications the sink failed to accept",
        )
        .expect("valid notification_failures_total metric");

        registry
            .register(Box::new(accept_requests_total.clone()))
            .expect("register accept_requests_total");
        registry
            .register(Box::new(status_updates_total.clone()))
            .expect("register status_updates_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(tasks_assigned_total.clone()))
            .expect("register tasks_assigned_total");
        registry
            .register(Box::new(notification_failures_total.clone()))
            .expect("register notification_failures_total");

        Self {
            registry,
            accept_requests_total,
            status_updates_total,
            dispatch_latency_seconds,
            tasks_assigned_total,
            notification_failures_total,
        }
    }

    /// Records one finished dispatch operation.
    pub fn observe(&self, operation: &str, outcome: &str, elapsed_seconds: f64) {
        let counter = match operation {
            "accept" => &self.accept_requests_total,
            _ => &self.status_updates_total,
        };
        counter.with_label_values(&[outcome]).inc();
        self.dispatch_latency_seconds
            .with_label_values(&[operation, outcome])
            .observe(elapsed_seconds);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
