use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub status_transitions_total: IntCounterVec,
    pub position_samples_total: IntCounter,
    pub events_published_total: IntCounterVec,
    pub events_dropped_total: IntCounterVec,
    pub live_connections: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Total assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of assignment processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Order status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid status_transitions_total metric");

        let position_samples_total =
            IntCounter::new("position_samples_total", "Position samples recorded")
                .expect("valid position_samples_total metric");

        let events_published_total = IntCounterVec::new(
            Opts::new(
                "events_published_total",
                "Realtime events handed to a live connection",
            ),
            &["event"],
        )
        .expect("valid events_published_total metric");

        let events_dropped_total = IntCounterVec::new(
            Opts::new("events_dropped_total", "Realtime events not delivered"),
            &["reason"],
        )
        .expect("valid events_dropped_total metric");

        let live_connections =
            IntGauge::new("live_connections", "Currently admitted websocket connections")
                .expect("valid live_connections metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(position_samples_total.clone()))
            .expect("register position_samples_total");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");
        registry
            .register(Box::new(events_dropped_total.clone()))
            .expect("register events_dropped_total");
        registry
            .register(Box::new(live_connections.clone()))
            .expect("register live_connections");

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            status_transitions_total,
            position_samples_total,
            events_published_total,
            events_dropped_total,
            live_connections,
        }
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
