// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order placement and numbering fallbacks
// - Status transitions (committed and rejected)
// - Realtime fan-out (delivered / nobody listening) and live connections
// - Invoice side effect failures
// - Redis counter circuit breaker and overall health
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_created: IntCounter,
    pub order_number_fallbacks: IntCounterVec,
    pub order_transitions: IntCounterVec,
    pub order_transition_rejections: IntCounterVec,
    pub order_transition_duration: HistogramVec,
    pub invoice_failures: IntCounter,

    // Realtime Metrics
    pub notifications_delivered: IntCounterVec,
    pub notifications_undelivered: IntCounterVec,
    pub active_connections: IntGaugeVec,

    // Infrastructure Metrics
    pub circuit_breaker_state: IntGauge,
    pub health_status: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Metrics
        let orders_created = IntCounter::new("orders_created_total", "Total orders placed")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_number_fallbacks = IntCounterVec::new(
            Opts::new(
                "order_number_fallbacks_total",
                "Order numbers produced by a degraded path",
            ),
            &["fallback"],
        )?;
        registry.register(Box::new(order_number_fallbacks.clone()))?;

        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Committed order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        let order_transition_rejections = IntCounterVec::new(
            Opts::new(
                "order_transition_rejections_total",
                "Rejected order status transitions",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(order_transition_rejections.clone()))?;

        let order_transition_duration = HistogramVec::new(
            HistogramOpts::new(
                "order_transition_duration_seconds",
                "Time from request to committed transition",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["to"],
        )?;
        registry.register(Box::new(order_transition_duration.clone()))?;

        let invoice_failures = IntCounter::new(
            "invoice_failures_total",
            "Invoice generations that failed after all retries",
        )?;
        registry.register(Box::new(invoice_failures.clone()))?;

        // Realtime Metrics
        let notifications_delivered = IntCounterVec::new(
            Opts::new(
                "notifications_delivered_total",
                "Push messages handed to live connections",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(notifications_delivered.clone()))?;

        let notifications_undelivered = IntCounterVec::new(
            Opts::new(
                "notifications_undelivered_total",
                "Events published while the target identity had no live connection",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(notifications_undelivered.clone()))?;

        let active_connections = IntGaugeVec::new(
            Opts::new("active_connections", "Live realtime connections"),
            &["role"],
        )?;
        registry.register(Box::new(active_connections.clone()))?;

        // Infrastructure Metrics
        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Redis counter circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let health_status = IntGauge::new(
            "health_status",
            "Overall health (0=Unhealthy, 1=Degraded, 2=Healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_number_fallbacks,
            order_transitions,
            order_transition_rejections,
            order_transition_duration,
            invoice_failures,
            notifications_delivered,
            notifications_undelivered,
            active_connections,
            circuit_breaker_state,
            health_status,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self) {
        self.orders_created.inc();
    }

    /// `fallback` is `scan` (counter unusable) or `timestamp` (attempts exhausted)
    pub fn record_number_fallback(&self, fallback: &str) {
        self.order_number_fallbacks.with_label_values(&[fallback]).inc();
    }

    pub fn record_transition(&self, from: &str, to: &str, duration_secs: f64) {
        self.order_transitions.with_label_values(&[from, to]).inc();
        self.order_transition_duration
            .with_label_values(&[to])
            .observe(duration_secs);
    }

    pub fn record_rejection(&self, reason: &str) {
        self.order_transition_rejections
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_invoice_failure(&self) {
        self.invoice_failures.inc();
    }

    /// Helper to record one fan-out outcome
    pub fn record_delivery(&self, event_type: &str, delivered: usize) {
        if delivered == 0 {
            self.notifications_undelivered
                .with_label_values(&[event_type])
                .inc();
        } else {
            self.notifications_delivered
                .with_label_values(&[event_type])
                .inc_by(delivered as u64);
        }
    }

    pub fn set_active_connections(&self, role: &str, count: usize) {
        self.active_connections
            .with_label_values(&[role])
            .set(count as i64);
    }

    pub fn update_circuit_breaker_state(&self, state: i64) {
        self.circuit_breaker_state.set(state);
    }

    pub fn update_health_status(&self, status: i64) {
        self.health_status.set(status);
    }
}
