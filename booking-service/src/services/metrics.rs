use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use prometheus::{IntCounterVec, Opts, Registry};

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
static PROMETHEUS_REGISTRY: OnceCell<Registry> = OnceCell::new();
static BOOKINGS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SETTLEMENT_PAISE_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// Install the recorder and register engine counters. Safe to call more
/// than once (tests spawn several applications per process).
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        if let Ok(handle) = PrometheusBuilder::new().install_recorder() {
            let _ = METRICS_HANDLE.set(handle);
        }
    }

    let registry = PROMETHEUS_REGISTRY.get_or_init(Registry::new);

    BOOKINGS_TOTAL.get_or_init(|| {
        let counter = IntCounterVec::new(
            Opts::new("bookings_total", "Bookings by terminal outcome"),
            &["status"],
        )
        .expect("failed to create bookings_total metric");
        registry
            .register(Box::new(counter.clone()))
            .expect("failed to register bookings_total");
        counter
    });

    SETTLEMENT_PAISE_TOTAL.get_or_init(|| {
        let counter = IntCounterVec::new(
            Opts::new(
                "settlement_paise_total",
                "Paise settled back to each party on cancellation",
            ),
            &["party"],
        )
        .expect("failed to create settlement_paise_total metric");
        registry
            .register(Box::new(counter.clone()))
            .expect("failed to register settlement_paise_total");
        counter
    });
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Count a booking reaching a lifecycle milestone.
pub fn record_booking(status: &str) {
    if let Some(counter) = BOOKINGS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

/// Meter settlement flow back to a party.
pub fn record_settlement(party: &str, amount_paise: i64) {
    if let Some(counter) = SETTLEMENT_PAISE_TOTAL.get() {
        counter
            .with_label_values(&[party])
            .inc_by(amount_paise.max(0) as u64);
    }
}
