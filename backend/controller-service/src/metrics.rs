use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

static MESSAGES_CONSUMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "controller_messages_consumed_total",
        "Measurements pulled from Kafka and decoded successfully",
    )
    .expect("failed to create controller_messages_consumed_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register controller_messages_consumed_total");
    counter
});

static DECODE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "controller_decode_failures_total",
        "Kafka payloads skipped because they were not valid measurements",
    )
    .expect("failed to create controller_decode_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register controller_decode_failures_total");
    counter
});

static BROADCAST_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "controller_broadcast_failures_total",
        "Measurements that could not be handed to the backplane",
    )
    .expect("failed to create controller_broadcast_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register controller_broadcast_failures_total");
    counter
});

static BROKER_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "controller_broker_failures_total",
            "Kafka failures that triggered a backoff, by classification",
        ),
        &["kind"],
    )
    .expect("failed to create controller_broker_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register controller_broker_failures_total");
    counter
});

static BACKOFF_SECONDS: Lazy<Gauge> = Lazy::new(|| {
    let gauge = Gauge::new(
        "controller_backoff_seconds",
        "Current retry delay of the Kafka ingest loop",
    )
    .expect("failed to create controller_backoff_seconds");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register controller_backoff_seconds");
    gauge
});

static CONNECTED_SUBSCRIBERS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "controller_connected_subscribers",
        "WebSocket subscribers connected to this instance",
    )
    .expect("failed to create controller_connected_subscribers");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register controller_connected_subscribers");
    gauge
});

static BACKPLANE_RELAYED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "controller_backplane_relayed_total",
        "Backplane events relayed to local subscribers",
    )
    .expect("failed to create controller_backplane_relayed_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register controller_backplane_relayed_total");
    counter
});

pub fn record_message_consumed() {
    MESSAGES_CONSUMED_TOTAL.inc();
}

pub fn record_decode_failure() {
    DECODE_FAILURES_TOTAL.inc();
}

pub fn record_broadcast_failure() {
    BROADCAST_FAILURES_TOTAL.inc();
}

pub fn record_broker_failure(kind: &str) {
    BROKER_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn set_backoff(delay: Duration) {
    BACKOFF_SECONDS.set(delay.as_secs_f64());
}

pub fn set_connected_subscribers(count: usize) {
    CONNECTED_SUBSCRIBERS.set(count as i64);
}

pub fn record_backplane_relay() {
    BACKPLANE_RELAYED_TOTAL.inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
