//! Prometheus metrics for the Bitvavo streaming client.
//!
//! Covers:
//! - Connection state and reconnects
//! - Dispatch outcomes per channel (delivered, dropped, routing miss, decode failure)
//! - Active subscriptions per channel
//! - Authentication state
//! - REST rate limit budget
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter,
    register_int_gauge, register_int_gauge_vec, CounterVec, Encoder, Gauge, GaugeVec, IntCounter,
    IntGauge, IntGaugeVec, TextEncoder,
};

/// WebSocket connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "bitvavo_ws_connected",
        "WebSocket connection state (1=connected)"
    )
    .unwrap()
});

/// Total WebSocket reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bitvavo_ws_reconnect_total",
        "Total WebSocket reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Events delivered to consumer streams.
pub static EVENTS_DELIVERED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bitvavo_ws_events_delivered_total",
        "Events delivered to consumer streams",
        &["channel"]
    )
    .unwrap()
});

/// Events dropped because the consumer stream was full or closed.
pub static EVENTS_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bitvavo_ws_events_dropped_total",
        "Events dropped because the consumer stream was full or closed",
        &["channel", "reason"]
    )
    .unwrap()
});

/// Inbound events with no active subscription.
pub static ROUTING_MISS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bitvavo_ws_routing_miss_total",
        "Inbound events for keys without an active subscription",
        &["channel"]
    )
    .unwrap()
});

/// Inbound frames that failed to decode.
pub static DECODE_FAILURE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bitvavo_ws_decode_failure_total",
        "Inbound frames that failed to decode",
        &["channel"]
    )
    .unwrap()
});

/// Inbound frames with an unrecognized event discriminator.
pub static UNKNOWN_EVENT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bitvavo_ws_unknown_event_total",
        "Inbound frames with an unrecognized event discriminator"
    )
    .unwrap()
});

/// Error frames received from the venue.
pub static ERROR_FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bitvavo_ws_error_frames_total",
        "Error frames received from the venue",
        &["action"]
    )
    .unwrap()
});

/// Active subscription keys per channel.
pub static ACTIVE_SUBSCRIPTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "bitvavo_ws_active_subscriptions",
        "Active subscription keys per channel",
        &["channel"]
    )
    .unwrap()
});

/// Authentication state machine current state.
pub static AUTH_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "bitvavo_ws_auth_state",
        "Authentication state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Remaining REST request weight.
pub static RATELIMIT_REMAINING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "bitvavo_http_ratelimit_remaining",
        "Remaining REST request weight in the current window"
    )
    .unwrap()
});

const AUTH_STATES: [&str; 4] = [
    "unauthenticated",
    "auth_requested",
    "authenticated",
    "auth_failed",
];

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record WebSocket connected.
    pub fn ws_connected() {
        WS_CONNECTED.set(1.0);
    }

    /// Record WebSocket disconnected.
    pub fn ws_disconnected() {
        WS_CONNECTED.set(0.0);
    }

    /// Record WebSocket reconnection.
    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn event_delivered(channel: &str) {
        EVENTS_DELIVERED_TOTAL.with_label_values(&[channel]).inc();
    }

    /// Record a dropped event. `reason` is "full" or "closed".
    pub fn event_dropped(channel: &str, reason: &str) {
        EVENTS_DROPPED_TOTAL
            .with_label_values(&[channel, reason])
            .inc();
    }

    pub fn routing_miss(channel: &str) {
        ROUTING_MISS_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn decode_failure(channel: &str) {
        DECODE_FAILURE_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn unknown_event() {
        UNKNOWN_EVENT_TOTAL.inc();
    }

    pub fn error_frame(action: &str) {
        ERROR_FRAMES_TOTAL.with_label_values(&[action]).inc();
    }

    pub fn active_subscriptions(channel: &str, count: usize) {
        ACTIVE_SUBSCRIPTIONS
            .with_label_values(&[channel])
            .set(count as i64);
    }

    /// Set authentication state. Only the active state is set to 1.
    pub fn auth_state_set(state: &str) {
        for s in AUTH_STATES {
            AUTH_STATE.with_label_values(&[s]).set(0.0);
        }
        AUTH_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn ratelimit_remaining(remaining: i64) {
        RATELIMIT_REMAINING.set(remaining);
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
