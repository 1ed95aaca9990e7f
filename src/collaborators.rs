use std::collections::BTreeMap;

pub trait PlaybackController: Send + Sync {
    fn has_active_session(&self) -> bool;
    fn pause(&self);
}

pub trait ContentAdvanceSink: Send + Sync {
    fn signal_advance(&self);
}

pub trait EventSink: Send + Sync {
    fn record(&self, name: &str, attributes: &BTreeMap<String, String>);
}

pub const EVENT_ARMED: &str = "sleep_timer_armed";
pub const EVENT_CANCELLED: &str = "sleep_timer_cancelled";
pub const EVENT_COMPLETED: &str = "sleep_timer_completed";
pub const EVENT_ORPHAN_CLEARED: &str = "sleep_timer_orphan_cleared";

/// Emits analytics events as `tracing` records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, name: &str, attributes: &BTreeMap<String, String>) {
        tracing::info!(target: "sleeptimer::events", event = name, ?attributes, "analytics event");
    }
}

pub(crate) fn attributes<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
