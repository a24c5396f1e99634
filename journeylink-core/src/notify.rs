use journeylink_shared::DomainEvent;
use std::sync::Arc;
use tracing::info;

/// Receiver of lifecycle events.
///
/// `emit` must not block on delivery: implementations that do I/O hand the
/// event off and report failures through logs. A failed delivery never
/// undoes the transition that produced the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: DomainEvent) {
        info!(
            event_type = %event.event_type,
            ride_id = %event.ride_id,
            booking_id = ?event.booking_id,
            recipients = event.recipients.len(),
            "Lifecycle event"
        );
    }
}

/// Forwards each event to every inner sink.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: DomainEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
