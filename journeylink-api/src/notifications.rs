use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures_util::stream::{Stream, StreamExt};
use journeylink_core::EventSink;
use journeylink_shared::DomainEvent;
use std::convert::Infallible;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::middleware::Claims;
use crate::state::AppState;

/// Publishes lifecycle events to connected SSE subscribers.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<DomainEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: DomainEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

/// GET /v1/notifications/stream
/// Events addressed to the caller, as they happen.
pub async fn stream_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = claims.sub;
    let stream = BroadcastStream::new(state.notifications.subscribe()).filter_map(move |result| {
        let event = match result {
            Ok(event) if event.is_for(&user_id) => to_sse(&event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!("Notification stream for {} lagged, skipped {} events", user_id, skipped);
                None
            }
        };
        async move { event.map(Ok::<_, Infallible>) }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: &DomainEvent) -> Option<Event> {
    match Event::default().event(event.event_type.as_str()).json_data(event) {
        Ok(sse) => Some(sse.id(event.id.to_string())),
        Err(e) => {
            warn!("Failed to encode {} event: {}", event.event_type, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use journeylink_shared::EventType;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sink_delivers_to_subscribers() {
        let (tx, mut rx) = broadcast::channel(8);
        let sink = BroadcastSink::new(tx);

        let event = DomainEvent::new(EventType::BookingRequested, Uuid::new_v4(), "driver-1", Utc::now())
            .notify(["driver-1"]);
        sink.emit(event.clone());

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_sink_without_subscribers_does_not_fail() {
        let (tx, _) = broadcast::channel(8);
        BroadcastSink::new(tx)
            .emit(DomainEvent::new(EventType::RideCreated, Uuid::new_v4(), "driver-1", Utc::now()));
    }
}
