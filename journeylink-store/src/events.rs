use journeylink_core::EventSink;
use journeylink_shared::DomainEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                debug!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Publishes lifecycle events to Kafka keyed by ride id, so every event of a
/// ride lands on the same partition.
#[derive(Clone)]
pub struct KafkaEventSink {
    producer: EventProducer,
    topic: String,
}

impl KafkaEventSink {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self { producer, topic: topic.into() }
    }
}

impl EventSink for KafkaEventSink {
    fn emit(&self, event: DomainEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.event_type, e);
                return;
            }
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, dropping {} event for ride {}", event.event_type, event.ride_id);
            return;
        };

        let producer = self.producer.clone();
        let topic = self.topic.clone();
        let key = event.ride_id.to_string();
        handle.spawn(async move {
            // Failure is already logged by publish.
            let _ = producer.publish(&topic, &key, &payload).await;
        });
    }
}
