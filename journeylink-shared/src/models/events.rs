use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of lifecycle transition carried by a [`DomainEvent`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RideCreated,
    RideUpdated,
    RideCancelled,
    BookingRequested,
    BookingAccepted,
    BookingDeclined,
    BookingCancelled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RideCreated => "RIDE_CREATED",
            EventType::RideUpdated => "RIDE_UPDATED",
            EventType::RideCancelled => "RIDE_CANCELLED",
            EventType::BookingRequested => "BOOKING_REQUESTED",
            EventType::BookingAccepted => "BOOKING_ACCEPTED",
            EventType::BookingDeclined => "BOOKING_DECLINED",
            EventType::BookingCancelled => "BOOKING_CANCELLED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful ride or booking transition, addressed to the users who
/// should hear about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub ride_id: Uuid,
    pub driver_id: String,
    pub booking_id: Option<Uuid>,
    pub passenger_id: Option<String>,
    pub recipients: Vec<String>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: EventType, ride_id: Uuid, driver_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            ride_id,
            driver_id: driver_id.into(),
            booking_id: None,
            passenger_id: None,
            recipients: Vec::new(),
            reason: None,
            timestamp: at,
        }
    }

    pub fn with_booking(mut self, booking_id: Uuid, passenger_id: impl Into<String>) -> Self {
        self.booking_id = Some(booking_id);
        self.passenger_id = Some(passenger_id.into());
        self
    }

    pub fn notify<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients.extend(recipients.into_iter().map(Into::into));
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    /// Whether `user_id` is one of the recipients.
    pub fn is_for(&self, user_id: &str) -> bool {
        self.recipients.iter().any(|r| r == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let ride_id = Uuid::new_v4();
        let booking_id = Uuid::new_v4();
        let event = DomainEvent::new(EventType::BookingAccepted, ride_id, "driver-1", Utc::now())
            .with_booking(booking_id, "passenger-1")
            .notify(["passenger-1"]);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BOOKING_ACCEPTED");
        assert_eq!(json["rideId"], ride_id.to_string());
        assert_eq!(json["driverId"], "driver-1");
        assert_eq!(json["passengerId"], "passenger-1");
        assert!(event.is_for("passenger-1"));
        assert!(!event.is_for("driver-1"));
    }
}
