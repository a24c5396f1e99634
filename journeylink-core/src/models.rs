use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ride status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Active,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Active => "ACTIVE",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RideStatus::Active)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(RideStatus::Active),
            "COMPLETED" => Ok(RideStatus::Completed),
            "CANCELLED" => Ok(RideStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Declined,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Declined => "DECLINED",
        }
    }

    /// PENDING and CONFIRMED bookings hold (or may hold) a seat.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "DECLINED" => Ok(BookingStatus::Declined),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    #[serde(default)]
    pub smoking: bool,
    #[serde(default)]
    pub pets: bool,
}

/// A driver-posted trip offer with seats for sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: Uuid,
    pub driver_id: String,
    pub origin: Place,
    pub destination: Place,
    pub departure_time: DateTime<Utc>,
    pub available_seats: u32,
    pub price_cents: i64,
    pub vehicle: Option<Vehicle>,
    pub preferences: Preferences,
    pub additional_info: Option<String>,
    pub status: RideStatus,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    /// Whether the driver may still edit or book against this ride at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == RideStatus::Active && self.departure_time > now
    }

    /// Seats left once `confirmed` bookings are accounted for.
    pub fn remaining_seats(&self, confirmed: u32) -> u32 {
        self.available_seats.saturating_sub(confirmed)
    }

    pub fn price(&self) -> f64 {
        cents_to_price(self.price_cents)
    }
}

/// A ride together with its derived seat availability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideView {
    #[serde(flatten)]
    pub ride: Ride,
    pub price: f64,
    pub remaining_seats: u32,
}

impl RideView {
    pub fn new(ride: Ride, confirmed: u32) -> Self {
        let remaining_seats = ride.remaining_seats(confirmed);
        let price = ride.price();
        Self { ride, price, remaining_seats }
    }
}

/// A passenger's request to occupy one seat on a ride.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub passenger_id: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn pending(ride_id: Uuid, passenger_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ride_id,
            passenger_id: passenger_id.into(),
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Payload for posting a new ride.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRide {
    pub origin: Place,
    pub destination: Place,
    pub departure_time: DateTime<Utc>,
    pub available_seats: i64,
    pub price: f64,
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub additional_info: Option<String>,
}

/// Partial update of a ride; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RidePatch {
    #[serde(default)]
    pub origin: Option<Place>,
    #[serde(default)]
    pub destination: Option<Place>,
    #[serde(default)]
    pub departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub available_seats: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
    #[serde(default)]
    pub preferences: Option<Preferences>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

impl RidePatch {
    pub fn is_empty(&self) -> bool {
        self.origin.is_none()
            && self.destination.is_none()
            && self.departure_time.is_none()
            && self.available_seats.is_none()
            && self.price.is_none()
            && self.vehicle.is_none()
            && self.preferences.is_none()
            && self.additional_info.is_none()
    }
}

/// Store-level ride search. Only ACTIVE rides departing after
/// `departing_after` are returned, ordered by `(departure_time, id)`.
#[derive(Debug, Clone)]
pub struct RideQuery {
    pub from_city: Option<String>,
    pub to_city: Option<String>,
    pub date: Option<NaiveDate>,
    pub min_seats: Option<u32>,
    pub departing_after: DateTime<Utc>,
    pub after: Option<(DateTime<Utc>, Uuid)>,
    pub limit: usize,
}

impl RideQuery {
    /// Filter evaluation shared by in-process stores.
    pub fn matches(&self, view: &RideView) -> bool {
        let ride = &view.ride;
        if ride.status != RideStatus::Active || ride.departure_time <= self.departing_after {
            return false;
        }
        if let Some(from) = &self.from_city {
            if !ride.origin.city.eq_ignore_ascii_case(from.trim()) {
                return false;
            }
        }
        if let Some(to) = &self.to_city {
            if !ride.destination.city.eq_ignore_ascii_case(to.trim()) {
                return false;
            }
        }
        if let Some(date) = self.date {
            if ride.departure_time.date_naive() != date {
                return false;
            }
        }
        if let Some(min) = self.min_seats {
            if view.remaining_seats < min {
                return false;
            }
        }
        if let Some((time, id)) = self.after {
            if (ride.departure_time, ride.id) <= (time, id) {
                return false;
            }
        }
        true
    }
}

/// Converts a decimal price to integer cents, rejecting more than two
/// decimal places.
pub fn price_to_cents(price: f64) -> Option<i64> {
    if !price.is_finite() {
        return None;
    }
    let scaled = price * 100.0;
    let rounded = scaled.round();
    if (scaled - rounded).abs() > 1e-6 {
        return None;
    }
    Some(rounded as i64)
}

pub fn cents_to_price(cents: i64) -> f64 {
    cents as f64 / 100.0
}
