//! Pure payload validation for rides.
//!
//! Validators collect every violated rule instead of stopping at the first,
//! so clients can render all field errors at once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::models::{price_to_cents, NewRide, Place, Ride, RidePatch, RideStatus, Vehicle};

pub const MIN_SEATS: i64 = 1;
pub const MAX_SEATS: i64 = 8;
pub const MAX_PRICE: f64 = 1000.0;
pub const MAX_ADDITIONAL_INFO: usize = 500;
pub const MAX_VEHICLE_FIELD: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.iter().map(|e| e.field.as_str()).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    pub fn single(field: &str, code: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, code, message);
        errors
    }

    pub fn push(&mut self, field: &str, code: &'static str, message: impl Into<String>) {
        self.0.push(FieldError { field: field.to_string(), code, message: message.into() });
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// Validates a new-ride payload and builds the ACTIVE ride it describes.
pub fn validate_new_ride(
    driver_id: &str,
    payload: &NewRide,
    now: DateTime<Utc>,
) -> Result<Ride, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let origin = check_place("origin", &payload.origin, &mut errors);
    let destination = check_place("destination", &payload.destination, &mut errors);
    check_distinct_cities(&origin, &destination, &mut errors);
    check_departure(payload.departure_time, now, &mut errors);
    let seats = check_seats(payload.available_seats, &mut errors);
    let price_cents = check_price(payload.price, &mut errors);
    let vehicle = payload.vehicle.as_ref().map(|v| check_vehicle(v, &mut errors));
    let additional_info = check_additional_info(payload.additional_info.as_deref(), &mut errors);

    errors.into_result(Ride {
        id: Uuid::new_v4(),
        driver_id: driver_id.to_string(),
        origin,
        destination,
        departure_time: payload.departure_time,
        available_seats: seats,
        price_cents,
        vehicle,
        preferences: payload.preferences,
        additional_info,
        status: RideStatus::Active,
        cancel_reason: None,
        created_at: now,
        updated_at: now,
    })
}

/// Applies `patch` over `current`, re-validating only the fields it changes.
///
/// The distinct-city rule is checked against the merged ride whenever either
/// endpoint changes. Seat reductions below the confirmed count are a
/// capacity concern and are left to the store.
pub fn validate_ride_patch(
    current: &Ride,
    patch: &RidePatch,
    now: DateTime<Utc>,
) -> Result<Ride, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let mut ride = current.clone();

    if let Some(origin) = &patch.origin {
        ride.origin = check_place("origin", origin, &mut errors);
    }
    if let Some(destination) = &patch.destination {
        ride.destination = check_place("destination", destination, &mut errors);
    }
    if patch.origin.is_some() || patch.destination.is_some() {
        check_distinct_cities(&ride.origin, &ride.destination, &mut errors);
    }
    if let Some(departure) = patch.departure_time {
        check_departure(departure, now, &mut errors);
        ride.departure_time = departure;
    }
    if let Some(seats) = patch.available_seats {
        ride.available_seats = check_seats(seats, &mut errors);
    }
    if let Some(price) = patch.price {
        ride.price_cents = check_price(price, &mut errors);
    }
    if let Some(vehicle) = &patch.vehicle {
        ride.vehicle = Some(check_vehicle(vehicle, &mut errors));
    }
    if let Some(preferences) = patch.preferences {
        ride.preferences = preferences;
    }
    if patch.additional_info.is_some() {
        ride.additional_info = check_additional_info(patch.additional_info.as_deref(), &mut errors);
    }

    ride.updated_at = now;
    errors.into_result(ride)
}

fn check_place(field: &str, place: &Place, errors: &mut ValidationErrors) -> Place {
    let city = place.city.trim();
    if city.is_empty() {
        errors.push(&format!("{field}.city"), "required", "city is required");
    }
    if let Some(coords) = place.coordinates {
        if !(-90.0..=90.0).contains(&coords.lat) || !(-180.0..=180.0).contains(&coords.lng) {
            errors.push(
                &format!("{field}.coordinates"),
                "out_of_range",
                "latitude must be within [-90, 90] and longitude within [-180, 180]",
            );
        }
    }
    Place {
        city: city.to_string(),
        address: place
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string),
        coordinates: place.coordinates,
    }
}

fn check_distinct_cities(origin: &Place, destination: &Place, errors: &mut ValidationErrors) {
    if !origin.city.is_empty() && origin.city.to_lowercase() == destination.city.to_lowercase() {
        errors.push("destination.city", "same_city", "origin and destination must be different cities");
    }
}

fn check_departure(departure: DateTime<Utc>, now: DateTime<Utc>, errors: &mut ValidationErrors) {
    if departure <= now {
        errors.push("departureTime", "departure_in_past", "departure time must be in the future");
    }
}

fn check_seats(seats: i64, errors: &mut ValidationErrors) -> u32 {
    if !(MIN_SEATS..=MAX_SEATS).contains(&seats) {
        errors.push(
            "availableSeats",
            "out_of_range",
            format!("available seats must be between {MIN_SEATS} and {MAX_SEATS}"),
        );
        return 0;
    }
    seats as u32
}

fn check_price(price: f64, errors: &mut ValidationErrors) -> i64 {
    if !(0.0..=MAX_PRICE).contains(&price) {
        errors.push("price", "out_of_range", format!("price must be between 0 and {MAX_PRICE}"));
        return 0;
    }
    match price_to_cents(price) {
        Some(cents) => cents,
        None => {
            errors.push("price", "too_many_decimals", "price may have at most two decimal places");
            0
        }
    }
}

fn check_vehicle(vehicle: &Vehicle, errors: &mut ValidationErrors) -> Vehicle {
    let mut clean = |field: &str, value: &Option<String>| -> Option<String> {
        let value = value.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
        if value.chars().count() > MAX_VEHICLE_FIELD {
            errors.push(
                &format!("vehicle.{field}"),
                "too_long",
                format!("must be at most {MAX_VEHICLE_FIELD} characters"),
            );
        }
        Some(value.to_string())
    };
    Vehicle {
        make: clean("make", &vehicle.make),
        model: clean("model", &vehicle.model),
        color: clean("color", &vehicle.color),
        plate: clean("plate", &vehicle.plate),
    }
}

fn check_additional_info(info: Option<&str>, errors: &mut ValidationErrors) -> Option<String> {
    let info = info.map(str::trim).filter(|i| !i.is_empty())?;
    if info.chars().count() > MAX_ADDITIONAL_INFO {
        errors.push(
            "additionalInfo",
            "too_long",
            format!("additional info must be at most {MAX_ADDITIONAL_INFO} characters"),
        );
    }
    Some(info.to_string())
}
