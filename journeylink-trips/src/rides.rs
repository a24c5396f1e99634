use chrono::NaiveDate;
use journeylink_core::pagination::{Cursor, Page};
use journeylink_core::validation::{validate_new_ride, validate_ride_patch, ValidationErrors};
use journeylink_core::{
    EventSink, LifecycleError, LifecycleResult, NewRide, Ride, RidePatch, RideQuery, RideRepository, RideView,
};
use journeylink_shared::{DomainEvent, EventType};
use mockable::Clock;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::bookings::BookingManager;
use crate::retry::read_with_retry;
use crate::SharedClock;

/// Query-string filters for ride search.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<NaiveDate>,
    pub seats: Option<u32>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self { default_page_size: 20, max_page_size: 50 }
    }
}

/// Owns ride creation, edits and cancellation.
pub struct RideManager {
    rides: Arc<dyn RideRepository>,
    bookings: Arc<BookingManager>,
    events: Arc<dyn EventSink>,
    clock: SharedClock,
    limits: SearchLimits,
}

impl RideManager {
    pub fn new(
        rides: Arc<dyn RideRepository>,
        bookings: Arc<BookingManager>,
        events: Arc<dyn EventSink>,
        clock: SharedClock,
    ) -> Self {
        Self { rides, bookings, events, clock, limits: SearchLimits::default() }
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validates the payload and stores a new ACTIVE ride owned by `driver_id`.
    #[instrument(skip(self, payload))]
    pub async fn create_ride(&self, driver_id: &str, payload: &NewRide) -> LifecycleResult<RideView> {
        let now = self.clock.utc();
        let ride = validate_new_ride(driver_id, payload, now)?;
        self.rides.insert_ride(&ride).await?;
        info!(ride_id = %ride.id, seats = ride.available_seats, "Ride created");

        self.events.emit(DomainEvent::new(EventType::RideCreated, ride.id, driver_id, now).notify([driver_id]));
        Ok(RideView::new(ride, 0))
    }

    /// Applies a partial edit while the ride is ACTIVE and has not departed.
    #[instrument(skip(self, patch))]
    pub async fn update_ride(&self, driver_id: &str, ride_id: Uuid, patch: &RidePatch) -> LifecycleResult<RideView> {
        let now = self.clock.utc();
        let ride = self.load_owned(driver_id, ride_id).await?;
        if !ride.is_open(now) {
            return Err(LifecycleError::InvalidState(format!(
                "ride is {} and departs at {}; it can no longer be edited",
                ride.status, ride.departure_time
            )));
        }

        if patch.is_empty() {
            let confirmed = self.confirmed(ride_id).await?;
            return Ok(RideView::new(ride, confirmed));
        }

        let updated = validate_ride_patch(&ride, patch, now)?;
        if updated.available_seats < ride.available_seats {
            let confirmed = self.confirmed(ride_id).await?;
            if updated.available_seats < confirmed {
                return Err(LifecycleError::Capacity(format!(
                    "{confirmed} bookings are confirmed; seats cannot drop to {}",
                    updated.available_seats
                )));
            }
        }

        // The store re-checks the seat guard under its own lock.
        let view = self.rides.update_ride(&updated).await?;
        info!("Ride updated");

        // The edit is committed; a failed lookup only costs the notification.
        match self.bookings.active_passengers(ride_id).await {
            Ok(passengers) => {
                self.events.emit(DomainEvent::new(EventType::RideUpdated, ride_id, driver_id, now).notify(passengers))
            }
            Err(e) => warn!(error = %e, "Ride updated but passengers could not be notified"),
        }
        Ok(view)
    }

    /// ACTIVE -> CANCELLED, cascading to every PENDING or CONFIRMED booking.
    #[instrument(skip(self))]
    pub async fn cancel_ride(&self, driver_id: &str, ride_id: Uuid, reason: Option<String>) -> LifecycleResult<RideView> {
        let now = self.clock.utc();
        let ride = self.load_owned(driver_id, ride_id).await?;
        if ride.status.is_terminal() {
            return Err(LifecycleError::InvalidState(format!("ride is already {}", ride.status)));
        }
        if ride.departure_time <= now {
            return Err(LifecycleError::InvalidState("ride has already departed".to_string()));
        }

        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let cancelled = self.rides.cancel_ride(ride_id, reason.as_deref(), now).await?;
        info!(affected = cancelled.bookings.len(), "Ride cancelled");
        self.bookings.announce_ride_cancellation(&cancelled.ride, &cancelled.bookings);

        self.events.emit(
            DomainEvent::new(EventType::RideCancelled, ride_id, driver_id, now)
                .notify(cancelled.bookings.into_iter().map(|b| b.passenger_id))
                .with_reason(reason),
        );
        Ok(RideView::new(cancelled.ride, 0))
    }

    pub async fn get_ride(&self, ride_id: Uuid) -> LifecycleResult<RideView> {
        let ride = self.load(ride_id).await?;
        let confirmed = self.confirmed(ride_id).await?;
        Ok(RideView::new(ride, confirmed))
    }

    /// One page of upcoming ACTIVE rides matching `params`.
    pub async fn search_rides(&self, params: &SearchParams) -> LifecycleResult<Page<RideView>> {
        let limit = params
            .limit
            .unwrap_or(self.limits.default_page_size)
            .clamp(1, self.limits.max_page_size);
        let after = match params.cursor.as_deref().filter(|c| !c.is_empty()) {
            Some(token) => Some(
                Cursor::decode(token)
                    .map_err(|e| ValidationErrors::single("cursor", "invalid_cursor", e.to_string()))?
                    .as_key(),
            ),
            None => None,
        };

        let query = RideQuery {
            from_city: params.from.clone().filter(|c| !c.trim().is_empty()),
            to_city: params.to.clone().filter(|c| !c.trim().is_empty()),
            date: params.date,
            min_seats: params.seats,
            departing_after: self.clock.utc(),
            after,
            limit: limit + 1,
        };
        let rows = read_with_retry("search_rides", || self.rides.search_rides(&query)).await?;
        Ok(Page::from_overfetch(rows, limit, |v| Cursor::new(v.ride.departure_time, v.ride.id)))
    }

    pub async fn list_driver_rides(&self, driver_id: &str) -> LifecycleResult<Vec<RideView>> {
        Ok(read_with_retry("list_driver_rides", || self.rides.list_driver_rides(driver_id)).await?)
    }

    async fn load(&self, ride_id: Uuid) -> LifecycleResult<Ride> {
        read_with_retry("get_ride", || self.rides.get_ride(ride_id))
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("ride {ride_id}")))
    }

    async fn load_owned(&self, driver_id: &str, ride_id: Uuid) -> LifecycleResult<Ride> {
        let ride = self.load(ride_id).await?;
        if ride.driver_id != driver_id {
            return Err(LifecycleError::Authorization("ride belongs to another driver".to_string()));
        }
        Ok(ride)
    }

    async fn confirmed(&self, ride_id: Uuid) -> LifecycleResult<u32> {
        Ok(read_with_retry("confirmed_count", || self.rides.confirmed_count(ride_id)).await?)
    }
}
