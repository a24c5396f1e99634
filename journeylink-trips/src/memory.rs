use async_trait::async_trait;
use chrono::{DateTime, Utc};
use journeylink_core::{
    Booking, BookingRepository, BookingStatus, CancelledRide, Ride, RideQuery, RideRepository, RideStatus, RideView,
    StoreError, StoreResult,
};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    rides: HashMap<Uuid, Ride>,
    bookings: HashMap<Uuid, Booking>,
}

impl Tables {
    fn ride(&self, id: Uuid) -> StoreResult<&Ride> {
        self.rides.get(&id).ok_or(StoreError::RideNotFound(id))
    }

    fn confirmed(&self, ride_id: Uuid) -> u32 {
        self.bookings
            .values()
            .filter(|b| b.ride_id == ride_id && b.status == BookingStatus::Confirmed)
            .count() as u32
    }

    fn view(&self, ride: &Ride) -> RideView {
        RideView::new(ride.clone(), self.confirmed(ride.id))
    }

    fn require_active(&self, ride_id: Uuid) -> StoreResult<&Ride> {
        let ride = self.ride(ride_id)?;
        if ride.status != RideStatus::Active {
            return Err(StoreError::RideNotActive { ride_id, status: ride.status });
        }
        Ok(ride)
    }
}

/// In-process store for development and tests.
///
/// One mutex covers both tables, so every guarded write sees and changes a
/// consistent snapshot.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RideRepository for MemoryStore {
    async fn insert_ride(&self, ride: &Ride) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        tables.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        Ok(self.tables.lock().await.rides.get(&id).cloned())
    }

    async fn update_ride(&self, ride: &Ride) -> StoreResult<RideView> {
        let mut tables = self.tables.lock().await;
        tables.require_active(ride.id)?;
        let confirmed = tables.confirmed(ride.id);
        if ride.available_seats < confirmed {
            return Err(StoreError::SeatsBelowConfirmed { ride_id: ride.id, confirmed });
        }
        let stored = tables.rides.get_mut(&ride.id).ok_or(StoreError::RideNotFound(ride.id))?;
        let mut updated = ride.clone();
        // Identity, ownership and lifecycle columns are not editable.
        updated.driver_id = stored.driver_id.clone();
        updated.status = stored.status;
        updated.cancel_reason = stored.cancel_reason.clone();
        updated.created_at = stored.created_at;
        *stored = updated.clone();
        Ok(RideView::new(updated, confirmed))
    }

    async fn cancel_ride(&self, id: Uuid, reason: Option<&str>, at: DateTime<Utc>) -> StoreResult<CancelledRide> {
        let mut tables = self.tables.lock().await;
        tables.require_active(id)?;
        let ride = tables.rides.get_mut(&id).ok_or(StoreError::RideNotFound(id))?;
        ride.status = RideStatus::Cancelled;
        ride.cancel_reason = reason.map(str::to_string);
        ride.updated_at = at;
        let ride = ride.clone();

        let mut bookings = Vec::new();
        for booking in tables.bookings.values_mut() {
            if booking.ride_id == id && booking.status.is_active() {
                booking.status = BookingStatus::Cancelled;
                booking.updated_at = at;
                bookings.push(booking.clone());
            }
        }
        bookings.sort_by_key(|b| (b.created_at, b.id));
        Ok(CancelledRide { ride, bookings })
    }

    async fn confirmed_count(&self, ride_id: Uuid) -> StoreResult<u32> {
        Ok(self.tables.lock().await.confirmed(ride_id))
    }

    async fn search_rides(&self, query: &RideQuery) -> StoreResult<Vec<RideView>> {
        let tables = self.tables.lock().await;
        let mut views: Vec<RideView> =
            tables.rides.values().map(|r| tables.view(r)).filter(|v| query.matches(v)).collect();
        views.sort_by_key(|v| (v.ride.departure_time, v.ride.id));
        views.truncate(query.limit);
        Ok(views)
    }

    async fn list_driver_rides(&self, driver_id: &str) -> StoreResult<Vec<RideView>> {
        let tables = self.tables.lock().await;
        let mut views: Vec<RideView> =
            tables.rides.values().filter(|r| r.driver_id == driver_id).map(|r| tables.view(r)).collect();
        views.sort_by_key(|v| (v.ride.departure_time, v.ride.id));
        Ok(views)
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn insert_pending(&self, booking: &Booking) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let ride = tables.require_active(booking.ride_id)?;
        let available = ride.available_seats;

        let duplicate = tables.bookings.values().any(|b| {
            b.ride_id == booking.ride_id && b.passenger_id == booking.passenger_id && b.status.is_active()
        });
        if duplicate {
            return Err(StoreError::DuplicateActiveBooking {
                ride_id: booking.ride_id,
                passenger_id: booking.passenger_id.clone(),
            });
        }
        if tables.confirmed(booking.ride_id) >= available {
            return Err(StoreError::NoSeatsRemaining(booking.ride_id));
        }

        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Booking> {
        let mut tables = self.tables.lock().await;
        let current = tables.bookings.get(&id).ok_or(StoreError::BookingNotFound(id))?;
        if !from.contains(&current.status) {
            return Err(StoreError::BookingStatusConflict { booking_id: id, status: current.status });
        }

        if to == BookingStatus::Confirmed {
            let ride_id = current.ride_id;
            let available = tables.require_active(ride_id)?.available_seats;
            if tables.confirmed(ride_id) >= available {
                return Err(StoreError::NoSeatsRemaining(ride_id));
            }
        }

        let booking = tables.bookings.get_mut(&id).ok_or(StoreError::BookingNotFound(id))?;
        booking.status = to;
        booking.updated_at = at;
        Ok(booking.clone())
    }

    async fn list_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<Booking> = tables.bookings.values().filter(|b| b.ride_id == ride_id).cloned().collect();
        bookings.sort_by_key(|b| (b.created_at, b.id));
        Ok(bookings)
    }

    async fn list_for_passenger(&self, passenger_id: &str) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<Booking> =
            tables.bookings.values().filter(|b| b.passenger_id == passenger_id).cloned().collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(bookings)
    }

    async fn find_active(&self, passenger_id: &str, ride_id: Uuid) -> StoreResult<Option<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .find(|b| b.ride_id == ride_id && b.passenger_id == passenger_id && b.status.is_active())
            .cloned())
    }
}
