use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{Booking, BookingStatus, Ride, RideQuery, RideView};

/// Outcome of a ride cancellation: the ride as stored and the bookings the
/// cascade moved to CANCELLED, oldest first.
#[derive(Debug, Clone)]
pub struct CancelledRide {
    pub ride: Ride,
    pub bookings: Vec<Booking>,
}

/// Persistence for rides.
///
/// Writes that touch seat capacity must evaluate their guard and apply the
/// write as one atomic unit against the backing store.
#[async_trait]
pub trait RideRepository: Send + Sync {
    async fn insert_ride(&self, ride: &Ride) -> StoreResult<()>;

    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>>;

    /// Overwrites the editable fields of an ACTIVE ride.
    ///
    /// Fails with `RideNotActive` if the ride left ACTIVE meanwhile and with
    /// `SeatsBelowConfirmed` if `ride.available_seats` is below the live
    /// CONFIRMED count. Returns the stored ride with the count it was
    /// checked against.
    async fn update_ride(&self, ride: &Ride) -> StoreResult<RideView>;

    /// ACTIVE -> CANCELLED together with every PENDING or CONFIRMED booking
    /// on the ride, in one atomic write. Fails with `RideNotActive` from any
    /// other status, leaving rides and bookings untouched.
    async fn cancel_ride(&self, id: Uuid, reason: Option<&str>, at: DateTime<Utc>) -> StoreResult<CancelledRide>;

    async fn confirmed_count(&self, ride_id: Uuid) -> StoreResult<u32>;

    /// At most `query.limit` matching rides with their remaining seats.
    async fn search_rides(&self, query: &RideQuery) -> StoreResult<Vec<RideView>>;

    async fn list_driver_rides(&self, driver_id: &str) -> StoreResult<Vec<RideView>>;
}

/// Persistence for bookings.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// Inserts a PENDING booking after checking, atomically with the insert,
    /// that the ride is ACTIVE, that the passenger holds no active booking on
    /// it and that at least one seat remains.
    async fn insert_pending(&self, booking: &Booking) -> StoreResult<()>;

    /// Moves a booking whose status is one of `from` to `to`.
    ///
    /// When `to` is CONFIRMED the ride must still be ACTIVE with a seat
    /// remaining; the check and the update are atomic.
    async fn transition(
        &self,
        id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Booking>;

    async fn list_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<Booking>>;

    async fn list_for_passenger(&self, passenger_id: &str) -> StoreResult<Vec<Booking>>;

    async fn find_active(&self, passenger_id: &str, ride_id: Uuid) -> StoreResult<Option<Booking>>;
}
