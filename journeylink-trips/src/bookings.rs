use journeylink_core::{
    Booking, BookingRepository, BookingStatus, EventSink, LifecycleError, LifecycleResult, Ride, RideRepository,
    RideStatus,
};
use journeylink_shared::{DomainEvent, EventType};
use mockable::Clock;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::retry::read_with_retry;
use crate::SharedClock;

/// Owns booking status transitions and keeps them consistent with ride
/// seat availability.
pub struct BookingManager {
    rides: Arc<dyn RideRepository>,
    bookings: Arc<dyn BookingRepository>,
    events: Arc<dyn EventSink>,
    clock: SharedClock,
}

impl BookingManager {
    pub fn new(
        rides: Arc<dyn RideRepository>,
        bookings: Arc<dyn BookingRepository>,
        events: Arc<dyn EventSink>,
        clock: SharedClock,
    ) -> Self {
        Self { rides, bookings, events, clock }
    }

    /// PENDING booking for `passenger_id` on an ACTIVE ride with a free seat.
    #[instrument(skip(self))]
    pub async fn request_booking(&self, passenger_id: &str, ride_id: Uuid) -> LifecycleResult<Booking> {
        let now = self.clock.utc();
        let ride = self.load_ride(ride_id).await?;

        if ride.driver_id == passenger_id {
            return Err(LifecycleError::Authorization("driver cannot book own ride".to_string()));
        }
        if ride.status != RideStatus::Active {
            return Err(LifecycleError::InvalidState(format!("ride is {}", ride.status)));
        }
        if ride.departure_time <= now {
            return Err(LifecycleError::InvalidState("ride has already departed".to_string()));
        }

        let booking = Booking::pending(ride.id, passenger_id, now);
        self.bookings.insert_pending(&booking).await?;
        info!(booking_id = %booking.id, "Booking requested");

        self.events.emit(
            DomainEvent::new(EventType::BookingRequested, ride.id, &ride.driver_id, now)
                .with_booking(booking.id, passenger_id)
                .notify([ride.driver_id.as_str()]),
        );
        Ok(booking)
    }

    /// PENDING -> CONFIRMED, by the ride's driver, while a seat remains.
    #[instrument(skip(self))]
    pub async fn accept_booking(&self, driver_id: &str, booking_id: Uuid) -> LifecycleResult<Booking> {
        let (booking, ride) = self.load_for_driver(driver_id, booking_id).await?;
        require_pending(&booking, "accept")?;
        if ride.status != RideStatus::Active {
            return Err(LifecycleError::InvalidState(format!("ride is {}", ride.status)));
        }

        let now = self.clock.utc();
        let accepted = self
            .bookings
            .transition(booking_id, &[BookingStatus::Pending], BookingStatus::Confirmed, now)
            .await?;
        info!("Booking confirmed");

        self.emit_to_passenger(EventType::BookingAccepted, &ride, &accepted, None);
        Ok(accepted)
    }

    /// PENDING -> DECLINED, by the ride's driver.
    #[instrument(skip(self))]
    pub async fn decline_booking(&self, driver_id: &str, booking_id: Uuid) -> LifecycleResult<Booking> {
        let (booking, ride) = self.load_for_driver(driver_id, booking_id).await?;
        require_pending(&booking, "decline")?;

        let now = self.clock.utc();
        let declined = self
            .bookings
            .transition(booking_id, &[BookingStatus::Pending], BookingStatus::Declined, now)
            .await?;
        info!("Booking declined");

        self.emit_to_passenger(EventType::BookingDeclined, &ride, &declined, None);
        Ok(declined)
    }

    /// PENDING or CONFIRMED -> CANCELLED, by the passenger or the ride's
    /// driver. A freed seat shows up through the live confirmed count.
    #[instrument(skip(self))]
    pub async fn cancel_booking(&self, caller_id: &str, booking_id: Uuid) -> LifecycleResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        let ride = self.load_ride(booking.ride_id).await?;

        let by_passenger = booking.passenger_id == caller_id;
        if !by_passenger && ride.driver_id != caller_id {
            return Err(LifecycleError::Authorization(
                "only the passenger or the ride's driver can cancel this booking".to_string(),
            ));
        }
        if !booking.status.is_active() {
            return Err(LifecycleError::InvalidState(format!("booking is {}", booking.status)));
        }

        let now = self.clock.utc();
        let cancelled = self
            .bookings
            .transition(booking_id, &[BookingStatus::Pending, BookingStatus::Confirmed], BookingStatus::Cancelled, now)
            .await?;
        info!(by_passenger, previous = %booking.status, "Booking cancelled");

        let recipient = if by_passenger { ride.driver_id.as_str() } else { cancelled.passenger_id.as_str() };
        self.events.emit(
            DomainEvent::new(EventType::BookingCancelled, ride.id, &ride.driver_id, now)
                .with_booking(cancelled.id, &cancelled.passenger_id)
                .notify([recipient]),
        );
        Ok(cancelled)
    }

    /// Tells each passenger whose booking was cancelled along with `ride`.
    /// The store has already applied the cascade.
    pub fn announce_ride_cancellation(&self, ride: &Ride, cancelled: &[Booking]) {
        info!(ride_id = %ride.id, count = cancelled.len(), "Cascaded ride cancellation to bookings");
        for booking in cancelled {
            self.emit_to_passenger(EventType::BookingCancelled, ride, booking, ride.cancel_reason.clone());
        }
    }

    pub async fn get_booking(&self, caller_id: &str, booking_id: Uuid) -> LifecycleResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        if booking.passenger_id != caller_id {
            let ride = self.load_ride(booking.ride_id).await?;
            if ride.driver_id != caller_id {
                return Err(LifecycleError::Authorization("booking belongs to another user".to_string()));
            }
        }
        Ok(booking)
    }

    pub async fn list_passenger_bookings(&self, passenger_id: &str) -> LifecycleResult<Vec<Booking>> {
        Ok(read_with_retry("list_for_passenger", || self.bookings.list_for_passenger(passenger_id)).await?)
    }

    /// Every booking on a ride, visible to its driver only.
    pub async fn list_ride_bookings(&self, driver_id: &str, ride_id: Uuid) -> LifecycleResult<Vec<Booking>> {
        let ride = self.load_ride(ride_id).await?;
        if ride.driver_id != driver_id {
            return Err(LifecycleError::Authorization("ride belongs to another driver".to_string()));
        }
        Ok(read_with_retry("list_for_ride", || self.bookings.list_for_ride(ride_id)).await?)
    }

    /// The caller's booking on a ride: the active one if any, otherwise the
    /// most recent.
    pub async fn my_booking_for_ride(&self, passenger_id: &str, ride_id: Uuid) -> LifecycleResult<Option<Booking>> {
        if let Some(active) = read_with_retry("find_active", || self.bookings.find_active(passenger_id, ride_id)).await? {
            return Ok(Some(active));
        }
        let bookings = read_with_retry("list_for_ride", || self.bookings.list_for_ride(ride_id)).await?;
        Ok(bookings.into_iter().filter(|b| b.passenger_id == passenger_id).max_by_key(|b| b.updated_at))
    }

    /// Passenger ids holding a PENDING or CONFIRMED booking on the ride.
    pub async fn active_passengers(&self, ride_id: Uuid) -> LifecycleResult<Vec<String>> {
        let bookings = read_with_retry("list_for_ride", || self.bookings.list_for_ride(ride_id)).await?;
        Ok(bookings.into_iter().filter(|b| b.status.is_active()).map(|b| b.passenger_id).collect())
    }

    async fn load_ride(&self, ride_id: Uuid) -> LifecycleResult<Ride> {
        read_with_retry("get_ride", || self.rides.get_ride(ride_id))
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("ride {ride_id}")))
    }

    async fn load_booking(&self, booking_id: Uuid) -> LifecycleResult<Booking> {
        read_with_retry("get_booking", || self.bookings.get_booking(booking_id))
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("booking {booking_id}")))
    }

    async fn load_for_driver(&self, driver_id: &str, booking_id: Uuid) -> LifecycleResult<(Booking, Ride)> {
        let booking = self.load_booking(booking_id).await?;
        let ride = self.load_ride(booking.ride_id).await?;
        if ride.driver_id != driver_id {
            return Err(LifecycleError::Authorization("only the ride's driver can act on this booking".to_string()));
        }
        Ok((booking, ride))
    }

    fn emit_to_passenger(&self, event_type: EventType, ride: &Ride, booking: &Booking, reason: Option<String>) {
        self.events.emit(
            DomainEvent::new(event_type, ride.id, &ride.driver_id, booking.updated_at)
                .with_booking(booking.id, &booking.passenger_id)
                .notify([booking.passenger_id.as_str()])
                .with_reason(reason),
        );
    }
}

fn require_pending(booking: &Booking, action: &str) -> LifecycleResult<()> {
    if booking.status != BookingStatus::Pending {
        return Err(LifecycleError::InvalidState(format!("cannot {action} a {} booking", booking.status)));
    }
    Ok(())
}
