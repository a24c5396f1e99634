use async_trait::async_trait;
use chrono::{DateTime, Utc};
use journeylink_core::repository::BookingRepository;
use journeylink_core::{Booking, BookingStatus, StoreError, StoreResult};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::backend;
use crate::ride_repo::{count_confirmed, lock_ride, require_active};

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BOOKING_COLUMNS: &str = "id, ride_id, passenger_id, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    ride_id: Uuid,
    passenger_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> StoreResult<Self> {
        Ok(Booking {
            id: row.id,
            ride_id: row.ride_id,
            passenger_id: row.passenger_id,
            status: row.status.parse().map_err(|e| StoreError::Backend(format!("{e}")))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

fn status_names(statuses: &[BookingStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Cancels every PENDING or CONFIRMED booking on a ride inside the caller's
/// transaction. The caller must already hold the ride lock.
pub(crate) async fn cancel_active_bookings(
    conn: &mut PgConnection,
    ride_id: Uuid,
    at: DateTime<Utc>,
) -> StoreResult<Vec<Booking>> {
    let rows: Vec<BookingRow> = sqlx::query_as(&format!(
        "WITH cancelled AS ( \
             UPDATE bookings SET status = 'CANCELLED', updated_at = $2 \
             WHERE ride_id = $1 AND status IN ('PENDING', 'CONFIRMED') RETURNING {BOOKING_COLUMNS} \
         ) SELECT {BOOKING_COLUMNS} FROM cancelled ORDER BY created_at, id"
    ))
    .bind(ride_id)
    .bind(at)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)?;

    into_bookings(rows)
}

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        row.map(Booking::try_from).transpose()
    }

    async fn insert_pending(&self, booking: &Booking) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let ride = require_active(&mut tx, booking.ride_id).await?;

        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM bookings WHERE ride_id = $1 AND passenger_id = $2 AND status IN ('PENDING', 'CONFIRMED') LIMIT 1",
        )
        .bind(booking.ride_id)
        .bind(&booking.passenger_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        let duplicate = || StoreError::DuplicateActiveBooking {
            ride_id: booking.ride_id,
            passenger_id: booking.passenger_id.clone(),
        };
        if existing.is_some() {
            return Err(duplicate());
        }
        if count_confirmed(&mut tx, booking.ride_id).await? >= ride.available_seats {
            return Err(StoreError::NoSeatsRemaining(booking.ride_id));
        }

        let inserted = sqlx::query(&format!("INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"))
            .bind(booking.id)
            .bind(booking.ride_id)
            .bind(&booking.passenger_id)
            .bind(booking.status.as_str())
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *tx)
            .await;

        match inserted {
            Ok(_) => tx.commit().await.map_err(backend),
            // The partial unique index backs up the check above.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(duplicate()),
            Err(e) => Err(backend(e)),
        }
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let ride_id: Option<(Uuid,)> = sqlx::query_as("SELECT ride_id FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        let (ride_id,) = ride_id.ok_or(StoreError::BookingNotFound(id))?;

        // Ride row first, then the booking row.
        let ride = lock_ride(&mut tx, ride_id).await?;
        let row: BookingRow =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"))
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;
        let current = Booking::try_from(row)?;
        if !from.contains(&current.status) {
            return Err(StoreError::BookingStatusConflict { booking_id: id, status: current.status });
        }

        if to == BookingStatus::Confirmed {
            if ride.status.is_terminal() {
                return Err(StoreError::RideNotActive { ride_id, status: ride.status });
            }
            if count_confirmed(&mut tx, ride_id).await? >= ride.available_seats {
                return Err(StoreError::NoSeatsRemaining(ride_id));
            }
        }

        let row: BookingRow = sqlx::query_as(&format!(
            "UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1 AND status = ANY($4) RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(to.as_str())
        .bind(at)
        .bind(status_names(from))
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        Booking::try_from(row)
    }

    async fn list_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE ride_id = $1 ORDER BY created_at, id"
        ))
        .bind(ride_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        into_bookings(rows)
    }

    async fn list_for_passenger(&self, passenger_id: &str) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE passenger_id = $1 ORDER BY created_at DESC, id"
        ))
        .bind(passenger_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        into_bookings(rows)
    }

    async fn find_active(&self, passenger_id: &str, ride_id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE ride_id = $1 AND passenger_id = $2 AND status IN ('PENDING', 'CONFIRMED')"
        ))
        .bind(ride_id)
        .bind(passenger_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(Booking::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_with_unknown_status_is_a_backend_error() {
        let row = BookingRow {
            id: Uuid::new_v4(),
            ride_id: Uuid::new_v4(),
            passenger_id: "p".to_string(),
            status: "LOST".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(Booking::try_from(row), Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_status_names_match_column_values() {
        let names = status_names(&[BookingStatus::Pending, BookingStatus::Confirmed]);
        assert_eq!(names, vec!["PENDING".to_string(), "CONFIRMED".to_string()]);
    }
}
