use async_trait::async_trait;
use chrono::{DateTime, Utc};
use journeylink_core::repository::RideRepository;
use journeylink_core::{
    CancelledRide, Coordinates, Place, Preferences, Ride, RideQuery, RideStatus, RideView, StoreError, StoreResult,
    Vehicle,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::backend;
use crate::booking_repo::cancel_active_bookings;

pub struct StoreRideRepository {
    pool: PgPool,
}

impl StoreRideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CONFIRMED_COUNT: &str =
    "(SELECT COUNT(*) FROM bookings b WHERE b.ride_id = r.id AND b.status = 'CONFIRMED')";

const RIDE_COLUMNS: &str = "r.id, r.driver_id, \
    r.origin_city, r.origin_address, r.origin_lat, r.origin_lng, \
    r.destination_city, r.destination_address, r.destination_lat, r.destination_lng, \
    r.departure_time, r.available_seats, r.price_cents, \
    r.vehicle_make, r.vehicle_model, r.vehicle_color, r.vehicle_plate, \
    r.smoking, r.pets, r.additional_info, r.status, r.cancel_reason, r.created_at, r.updated_at";

fn select_rides() -> String {
    format!("SELECT {RIDE_COLUMNS}, {CONFIRMED_COUNT} AS confirmed FROM rides r")
}

#[derive(sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    driver_id: String,
    origin_city: String,
    origin_address: Option<String>,
    origin_lat: Option<f64>,
    origin_lng: Option<f64>,
    destination_city: String,
    destination_address: Option<String>,
    destination_lat: Option<f64>,
    destination_lng: Option<f64>,
    departure_time: DateTime<Utc>,
    available_seats: i32,
    price_cents: i64,
    vehicle_make: Option<String>,
    vehicle_model: Option<String>,
    vehicle_color: Option<String>,
    vehicle_plate: Option<String>,
    smoking: bool,
    pets: bool,
    additional_info: Option<String>,
    status: String,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed: i64,
}

fn place(city: String, address: Option<String>, lat: Option<f64>, lng: Option<f64>) -> Place {
    let coordinates = match (lat, lng) {
        (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
        _ => None,
    };
    Place { city, address, coordinates }
}

fn seats_from_db(value: i64) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Backend(format!("invalid seat count {value}")))
}

impl RideRow {
    fn into_view(self) -> StoreResult<RideView> {
        let status: RideStatus = self.status.parse().map_err(|e| StoreError::Backend(format!("{e}")))?;
        let confirmed = seats_from_db(self.confirmed)?;
        let vehicle = if self.vehicle_make.is_none()
            && self.vehicle_model.is_none()
            && self.vehicle_color.is_none()
            && self.vehicle_plate.is_none()
        {
            None
        } else {
            Some(Vehicle {
                make: self.vehicle_make,
                model: self.vehicle_model,
                color: self.vehicle_color,
                plate: self.vehicle_plate,
            })
        };

        let ride = Ride {
            id: self.id,
            driver_id: self.driver_id,
            origin: place(self.origin_city, self.origin_address, self.origin_lat, self.origin_lng),
            destination: place(
                self.destination_city,
                self.destination_address,
                self.destination_lat,
                self.destination_lng,
            ),
            departure_time: self.departure_time,
            available_seats: seats_from_db(self.available_seats.into())?,
            price_cents: self.price_cents,
            vehicle,
            preferences: Preferences { smoking: self.smoking, pets: self.pets },
            additional_info: self.additional_info,
            status,
            cancel_reason: self.cancel_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        Ok(RideView::new(ride, confirmed))
    }
}

/// Status and capacity of a ride row held under `FOR UPDATE`.
pub(crate) struct LockedRide {
    pub status: RideStatus,
    pub available_seats: u32,
}

/// Locks the ride row for the rest of the transaction.
///
/// Every guarded write locks the ride before touching its bookings, so
/// concurrent writers on one ride serialize in the same order.
pub(crate) async fn lock_ride(conn: &mut PgConnection, ride_id: Uuid) -> StoreResult<LockedRide> {
    let row: Option<(String, i32)> =
        sqlx::query_as("SELECT status, available_seats FROM rides WHERE id = $1 FOR UPDATE")
            .bind(ride_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(backend)?;

    let (status, seats) = row.ok_or(StoreError::RideNotFound(ride_id))?;
    Ok(LockedRide {
        status: status.parse().map_err(|e| StoreError::Backend(format!("{e}")))?,
        available_seats: seats_from_db(seats.into())?,
    })
}

pub(crate) async fn require_active(conn: &mut PgConnection, ride_id: Uuid) -> StoreResult<LockedRide> {
    let ride = lock_ride(conn, ride_id).await?;
    if ride.status != RideStatus::Active {
        return Err(StoreError::RideNotActive { ride_id, status: ride.status });
    }
    Ok(ride)
}

async fn fetch_view(conn: &mut PgConnection, id: Uuid) -> StoreResult<RideView> {
    let row: RideRow = sqlx::query_as(&format!("{} WHERE r.id = $1", select_rides()))
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(backend)?;
    row.into_view()
}

pub(crate) async fn count_confirmed(conn: &mut PgConnection, ride_id: Uuid) -> StoreResult<u32> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE ride_id = $1 AND status = 'CONFIRMED'")
            .bind(ride_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(backend)?;
    seats_from_db(count)
}

#[async_trait]
impl RideRepository for StoreRideRepository {
    async fn insert_ride(&self, ride: &Ride) -> StoreResult<()> {
        let vehicle = ride.vehicle.clone().unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO rides (
                id, driver_id,
                origin_city, origin_address, origin_lat, origin_lng,
                destination_city, destination_address, destination_lat, destination_lng,
                departure_time, available_seats, price_cents,
                vehicle_make, vehicle_model, vehicle_color, vehicle_plate,
                smoking, pets, additional_info, status, cancel_reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(ride.id)
        .bind(&ride.driver_id)
        .bind(&ride.origin.city)
        .bind(&ride.origin.address)
        .bind(ride.origin.coordinates.map(|c| c.lat))
        .bind(ride.origin.coordinates.map(|c| c.lng))
        .bind(&ride.destination.city)
        .bind(&ride.destination.address)
        .bind(ride.destination.coordinates.map(|c| c.lat))
        .bind(ride.destination.coordinates.map(|c| c.lng))
        .bind(ride.departure_time)
        .bind(ride.available_seats as i32)
        .bind(ride.price_cents)
        .bind(vehicle.make)
        .bind(vehicle.model)
        .bind(vehicle.color)
        .bind(vehicle.plate)
        .bind(ride.preferences.smoking)
        .bind(ride.preferences.pets)
        .bind(&ride.additional_info)
        .bind(ride.status.as_str())
        .bind(&ride.cancel_reason)
        .bind(ride.created_at)
        .bind(ride.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        let row: Option<RideRow> = sqlx::query_as(&format!("{} WHERE r.id = $1", select_rides()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(|r| r.into_view().map(|v| v.ride)).transpose()
    }

    async fn update_ride(&self, ride: &Ride) -> StoreResult<RideView> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        require_active(&mut tx, ride.id).await?;
        let confirmed = count_confirmed(&mut tx, ride.id).await?;
        if ride.available_seats < confirmed {
            return Err(StoreError::SeatsBelowConfirmed { ride_id: ride.id, confirmed });
        }

        let vehicle = ride.vehicle.clone().unwrap_or_default();
        // Identity, ownership and lifecycle columns are not editable.
        sqlx::query(
            r#"
            UPDATE rides SET
                origin_city = $2, origin_address = $3, origin_lat = $4, origin_lng = $5,
                destination_city = $6, destination_address = $7, destination_lat = $8, destination_lng = $9,
                departure_time = $10, available_seats = $11, price_cents = $12,
                vehicle_make = $13, vehicle_model = $14, vehicle_color = $15, vehicle_plate = $16,
                smoking = $17, pets = $18, additional_info = $19, updated_at = $20
            WHERE id = $1
            "#,
        )
        .bind(ride.id)
        .bind(&ride.origin.city)
        .bind(&ride.origin.address)
        .bind(ride.origin.coordinates.map(|c| c.lat))
        .bind(ride.origin.coordinates.map(|c| c.lng))
        .bind(&ride.destination.city)
        .bind(&ride.destination.address)
        .bind(ride.destination.coordinates.map(|c| c.lat))
        .bind(ride.destination.coordinates.map(|c| c.lng))
        .bind(ride.departure_time)
        .bind(ride.available_seats as i32)
        .bind(ride.price_cents)
        .bind(vehicle.make)
        .bind(vehicle.model)
        .bind(vehicle.color)
        .bind(vehicle.plate)
        .bind(ride.preferences.smoking)
        .bind(ride.preferences.pets)
        .bind(&ride.additional_info)
        .bind(ride.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let view = fetch_view(&mut tx, ride.id).await?;
        tx.commit().await.map_err(backend)?;
        Ok(view)
    }

    async fn cancel_ride(&self, id: Uuid, reason: Option<&str>, at: DateTime<Utc>) -> StoreResult<CancelledRide> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        require_active(&mut tx, id).await?;

        sqlx::query("UPDATE rides SET status = 'CANCELLED', cancel_reason = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(reason)
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        let bookings = cancel_active_bookings(&mut tx, id, at).await?;

        let view = fetch_view(&mut tx, id).await?;
        tx.commit().await.map_err(backend)?;

        Ok(CancelledRide { ride: view.ride, bookings })
    }

    async fn confirmed_count(&self, ride_id: Uuid) -> StoreResult<u32> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        count_confirmed(&mut conn, ride_id).await
    }

    async fn search_rides(&self, query: &RideQuery) -> StoreResult<Vec<RideView>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(select_rides());
        qb.push(" WHERE r.status = 'ACTIVE' AND r.departure_time > ");
        qb.push_bind(query.departing_after);

        if let Some(from) = &query.from_city {
            qb.push(" AND lower(r.origin_city) = lower(").push_bind(from.trim().to_string()).push(")");
        }
        if let Some(to) = &query.to_city {
            qb.push(" AND lower(r.destination_city) = lower(").push_bind(to.trim().to_string()).push(")");
        }
        if let Some(date) = query.date {
            qb.push(" AND (r.departure_time AT TIME ZONE 'UTC')::date = ").push_bind(date);
        }
        if let Some(min) = query.min_seats {
            qb.push(format!(" AND r.available_seats - {CONFIRMED_COUNT} >= ")).push_bind(i64::from(min));
        }
        if let Some((time, id)) = query.after {
            qb.push(" AND (r.departure_time, r.id) > (").push_bind(time).push(", ").push_bind(id).push(")");
        }
        qb.push(" ORDER BY r.departure_time, r.id LIMIT ").push_bind(query.limit as i64);

        let rows: Vec<RideRow> = qb.build_query_as().fetch_all(&self.pool).await.map_err(backend)?;
        rows.into_iter().map(RideRow::into_view).collect()
    }

    async fn list_driver_rides(&self, driver_id: &str) -> StoreResult<Vec<RideView>> {
        let rows: Vec<RideRow> =
            sqlx::query_as(&format!("{} WHERE r.driver_id = $1 ORDER BY r.departure_time, r.id", select_rides()))
                .bind(driver_id)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

        rows.into_iter().map(RideRow::into_view).collect()
    }
}
