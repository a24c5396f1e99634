use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Extension, Json, Router,
};
use journeylink_core::Booking;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/accept", patch(accept_booking))
        .route("/v1/bookings/{id}/decline", patch(decline_booking))
        .route("/v1/bookings/{id}/cancel", patch(cancel_booking))
        .route("/v1/me/bookings", get(my_bookings))
}

/// POST /v1/rides/{id}/bookings
pub async fn request_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.bookings.request_booking(&claims.sub, ride_id).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /v1/bookings/{id}
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get_booking(&claims.sub, booking_id).await?))
}

/// PATCH /v1/bookings/{id}/accept
pub async fn accept_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.accept_booking(&claims.sub, booking_id).await?))
}

/// PATCH /v1/bookings/{id}/decline
pub async fn decline_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.decline_booking(&claims.sub, booking_id).await?))
}

/// PATCH /v1/bookings/{id}/cancel
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.cancel_booking(&claims.sub, booking_id).await?))
}

/// GET /v1/me/bookings
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_passenger_bookings(&claims.sub).await?))
}
