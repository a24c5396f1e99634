use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use journeylink_core::pagination::Page;
use journeylink_core::{Booking, LifecycleError, NewRide, RidePatch, RideView};
use journeylink_trips::SearchParams;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/rides", post(create_ride).get(search_rides))
        .route("/v1/rides/{id}", get(get_ride).patch(update_ride).delete(cancel_ride))
        .route("/v1/rides/{id}/cancel", post(cancel_ride))
        .route("/v1/rides/{id}/bookings", get(list_ride_bookings).post(crate::bookings::request_booking))
        .route("/v1/rides/{id}/my-booking", get(my_booking))
        .route("/v1/me/rides", get(my_rides))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRideRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(body)| body).map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// POST /v1/rides
pub async fn create_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<NewRide>, JsonRejection>,
) -> Result<(StatusCode, Json<RideView>), AppError> {
    let payload = json_body(payload)?;
    let ride = state.rides.create_ride(&claims.sub, &payload).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

/// GET /v1/rides?from=&to=&date=&seats=&cursor=&limit=
pub async fn search_rides(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Page<RideView>>, AppError> {
    let Query(params) = params.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    Ok(Json(state.rides.search_rides(&params).await?))
}

/// GET /v1/rides/{id}
pub async fn get_ride(State(state): State<AppState>, Path(ride_id): Path<Uuid>) -> Result<Json<RideView>, AppError> {
    Ok(Json(state.rides.get_ride(ride_id).await?))
}

/// PATCH /v1/rides/{id}
pub async fn update_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
    payload: Result<Json<RidePatch>, JsonRejection>,
) -> Result<Json<RideView>, AppError> {
    let patch = json_body(payload)?;
    Ok(Json(state.rides.update_ride(&claims.sub, ride_id, &patch).await?))
}

/// POST /v1/rides/{id}/cancel and DELETE /v1/rides/{id}
///
/// The body, with an optional `reason`, may be omitted.
pub async fn cancel_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<RideView>, AppError> {
    let request: CancelRideRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CancelRideRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("invalid cancel body: {e}")))?
    };
    Ok(Json(state.rides.cancel_ride(&claims.sub, ride_id, request.reason).await?))
}

/// GET /v1/me/rides
pub async fn my_rides(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<RideView>>, AppError> {
    Ok(Json(state.rides.list_driver_rides(&claims.sub).await?))
}

/// GET /v1/rides/{id}/bookings
pub async fn list_ride_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_ride_bookings(&claims.sub, ride_id).await?))
}

/// GET /v1/rides/{id}/my-booking
pub async fn my_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    state
        .bookings
        .my_booking_for_ride(&claims.sub, ride_id)
        .await?
        .map(Json)
        .ok_or_else(|| LifecycleError::NotFound(format!("no booking on ride {ride_id}")).into())
}
