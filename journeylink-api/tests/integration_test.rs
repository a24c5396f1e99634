use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use journeylink_api::middleware::Claims;
use journeylink_api::{app, AppState, AuthConfig, BroadcastSink};
use journeylink_core::EventSink;
use journeylink_trips::{BookingManager, MemoryStore, RideManager, SharedClock};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

fn test_app() -> Router {
    let store = Arc::new(MemoryStore::new());
    let (tx, _) = broadcast::channel(64);
    let events: Arc<dyn EventSink> = Arc::new(BroadcastSink::new(tx.clone()));
    let clock: SharedClock = Arc::new(mockable::DefaultClock);
    let bookings = Arc::new(BookingManager::new(store.clone(), store.clone(), events.clone(), clock.clone()));
    let rides = Arc::new(RideManager::new(store, bookings.clone(), events, clock));

    app(AppState::new(rides, bookings, tx, AuthConfig { secret: SECRET.to_string(), leeway: 0 }))
}

fn token(user: &str) -> String {
    let claims = Claims { sub: user.to_string(), exp: (Utc::now().timestamp() + 3600) as usize };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn ride_body(from: &str, to: &str, seats: i64, days_ahead: i64) -> Value {
    json!({
        "origin": { "city": from, "address": "Central station" },
        "destination": { "city": to },
        "departureTime": (Utc::now() + Duration::days(days_ahead)).to_rfc3339(),
        "availableSeats": seats,
        "price": 29.99,
        "preferences": { "smoking": false, "pets": true },
        "additionalInfo": "One large bag per person"
    })
}

async fn create_ride(app: &Router, driver: &str, seats: i64) -> String {
    let (status, ride) = send(app, Method::POST, "/v1/rides", Some(driver), Some(ride_body("Berlin", "Hamburg", seats, 2))).await;
    assert_eq!(status, StatusCode::CREATED);
    ride["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = test_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let app = test_app();
    let (status, body) = send(&app, Method::GET, "/v1/me/rides", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .uri("/v1/me/rides")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_fetch_ride() {
    let app = test_app();
    let (status, ride) =
        send(&app, Method::POST, "/v1/rides", Some("driver-1"), Some(ride_body("Berlin", "Hamburg", 3, 2))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ride["status"], "ACTIVE");
    assert_eq!(ride["driverId"], "driver-1");
    assert_eq!(ride["remainingSeats"], 3);
    assert_eq!(ride["price"], 29.99);

    let uri = format!("/v1/rides/{}", ride["id"].as_str().unwrap());
    let (status, fetched) = send(&app, Method::GET, &uri, Some("someone-else"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["origin"]["city"], "Berlin");

    let (_, mine) = send(&app, Method::GET, "/v1/me/rides", Some("driver-1"), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_ride_lists_every_field_error() {
    let app = test_app();
    let mut body = ride_body("Lyon", "lyon", 12, -1);
    body["price"] = json!(-5);

    let (status, error) = send(&app, Method::POST, "/v1/rides", Some("driver-1"), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "VALIDATION_FAILED");

    let fields: Vec<&str> =
        error["error"]["details"].as_array().unwrap().iter().map(|d| d["field"].as_str().unwrap()).collect();
    assert!(fields.contains(&"destination.city"));
    assert!(fields.contains(&"departureTime"));
    assert!(fields.contains(&"availableSeats"));
    assert!(fields.contains(&"price"));
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let app = test_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/rides")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("driver-1")))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_booking_flow_over_http() {
    let app = test_app();
    let ride_id = create_ride(&app, "driver-1", 1).await;
    let bookings_uri = format!("/v1/rides/{ride_id}/bookings");

    let (status, booking) = send(&app, Method::POST, &bookings_uri, Some("passenger-a"), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "PENDING");
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let (status, dup) = send(&app, Method::POST, &bookings_uri, Some("passenger-a"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(dup["error"]["code"], "DUPLICATE_BOOKING");

    let (status, own) = send(&app, Method::POST, &bookings_uri, Some("driver-1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(own["error"]["code"], "FORBIDDEN");

    let accept_uri = format!("/v1/bookings/{booking_id}/accept");
    let (status, _) = send(&app, Method::PATCH, &accept_uri, Some("passenger-a"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = send(&app, Method::PATCH, &accept_uri, Some("driver-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "CONFIRMED");

    let (_, ride) = send(&app, Method::GET, &format!("/v1/rides/{ride_id}"), Some("passenger-a"), None).await;
    assert_eq!(ride["remainingSeats"], 0);

    let (status, full) = send(&app, Method::POST, &bookings_uri, Some("passenger-b"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(full["error"]["code"], "CAPACITY_EXCEEDED");

    let (status, mine) =
        send(&app, Method::GET, &format!("/v1/rides/{ride_id}/my-booking"), Some("passenger-a"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["id"], booking_id.as_str());

    let (_, listed) = send(&app, Method::GET, "/v1/me/bookings", Some("passenger-a"), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_decline_then_cancel_are_state_checked() {
    let app = test_app();
    let ride_id = create_ride(&app, "driver-1", 2).await;

    let (_, booking) =
        send(&app, Method::POST, &format!("/v1/rides/{ride_id}/bookings"), Some("passenger-a"), None).await;
    let booking_id = booking["id"].as_str().unwrap();

    let (status, declined) =
        send(&app, Method::PATCH, &format!("/v1/bookings/{booking_id}/decline"), Some("driver-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(declined["status"], "DECLINED");

    let (status, error) =
        send(&app, Method::PATCH, &format!("/v1/bookings/{booking_id}/cancel"), Some("passenger-a"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_cancelling_ride_cascades_to_bookings() {
    let app = test_app();
    let ride_id = create_ride(&app, "driver-1", 2).await;
    let bookings_uri = format!("/v1/rides/{ride_id}/bookings");

    let (_, a) = send(&app, Method::POST, &bookings_uri, Some("passenger-a"), None).await;
    send(&app, Method::PATCH, &format!("/v1/bookings/{}/accept", a["id"].as_str().unwrap()), Some("driver-1"), None)
        .await;
    send(&app, Method::POST, &bookings_uri, Some("passenger-b"), None).await;

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/v1/rides/{ride_id}/cancel"),
        Some("passenger-a"),
        Some(json!({ "reason": "not mine" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = send(
        &app,
        Method::POST,
        &format!("/v1/rides/{ride_id}/cancel"),
        Some("driver-1"),
        Some(json!({ "reason": "  Car broke down  " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");
    assert_eq!(cancelled["cancelReason"], "Car broke down");

    let (_, bookings) = send(&app, Method::GET, &bookings_uri, Some("driver-1"), None).await;
    let statuses: Vec<&str> = bookings.as_array().unwrap().iter().map(|b| b["status"].as_str().unwrap()).collect();
    assert_eq!(statuses, vec!["CANCELLED", "CANCELLED"]);

    let (status, error) = send(&app, Method::POST, &bookings_uri, Some("passenger-c"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "INVALID_STATE");

    let (status, _) = send(&app, Method::DELETE, &format!("/v1/rides/{ride_id}"), Some("driver-1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_update_ride_cannot_drop_below_confirmed() {
    let app = test_app();
    let ride_id = create_ride(&app, "driver-1", 3).await;
    let ride_uri = format!("/v1/rides/{ride_id}");

    for passenger in ["passenger-a", "passenger-b"] {
        let (_, b) =
            send(&app, Method::POST, &format!("/v1/rides/{ride_id}/bookings"), Some(passenger), None).await;
        send(&app, Method::PATCH, &format!("/v1/bookings/{}/accept", b["id"].as_str().unwrap()), Some("driver-1"), None)
            .await;
    }

    let (status, error) =
        send(&app, Method::PATCH, &ride_uri, Some("driver-1"), Some(json!({ "availableSeats": 1 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "CAPACITY_EXCEEDED");

    let (status, updated) =
        send(&app, Method::PATCH, &ride_uri, Some("driver-1"), Some(json!({ "availableSeats": 2, "price": 35 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["remainingSeats"], 0);
    assert_eq!(updated["price"], 35.0);

    let (status, _) = send(&app, Method::PATCH, &ride_uri, Some("driver-2"), Some(json!({ "price": 1 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_search_pages_through_matching_rides() {
    let app = test_app();
    for days in 1..=3 {
        send(&app, Method::POST, "/v1/rides", Some("driver-1"), Some(ride_body("Berlin", "Hamburg", 2, days))).await;
    }
    send(&app, Method::POST, "/v1/rides", Some("driver-1"), Some(ride_body("Berlin", "Munich", 2, 1))).await;

    let (status, first) = send(&app, Method::GET, "/v1/rides?from=berlin&to=HAMBURG&limit=2", Some("p"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["items"].as_array().unwrap().len(), 2);
    let cursor = first["nextCursor"].as_str().unwrap().to_string();

    let (_, second) =
        send(&app, Method::GET, &format!("/v1/rides?from=berlin&to=HAMBURG&limit=2&cursor={cursor}"), Some("p"), None)
            .await;
    assert_eq!(second["items"].as_array().unwrap().len(), 1);
    assert!(second["nextCursor"].is_null());

    let (status, error) = send(&app, Method::GET, "/v1/rides?cursor=bad!cursor", Some("p"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_my_booking_is_not_found_without_one() {
    let app = test_app();
    let ride_id = create_ride(&app, "driver-1", 2).await;

    let (status, error) =
        send(&app, Method::GET, &format!("/v1/rides/{ride_id}/my-booking"), Some("passenger-a"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_notification_stream_opens_for_authenticated_user() {
    let app = test_app();
    let request = Request::builder()
        .uri("/v1/notifications/stream")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("driver-1")))
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}
