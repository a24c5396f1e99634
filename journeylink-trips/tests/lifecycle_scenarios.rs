use chrono::{Duration, Utc};
use journeylink_core::notify::LogSink;
use journeylink_core::{BookingStatus, LifecycleError, NewRide, Place, Preferences, RideRepository};
use journeylink_trips::{BookingManager, MemoryStore, RideManager};
use std::sync::Arc;

struct World {
    store: Arc<MemoryStore>,
    rides: RideManager,
    bookings: Arc<BookingManager>,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(mockable::DefaultClock);
    let bookings = Arc::new(BookingManager::new(store.clone(), store.clone(), Arc::new(LogSink), clock.clone()));
    let rides = RideManager::new(store.clone(), bookings.clone(), Arc::new(LogSink), clock);
    World { store, rides, bookings }
}

fn ride_payload(seats: i64) -> NewRide {
    NewRide {
        origin: Place { city: "Berlin".to_string(), address: Some("Hauptbahnhof".to_string()), coordinates: None },
        destination: Place { city: "Hamburg".to_string(), address: None, coordinates: None },
        departure_time: Utc::now() + Duration::days(2),
        available_seats: seats,
        price: 29.99,
        vehicle: None,
        preferences: Preferences::default(),
        additional_info: None,
    }
}

#[tokio::test]
async fn test_two_seat_ride_walkthrough() {
    let w = world();
    let ride = w.rides.create_ride("driver", &ride_payload(2)).await.unwrap().ride;

    let a = w.bookings.request_booking("passenger-a", ride.id).await.unwrap();
    assert_eq!(a.status, BookingStatus::Pending);
    w.bookings.accept_booking("driver", a.id).await.unwrap();
    assert_eq!(w.rides.get_ride(ride.id).await.unwrap().remaining_seats, 1);

    let b = w.bookings.request_booking("passenger-b", ride.id).await.unwrap();
    let b = w.bookings.decline_booking("driver", b.id).await.unwrap();
    assert_eq!(b.status, BookingStatus::Declined);
    assert_eq!(w.rides.get_ride(ride.id).await.unwrap().remaining_seats, 1);

    let c = w.bookings.request_booking("passenger-c", ride.id).await.unwrap();
    let c = w.bookings.accept_booking("driver", c.id).await.unwrap();
    assert_eq!(c.status, BookingStatus::Confirmed);
    assert_eq!(w.rides.get_ride(ride.id).await.unwrap().remaining_seats, 0);

    let err = w.bookings.request_booking("passenger-d", ride.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Capacity(_)));
}

#[tokio::test]
async fn test_cancelled_confirmed_booking_frees_a_seat() {
    let w = world();
    let ride = w.rides.create_ride("driver", &ride_payload(1)).await.unwrap().ride;

    let a = w.bookings.request_booking("passenger-a", ride.id).await.unwrap();
    w.bookings.accept_booking("driver", a.id).await.unwrap();
    assert!(w.bookings.request_booking("passenger-b", ride.id).await.is_err());

    w.bookings.cancel_booking("passenger-a", a.id).await.unwrap();
    assert_eq!(w.rides.get_ride(ride.id).await.unwrap().remaining_seats, 1);
    let b = w.bookings.request_booking("passenger-b", ride.id).await.unwrap();
    w.bookings.accept_booking("driver", b.id).await.unwrap();
    assert_eq!(w.store.confirmed_count(ride.id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_flows_for_last_seat_confirm_exactly_one() {
    let w = Arc::new(world());
    let ride_id = w.rides.create_ride("driver", &ride_payload(1)).await.unwrap().ride.id;

    let flows: Vec<_> = (0..2)
        .map(|i| {
            let w = w.clone();
            tokio::spawn(async move {
                let booking = w.bookings.request_booking(&format!("racer-{i}"), ride_id).await?;
                w.bookings.accept_booking("driver", booking.id).await
            })
        })
        .collect();

    let mut confirmed = 0;
    let mut capacity_failures = 0;
    for flow in flows {
        match flow.await.unwrap() {
            Ok(booking) => {
                assert_eq!(booking.status, BookingStatus::Confirmed);
                confirmed += 1;
            }
            Err(LifecycleError::Capacity(_)) => capacity_failures += 1,
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }

    assert_eq!(confirmed, 1);
    assert_eq!(capacity_failures, 1);
    assert_eq!(w.store.confirmed_count(ride_id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_confirmed_never_exceeds_seats_under_load() {
    let w = Arc::new(world());
    let ride_id = w.rides.create_ride("driver", &ride_payload(3)).await.unwrap().ride.id;

    let flows: Vec<_> = (0..24)
        .map(|i| {
            let w = w.clone();
            tokio::spawn(async move {
                let booking = w.bookings.request_booking(&format!("p-{i}"), ride_id).await?;
                w.bookings.accept_booking("driver", booking.id).await
            })
        })
        .collect();
    for flow in flows {
        let _ = flow.await.unwrap();
    }

    let bookings = w.bookings.list_ride_bookings("driver", ride_id).await.unwrap();
    let confirmed = bookings.iter().filter(|b| b.status == BookingStatus::Confirmed).count();
    assert_eq!(confirmed, 3);
    assert_eq!(w.rides.get_ride(ride_id).await.unwrap().remaining_seats, 0);
}
