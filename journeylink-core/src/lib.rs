pub mod error;
pub mod models;
pub mod notify;
pub mod pagination;
pub mod repository;
pub mod validation;

pub use error::{LifecycleError, LifecycleResult, StoreError, StoreResult};
pub use models::{
    Booking, BookingStatus, Coordinates, NewRide, Place, Preferences, Ride, RidePatch, RideQuery,
    RideStatus, RideView, Vehicle,
};
pub use notify::EventSink;
pub use repository::{BookingRepository, CancelledRide, RideRepository};
