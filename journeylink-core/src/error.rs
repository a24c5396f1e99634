use uuid::Uuid;

use crate::models::{BookingStatus, RideStatus};
use crate::validation::ValidationErrors;

/// Failure of a ride or booking lifecycle operation.
///
/// Every variant carries a stable machine-readable [`code`](Self::code) that
/// the HTTP layer forwards to clients.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not authorized: {0}")]
    Authorization(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Capacity exceeded: {0}")]
    Capacity(String),
    #[error("Duplicate booking: {0}")]
    DuplicateBooking(String),
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl LifecycleError {
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::Validation(_) => "VALIDATION_FAILED",
            LifecycleError::NotFound(_) => "NOT_FOUND",
            LifecycleError::Authorization(_) => "FORBIDDEN",
            LifecycleError::InvalidState(_) => "INVALID_STATE",
            LifecycleError::Capacity(_) => "CAPACITY_EXCEEDED",
            LifecycleError::DuplicateBooking(_) => "DUPLICATE_BOOKING",
            LifecycleError::Storage(_) => "INTERNAL",
        }
    }
}

impl From<ValidationErrors> for LifecycleError {
    fn from(errors: ValidationErrors) -> Self {
        LifecycleError::Validation(errors)
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Outcome of a guarded write that the store refused, or a backend failure.
///
/// Guard variants are evaluated by the store in the same atomic unit as the
/// write they protect.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ride {0} not found")]
    RideNotFound(Uuid),
    #[error("booking {0} not found")]
    BookingNotFound(Uuid),
    #[error("ride {ride_id} is {status}")]
    RideNotActive { ride_id: Uuid, status: RideStatus },
    #[error("booking {booking_id} is {status}")]
    BookingStatusConflict { booking_id: Uuid, status: BookingStatus },
    #[error("passenger {passenger_id} already holds an active booking on ride {ride_id}")]
    DuplicateActiveBooking { ride_id: Uuid, passenger_id: String },
    #[error("ride {0} has no seats remaining")]
    NoSeatsRemaining(Uuid),
    #[error("ride {ride_id} has {confirmed} confirmed bookings")]
    SeatsBelowConfirmed { ride_id: Uuid, confirmed: u32 },
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::RideNotFound(_) | StoreError::BookingNotFound(_) => LifecycleError::NotFound(message),
            StoreError::RideNotActive { .. } | StoreError::BookingStatusConflict { .. } => {
                LifecycleError::InvalidState(message)
            }
            StoreError::DuplicateActiveBooking { .. } => LifecycleError::DuplicateBooking(message),
            StoreError::NoSeatsRemaining(_) | StoreError::SeatsBelowConfirmed { .. } => {
                LifecycleError::Capacity(message)
            }
            StoreError::Backend(_) => LifecycleError::Storage(message),
        }
    }
}
