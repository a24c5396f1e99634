pub mod bookings;
pub mod memory;
pub mod retry;
pub mod rides;

use std::sync::Arc;

pub use bookings::BookingManager;
pub use memory::MemoryStore;
pub use rides::{RideManager, SearchLimits, SearchParams};

/// Time source shared by the lifecycle managers.
pub type SharedClock = Arc<dyn mockable::Clock + Send + Sync>;
