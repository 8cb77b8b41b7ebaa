// Salon booking core
//
// Slot allocation, staff auto-assignment, pricing with coupons and loyalty
// points, and the booking coordinator that writes reservations atomically.

pub mod booking;
pub mod config;
pub mod db;
pub mod validation;

pub use booking::{BookingCoordinator, BookingError, BookingResult, CoordinatorSettings};
pub use config::{Config, ConfigError};
