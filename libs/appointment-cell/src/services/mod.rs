// libs/appointment-cell/src/services/mod.rs
pub mod availability;
pub mod booking;

pub use availability::AvailabilityService;
pub use booking::{AppointmentBookingService, AppointmentListQuery};
