pub mod error;
pub mod factory;
pub mod item;
pub mod venue;
pub mod workshop;

pub use error::BookingError;
pub use factory::{ClaimFactory, fee_basis_over};
pub use item::{Item, ItemBooking, ItemBookings, ItemState, ItemUnit, SelfPickup};
pub use venue::VenueBooking;
pub use workshop::{EquipmentBooking, Occurrence, WorkshopBooking, WorkshopRate};
