use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("booking period {start} .. {end} is empty")]
    EmptyPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("item {item} cannot be booked while {state}")]
    ItemUnavailable { item: String, state: String },

    #[error("a booking needs at least one {0}")]
    Nothing(&'static str),
}
