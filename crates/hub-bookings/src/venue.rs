use hub_finance::ClaimLine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BookingError, factory::ClaimFactory, workshop::Occurrence};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueBooking {
    pub venue: Uuid,
    pub venue_name: String,
    pub event_name: String,
    pub price_per_hour: Decimal,
    /// Upper bound for a single occurrence.
    pub max_price_per_day: Option<Decimal>,
    pub currency: String,
    pub occurrences: Vec<Occurrence>,
}

impl ClaimFactory for VenueBooking {
    fn claim_lines(&self) -> Result<Vec<ClaimLine>, BookingError> {
        if self.occurrences.is_empty() {
            return Err(BookingError::Nothing("occurrence"));
        }
        let item = format!("{} ({})", self.venue_name, self.event_name);
        Ok(self
            .occurrences
            .iter()
            .map(|occurrence| {
                let hours = occurrence.hours();
                let (quantity, unit, price) = match self.max_price_per_day {
                    Some(cap) if hours * self.price_per_hour > cap => (Decimal::ONE, "d", cap),
                    _ => (hours, "h", self.price_per_hour),
                };
                ClaimLine {
                    item: item.clone(),
                    quantity,
                    unit: unit.to_string(),
                    price,
                    currency: self.currency.clone(),
                    period_start: occurrence.start,
                    period_end: occurrence.end,
                }
            })
            .collect())
    }
}
