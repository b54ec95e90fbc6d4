use chrono::{DateTime, Utc};
use hub_core::money::MONEY_SCALE;
use hub_finance::{ClaimLine, FeeBasis};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    BookingError,
    factory::{ClaimFactory, fee_basis_over},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Occurrence {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::EmptyPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn hours(&self) -> Decimal {
        let seconds = (self.end - self.start).num_seconds();
        (Decimal::from(seconds) / Decimal::from(3_600)).round_dp(MONEY_SCALE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopRate {
    pub workshop: Uuid,
    pub name: String,
    pub price_per_hour: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentBooking {
    pub name: String,
    pub workshop_name: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopBooking {
    pub workshops: Vec<WorkshopRate>,
    pub equipment: Vec<EquipmentBooking>,
    pub occurrences: Vec<Occurrence>,
    pub is_deleted: bool,
}

impl WorkshopBooking {
    fn workshop_lines(&self) -> impl Iterator<Item = ClaimLine> + '_ {
        self.workshops.iter().flat_map(move |workshop| {
            self.occurrences.iter().map(move |occurrence| ClaimLine {
                item: workshop.name.clone(),
                quantity: occurrence.hours(),
                unit: "h".to_string(),
                price: workshop.price_per_hour,
                currency: workshop.currency.clone(),
                period_start: occurrence.start,
                period_end: occurrence.end,
            })
        })
    }

    fn equipment_lines(&self) -> impl Iterator<Item = ClaimLine> + '_ {
        self.equipment.iter().flat_map(move |equipment| {
            self.occurrences.iter().map(move |occurrence| ClaimLine {
                item: format!("{}@{}", equipment.name, equipment.workshop_name),
                quantity: equipment.quantity,
                unit: "u".to_string(),
                price: equipment.price,
                currency: equipment.currency.clone(),
                period_start: occurrence.start,
                period_end: occurrence.end,
            })
        })
    }
}

impl ClaimFactory for WorkshopBooking {
    fn claim_lines(&self) -> Result<Vec<ClaimLine>, BookingError> {
        if self.occurrences.is_empty() {
            return Err(BookingError::Nothing("occurrence"));
        }
        if self.workshops.is_empty() {
            return Err(BookingError::Nothing("workshop"));
        }
        Ok(self.workshop_lines().chain(self.equipment_lines()).collect())
    }

    /// Equipment is not subject to the payment fee.
    fn fee_basis(&self, _lines: &[ClaimLine]) -> Option<FeeBasis> {
        let workshop_lines: Vec<ClaimLine> = self.workshop_lines().collect();
        fee_basis_over(&workshop_lines)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn booking(occurrences: usize) -> WorkshopBooking {
        let start = Utc::now();
        WorkshopBooking {
            workshops: vec![WorkshopRate {
                workshop: Uuid::new_v4(),
                name: "Wood shop".to_string(),
                price_per_hour: Decimal::new(12, 0),
                currency: "EUR".to_string(),
            }],
            equipment: vec![EquipmentBooking {
                name: "Table saw".to_string(),
                workshop_name: "Wood shop".to_string(),
                quantity: Decimal::new(2, 0),
                price: Decimal::new(5, 0),
                currency: "EUR".to_string(),
            }],
            occurrences: (0..occurrences as i64)
                .map(|week| {
                    let day = start + Duration::weeks(week);
                    Occurrence::new(day, day + Duration::hours(3)).unwrap()
                })
                .collect(),
            is_deleted: false,
        }
    }

    #[test]
    fn lines_per_workshop_and_equipment_occurrence() {
        let lines = booking(2).claim_lines().unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].quantity, Decimal::new(3, 0));
        assert_eq!(lines[0].unit, "h");
        assert_eq!(lines[2].item, "Table saw@Wood shop");
        assert_eq!(lines[2].quantity, Decimal::new(2, 0));
    }

    #[test]
    fn fee_basis_excludes_equipment() {
        let booking = booking(2);
        let lines = booking.claim_lines().unwrap();
        let basis = booking.fee_basis(&lines).unwrap();
        assert_eq!(basis.net_total, Decimal::new(72, 0));
        assert_eq!(basis.period_start, booking.occurrences[0].start);
        assert_eq!(basis.period_end, booking.occurrences[1].end);
    }

    #[test]
    fn occurrences_are_required() {
        assert!(matches!(
            booking(0).claim_lines(),
            Err(BookingError::Nothing("occurrence"))
        ));
    }
}
