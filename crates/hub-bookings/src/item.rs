//! Lendable items and bookings of them.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use hub_core::{Lifecycle, StateCodeError, StateGraph, TransitionError, money::MONEY_SCALE};
use hub_finance::{ClaimLine, FeeBasis};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    BookingError,
    factory::{ClaimFactory, fee_basis_over},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemState {
    Available,
    Lent,
    Defect,
    Hidden,
}

impl StateGraph for ItemState {
    const ENTITY: &'static str = "item";

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Available => &[Self::Defect, Self::Hidden, Self::Lent],
            Self::Lent | Self::Defect | Self::Hidden => &[Self::Available],
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Available => "AVAILABLE",
            Self::Lent => "LENT",
            Self::Defect => "DEFECT",
            Self::Hidden => "HIDDEN",
        })
    }
}

impl FromStr for ItemState {
    type Err = StateCodeError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code {
            "AVAILABLE" => Ok(Self::Available),
            "LENT" => Ok(Self::Lent),
            "DEFECT" => Ok(Self::Defect),
            "HIDDEN" => Ok(Self::Hidden),
            other => Err(StateCodeError {
                entity: Self::ENTITY,
                code: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemUnit {
    Hours,
    Days,
}

impl ItemUnit {
    pub fn code(self) -> &'static str {
        match self {
            Self::Hours => "h",
            Self::Days => "d",
        }
    }

    fn seconds(self) -> i64 {
        match self {
            Self::Hours => 3_600,
            Self::Days => 86_400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfPickup {
    NotAllowed,
    /// Only for actors in the item's self-pickup group.
    Limited,
    Allowed,
}

impl SelfPickup {
    pub fn grants(self, group: &[Uuid], actor: Uuid) -> bool {
        match self {
            Self::Allowed => true,
            Self::Limited => group.contains(&actor),
            Self::NotAllowed => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub unit: ItemUnit,
    pub base_price: Decimal,
    pub currency: String,
    pub self_pickup: SelfPickup,
    pub self_pickup_group: Vec<Uuid>,
    pub instructions: String,
    lifecycle: Lifecycle<ItemState>,
}

impl Item {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: Uuid,
        name: impl Into<String>,
        unit: ItemUnit,
        base_price: Decimal,
        currency: impl Into<String>,
        self_pickup: SelfPickup,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            name: name.into(),
            unit,
            base_price,
            currency: currency.into(),
            self_pickup,
            self_pickup_group: Vec::new(),
            instructions: String::new(),
            lifecycle: Lifecycle::new(ItemState::Available, created_at),
        }
    }

    pub fn state(&self) -> ItemState {
        self.lifecycle.state()
    }

    pub fn set_available(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(ItemState::Available, at)
    }

    pub fn set_lent(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(ItemState::Lent, at)
    }

    pub fn set_defect(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(ItemState::Defect, at)
    }

    pub fn set_hidden(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(ItemState::Hidden, at)
    }

    pub fn is_bookable(&self) -> bool {
        matches!(self.state(), ItemState::Available | ItemState::Lent)
    }

    pub fn grants_self_pickup(&self, actor: Uuid) -> bool {
        self.self_pickup.grants(&self.self_pickup_group, actor)
    }
}

/// One item booked for one period, with the item data frozen at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBooking {
    pub item: Uuid,
    pub item_name: String,
    pub unit: ItemUnit,
    pub price: Decimal,
    pub currency: String,
    pub self_pickup: SelfPickup,
    pub self_pickup_group: Vec<Uuid>,
    pub instructions: String,
    pub dtstart: DateTime<Utc>,
    pub dtend: DateTime<Utc>,
    pub is_deleted: bool,
}

impl ItemBooking {
    pub fn new(item: &Item, dtstart: DateTime<Utc>, dtend: DateTime<Utc>) -> Result<Self, BookingError> {
        if dtend <= dtstart {
            return Err(BookingError::EmptyPeriod {
                start: dtstart,
                end: dtend,
            });
        }
        if !item.is_bookable() {
            return Err(BookingError::ItemUnavailable {
                item: item.name.clone(),
                state: item.state().to_string(),
            });
        }
        Ok(Self {
            item: item.id,
            item_name: item.name.clone(),
            unit: item.unit,
            price: item.base_price,
            currency: item.currency.clone(),
            self_pickup: item.self_pickup,
            self_pickup_group: item.self_pickup_group.clone(),
            instructions: item.instructions.clone(),
            dtstart,
            dtend,
            is_deleted: false,
        })
    }

    /// Booked length in the item's unit.
    pub fn quantity(&self) -> Decimal {
        let seconds = (self.dtend - self.dtstart).num_seconds();
        (Decimal::from(seconds) / Decimal::from(self.unit.seconds())).round_dp(MONEY_SCALE)
    }

}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBookings {
    pub bookings: Vec<ItemBooking>,
    /// Message to the owner, e.g. to negotiate pickup times.
    pub note: Option<String>,
}

impl ItemBookings {
    fn active(&self) -> impl Iterator<Item = &ItemBooking> {
        self.bookings.iter().filter(|b| !b.is_deleted)
    }

    pub fn grants_self_pickup(&self, debitor: Uuid) -> bool {
        self.active()
            .any(|b| b.self_pickup.grants(&b.self_pickup_group, debitor))
    }

    pub fn instructions(&self) -> String {
        self.active()
            .map(|b| b.instructions.as_str())
            .filter(|i| !i.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drops bookings that have not ended yet.
    pub fn release_from(&mut self, now: DateTime<Utc>) {
        for booking in self.bookings.iter_mut().filter(|b| b.dtend >= now) {
            booking.is_deleted = true;
        }
    }

    pub fn release_all(&mut self) {
        for booking in &mut self.bookings {
            booking.is_deleted = true;
        }
    }
}

impl ClaimFactory for ItemBookings {
    fn claim_lines(&self) -> Result<Vec<ClaimLine>, BookingError> {
        let lines: Vec<ClaimLine> = self
            .active()
            .map(|booking| ClaimLine {
                item: booking.item_name.clone(),
                quantity: booking.quantity(),
                unit: booking.unit.code().to_string(),
                price: booking.price,
                currency: booking.currency.clone(),
                period_start: booking.dtstart,
                period_end: booking.dtend,
            })
            .collect();
        if lines.is_empty() {
            return Err(BookingError::Nothing("item"));
        }
        Ok(lines)
    }

    fn fee_basis(&self, lines: &[ClaimLine]) -> Option<FeeBasis> {
        fee_basis_over(lines)
    }
}
