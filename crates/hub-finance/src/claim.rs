//! Billable line items accrued against a contract.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use hub_core::{
    Lifecycle, StateCodeError, StateGraph, TransitionError,
    money::{MONEY_SCALE, apply_discount, apply_tax},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimState {
    Pending,
    Settled,
    Terminated,
}

impl StateGraph for ClaimState {
    const ENTITY: &'static str = "claim";

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Settled, Self::Terminated],
            Self::Settled | Self::Terminated => &[],
        }
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Settled => "SETTLED",
            Self::Terminated => "TERMINATED",
        })
    }
}

impl FromStr for ClaimState {
    type Err = StateCodeError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code {
            "PENDING" => Ok(Self::Pending),
            "SETTLED" => Ok(Self::Settled),
            "TERMINATED" => Ok(Self::Terminated),
            other => Err(StateCodeError {
                entity: Self::ENTITY,
                code: other.to_string(),
            }),
        }
    }
}

/// Unpriced quantity of something booked for a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimLine {
    pub item: String,
    pub quantity: Decimal,
    pub unit: String,
    pub price: Decimal,
    pub currency: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Discount and tax a contract applies to every accrued line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pricing {
    pub discount: Decimal,
    pub tax_rate: Decimal,
}

/// Net total a payment fee is computed from, with the period it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeBasis {
    pub net_total: Decimal,
    pub currency: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// The monetary content of a claim. Copied verbatim into invoice positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimEntry {
    pub item: String,
    pub quantity: Decimal,
    pub unit: String,
    pub price: Decimal,
    pub currency: String,
    pub net: Decimal,
    pub discount: Decimal,
    pub discounted_net: Decimal,
    pub tax_rate: Decimal,
    pub gross: Decimal,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl ClaimEntry {
    pub fn priced(line: ClaimLine, pricing: Pricing) -> Self {
        let net = (line.quantity * line.price).round_dp(MONEY_SCALE);
        let discounted_net = apply_discount(net, pricing.discount);
        let gross = apply_tax(discounted_net, pricing.tax_rate);

        Self {
            item: line.item,
            quantity: line.quantity,
            unit: line.unit,
            price: line.price,
            currency: line.currency,
            net,
            discount: pricing.discount,
            discounted_net,
            tax_rate: pricing.tax_rate,
            gross,
            period_start: line.period_start,
            period_end: line.period_end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: i64,
    pub contract_id: i64,
    pub entry: ClaimEntry,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    lifecycle: Lifecycle<ClaimState>,
}

impl Claim {
    pub fn new(id: i64, contract_id: i64, entry: ClaimEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            contract_id,
            entry,
            is_deleted: false,
            created_at,
            lifecycle: Lifecycle::new(ClaimState::Pending, created_at),
        }
    }

    pub fn restore(
        id: i64,
        contract_id: i64,
        entry: ClaimEntry,
        lifecycle: Lifecycle<ClaimState>,
        is_deleted: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            contract_id,
            entry,
            is_deleted,
            created_at,
            lifecycle,
        }
    }

    pub fn state(&self) -> ClaimState {
        self.lifecycle.state()
    }

    pub fn state_changed(&self) -> DateTime<Utc> {
        self.lifecycle.state_changed()
    }

    pub fn lifecycle(&self) -> &Lifecycle<ClaimState> {
        &self.lifecycle
    }

    /// Still billable: pending and not purged.
    pub fn is_open(&self) -> bool {
        !self.is_deleted && self.state() == ClaimState::Pending
    }

    pub fn settle(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(ClaimState::Settled, at)
    }

    pub fn terminate(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(ClaimState::Terminated, at)
    }

    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
    }
}
