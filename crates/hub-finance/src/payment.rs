use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use hub_core::{Lifecycle, StateCodeError, StateGraph, TransitionError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentState {
    Init,
    Pending,
    Finalized,
    Canceled,
    Failed,
    Refunded,
}

impl StateGraph for PaymentState {
    const ENTITY: &'static str = "payment";

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Init => &[Self::Pending],
            Self::Pending => &[Self::Finalized, Self::Canceled, Self::Failed],
            Self::Finalized => &[Self::Refunded],
            Self::Canceled | Self::Failed | Self::Refunded => &[],
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::Pending => "PENDING",
            Self::Finalized => "FINALIZED",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        })
    }
}

impl FromStr for PaymentState {
    type Err = StateCodeError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Ok(match code {
            "INIT" => Self::Init,
            "PENDING" => Self::Pending,
            "FINALIZED" => Self::Finalized,
            "CANCELED" => Self::Canceled,
            "FAILED" => Self::Failed,
            "REFUNDED" => Self::Refunded,
            other => {
                return Err(StateCodeError {
                    entity: Self::ENTITY,
                    code: other.to_string(),
                });
            }
        })
    }
}

/// Money moved from the debitor to the creditor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub payment_method: Uuid,
    pub contract_id: Option<i64>,
    pub debitor: Uuid,
    pub creditor: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    lifecycle: Lifecycle<PaymentState>,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payment_method: Uuid,
        contract_id: Option<i64>,
        debitor: Uuid,
        creditor: Uuid,
        amount: Decimal,
        currency: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_method,
            contract_id,
            debitor,
            creditor,
            amount,
            currency: currency.into(),
            timestamp,
            lifecycle: Lifecycle::new(PaymentState::Init, timestamp),
        }
    }

    /// A payment that already cleared, e.g. cash handed over at the counter.
    #[allow(clippy::too_many_arguments)]
    pub fn finalized(
        payment_method: Uuid,
        contract_id: Option<i64>,
        debitor: Uuid,
        creditor: Uuid,
        amount: Decimal,
        currency: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        let mut payment = Self::new(
            payment_method,
            contract_id,
            debitor,
            creditor,
            amount,
            currency,
            timestamp,
        );
        payment.set_pending(timestamp)?;
        payment.set_finalized(timestamp)?;
        Ok(payment)
    }

    pub fn restore(mut self, lifecycle: Lifecycle<PaymentState>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn state(&self) -> PaymentState {
        self.lifecycle.state()
    }

    pub fn lifecycle(&self) -> &Lifecycle<PaymentState> {
        &self.lifecycle
    }

    pub fn set_pending(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(PaymentState::Pending, at)
    }

    pub fn set_finalized(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(PaymentState::Finalized, at)
    }

    pub fn set_canceled(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(PaymentState::Canceled, at)
    }

    pub fn set_failed(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(PaymentState::Failed, at)
    }

    pub fn set_refunded(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.lifecycle.move_to(PaymentState::Refunded, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        Payment::new(
            Uuid::new_v4(),
            Some(1),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::new(4200, 2),
            "EUR",
            Utc::now(),
        )
    }

    #[test]
    fn finalized_payment_passes_through_pending() {
        let p = Payment::finalized(
            Uuid::new_v4(),
            None,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::ONE,
            "EUR",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(p.state(), PaymentState::Finalized);
    }

    #[test]
    fn refund_only_after_finalization() {
        let now = Utc::now();
        let mut p = payment();
        assert!(p.set_refunded(now).is_err());
        p.set_pending(now).unwrap();
        assert!(p.set_refunded(now).is_err());
        p.set_finalized(now).unwrap();
        p.set_refunded(now).unwrap();
        assert_eq!(p.state(), PaymentState::Refunded);
        assert!(p.set_failed(now).is_err());
    }

    #[test]
    fn failed_and_canceled_are_terminal() {
        let now = Utc::now();
        let mut failed = payment();
        failed.set_pending(now).unwrap();
        failed.set_failed(now).unwrap();
        assert!(failed.set_finalized(now).is_err());

        let mut canceled = payment();
        canceled.set_pending(now).unwrap();
        canceled.set_canceled(now).unwrap();
        assert!(canceled.set_pending(now).is_err());
    }

    #[test]
    fn state_codes_parse() {
        for state in [
            PaymentState::Init,
            PaymentState::Pending,
            PaymentState::Finalized,
            PaymentState::Canceled,
            PaymentState::Failed,
            PaymentState::Refunded,
        ] {
            assert_eq!(state.to_string().parse::<PaymentState>().unwrap(), state);
        }
        assert!("PAID".parse::<PaymentState>().is_err());
    }
}
