use hub_bookings::BookingError;
use hub_core::TransitionError;
use hub_finance::FinanceError;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Finance(#[from] FinanceError),

    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("contract {0} has no payment method")]
    MissingPaymentMethod(i64),

    #[error("payment method {payment_method} is not offered by contract procedure {contract_procedure}")]
    PaymentMethodNotOffered {
        payment_method: Uuid,
        contract_procedure: Uuid,
    },

    #[error("initial settlement logs cannot be set for prepayments (contract {0})")]
    PrepaymentSettlementLog(i64),

    #[error("contract {0} already has a settlement log entry")]
    SettlementLogExists(i64),

    #[error("contract {0} is not a SEPA mandate")]
    NotAMandate(i64),

    #[error("no free invoice number for creditor {creditor} prefix {prefix:?} after {attempts} attempts")]
    InvoiceNumbering {
        creditor: Uuid,
        prefix: String,
        attempts: u32,
    },

    #[error("rendering invoice {invoice_no} failed: {source}")]
    Render {
        invoice_no: String,
        #[source]
        source: anyhow::Error,
    },
}
