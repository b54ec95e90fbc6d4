use hub_core::TransitionError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FinanceError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("no payment method registered for kind {0:?}")]
    UnknownPaymentMethodKind(String),

    #[error("invalid details for payment method kind {kind}: {source}")]
    InvalidPaymentMethodDetails {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cash payments can only be initialized as prepayment")]
    CashRequiresPrepayment,

    #[error("no running SEPA mandate between creditor {creditor} and debitor {debitor}")]
    MissingSepaMandate { creditor: Uuid, debitor: Uuid },

    #[error("actor {0} has no bank account on file")]
    MissingBankAccount(Uuid),

    #[error("claim {claim_id} does not belong to contract {contract_id}")]
    ForeignClaim { claim_id: i64, contract_id: i64 },
}
