//! Persistence seam of the contract engine.
//!
//! Every engine operation runs inside one store transaction. A contract is
//! locked with [`ContractStore::lock_contract`] before it is touched, which
//! serialises settlement per contract while leaving other contracts free to
//! proceed. Invoice numbers are protected by a unique (creditor, prefix,
//! invoice_no) constraint; a collision surfaces as
//! [`StoreError::DuplicateInvoiceNumber`] and leaves the transaction usable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub_core::{Actor, ContractProcedure, PriceProfile};
use hub_finance::{
    Claim, ClaimEntry, DirectDebit, Invoice, InvoiceDocument, InvoiceDraft, MandateRef, Payment,
    PaymentMethodRecord,
};
use thiserror::Error;
use uuid::Uuid;

use crate::contract::{Contract, ContractState, NewContract, SettlementLog};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invoice number {prefix}-{invoice_no} is already taken for creditor {creditor}")]
    DuplicateInvoiceNumber {
        creditor: Uuid,
        prefix: String,
        invoice_no: String,
    },

    #[error("invoice {0} cannot be deleted")]
    InvoiceImmutable(i64),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[async_trait]
pub trait ContractStore: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;

    async fn actor(&self, id: Uuid) -> Result<Actor, StoreError>;
    async fn contract_procedure(&self, id: Uuid) -> Result<ContractProcedure, StoreError>;
    async fn price_profile(&self, id: Uuid) -> Result<PriceProfile, StoreError>;
    async fn payment_method(&self, id: Uuid) -> Result<PaymentMethodRecord, StoreError>;

    async fn insert_contract(&self, tx: &mut Self::Tx, contract: NewContract) -> Result<Contract, StoreError>;
    /// Loads the contract and holds its row lock until the transaction ends.
    async fn lock_contract(&self, tx: &mut Self::Tx, id: i64) -> Result<Contract, StoreError>;
    async fn update_contract(&self, tx: &mut Self::Tx, contract: &Contract) -> Result<(), StoreError>;

    async fn insert_claims(
        &self,
        tx: &mut Self::Tx,
        contract_id: i64,
        entries: Vec<ClaimEntry>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError>;
    /// Claims of a locked contract that were not purged, ordered by id.
    async fn live_claims(&self, tx: &mut Self::Tx, contract_id: i64) -> Result<Vec<Claim>, StoreError>;
    async fn update_claims(&self, tx: &mut Self::Tx, claims: &[Claim]) -> Result<(), StoreError>;

    async fn last_settlement_log(
        &self,
        tx: &mut Self::Tx,
        contract_id: i64,
    ) -> Result<Option<SettlementLog>, StoreError>;
    async fn append_settlement_log(
        &self,
        tx: &mut Self::Tx,
        contract_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<SettlementLog, StoreError>;

    /// Highest numeric invoice number of a (creditor, prefix) sequence.
    async fn max_invoice_no(&self, tx: &mut Self::Tx, creditor: Uuid, prefix: &str) -> Result<Option<u64>, StoreError>;
    async fn insert_invoice(
        &self,
        tx: &mut Self::Tx,
        draft: &InvoiceDraft,
        invoice_no: &str,
        at: DateTime<Utc>,
    ) -> Result<Invoice, StoreError>;
    async fn attach_invoice_document(
        &self,
        tx: &mut Self::Tx,
        invoice_id: i64,
        document: &InvoiceDocument,
    ) -> Result<(), StoreError>;
    /// Always fails: issued invoices are immutable.
    async fn delete_invoice(&self, tx: &mut Self::Tx, invoice_id: i64) -> Result<(), StoreError>;

    async fn insert_payment(&self, tx: &mut Self::Tx, payment: &Payment) -> Result<(), StoreError>;
    async fn insert_direct_debit(&self, tx: &mut Self::Tx, debit: &DirectDebit) -> Result<(), StoreError>;
    /// RUNNING SEPA mandate between the two actors, if any.
    async fn running_mandate(
        &self,
        tx: &mut Self::Tx,
        creditor: Uuid,
        debitor: Uuid,
    ) -> Result<Option<MandateRef>, StoreError>;

    async fn contract_ids_in_state(&self, states: &[ContractState]) -> Result<Vec<i64>, StoreError>;
    async fn contract(&self, id: i64) -> Result<Contract, StoreError>;
    async fn claims(&self, contract_id: i64) -> Result<Vec<Claim>, StoreError>;
    async fn settlement_logs(&self, contract_id: i64) -> Result<Vec<SettlementLog>, StoreError>;
    async fn invoices(&self, contract_id: i64) -> Result<Vec<Invoice>, StoreError>;
    async fn payments(&self, contract_id: i64) -> Result<Vec<Payment>, StoreError>;
    async fn direct_debits(&self, contract_id: i64) -> Result<Vec<DirectDebit>, StoreError>;
}
