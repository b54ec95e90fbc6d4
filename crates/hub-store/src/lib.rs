//! In-process [`ContractStore`] used by tests and local runs.
//!
//! Writes go straight to the shared tables and are recorded in the
//! transaction's undo log; rollback replays it backwards. Contract locks are
//! per-contract async mutexes held until the transaction ends, so readers
//! outside a transaction may observe uncommitted rows. Invoice numbering
//! follows the database: the maximum only counts committed rows and rows of
//! the calling transaction, while the uniqueness check sees every row.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub_contracts::{
    Contract, ContractKind, ContractState, ContractStore, NewContract, SettlementLog, StoreError,
};
use hub_core::{Actor, ContractProcedure, PriceProfile};
use hub_finance::{
    Claim, ClaimEntry, DirectDebit, Invoice, InvoiceDocument, InvoiceDraft, MandateRef, Payment,
    PaymentMethodRecord, numeric_invoice_no,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

struct InvoiceRow {
    invoice: Invoice,
    /// Transaction that inserted the row, until it commits.
    owner_tx: Option<u64>,
}

#[derive(Default)]
struct Tables {
    actors: HashMap<Uuid, Actor>,
    procedures: HashMap<Uuid, ContractProcedure>,
    price_profiles: HashMap<Uuid, PriceProfile>,
    payment_methods: HashMap<Uuid, PaymentMethodRecord>,
    contracts: BTreeMap<i64, Contract>,
    claims: BTreeMap<i64, Claim>,
    settlement_logs: BTreeMap<i64, SettlementLog>,
    invoices: BTreeMap<i64, InvoiceRow>,
    payments: Vec<Payment>,
    direct_debits: Vec<DirectDebit>,
    next_contract: i64,
    next_claim: i64,
    next_log: i64,
    next_invoice: i64,
}

enum Undo {
    Contract(i64, Option<Contract>),
    Claim(i64, Option<Claim>),
    SettlementLog(i64),
    Invoice(i64),
    InvoiceDocument(i64, Option<InvoiceDocument>),
    Payment(Uuid),
    DirectDebit(Uuid),
}

pub struct MemoryTx {
    id: u64,
    locks: HashMap<i64, OwnedMutexGuard<()>>,
    undo: Vec<Undo>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    contract_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    tx_sequence: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_actor(&self, actor: Actor) {
        self.tables.write().await.actors.insert(actor.id, actor);
    }

    pub async fn put_procedure(&self, procedure: ContractProcedure) {
        self.tables.write().await.procedures.insert(procedure.id, procedure);
    }

    pub async fn put_price_profile(&self, profile: PriceProfile) {
        self.tables.write().await.price_profiles.insert(profile.id, profile);
    }

    pub async fn put_payment_method(&self, method: PaymentMethodRecord) {
        self.tables.write().await.payment_methods.insert(method.id, method);
    }

    async fn contract_lock(&self, id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.contract_locks.lock().await;
        Arc::clone(locks.entry(id).or_default())
    }
}

fn is_visible(row: &InvoiceRow, tx_id: u64) -> bool {
    row.owner_tx.is_none_or(|owner| owner == tx_id)
}

#[async_trait]
impl ContractStore for InMemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        Ok(MemoryTx {
            id: self.tx_sequence.fetch_add(1, Ordering::Relaxed) + 1,
            locks: HashMap::new(),
            undo: Vec::new(),
        })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for row in tables.invoices.values_mut() {
            if row.owner_tx == Some(tx.id) {
                row.owner_tx = None;
            }
        }
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        debug!(tx = tx.id, writes = tx.undo.len(), "rolling back");
        for undo in tx.undo.into_iter().rev() {
            match undo {
                Undo::Contract(id, Some(previous)) => {
                    tables.contracts.insert(id, previous);
                }
                Undo::Contract(id, None) => {
                    tables.contracts.remove(&id);
                }
                Undo::Claim(id, Some(previous)) => {
                    tables.claims.insert(id, previous);
                }
                Undo::Claim(id, None) => {
                    tables.claims.remove(&id);
                }
                Undo::SettlementLog(id) => {
                    tables.settlement_logs.remove(&id);
                }
                Undo::Invoice(id) => {
                    tables.invoices.remove(&id);
                }
                Undo::InvoiceDocument(id, previous) => {
                    if let Some(row) = tables.invoices.get_mut(&id) {
                        row.invoice.document = previous;
                    }
                }
                Undo::Payment(id) => tables.payments.retain(|payment| payment.id != id),
                Undo::DirectDebit(id) => tables.direct_debits.retain(|debit| debit.id != id),
            }
        }
        Ok(())
    }

    async fn actor(&self, id: Uuid) -> Result<Actor, StoreError> {
        self.tables
            .read()
            .await
            .actors
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("actor", id))
    }

    async fn contract_procedure(&self, id: Uuid) -> Result<ContractProcedure, StoreError> {
        self.tables
            .read()
            .await
            .procedures
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("contract procedure", id))
    }

    async fn price_profile(&self, id: Uuid) -> Result<PriceProfile, StoreError> {
        self.tables
            .read()
            .await
            .price_profiles
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("price profile", id))
    }

    async fn payment_method(&self, id: Uuid) -> Result<PaymentMethodRecord, StoreError> {
        self.tables
            .read()
            .await
            .payment_methods
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("payment method", id))
    }

    async fn insert_contract(&self, tx: &mut MemoryTx, contract: NewContract) -> Result<Contract, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_contract += 1;
        let contract = Contract::create(tables.next_contract, contract);
        tables.contracts.insert(contract.id, contract.clone());
        tx.undo.push(Undo::Contract(contract.id, None));
        Ok(contract)
    }

    async fn lock_contract(&self, tx: &mut MemoryTx, id: i64) -> Result<Contract, StoreError> {
        if !tx.locks.contains_key(&id) {
            let guard = self.contract_lock(id).await.lock_owned().await;
            tx.locks.insert(id, guard);
        }
        self.tables
            .read()
            .await
            .contracts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("contract", id))
    }

    async fn update_contract(&self, tx: &mut MemoryTx, contract: &Contract) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let previous = tables
            .contracts
            .insert(contract.id, contract.clone())
            .ok_or_else(|| StoreError::not_found("contract", contract.id))?;
        tx.undo.push(Undo::Contract(contract.id, Some(previous)));
        Ok(())
    }

    async fn insert_claims(
        &self,
        tx: &mut MemoryTx,
        contract_id: i64,
        entries: Vec<ClaimEntry>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError> {
        let mut tables = self.tables.write().await;
        let mut claims = Vec::with_capacity(entries.len());
        for entry in entries {
            tables.next_claim += 1;
            let claim = Claim::new(tables.next_claim, contract_id, entry, at);
            tables.claims.insert(claim.id, claim.clone());
            tx.undo.push(Undo::Claim(claim.id, None));
            claims.push(claim);
        }
        Ok(claims)
    }

    async fn live_claims(&self, _tx: &mut MemoryTx, contract_id: i64) -> Result<Vec<Claim>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .claims
            .values()
            .filter(|claim| claim.contract_id == contract_id && !claim.is_deleted)
            .cloned()
            .collect())
    }

    async fn update_claims(&self, tx: &mut MemoryTx, claims: &[Claim]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for claim in claims {
            let previous = tables
                .claims
                .insert(claim.id, claim.clone())
                .ok_or_else(|| StoreError::not_found("claim", claim.id))?;
            tx.undo.push(Undo::Claim(claim.id, Some(previous)));
        }
        Ok(())
    }

    async fn last_settlement_log(
        &self,
        _tx: &mut MemoryTx,
        contract_id: i64,
    ) -> Result<Option<SettlementLog>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .settlement_logs
            .values()
            .filter(|log| log.contract_id == contract_id)
            .max_by_key(|log| (log.timestamp, log.id))
            .cloned())
    }

    async fn append_settlement_log(
        &self,
        tx: &mut MemoryTx,
        contract_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<SettlementLog, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_log += 1;
        let log = SettlementLog {
            id: tables.next_log,
            contract_id,
            timestamp,
        };
        tables.settlement_logs.insert(log.id, log.clone());
        tx.undo.push(Undo::SettlementLog(log.id));
        Ok(log)
    }

    async fn max_invoice_no(&self, tx: &mut MemoryTx, creditor: Uuid, prefix: &str) -> Result<Option<u64>, StoreError> {
        let tx_id = tx.id;
        Ok(self
            .tables
            .read()
            .await
            .invoices
            .values()
            .filter(|row| is_visible(row, tx_id))
            .filter(|row| row.invoice.draft.creditor == creditor && row.invoice.draft.prefix == prefix)
            .filter_map(|row| numeric_invoice_no(&row.invoice.invoice_no))
            .max())
    }

    async fn insert_invoice(
        &self,
        tx: &mut MemoryTx,
        draft: &InvoiceDraft,
        invoice_no: &str,
        at: DateTime<Utc>,
    ) -> Result<Invoice, StoreError> {
        let mut tables = self.tables.write().await;
        let taken = tables.invoices.values().any(|row| {
            row.invoice.draft.creditor == draft.creditor
                && row.invoice.draft.prefix == draft.prefix
                && row.invoice.invoice_no == invoice_no
        });
        if taken {
            return Err(StoreError::DuplicateInvoiceNumber {
                creditor: draft.creditor,
                prefix: draft.prefix.clone(),
                invoice_no: invoice_no.to_string(),
            });
        }
        tables.next_invoice += 1;
        let invoice = Invoice::issue(tables.next_invoice, draft.clone(), invoice_no.to_string(), at);
        tables.invoices.insert(
            invoice.id,
            InvoiceRow {
                invoice: invoice.clone(),
                owner_tx: Some(tx.id),
            },
        );
        tx.undo.push(Undo::Invoice(invoice.id));
        Ok(invoice)
    }

    async fn attach_invoice_document(
        &self,
        tx: &mut MemoryTx,
        invoice_id: i64,
        document: &InvoiceDocument,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .invoices
            .get_mut(&invoice_id)
            .ok_or_else(|| StoreError::not_found("invoice", invoice_id))?;
        let previous = row.invoice.document.replace(document.clone());
        tx.undo.push(Undo::InvoiceDocument(invoice_id, previous));
        Ok(())
    }

    async fn delete_invoice(&self, _tx: &mut MemoryTx, invoice_id: i64) -> Result<(), StoreError> {
        Err(StoreError::InvoiceImmutable(invoice_id))
    }

    async fn insert_payment(&self, tx: &mut MemoryTx, payment: &Payment) -> Result<(), StoreError> {
        self.tables.write().await.payments.push(payment.clone());
        tx.undo.push(Undo::Payment(payment.id));
        Ok(())
    }

    async fn insert_direct_debit(&self, tx: &mut MemoryTx, debit: &DirectDebit) -> Result<(), StoreError> {
        self.tables.write().await.direct_debits.push(debit.clone());
        tx.undo.push(Undo::DirectDebit(debit.id));
        Ok(())
    }

    async fn running_mandate(
        &self,
        _tx: &mut MemoryTx,
        creditor: Uuid,
        debitor: Uuid,
    ) -> Result<Option<MandateRef>, StoreError> {
        let tables = self.tables.read().await;
        let mandate = tables.contracts.values().find(|contract| {
            contract.kind == ContractKind::SepaMandate
                && contract.creditor == creditor
                && contract.debitor == debitor
                && contract.state() == ContractState::Running
                && !contract.is_deleted
        });
        Ok(mandate.map(|mandate| MandateRef {
            contract_id: mandate.id,
            has_prior_debits: tables
                .direct_debits
                .iter()
                .any(|debit| debit.mandate_contract_id == mandate.id),
        }))
    }

    async fn contract_ids_in_state(&self, states: &[ContractState]) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .contracts
            .values()
            .filter(|contract| !contract.is_deleted && states.contains(&contract.state()))
            .map(|contract| contract.id)
            .collect())
    }

    async fn contract(&self, id: i64) -> Result<Contract, StoreError> {
        self.tables
            .read()
            .await
            .contracts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("contract", id))
    }

    async fn claims(&self, contract_id: i64) -> Result<Vec<Claim>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .claims
            .values()
            .filter(|claim| claim.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn settlement_logs(&self, contract_id: i64) -> Result<Vec<SettlementLog>, StoreError> {
        let mut logs: Vec<_> = self
            .tables
            .read()
            .await
            .settlement_logs
            .values()
            .filter(|log| log.contract_id == contract_id)
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.timestamp, log.id));
        Ok(logs)
    }

    async fn invoices(&self, contract_id: i64) -> Result<Vec<Invoice>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .invoices
            .values()
            .filter(|row| row.invoice.draft.contract_id == contract_id)
            .map(|row| row.invoice.clone())
            .collect())
    }

    async fn payments(&self, contract_id: i64) -> Result<Vec<Payment>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .payments
            .iter()
            .filter(|payment| payment.contract_id == Some(contract_id))
            .cloned()
            .collect())
    }

    async fn direct_debits(&self, contract_id: i64) -> Result<Vec<DirectDebit>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .direct_debits
            .iter()
            .filter(|debit| debit.contract_id == contract_id)
            .cloned()
            .collect())
    }
}
