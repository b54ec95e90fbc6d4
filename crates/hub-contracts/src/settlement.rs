use std::time::Duration as StdDuration;

use chrono::Duration;
use hub_core::{
    Actor, ContractProcedure, Notification, NotificationLevel, NotificationTarget, NotificationType,
    StateGraph,
};
use hub_finance::{
    Claim, ClaimState, Invoice, InvoiceDocument, InvoiceDraft, InvoiceSubject,
    MAX_NUMBERING_ATTEMPTS, PaymentMethod, PaymentMethodKind, SettlementEffect, SettlementRequest,
    format_invoice_no,
};
use tracing::{info, warn};

use crate::{
    ContractError,
    contract::{Contract, ContractState, SettlementLog},
    engine::{ContractEngine, Outbox},
    store::{ContractStore, StoreError},
};

/// Pause before the n-th retry of an invoice number.
const NUMBERING_BACKOFF: StdDuration = StdDuration::from_millis(10);

/// Outcome of one settlement pass over a contract.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub contract_id: i64,
    /// Ids of the claims closed in this pass.
    pub settled: Vec<i64>,
    pub invoice: Option<Invoice>,
    pub log: SettlementLog,
    pub finalized: bool,
}

impl<S: ContractStore> ContractEngine<S> {
    /// Settles every due claim of the contract in one unit of work.
    pub async fn settle_claims(&self, contract_id: i64) -> Result<Settlement, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            let procedure = self.store.contract_procedure(contract.contract_procedure).await?;
            self.settle_in(&mut tx, &mut contract, &procedure, &mut outbox)
                .await
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    /// Anchors the settlement schedule of a non-prepayment contract at its first claim.
    pub async fn set_initial_settlement_log(&self, contract_id: i64) -> Result<SettlementLog, ContractError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let contract = self.store.lock_contract(&mut tx, contract_id).await?;
            let method = match contract.payment_method {
                Some(id) => Some(self.resolve_payment_method(id).await?),
                None => None,
            };
            self.initial_log_in(&mut tx, &contract, method.as_ref()).await
        }
        .await;
        self.finish(tx, result, Outbox::new()).await
    }

    pub(crate) async fn initial_log_in(
        &self,
        tx: &mut S::Tx,
        contract: &Contract,
        method: Option<&PaymentMethod>,
    ) -> Result<SettlementLog, ContractError> {
        if method.is_some_and(|m| m.is_prepayment) {
            return Err(ContractError::PrepaymentSettlementLog(contract.id));
        }
        if self.store.last_settlement_log(tx, contract.id).await?.is_some() {
            return Err(ContractError::SettlementLogExists(contract.id));
        }
        let anchor = self
            .store
            .live_claims(tx, contract.id)
            .await?
            .iter()
            .map(|claim| claim.entry.period_start)
            .min()
            .unwrap_or_else(|| self.clock.now());
        let log = self.store.append_settlement_log(tx, contract.id, anchor).await?;
        info!(contract_id = contract.id, anchor = %anchor, "initial settlement log");
        Ok(log)
    }

    pub(crate) async fn settle_in(
        &self,
        tx: &mut S::Tx,
        contract: &mut Contract,
        procedure: &ContractProcedure,
        outbox: &mut Outbox,
    ) -> Result<Settlement, ContractError> {
        let now = self.clock.now();
        let method = match contract.payment_method {
            Some(id) => Some(self.resolve_payment_method(id).await?),
            None => None,
        };
        let cutoff = match &method {
            Some(m) if m.is_prepayment => now + Duration::days(procedure.settlement_interval.days()),
            _ => now,
        };

        let live = self.store.live_claims(tx, contract.id).await?;
        let (mut selected, rest): (Vec<Claim>, Vec<Claim>) = live
            .into_iter()
            .filter(|claim| claim.state() == ClaimState::Pending)
            .partition(|claim| claim.entry.period_end <= cutoff);

        let mut invoice = None;
        if !selected.is_empty() {
            let method = method.ok_or(ContractError::MissingPaymentMethod(contract.id))?;
            let creditor = self.store.actor(contract.creditor).await?;
            let debitor = self.store.actor(contract.debitor).await?;

            if procedure.is_invoicing {
                invoice = Some(
                    self.issue_invoice(tx, contract, &creditor, &debitor, &selected, &method, outbox)
                        .await?,
                );
            }

            let mandate = match method.kind {
                PaymentMethodKind::Sepa(_) => {
                    self.store
                        .running_mandate(tx, contract.creditor, contract.debitor)
                        .await?
                }
                _ => None,
            };
            let reference = contract.reference();
            let effects = method.provider().settle(
                &method,
                &SettlementRequest {
                    contract: &reference,
                    claims: &selected,
                    invoice: invoice.as_ref(),
                    debitor: &debitor,
                    mandate,
                    at: now,
                },
            )?;
            for effect in &effects {
                match effect {
                    SettlementEffect::Payment(payment) => self.store.insert_payment(tx, payment).await?,
                    SettlementEffect::DirectDebit(debit) => {
                        self.store.insert_direct_debit(tx, debit).await?
                    }
                }
            }

            for claim in &mut selected {
                claim.settle(now)?;
            }
            self.store.update_claims(tx, &selected).await?;
        }

        let mut finalized = false;
        if contract.is_fixed_term
            && rest.is_empty()
            && contract.state().can_move_to(ContractState::Finalized)
        {
            contract.move_to(ContractState::Finalized, now)?;
            self.store.update_contract(tx, contract).await?;
            finalized = true;
        }

        let log = self.store.append_settlement_log(tx, contract.id, now).await?;
        info!(
            contract_id = contract.id,
            settled = selected.len(),
            invoice_no = invoice.as_ref().map(|i| i.full_invoice_no.as_str()),
            finalized,
            "settlement pass"
        );
        Ok(Settlement {
            contract_id: contract.id,
            settled: selected.iter().map(|claim| claim.id).collect(),
            invoice,
            log,
            finalized,
        })
    }

    /// Numbers, stores and renders the invoice for a settled batch.
    #[allow(clippy::too_many_arguments)]
    async fn issue_invoice(
        &self,
        tx: &mut S::Tx,
        contract: &Contract,
        creditor: &Actor,
        debitor: &Actor,
        claims: &[Claim],
        method: &PaymentMethod,
        outbox: &mut Outbox,
    ) -> Result<Invoice, ContractError> {
        let now = self.clock.now();
        let draft = InvoiceDraft::build(
            InvoiceSubject {
                contract_id: contract.id,
                contract_uuid: contract.uuid,
                creditor,
                debitor,
            },
            claims,
            method.provider().invoice_text(),
            false,
            now.date_naive(),
        );

        let mut invoice = self.insert_numbered(tx, &draft).await?;

        let rendered = self
            .renderer
            .generate(&invoice)
            .map_err(|source| ContractError::Render {
                invoice_no: invoice.full_invoice_no.clone(),
                source,
            })?;
        let extension = rendered.extension().to_owned();
        let document = InvoiceDocument::new(
            &invoice,
            &creditor.slug,
            &extension,
            &rendered.mimetype,
            rendered.content,
        );
        self.store
            .attach_invoice_document(tx, invoice.id, &document)
            .await?;

        if !contract.is_self_dealing() {
            outbox.push(
                Notification::build(
                    NotificationType::Monetary,
                    contract.creditor,
                    contract.debitor,
                    format!("New invoice {}", invoice.full_invoice_no),
                    format!(
                        "{} issued invoice {} for {}",
                        creditor.name,
                        invoice.full_invoice_no,
                        contract.kind.verbose_name()
                    ),
                    contract.link(),
                    NotificationLevel::High,
                    NotificationTarget::Invoice {
                        id: invoice.id,
                        contract_id: contract.id,
                    },
                    now,
                )
                .with_attachment(document.path.clone()),
            );
        }
        invoice.document = Some(document);
        Ok(invoice)
    }

    /// Takes the next number of the creditor's sequence, retrying when a concurrent pass got there first.
    async fn insert_numbered(&self, tx: &mut S::Tx, draft: &InvoiceDraft) -> Result<Invoice, ContractError> {
        for attempt in 1..=MAX_NUMBERING_ATTEMPTS {
            let next = self
                .store
                .max_invoice_no(tx, draft.creditor, &draft.prefix)
                .await?
                .unwrap_or(0)
                + 1;
            let invoice_no = format_invoice_no(next);
            match self
                .store
                .insert_invoice(tx, draft, &invoice_no, self.clock.now())
                .await
            {
                Ok(invoice) => return Ok(invoice),
                Err(StoreError::DuplicateInvoiceNumber { .. }) => {
                    warn!(
                        contract_id = draft.contract_id,
                        invoice_no = %invoice_no,
                        attempt,
                        "invoice number taken, retrying"
                    );
                    tokio::time::sleep(NUMBERING_BACKOFF * attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ContractError::InvoiceNumbering {
            creditor: draft.creditor,
            prefix: draft.prefix.clone(),
            attempts: MAX_NUMBERING_ATTEMPTS,
        })
    }
}
