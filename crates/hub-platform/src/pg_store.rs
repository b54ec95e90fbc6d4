//! Postgres implementation of [`ContractStore`].
//!
//! Complex value objects (booking terms, actor profiles, invoice drafts) are
//! kept as JSONB next to the relational columns the engine filters on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub_contracts::{
    Contract, ContractDraft, ContractKind, ContractState, ContractStore, NewContract,
    SettlementLog, StoreError,
};
use hub_core::{
    Actor, BankAccount, ContractProcedure, DeclarationOfIntent, Lifecycle, PriceProfile,
};
use hub_finance::{
    Claim, ClaimEntry, ClaimState, DebitSequence, DirectDebit, Invoice, InvoiceDocument,
    InvoiceDraft, MandateRef, Payment, PaymentMethodRecord, PaymentState,
};
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json};
use uuid::Uuid;

const CONTRACT_COLUMNS: &str = "id, uuid, terms, creditor, debitor, contract_procedure, payment_method, \
     price_profile, terms_and_conditions, is_fixed_term, confirmation, acceptance, created_by, \
     created_at, is_deleted, state, state_changed";

const CLAIM_COLUMNS: &str = "id, contract_id, item, quantity, unit, price, currency, net, discount, \
     discounted_net, tax_rate, gross, period_start, period_end, state, state_changed, is_deleted, created_at";

const INVOICE_COLUMNS: &str = "id, invoice_no, draft, document, document_content, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn document<T: DeserializeOwned>(&self, table: &'static str, entity: &'static str, id: Uuid) -> Result<T, StoreError> {
        let row = sqlx::query(&format!("SELECT document FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::not_found(entity, id))?;
        Ok(row.try_get::<Json<T>, _>("document").map_err(backend)?.0)
    }
}

fn backend(err: impl Into<anyhow::Error>) -> StoreError {
    StoreError::Backend(err.into())
}

fn contract_from_row(row: &PgRow) -> Result<Contract, StoreError> {
    let kind: Json<ContractKind> = row.try_get("terms").map_err(backend)?;
    let state: ContractState = row
        .try_get::<String, _>("state")
        .map_err(backend)?
        .parse()
        .map_err(backend)?;
    let confirmation: Option<Json<DeclarationOfIntent>> = row.try_get("confirmation").map_err(backend)?;
    let acceptance: Option<Json<DeclarationOfIntent>> = row.try_get("acceptance").map_err(backend)?;

    let new = NewContract {
        uuid: row.try_get("uuid").map_err(backend)?,
        draft: ContractDraft {
            kind: kind.0,
            creditor: row.try_get("creditor").map_err(backend)?,
            debitor: row.try_get("debitor").map_err(backend)?,
            contract_procedure: row.try_get("contract_procedure").map_err(backend)?,
            payment_method: row.try_get("payment_method").map_err(backend)?,
            price_profile: row.try_get("price_profile").map_err(backend)?,
            is_fixed_term: row.try_get("is_fixed_term").map_err(backend)?,
        },
        terms_and_conditions: row.try_get("terms_and_conditions").map_err(backend)?,
        created_by: row.try_get("created_by").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    };
    let mut contract = Contract::create(row.try_get("id").map_err(backend)?, new).restore(
        Lifecycle::restore(state, row.try_get("state_changed").map_err(backend)?),
    );
    contract.confirmation = confirmation.map(|json| json.0);
    contract.acceptance = acceptance.map(|json| json.0);
    contract.is_deleted = row.try_get("is_deleted").map_err(backend)?;
    Ok(contract)
}

fn claim_from_row(row: &PgRow) -> Result<Claim, StoreError> {
    let state: ClaimState = row
        .try_get::<String, _>("state")
        .map_err(backend)?
        .parse()
        .map_err(backend)?;
    let entry = ClaimEntry {
        item: row.try_get("item").map_err(backend)?,
        quantity: row.try_get("quantity").map_err(backend)?,
        unit: row.try_get("unit").map_err(backend)?,
        price: row.try_get("price").map_err(backend)?,
        currency: row.try_get("currency").map_err(backend)?,
        net: row.try_get("net").map_err(backend)?,
        discount: row.try_get("discount").map_err(backend)?,
        discounted_net: row.try_get("discounted_net").map_err(backend)?,
        tax_rate: row.try_get("tax_rate").map_err(backend)?,
        gross: row.try_get("gross").map_err(backend)?,
        period_start: row.try_get("period_start").map_err(backend)?,
        period_end: row.try_get("period_end").map_err(backend)?,
    };
    Ok(Claim::restore(
        row.try_get("id").map_err(backend)?,
        row.try_get("contract_id").map_err(backend)?,
        entry,
        Lifecycle::restore(state, row.try_get("state_changed").map_err(backend)?),
        row.try_get("is_deleted").map_err(backend)?,
        row.try_get("created_at").map_err(backend)?,
    ))
}

fn invoice_from_row(row: &PgRow) -> Result<Invoice, StoreError> {
    let draft: Json<InvoiceDraft> = row.try_get("draft").map_err(backend)?;
    let mut invoice = Invoice::issue(
        row.try_get("id").map_err(backend)?,
        draft.0,
        row.try_get("invoice_no").map_err(backend)?,
        row.try_get("created_at").map_err(backend)?,
    );
    let document: Option<Json<InvoiceDocument>> = row.try_get("document").map_err(backend)?;
    let content: Option<Vec<u8>> = row.try_get("document_content").map_err(backend)?;
    invoice.document = document.map(|json| InvoiceDocument {
        content: content.unwrap_or_default(),
        ..json.0
    });
    Ok(invoice)
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    let state: PaymentState = row
        .try_get::<String, _>("state")
        .map_err(backend)?
        .parse()
        .map_err(backend)?;
    let mut payment = Payment::new(
        row.try_get("payment_method").map_err(backend)?,
        row.try_get("contract_id").map_err(backend)?,
        row.try_get("debitor").map_err(backend)?,
        row.try_get("creditor").map_err(backend)?,
        row.try_get("amount").map_err(backend)?,
        row.try_get::<String, _>("currency").map_err(backend)?,
        row.try_get("timestamp").map_err(backend)?,
    )
    .restore(Lifecycle::restore(state, row.try_get("state_changed").map_err(backend)?));
    payment.id = row.try_get("id").map_err(backend)?;
    Ok(payment)
}

fn debit_from_row(row: &PgRow) -> Result<DirectDebit, StoreError> {
    let sequence = match row.try_get::<String, _>("sequence").map_err(backend)?.as_str() {
        "FRST" => DebitSequence::First,
        "RCUR" => DebitSequence::Recurring,
        other => return Err(backend(anyhow::anyhow!("unknown debit sequence {other:?}"))),
    };
    let account: Json<BankAccount> = row.try_get("account").map_err(backend)?;
    Ok(DirectDebit {
        id: row.try_get("id").map_err(backend)?,
        end_to_end_id: row.try_get("end_to_end_id").map_err(backend)?,
        mandate_contract_id: row.try_get("mandate_contract_id").map_err(backend)?,
        contract_id: row.try_get("contract_id").map_err(backend)?,
        creditor: row.try_get("creditor").map_err(backend)?,
        debitor: row.try_get("debitor").map_err(backend)?,
        account: account.0,
        amount: row.try_get("amount").map_err(backend)?,
        currency: row.try_get("currency").map_err(backend)?,
        sequence,
        description: row.try_get("description").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

#[async_trait]
impl ContractStore for PgStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.pool.begin().await.map_err(backend)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await.map_err(backend)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.rollback().await.map_err(backend)
    }

    async fn actor(&self, id: Uuid) -> Result<Actor, StoreError> {
        self.document("actors", "actor", id).await
    }

    async fn contract_procedure(&self, id: Uuid) -> Result<ContractProcedure, StoreError> {
        self.document("contract_procedures", "contract procedure", id).await
    }

    async fn price_profile(&self, id: Uuid) -> Result<PriceProfile, StoreError> {
        self.document("price_profiles", "price profile", id).await
    }

    async fn payment_method(&self, id: Uuid) -> Result<PaymentMethodRecord, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner, name, kind, details, currency, is_prepayment,
                   fee_absolute_value, fee_relative_value, fee_tax_rate
            FROM payment_methods
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::not_found("payment method", id))?;

        Ok(PaymentMethodRecord {
            id: row.try_get("id").map_err(backend)?,
            owner: row.try_get("owner").map_err(backend)?,
            name: row.try_get("name").map_err(backend)?,
            kind: row.try_get("kind").map_err(backend)?,
            details: row.try_get("details").map_err(backend)?,
            currency: row.try_get("currency").map_err(backend)?,
            is_prepayment: row.try_get("is_prepayment").map_err(backend)?,
            fee_absolute_value: row.try_get("fee_absolute_value").map_err(backend)?,
            fee_relative_value: row.try_get("fee_relative_value").map_err(backend)?,
            fee_tax_rate: row.try_get("fee_tax_rate").map_err(backend)?,
        })
    }

    async fn insert_contract(&self, tx: &mut Self::Tx, contract: NewContract) -> Result<Contract, StoreError> {
        let created_at = contract.created_at;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO contracts (
                uuid, kind, terms, creditor, debitor, contract_procedure, payment_method,
                price_profile, terms_and_conditions, is_fixed_term, created_by, created_at,
                state, state_changed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $12)
            RETURNING id
            "#,
        )
        .bind(contract.uuid)
        .bind(contract.draft.kind.key())
        .bind(Json(&contract.draft.kind))
        .bind(contract.draft.creditor)
        .bind(contract.draft.debitor)
        .bind(contract.draft.contract_procedure)
        .bind(contract.draft.payment_method)
        .bind(contract.draft.price_profile)
        .bind(contract.terms_and_conditions.as_deref())
        .bind(contract.draft.is_fixed_term)
        .bind(contract.created_by)
        .bind(created_at)
        .bind(ContractState::Pending.to_string())
        .fetch_one(&mut **tx)
        .await
        .map_err(backend)?;

        Ok(Contract::create(id, contract))
    }

    async fn lock_contract(&self, tx: &mut Self::Tx, id: i64) -> Result<Contract, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::not_found("contract", id))?;
        contract_from_row(&row)
    }

    async fn update_contract(&self, tx: &mut Self::Tx, contract: &Contract) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE contracts
            SET terms = $2, confirmation = $3, acceptance = $4, is_deleted = $5,
                state = $6, state_changed = $7
            WHERE id = $1
            "#,
        )
        .bind(contract.id)
        .bind(Json(&contract.kind))
        .bind(contract.confirmation.as_ref().map(Json))
        .bind(contract.acceptance.as_ref().map(Json))
        .bind(contract.is_deleted)
        .bind(contract.state().to_string())
        .bind(contract.state_changed())
        .execute(&mut **tx)
        .await
        .map_err(backend)?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("contract", contract.id));
        }
        Ok(())
    }

    async fn insert_claims(
        &self,
        tx: &mut Self::Tx,
        contract_id: i64,
        entries: Vec<ClaimEntry>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError> {
        let mut claims = Vec::with_capacity(entries.len());
        for entry in entries {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO claims (
                    contract_id, item, quantity, unit, price, currency, net, discount,
                    discounted_net, tax_rate, gross, period_start, period_end, state,
                    state_changed, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
                RETURNING id
                "#,
            )
            .bind(contract_id)
            .bind(&entry.item)
            .bind(entry.quantity)
            .bind(&entry.unit)
            .bind(entry.price)
            .bind(&entry.currency)
            .bind(entry.net)
            .bind(entry.discount)
            .bind(entry.discounted_net)
            .bind(entry.tax_rate)
            .bind(entry.gross)
            .bind(entry.period_start)
            .bind(entry.period_end)
            .bind(ClaimState::Pending.to_string())
            .bind(at)
            .fetch_one(&mut **tx)
            .await
            .map_err(backend)?;
            claims.push(Claim::new(id, contract_id, entry, at));
        }
        Ok(claims)
    }

    async fn live_claims(&self, tx: &mut Self::Tx, contract_id: i64) -> Result<Vec<Claim>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE contract_id = $1 AND NOT is_deleted ORDER BY id"
        ))
        .bind(contract_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(backend)?;
        rows.iter().map(claim_from_row).collect()
    }

    async fn update_claims(&self, tx: &mut Self::Tx, claims: &[Claim]) -> Result<(), StoreError> {
        for claim in claims {
            sqlx::query("UPDATE claims SET state = $2, state_changed = $3, is_deleted = $4 WHERE id = $1")
                .bind(claim.id)
                .bind(claim.state().to_string())
                .bind(claim.state_changed())
                .bind(claim.is_deleted)
                .execute(&mut **tx)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn last_settlement_log(
        &self,
        tx: &mut Self::Tx,
        contract_id: i64,
    ) -> Result<Option<SettlementLog>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, contract_id, timestamp
            FROM settlement_logs
            WHERE contract_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(contract_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?;

        row.map(|row| {
            Ok(SettlementLog {
                id: row.try_get("id").map_err(backend)?,
                contract_id: row.try_get("contract_id").map_err(backend)?,
                timestamp: row.try_get("timestamp").map_err(backend)?,
            })
        })
        .transpose()
    }

    async fn append_settlement_log(
        &self,
        tx: &mut Self::Tx,
        contract_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<SettlementLog, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO settlement_logs (contract_id, timestamp) VALUES ($1, $2) RETURNING id",
        )
        .bind(contract_id)
        .bind(timestamp)
        .fetch_one(&mut **tx)
        .await
        .map_err(backend)?;
        Ok(SettlementLog {
            id,
            contract_id,
            timestamp,
        })
    }

    async fn max_invoice_no(&self, tx: &mut Self::Tx, creditor: Uuid, prefix: &str) -> Result<Option<u64>, StoreError> {
        let max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(invoice_no::BIGINT)
            FROM invoices
            WHERE creditor = $1 AND prefix = $2 AND invoice_no ~ '^[0-9]+$'
            "#,
        )
        .bind(creditor)
        .bind(prefix)
        .fetch_one(&mut **tx)
        .await
        .map_err(backend)?;
        Ok(max.and_then(|max| u64::try_from(max).ok()))
    }

    async fn insert_invoice(
        &self,
        tx: &mut Self::Tx,
        draft: &InvoiceDraft,
        invoice_no: &str,
        at: DateTime<Utc>,
    ) -> Result<Invoice, StoreError> {
        let full_invoice_no = format!("{}-{}", draft.prefix, invoice_no);
        // Waits for a concurrent insert of the same number and yields no row if it committed.
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO invoices (
                contract_id, creditor, prefix, invoice_no, full_invoice_no, draft, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (creditor, prefix, invoice_no) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(draft.contract_id)
        .bind(draft.creditor)
        .bind(&draft.prefix)
        .bind(invoice_no)
        .bind(&full_invoice_no)
        .bind(Json(draft))
        .bind(at)
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?;

        match id {
            Some(id) => Ok(Invoice::issue(id, draft.clone(), invoice_no.to_string(), at)),
            None => Err(StoreError::DuplicateInvoiceNumber {
                creditor: draft.creditor,
                prefix: draft.prefix.clone(),
                invoice_no: invoice_no.to_string(),
            }),
        }
    }

    async fn attach_invoice_document(
        &self,
        tx: &mut Self::Tx,
        invoice_id: i64,
        document: &InvoiceDocument,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query("UPDATE invoices SET document = $2, document_content = $3 WHERE id = $1")
            .bind(invoice_id)
            .bind(Json(document))
            .bind(&document.content)
            .execute(&mut **tx)
            .await
            .map_err(backend)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("invoice", invoice_id));
        }
        Ok(())
    }

    async fn delete_invoice(&self, _tx: &mut Self::Tx, invoice_id: i64) -> Result<(), StoreError> {
        Err(StoreError::InvoiceImmutable(invoice_id))
    }

    async fn insert_payment(&self, tx: &mut Self::Tx, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, payment_method, contract_id, debitor, creditor, amount, currency,
                timestamp, state, state_changed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id)
        .bind(payment.payment_method)
        .bind(payment.contract_id)
        .bind(payment.debitor)
        .bind(payment.creditor)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.timestamp)
        .bind(payment.state().to_string())
        .bind(payment.lifecycle().state_changed())
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn insert_direct_debit(&self, tx: &mut Self::Tx, debit: &DirectDebit) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO direct_debits (
                id, end_to_end_id, mandate_contract_id, contract_id, creditor, debitor,
                account, amount, currency, sequence, description, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(debit.id)
        .bind(debit.end_to_end_id)
        .bind(debit.mandate_contract_id)
        .bind(debit.contract_id)
        .bind(debit.creditor)
        .bind(debit.debitor)
        .bind(Json(&debit.account))
        .bind(debit.amount)
        .bind(&debit.currency)
        .bind(debit.sequence.code())
        .bind(&debit.description)
        .bind(debit.created_at)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn running_mandate(
        &self,
        tx: &mut Self::Tx,
        creditor: Uuid,
        debitor: Uuid,
    ) -> Result<Option<MandateRef>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT c.id,
                   EXISTS (SELECT 1 FROM direct_debits d WHERE d.mandate_contract_id = c.id) AS has_prior_debits
            FROM contracts c
            WHERE c.kind = $1 AND c.creditor = $2 AND c.debitor = $3
              AND c.state = $4 AND NOT c.is_deleted
            ORDER BY c.id
            LIMIT 1
            "#,
        )
        .bind(ContractKind::SepaMandate.key())
        .bind(creditor)
        .bind(debitor)
        .bind(ContractState::Running.to_string())
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?;

        row.map(|row| {
            Ok(MandateRef {
                contract_id: row.try_get("id").map_err(backend)?,
                has_prior_debits: row.try_get("has_prior_debits").map_err(backend)?,
            })
        })
        .transpose()
    }

    async fn contract_ids_in_state(&self, states: &[ContractState]) -> Result<Vec<i64>, StoreError> {
        let states: Vec<String> = states.iter().map(ToString::to_string).collect();
        sqlx::query_scalar("SELECT id FROM contracts WHERE state = ANY($1) AND NOT is_deleted ORDER BY id")
            .bind(&states)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)
    }

    async fn contract(&self, id: i64) -> Result<Contract, StoreError> {
        let row = sqlx::query(&format!("SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::not_found("contract", id))?;
        contract_from_row(&row)
    }

    async fn claims(&self, contract_id: i64) -> Result<Vec<Claim>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE contract_id = $1 ORDER BY id"
        ))
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(claim_from_row).collect()
    }

    async fn settlement_logs(&self, contract_id: i64) -> Result<Vec<SettlementLog>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, contract_id, timestamp FROM settlement_logs WHERE contract_id = $1 ORDER BY timestamp, id",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter()
            .map(|row| {
                Ok(SettlementLog {
                    id: row.try_get("id").map_err(backend)?,
                    contract_id: row.try_get("contract_id").map_err(backend)?,
                    timestamp: row.try_get("timestamp").map_err(backend)?,
                })
            })
            .collect()
    }

    async fn invoices(&self, contract_id: i64) -> Result<Vec<Invoice>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE contract_id = $1 ORDER BY id"
        ))
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(invoice_from_row).collect()
    }

    async fn payments(&self, contract_id: i64) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_method, contract_id, debitor, creditor, amount, currency,
                   timestamp, state, state_changed
            FROM payments
            WHERE contract_id = $1
            ORDER BY timestamp
            "#,
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn direct_debits(&self, contract_id: i64) -> Result<Vec<DirectDebit>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, end_to_end_id, mandate_contract_id, contract_id, creditor, debitor,
                   account, amount, currency, sequence, description, created_at
            FROM direct_debits
            WHERE contract_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(debit_from_row).collect()
    }
}
