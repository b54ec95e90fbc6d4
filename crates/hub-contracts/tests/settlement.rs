mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{Harness, ctx, past_and_future};
use hub_contracts::{ContractError, ContractState, ContractStore};
use hub_core::NotificationType;
use hub_finance::{
    ClaimState, DebitSequence, Invoice, InvoiceDraft, InvoiceSubject, MAX_NUMBERING_ATTEMPTS,
    PaymentState,
};
use hub_tools::{DocumentRenderer, RenderedDocument};
use rust_decimal::Decimal;
use uuid::Uuid;

async fn running(h: &Harness, offsets: &[Duration], method: &hub_finance::PaymentMethod) -> i64 {
    let kind = h.item_bookings(offsets);
    let contract = h
        .engine
        .set_pending(h.draft(kind, method), &ctx(&h.borrower))
        .await
        .unwrap();
    h.engine.initialize(contract.id, &ctx(&h.borrower)).await.unwrap();
    contract.id
}

#[tokio::test]
async fn settles_due_claims_into_one_invoice() {
    let h = Harness::new().await;
    let id = running(&h, &past_and_future(), &h.transfer).await;
    h.sink.clear().await;

    let settlement = h.engine.settle_claims(id).await.unwrap();
    assert_eq!(settlement.settled.len(), 5);
    assert!(!settlement.finalized);
    assert_eq!(
        h.store.contract(id).await.unwrap().state(),
        ContractState::Running
    );

    let invoice = settlement.invoice.unwrap();
    assert_eq!(invoice.full_invoice_no, "TL-00001");
    assert_eq!(invoice.positions().len(), 5);
    assert_eq!(invoice.totals().net, Decimal::new(6250, 2));
    assert!(
        invoice
            .positions()
            .windows(2)
            .all(|pair| pair[0].period_start >= pair[1].period_start)
    );
    let document = invoice.document.as_ref().unwrap();
    assert!(document.path.starts_with("invoices/tool-library/"));
    assert!(document.path.ends_with(".txt"));

    let claims = h.store.claims(id).await.unwrap();
    assert_eq!(claims.iter().filter(|c| c.state() == ClaimState::Settled).count(), 5);
    assert_eq!(h.store.settlement_logs(id).await.unwrap().len(), 2);

    let sent = h.sink.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationType::Monetary);
    assert_eq!(sent[0].recipient, h.borrower.id);
    assert_eq!(sent[0].attachments, vec![document.path.clone()]);
}

#[tokio::test]
async fn second_pass_settles_nothing_new() {
    let h = Harness::new().await;
    let id = running(&h, &past_and_future(), &h.transfer).await;

    h.engine.settle_claims(id).await.unwrap();
    let again = h.engine.settle_claims(id).await.unwrap();
    assert!(again.settled.is_empty());
    assert!(again.invoice.is_none());
    assert_eq!(h.store.invoices(id).await.unwrap().len(), 1);
    assert_eq!(h.store.settlement_logs(id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn fixed_term_contract_finalizes_once_everything_is_settled() {
    let h = Harness::new().await;
    let id = running(&h, &past_and_future(), &h.transfer).await;
    h.engine.settle_claims(id).await.unwrap();

    h.clock.advance(Duration::days(9));
    let settlement = h.engine.settle_claims(id).await.unwrap();
    assert_eq!(settlement.settled.len(), 5);
    assert!(settlement.finalized);
    assert_eq!(settlement.invoice.unwrap().full_invoice_no, "TL-00002");
    assert_eq!(
        h.store.contract(id).await.unwrap().state(),
        ContractState::Finalized
    );
}

#[tokio::test]
async fn invoicing_can_be_disabled() {
    let h = Harness::configured(|procedure| procedure.is_invoicing = false).await;
    let id = running(&h, &past_and_future(), &h.transfer).await;

    let settlement = h.engine.settle_claims(id).await.unwrap();
    assert_eq!(settlement.settled.len(), 5);
    assert!(settlement.invoice.is_none());
    assert!(h.store.invoices(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn prepayment_settles_the_coming_interval_up_front() {
    let h = Harness::new().await;
    let offsets = [Duration::days(-2), Duration::days(1), Duration::days(3)];
    let id = running(&h, &offsets, &h.cash).await;

    let contract = h.store.contract(id).await.unwrap();
    assert_eq!(contract.state(), ContractState::Finalized);

    let claims = h.store.claims(id).await.unwrap();
    assert!(claims.iter().all(|c| c.state() == ClaimState::Settled));
    assert_eq!(h.store.settlement_logs(id).await.unwrap().len(), 1);

    let payments = h.store.payments(id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].state(), PaymentState::Finalized);
    let gross: Decimal = claims.iter().map(|c| c.entry.gross).sum();
    assert_eq!(payments[0].amount, gross);

    let invoices = h.store.invoices(id).await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].draft.payment_provider_text, "The amount has been paid in cash.");
}

#[tokio::test]
async fn prepayment_leaves_claims_beyond_the_interval() {
    let h = Harness::new().await;
    let offsets = [Duration::days(1), Duration::days(20)];
    let id = running(&h, &offsets, &h.cash).await;

    assert_eq!(
        h.store.contract(id).await.unwrap().state(),
        ContractState::Running
    );
    let claims = h.store.claims(id).await.unwrap();
    assert_eq!(claims.iter().filter(|c| c.state() == ClaimState::Pending).count(), 1);
}

#[tokio::test]
async fn initial_log_is_set_once_and_never_for_prepayment() {
    let h = Harness::new().await;
    let id = running(&h, &past_and_future(), &h.transfer).await;
    let err = h.engine.set_initial_settlement_log(id).await.unwrap_err();
    assert!(matches!(err, ContractError::SettlementLogExists(c) if c == id));

    let prepaid = running(&h, &[Duration::days(30)], &h.cash).await;
    let err = h.engine.set_initial_settlement_log(prepaid).await.unwrap_err();
    assert!(matches!(err, ContractError::PrepaymentSettlementLog(c) if c == prepaid));
}

#[tokio::test]
async fn initial_log_falls_back_to_now_without_claims() {
    let h = Harness::configured(|procedure| procedure.auto_accept = false).await;
    let mut draft = h.draft(h.item_bookings(&[Duration::days(2)]), &h.transfer);
    draft.debitor = h.lender.id;
    let contract = h.engine.set_pending(draft, &ctx(&h.lender)).await.unwrap();

    let log = h.engine.set_initial_settlement_log(contract.id).await.unwrap();
    assert_eq!(log.timestamp, h.now());
}

#[tokio::test]
async fn sepa_settlement_emits_first_then_recurring_debits() {
    let h = Harness::new().await;
    let mut mandate = h.draft(hub_contracts::ContractKind::SepaMandate, &h.sepa);
    mandate.payment_method = None;
    mandate.is_fixed_term = false;
    let mandate = h.engine.set_pending(mandate, &ctx(&h.borrower)).await.unwrap();
    h.engine.sign_sepa_mandate(mandate.id, &ctx(&h.borrower)).await.unwrap();

    let first = running(&h, &[Duration::days(-3)], &h.sepa).await;
    let second = running(&h, &[Duration::days(-2)], &h.sepa).await;

    h.engine.settle_claims(first).await.unwrap();
    h.engine.settle_claims(second).await.unwrap();

    let debits = h.store.direct_debits(first).await.unwrap();
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].sequence, DebitSequence::First);
    assert_eq!(debits[0].mandate_contract_id, mandate.id);
    assert_eq!(debits[0].description, "Item booking: TL-00001");
    assert_eq!(debits[0].amount, debits[0].amount.round_dp(2));

    let debits = h.store.direct_debits(second).await.unwrap();
    assert_eq!(debits[0].sequence, DebitSequence::Recurring);
}

#[tokio::test]
async fn invoice_numbers_stay_gapless_under_concurrency() {
    let h = Harness::new().await;
    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(running(&h, &[Duration::days(-3)], &h.transfer).await);
    }

    let tasks: Vec<_> = ids
        .iter()
        .map(|&id| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.settle_claims(id).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut numbers = Vec::new();
    for id in ids {
        for invoice in h.store.invoices(id).await.unwrap() {
            numbers.push(invoice.invoice_no);
        }
    }
    numbers.sort();
    let expected: Vec<_> = (1..=6).map(hub_finance::format_invoice_no).collect();
    assert_eq!(numbers, expected);
}

struct BrokenRenderer;

impl DocumentRenderer for BrokenRenderer {
    fn generate(&self, _: &Invoice) -> anyhow::Result<RenderedDocument> {
        anyhow::bail!("template missing")
    }
}

#[tokio::test]
async fn failed_rendering_rolls_back_the_whole_pass() {
    let h = Harness::with(|_| {}, Arc::new(BrokenRenderer)).await;
    let id = running(&h, &past_and_future(), &h.transfer).await;

    let err = h.engine.settle_claims(id).await.unwrap_err();
    assert!(matches!(err, ContractError::Render { .. }));

    assert!(h.store.invoices(id).await.unwrap().is_empty());
    assert_eq!(h.store.settlement_logs(id).await.unwrap().len(), 1);
    let claims = h.store.claims(id).await.unwrap();
    assert!(claims.iter().all(|c| c.state() == ClaimState::Pending));
}

#[tokio::test(start_paused = true)]
async fn exhausted_numbering_retries_abort_the_pass() {
    let h = Harness::new().await;
    let id = running(&h, &past_and_future(), &h.transfer).await;

    let blocker = InvoiceDraft::build(
        InvoiceSubject {
            contract_id: 0,
            contract_uuid: Uuid::new_v4(),
            creditor: &h.lender,
            debitor: &h.borrower,
        },
        &[],
        "",
        false,
        h.now().date_naive(),
    );
    let mut held = h.store.begin().await.unwrap();
    h.store
        .insert_invoice(&mut held, &blocker, "00001", h.now())
        .await
        .unwrap();

    let err = h.engine.settle_claims(id).await.unwrap_err();
    match err {
        ContractError::InvoiceNumbering {
            creditor,
            prefix,
            attempts,
        } => {
            assert_eq!(creditor, h.lender.id);
            assert_eq!(prefix, "TL");
            assert_eq!(attempts, MAX_NUMBERING_ATTEMPTS);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.store.invoices(id).await.unwrap().is_empty());
    assert_eq!(h.store.settlement_logs(id).await.unwrap().len(), 1);
    let claims = h.store.claims(id).await.unwrap();
    assert!(claims.iter().all(|c| c.state() == ClaimState::Pending));

    h.store.commit(held).await.unwrap();
    let settlement = h.engine.settle_claims(id).await.unwrap();
    let invoice = settlement.invoice.unwrap();
    assert_eq!(invoice.full_invoice_no, "TL-00002");
}
