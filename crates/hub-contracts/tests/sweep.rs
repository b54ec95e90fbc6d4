mod common;

use chrono::Duration;
use common::{Harness, ctx, past_and_future};
use hub_contracts::{ContractState, ContractStore, SweepReport};
use hub_finance::ClaimState;

#[tokio::test]
async fn stale_pending_contracts_expire() {
    let h = Harness::new().await;
    let kind = h.item_bookings(&[Duration::days(2)]);
    let contract = h
        .engine
        .set_pending(h.draft(kind, &h.transfer), &ctx(&h.borrower))
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(29));
    assert_eq!(h.engine.expire_contracts().await.unwrap(), 0);

    h.clock.advance(Duration::minutes(2));
    assert_eq!(h.engine.expire_contracts().await.unwrap(), 1);

    let stored = h.store.contract(contract.id).await.unwrap();
    assert_eq!(stored.state(), ContractState::Expired);
    assert!(h.store.claims(contract.id).await.unwrap().iter().all(|c| c.is_deleted));
    assert_eq!(h.engine.expire_contracts().await.unwrap(), 0);
}

#[tokio::test]
async fn sweep_settles_only_due_contracts() {
    let h = Harness::new().await;
    let due = {
        let kind = h.item_bookings(&past_and_future());
        let contract = h
            .engine
            .set_pending(h.draft(kind, &h.transfer), &ctx(&h.borrower))
            .await
            .unwrap();
        h.engine.initialize(contract.id, &ctx(&h.borrower)).await.unwrap();
        contract.id
    };
    let fresh = {
        let kind = h.item_bookings(&[Duration::days(3)]);
        let contract = h
            .engine
            .set_pending(h.draft(kind, &h.transfer), &ctx(&h.borrower))
            .await
            .unwrap();
        h.engine.initialize(contract.id, &ctx(&h.borrower)).await.unwrap();
        contract.id
    };

    let report = h.engine.settle_due_contracts(4).await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            examined: 2,
            settled: 1,
            failed: 0,
        }
    );
    assert_eq!(h.store.settlement_logs(due).await.unwrap().len(), 2);
    assert_eq!(h.store.settlement_logs(fresh).await.unwrap().len(), 1);

    let again = h.engine.settle_due_contracts(4).await.unwrap();
    assert_eq!(again.settled, 0);
    assert_eq!(h.store.invoices(due).await.unwrap().len(), 1);
}

#[tokio::test]
async fn terminated_contracts_are_swept_while_claims_remain() {
    let h = Harness::configured(|procedure| procedure.termination_period = 9).await;
    let kind = h.item_bookings(&past_and_future());
    let contract = h
        .engine
        .set_pending(h.draft(kind, &h.transfer), &ctx(&h.borrower))
        .await
        .unwrap();
    h.engine.initialize(contract.id, &ctx(&h.borrower)).await.unwrap();
    h.engine.settle_claims(contract.id).await.unwrap();
    h.engine.set_terminated(contract.id, h.lender.id).await.unwrap();

    h.clock.advance(Duration::days(9));
    let report = h.engine.settle_due_contracts(2).await.unwrap();
    assert_eq!(report.settled, 1);

    let claims = h.store.claims(contract.id).await.unwrap();
    assert!(claims.iter().all(|c| c.state() == ClaimState::Settled));
    assert_eq!(
        h.store.contract(contract.id).await.unwrap().state(),
        ContractState::Terminated
    );

    h.clock.advance(Duration::days(30));
    let report = h.engine.settle_due_contracts(2).await.unwrap();
    assert_eq!(report.settled, 0);
}
