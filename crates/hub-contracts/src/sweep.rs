//! Periodic passes over all contracts: expiry of stale pending contracts and
//! settlement of contracts whose interval has elapsed.

use chrono::Duration;
use futures_util::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::{
    ContractError,
    contract::{Contract, ContractState},
    engine::{ContractEngine, Outbox},
    settlement::Settlement,
    store::ContractStore,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub settled: usize,
    pub failed: usize,
}

impl<S: ContractStore> ContractEngine<S> {
    /// Expires every pending contract older than the expiration window.
    pub async fn expire_contracts(&self) -> Result<usize, ContractError> {
        let ids = self
            .store
            .contract_ids_in_state(&[ContractState::Pending])
            .await?;
        let mut expired = 0;
        for id in ids {
            match self.expire_if_stale(id).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(err) => warn!(contract_id = id, error = %err, "expiring contract failed"),
            }
        }
        if expired > 0 {
            info!(expired, "expired pending contracts");
        }
        Ok(expired)
    }

    /// Settles every running or terminated contract that is due, `concurrency` at a time.
    pub async fn settle_due_contracts(&self, concurrency: usize) -> Result<SweepReport, ContractError> {
        let ids = self
            .store
            .contract_ids_in_state(&[ContractState::Running, ContractState::Terminated])
            .await?;
        let results: Vec<_> = stream::iter(ids)
            .map(|id| async move { (id, self.settle_if_due(id).await) })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut report = SweepReport {
            examined: results.len(),
            ..SweepReport::default()
        };
        for (id, result) in results {
            match result {
                Ok(Some(_)) => report.settled += 1,
                Ok(None) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(contract_id = id, error = %err, "settlement failed");
                }
            }
        }
        info!(
            examined = report.examined,
            settled = report.settled,
            failed = report.failed,
            "settlement sweep"
        );
        Ok(report)
    }

    async fn expire_if_stale(&self, contract_id: i64) -> Result<bool, ContractError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            if contract.state() != ContractState::Pending || !contract.is_expired(self.clock.now()) {
                return Ok::<_, ContractError>(false);
            }
            self.purge_in(&mut tx, &mut contract, ContractState::Expired).await?;
            Ok::<_, ContractError>(true)
        }
        .await;
        self.finish(tx, result, Outbox::new()).await
    }

    /// Re-checks under the contract lock so concurrent sweeps settle a contract once.
    async fn settle_if_due(&self, contract_id: i64) -> Result<Option<Settlement>, ContractError> {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let result = async {
            let mut contract = self.store.lock_contract(&mut tx, contract_id).await?;
            if !self.is_due(&mut tx, &contract).await? {
                debug!(contract_id, "settlement not due");
                return Ok::<_, ContractError>(None);
            }
            let procedure = self.store.contract_procedure(contract.contract_procedure).await?;
            let settlement = self
                .settle_in(&mut tx, &mut contract, &procedure, &mut outbox)
                .await?;
            Ok::<_, ContractError>(Some(settlement))
        }
        .await;
        self.finish(tx, result, outbox).await
    }

    async fn is_due(&self, tx: &mut S::Tx, contract: &Contract) -> Result<bool, ContractError> {
        match contract.state() {
            ContractState::Running => {}
            ContractState::Terminated => {
                let open = self.store.live_claims(tx, contract.id).await?;
                if !open.iter().any(|claim| claim.is_open()) {
                    return Ok(false);
                }
            }
            _ => return Ok(false),
        }
        let Some(last) = self.store.last_settlement_log(tx, contract.id).await? else {
            return Ok(true);
        };
        let procedure = self.store.contract_procedure(contract.contract_procedure).await?;
        let interval = Duration::days(procedure.settlement_interval.days());
        Ok(last.timestamp + interval <= self.clock.now())
    }
}
