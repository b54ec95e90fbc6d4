use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use hub_contracts::{ContractEngine, ContractStore};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{error, info};

/// A periodic unit of background work.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;
    async fn tick(&self) -> Result<()>;
}

/// Moves stale pending contracts to EXPIRED.
pub struct ExpireContracts<S: ContractStore> {
    pub engine: ContractEngine<S>,
}

#[async_trait]
impl<S: ContractStore> Job for ExpireContracts<S> {
    fn name(&self) -> &'static str {
        "expire-contracts"
    }

    async fn tick(&self) -> Result<()> {
        self.engine.expire_contracts().await?;
        Ok(())
    }
}

/// Settles every contract whose settlement interval has elapsed.
pub struct SettlementSweep<S: ContractStore> {
    pub engine: ContractEngine<S>,
    pub concurrency: usize,
}

#[async_trait]
impl<S: ContractStore> Job for SettlementSweep<S> {
    fn name(&self) -> &'static str {
        "settlement-sweep"
    }

    async fn tick(&self) -> Result<()> {
        let report = self.engine.settle_due_contracts(self.concurrency).await?;
        if report.failed > 0 {
            anyhow::bail!("{} of {} contracts failed to settle", report.failed, report.examined);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<(Arc<dyn Job>, Duration)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn every(mut self, period: Duration, job: impl Job + 'static) -> Self {
        self.jobs.push((Arc::new(job), period));
        self
    }

    /// Ticks every job on its own interval until `shutdown` resolves. A tick
    /// that is still running when shutdown fires is allowed to finish.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        let (stop, stopped) = watch::channel(false);
        let handles: Vec<JoinHandle<()>> = self
            .jobs
            .into_iter()
            .map(|(job, period)| tokio::spawn(drive(job, period, stopped.clone())))
            .collect();

        shutdown.await;
        info!("scheduler shutting down");
        let _ = stop.send(true);
        for handle in handles {
            handle.await?;
        }
        Ok(())
    }
}

async fn drive(job: Arc<dyn Job>, period: Duration, mut stopped: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(job = job.name(), period_secs = period.as_secs(), "job scheduled");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = job.tick().await {
                    error!(job = job.name(), "job failed: {err:#}");
                }
            }
            _ = stopped.changed() => break,
        }
    }
}
