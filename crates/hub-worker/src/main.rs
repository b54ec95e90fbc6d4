use std::sync::Arc;

use anyhow::Result;
use hub_contracts::ContractEngine;
use hub_core::SystemClock;
use hub_finance::PaymentMethodRegistry;
use hub_platform::{PgStore, RedisBus, ServiceConfig, connect_database};
use hub_scheduler::{ExpireContracts, Scheduler, SettlementSweep};
use hub_tools::{NotificationSink, TextInvoiceRenderer, TracingNotificationSink};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "hub_worker=info,hub_contracts=info,hub_scheduler=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let pool = connect_database(&config.database_url).await?;

    let notifications: Arc<dyn NotificationSink> = match &config.redis_url {
        Some(url) => Arc::new(RedisBus::connect(url)?),
        None => {
            warn!("REDIS_URL not set, notifications are only logged");
            Arc::new(TracingNotificationSink)
        }
    };

    let registry = PaymentMethodRegistry::with_builtin();
    info!(kinds = ?registry.kinds().collect::<Vec<_>>(), "payment methods registered");

    let engine = ContractEngine::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(registry),
        notifications,
        Arc::new(TextInvoiceRenderer),
        Arc::new(SystemClock),
    );

    let scheduler = Scheduler::new()
        .every(
            config.expire_every,
            ExpireContracts {
                engine: engine.clone(),
            },
        )
        .every(
            config.settle_every,
            SettlementSweep {
                engine,
                concurrency: config.sweep_concurrency,
            },
        );

    info!(
        expire_every_secs = config.expire_every.as_secs(),
        settle_every_secs = config.settle_every.as_secs(),
        "contract worker started"
    );
    scheduler
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {err}");
            }
        })
        .await
}
