use std::sync::Arc;

use tracing::{info, warn};

use stockpilot_alerts::{AlertId, StockAlert};
use stockpilot_core::{Clock, SystemClock, TenantId};
use stockpilot_events::{EventEnvelope, InMemoryEventBus};
use stockpilot_infra::jobs::{InMemoryJobStore, JobExecutor, JobExecutorConfig};
use stockpilot_infra::rule_engine::register_deferred_handler;
use stockpilot_infra::runners::{EventWorker, SweepRunner};
use stockpilot_infra::sinks::{TracingNotificationSink, TracingPriceAuditSink};
use stockpilot_infra::store::{InMemoryInventoryStore, InMemoryMovementStore, InMemoryTenantStore};
use stockpilot_infra::{ActionExecutor, AlertEngine, EngineConfig, RuleEngine, RuleEngineConfig, StockLedger};
use stockpilot_rules::{AutomationRule, RuleId, TriggerEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    stockpilot_observability::init_with(config.log_format);

    let tenant_id = config.tenant_id.unwrap_or_else(|| {
        let tenant = TenantId::new();
        warn!(tenant = %tenant, "STOCKPILOT_TENANT_ID not set; running for a fresh tenant");
        tenant
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = Arc::new(TracingNotificationSink);
    let alert_store: Arc<InMemoryTenantStore<AlertId, StockAlert>> = Arc::new(InMemoryTenantStore::new());
    let rule_store: Arc<InMemoryTenantStore<RuleId, AutomationRule>> = Arc::new(InMemoryTenantStore::new());
    let jobs = InMemoryJobStore::arc();

    let alerts = Arc::new(AlertEngine::new(alert_store, notifier.clone(), clock.clone()));
    let ledger = Arc::new(
        StockLedger::new(
            Arc::new(InMemoryInventoryStore::new()),
            Arc::new(InMemoryMovementStore::new()),
            alerts.clone(),
            clock.clone(),
        )
        .with_conflict_retries(config.conflict_retries),
    );
    let actions = ActionExecutor::new(
        ledger.clone(),
        alerts.clone(),
        notifier,
        Arc::new(TracingPriceAuditSink),
        clock.clone(),
    );
    let rules = Arc::new(RuleEngine::new(
        rule_store,
        ledger,
        actions,
        jobs.clone(),
        clock.clone(),
        RuleEngineConfig::from(&config),
    ));

    let bus: Arc<InMemoryEventBus<EventEnvelope<TriggerEvent>>> = Arc::new(InMemoryEventBus::new());

    let sweep = SweepRunner::from(&config).spawn_for_tenant("stockpilot-sweep", tenant_id, rules.clone(), alerts);
    let events = EventWorker::spawn("stockpilot-events", bus.clone(), Some(tenant_id), rules.clone());

    let mut executor = JobExecutor::new(jobs, clock);
    register_deferred_handler(&mut executor, rules);
    let deferred = executor.spawn(
        JobExecutorConfig::default()
            .with_name("stockpilot-deferred")
            .with_tenant(tenant_id)
            .with_poll_interval(config.deferred_poll_interval()),
    );

    info!(
        tenant = %tenant_id,
        sweep_interval_secs = config.sweep_interval_secs,
        alert_sweep = config.alert_sweep,
        "stockpilot worker started"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // Joining the runner threads blocks.
    tokio::task::spawn_blocking(move || {
        sweep.shutdown();
        events.shutdown();
        deferred.shutdown();
        drop(bus);
    })
    .await?;

    info!("stockpilot worker stopped");
    Ok(())
}
