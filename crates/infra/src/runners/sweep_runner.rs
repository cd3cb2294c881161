use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use stockpilot_core::TenantId;

use crate::alert_engine::AlertEngine;
use crate::config::EngineConfig;
use crate::rule_engine::RuleEngine;

/// Config for the tenant sweep runner.
#[derive(Debug, Clone)]
pub struct SweepRunner {
    pub interval: Duration,
    /// Also escalate and re-notify stale alerts on every tick.
    pub alert_sweep: bool,
}

impl Default for SweepRunner {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SweepRunner {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            interval: cfg.sweep_interval(),
            alert_sweep: cfg.alert_sweep,
        }
    }
}

/// Handle for a running sweep runner (shutdown + trigger hook).
#[derive(Debug)]
pub struct SweepRunnerHandle {
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl SweepRunnerHandle {
    /// Request a sweep ahead of the next tick.
    ///
    /// Triggers are coalesced: while one is pending, further calls are no-ops.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Gracefully stop the runner thread. A sweep in progress finishes first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl SweepRunner {
    /// Spawn a tenant-scoped runner.
    ///
    /// Runs once on startup, then every `interval`. Failures are logged and never
    /// stop the loop.
    pub fn spawn_for_tenant(
        &self,
        name: &'static str,
        tenant_id: TenantId,
        rules: Arc<RuleEngine>,
        alerts: Arc<AlertEngine>,
    ) -> SweepRunnerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);

        let cfg = self.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || runner_loop(name, tenant_id, cfg, shutdown_rx, trigger_rx, rules, alerts))
            .expect("failed to spawn sweep runner thread");

        SweepRunnerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
        }
    }
}

fn runner_loop(
    name: &'static str,
    tenant_id: TenantId,
    cfg: SweepRunner,
    shutdown_rx: mpsc::Receiver<()>,
    trigger_rx: mpsc::Receiver<()>,
    rules: Arc<RuleEngine>,
    alerts: Arc<AlertEngine>,
) {
    info!(runner = name, tenant = %tenant_id, "sweep runner started");

    let mut next_tick = Instant::now() + cfg.interval;
    let mut pending = true; // run once on startup

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let now = Instant::now();
        if now >= next_tick {
            pending = true;
            // Stable cadence even after a long sweep.
            while next_tick <= now {
                next_tick += cfg.interval;
            }
        }

        while trigger_rx.try_recv().is_ok() {
            pending = true;
        }

        if !pending {
            let sleep_for = next_tick
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(250));
            thread::sleep(sleep_for);
            continue;
        }
        pending = false;

        if let Err(e) = rules.run_sweep(tenant_id) {
            warn!(runner = name, tenant = %tenant_id, error = %e, "rule sweep failed");
        }

        if cfg.alert_sweep
            && let Err(e) = alerts.sweep_stale(tenant_id)
        {
            warn!(runner = name, tenant = %tenant_id, error = %e, "stale alert sweep failed");
        }
    }

    info!(runner = name, tenant = %tenant_id, "sweep runner stopped");
}
