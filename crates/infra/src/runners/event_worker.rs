use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use stockpilot_core::TenantId;
use stockpilot_events::{EventBus, EventEnvelope, Subscription, TenantScoped};
use stockpilot_rules::TriggerEvent;

use crate::rule_engine::RuleEngine;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Routes trigger events from a bus to [`RuleEngine::dispatch_event`].
///
/// - Subscribes at spawn time; events published earlier are not seen
/// - `tenant_id`, when set, drops envelopes of other tenants
/// - Handler errors are logged, the worker keeps going
#[derive(Debug)]
pub struct EventWorker;

impl EventWorker {
    pub fn spawn<B>(
        name: &'static str,
        bus: B,
        tenant_id: Option<TenantId>,
        engine: Arc<RuleEngine>,
    ) -> WorkerHandle
    where
        B: EventBus<EventEnvelope<TriggerEvent>> + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &engine))
            .expect("failed to spawn event worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn worker_loop(
    name: &'static str,
    sub: Subscription<EventEnvelope<TriggerEvent>>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    engine: &RuleEngine,
) {
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                let tenant = TenantScoped::tenant_id(&envelope);
                if tenant_id.is_some_and(|t| tenant != t) {
                    continue;
                }

                let event = envelope.payload();
                match engine.dispatch_event(tenant, event) {
                    Ok(report) => debug!(
                        worker = name,
                        event = event.kind().as_str(),
                        eligible = report.eligible_rules,
                        executed = report.executions.len(),
                        "trigger event dispatched"
                    ),
                    Err(e) => warn!(worker = name, event = event.kind().as_str(), error = %e, "event dispatch failed"),
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
