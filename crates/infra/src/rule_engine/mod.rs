//! Rule engine: rule management, gated execution, the periodic sweep and
//! domain-event dispatch.
//!
//! Execution of one rule:
//! 1. gate (`can_execute`) and mark executing; a rejected start is recorded and re-raised
//! 2. resolve target items and evaluate conditions per item
//! 3. on match run the primary action, then secondary actions in order (delayed ones
//!    become `rule_action.*` jobs), then notifications best-effort
//! 4. record one execution entry with per-item failure counts
//!
//! Rule writes happen under one engine lock and always reload the stored rule first,
//! so stats from a finishing batch never clobber a concurrent deactivation.

pub mod actions;
pub mod deferred;

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use stockpilot_core::{Clock, DomainError, DomainResult, TenantId};
use stockpilot_inventory::{InventoryItem, InventoryItemId};
use stockpilot_rules::{
    AutomationRule, ExecutionRecord, ExecutionTrigger, RuleDefinition, RuleId, SecondaryAction, TriggerEvent,
};

use crate::config::EngineConfig;
use crate::jobs::{Job, JobId, JobKind, JobStore, RetryPolicy};
use crate::ledger::StockLedger;
use crate::store::TenantStore;

pub use actions::{ActionExecutor, ActionOutcome};
pub use deferred::{DeferredAction, register_deferred_handler};

pub type RuleStore = dyn TenantStore<RuleId, AutomationRule>;

#[derive(Debug, Clone)]
pub struct RuleEngineConfig {
    pub inter_rule_delay: Duration,
    pub inter_item_delay: Duration,
    /// Total time one sweep may spend before leaving due rules for the next tick.
    pub sweep_budget: Duration,
    /// Per-attempt timeout of deferred actions.
    pub action_timeout: Duration,
    pub deferred_retry: RetryPolicy,
    /// How long a rule may stay executing without recording a result before the
    /// sweep releases it.
    pub execution_lease: Duration,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RuleEngineConfig {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            inter_rule_delay: cfg.inter_rule_delay(),
            inter_item_delay: cfg.inter_item_delay(),
            sweep_budget: cfg.sweep_budget(),
            action_timeout: cfg.action_timeout(),
            deferred_retry: cfg.deferred_retry_policy(),
            execution_lease: cfg.execution_lease(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item_id: InventoryItemId,
    pub error: String,
}

/// Outcome of one rule execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub rule_id: RuleId,
    pub evaluated_items: u32,
    pub affected_items: u32,
    pub failures: Vec<ItemFailure>,
    pub deferred_jobs: Vec<JobId>,
    /// The rule was deactivated while its batch ran.
    pub stopped_early: bool,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub due: usize,
    pub executed: usize,
    /// Executions that completed with item failures.
    pub failed: usize,
    /// Executions that could not start.
    pub errors: usize,
    /// Due rules left for the next sweep once the budget ran out.
    pub deferred_by_budget: usize,
    /// Rules released from a stuck execution before the sweep started.
    pub released: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub eligible_rules: usize,
    pub executions: Vec<ExecutionReport>,
    pub errors: usize,
}

pub struct RuleEngine {
    rules: Arc<RuleStore>,
    ledger: Arc<StockLedger>,
    actions: ActionExecutor,
    jobs: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    config: RuleEngineConfig,
    write_lock: Mutex<()>,
}

impl RuleEngine {
    pub fn new(
        rules: Arc<RuleStore>,
        ledger: Arc<StockLedger>,
        actions: ActionExecutor,
        jobs: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        config: RuleEngineConfig,
    ) -> Self {
        Self {
            rules,
            ledger,
            actions,
            jobs,
            clock,
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Validate and store a new rule. Rules start inactive unless `activate` is set.
    pub fn create_rule(
        &self,
        tenant_id: TenantId,
        definition: RuleDefinition,
        created_by: &str,
        activate: bool,
    ) -> DomainResult<AutomationRule> {
        let now = self.clock.now();
        let mut rule = AutomationRule::new(RuleId::generate(), tenant_id, definition, created_by, now)?;
        if activate {
            rule.activate(now)?;
        }

        let _guard = self.lock();
        self.rules.upsert(tenant_id, rule.id_typed(), rule.clone())?;
        info!(
            tenant = %tenant_id,
            rule_id = %rule.id_typed(),
            rule_type = rule.rule_type().as_str(),
            active = rule.is_active(),
            "automation rule created"
        );
        Ok(rule)
    }

    pub fn update_rule(
        &self,
        tenant_id: TenantId,
        rule_id: RuleId,
        definition: RuleDefinition,
    ) -> DomainResult<AutomationRule> {
        self.modify(tenant_id, rule_id, |rule, now| rule.update_definition(definition, now))
    }

    pub fn activate_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> DomainResult<AutomationRule> {
        self.modify(tenant_id, rule_id, |rule, now| rule.activate(now))
    }

    /// Deactivate. A batch already running for this rule stops at its next item.
    pub fn deactivate_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> DomainResult<AutomationRule> {
        self.modify(tenant_id, rule_id, |rule, now| rule.deactivate(now))
    }

    pub fn retire_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> DomainResult<AutomationRule> {
        self.modify(tenant_id, rule_id, |rule, now| rule.retire(now))
    }

    pub fn get_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> DomainResult<AutomationRule> {
        self.load(tenant_id, rule_id)
    }

    /// All rules of a tenant, highest priority first.
    pub fn list_rules(&self, tenant_id: TenantId) -> DomainResult<Vec<AutomationRule>> {
        let mut rules = self.rules.list(tenant_id)?;
        sort_by_priority(&mut rules);
        Ok(rules)
    }

    /// Whether the rule would pass its gate right now.
    pub fn can_execute(&self, tenant_id: TenantId, rule_id: RuleId) -> DomainResult<bool> {
        Ok(self.load(tenant_id, rule_id)?.can_execute(self.clock.now()).is_ok())
    }

    pub fn evaluate_conditions(&self, rule: &AutomationRule, item_data: &Value) -> bool {
        rule.conditions().evaluate(item_data)
    }

    /// Run a rule on demand against its whole target scope.
    pub fn execute_rule(
        &self,
        tenant_id: TenantId,
        rule_id: RuleId,
        requested_by: &str,
    ) -> DomainResult<ExecutionReport> {
        let trigger = ExecutionTrigger::Manual {
            requested_by: requested_by.to_string(),
        };
        self.run(tenant_id, rule_id, trigger, None, None)
    }

    /// Execute every due rule once, highest priority first, one at a time.
    ///
    /// A failing rule is logged and the sweep moves on.
    pub fn run_sweep(&self, tenant_id: TenantId) -> DomainResult<SweepReport> {
        let started = Instant::now();
        let released = self.release_stale_executions(tenant_id)?;
        let now = self.clock.now();

        let mut due: Vec<_> = self
            .rules
            .list(tenant_id)?
            .into_iter()
            .filter(|r| r.is_due(now) && r.can_execute(now).is_ok())
            .collect();
        sort_by_priority(&mut due);

        let mut report = SweepReport {
            due: due.len(),
            released,
            ..SweepReport::default()
        };

        for (i, rule) in due.iter().enumerate() {
            if started.elapsed() >= self.config.sweep_budget {
                report.deferred_by_budget = due.len() - i;
                warn!(
                    tenant = %tenant_id,
                    remaining = report.deferred_by_budget,
                    "sweep budget exhausted"
                );
                break;
            }
            if i > 0 {
                pause(self.config.inter_rule_delay);
            }

            match self.run(tenant_id, rule.id_typed(), ExecutionTrigger::Schedule, None, None) {
                Ok(execution) => {
                    report.executed += 1;
                    if !execution.success {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(tenant = %tenant_id, rule_id = %rule.id_typed(), error = %e, "rule execution failed to start");
                }
            }
        }

        debug!(
            tenant = %tenant_id,
            due = report.due,
            executed = report.executed,
            failed = report.failed,
            errors = report.errors,
            "rule sweep finished"
        );
        Ok(report)
    }

    /// Return rules stuck in `Executing` past the execution lease to `Active`,
    /// recording the lost run as failed. Returns how many were released.
    pub fn release_stale_executions(&self, tenant_id: TenantId) -> DomainResult<usize> {
        let lease = chrono::Duration::from_std(self.config.execution_lease)
            .map_err(|e| DomainError::validation(format!("execution lease out of range: {e}")))?;

        let _guard = self.lock();
        let now = self.clock.now();
        let mut released = 0;
        for mut rule in self.rules.list(tenant_id)?.into_iter().filter(AutomationRule::is_executing) {
            if rule.expire_execution(now, lease) {
                let rule_id = rule.id_typed();
                self.rules.upsert(tenant_id, rule_id, rule)?;
                released += 1;
                warn!(tenant = %tenant_id, rule_id = %rule_id, "released rule stuck in execution");
            }
        }
        Ok(released)
    }

    /// Evaluate realtime rules eligible for the event against the items it concerns.
    pub fn dispatch_event(&self, tenant_id: TenantId, event: &TriggerEvent) -> DomainResult<DispatchReport> {
        let now = self.clock.now();
        let kind = event.kind();
        let eligible_types = kind.eligible_rule_types();

        let mut eligible: Vec<_> = self
            .rules
            .list(tenant_id)?
            .into_iter()
            .filter(|r| r.is_realtime() && eligible_types.contains(&r.rule_type()) && r.can_execute(now).is_ok())
            .collect();
        sort_by_priority(&mut eligible);

        let mut report = DispatchReport {
            eligible_rules: eligible.len(),
            ..DispatchReport::default()
        };
        if eligible.is_empty() {
            return Ok(report);
        }

        let scope: Vec<InventoryItemId> = match event.supplier_id() {
            Some(supplier) => self
                .ledger
                .list_active_items(tenant_id)?
                .into_iter()
                .filter(|item| item.supplier_id() == Some(supplier))
                .map(|item| item.id_typed())
                .collect(),
            None => event.item_ids(),
        };
        if scope.is_empty() {
            debug!(tenant = %tenant_id, event = kind.as_str(), "event concerns no items");
            return Ok(report);
        }

        for rule in eligible {
            let trigger = ExecutionTrigger::Event {
                event: kind.as_str().to_string(),
            };
            match self.run(tenant_id, rule.id_typed(), trigger, Some(event), Some(scope.as_slice())) {
                Ok(execution) => report.executions.push(execution),
                Err(e) => {
                    report.errors += 1;
                    warn!(
                        tenant = %tenant_id,
                        rule_id = %rule.id_typed(),
                        event = kind.as_str(),
                        error = %e,
                        "event-triggered rule failed to start"
                    );
                }
            }
        }
        Ok(report)
    }

    pub(crate) fn actions(&self) -> &ActionExecutor {
        &self.actions
    }

    pub(crate) fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    fn run(
        &self,
        tenant_id: TenantId,
        rule_id: RuleId,
        trigger: ExecutionTrigger,
        event: Option<&TriggerEvent>,
        scope: Option<&[InventoryItemId]>,
    ) -> DomainResult<ExecutionReport> {
        let started_at = self.clock.now();
        let rule = {
            let _guard = self.lock();
            let mut rule = self.load(tenant_id, rule_id)?;
            if let Err(e) = rule.begin_execution(&trigger, started_at) {
                rule.record_execution(ExecutionRecord::aborted(trigger, e.to_string(), started_at));
                self.rules.upsert(tenant_id, rule_id, rule)?;
                debug!(tenant = %tenant_id, rule_id = %rule_id, reason = %e, "rule execution rejected");
                return Err(e);
            }
            self.rules.upsert(tenant_id, rule_id, rule.clone())?;
            rule
        };

        let items = match self.resolve_items(tenant_id, scope) {
            Ok(items) => items,
            Err(e) => {
                self.record(tenant_id, rule_id, ExecutionRecord::aborted(trigger, e.to_string(), self.clock.now()))?;
                return Err(e);
            }
        };

        let mut report = ExecutionReport {
            rule_id,
            evaluated_items: 0,
            affected_items: 0,
            failures: Vec::new(),
            deferred_jobs: Vec::new(),
            stopped_early: false,
            success: true,
        };

        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                pause(self.config.inter_item_delay);
            }
            if !self.still_executing(tenant_id, rule_id) {
                info!(tenant = %tenant_id, rule_id = %rule_id, "rule deactivated mid-batch; stopping");
                report.stopped_early = true;
                break;
            }

            let data = match condition_data(item, event) {
                Ok(data) => data,
                Err(e) => {
                    report.failures.push(ItemFailure {
                        item_id: item.id_typed(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if !rule.targets(item.id_typed(), &data) {
                continue;
            }
            report.evaluated_items += 1;
            if !self.evaluate_conditions(&rule, &data) {
                continue;
            }

            match self.apply_actions(&rule, item, &data, started_at) {
                Ok(jobs) => {
                    report.affected_items += 1;
                    report.deferred_jobs.extend(jobs);
                }
                Err(e) => {
                    warn!(
                        tenant = %tenant_id,
                        rule_id = %rule_id,
                        item_id = %item.id_typed(),
                        error = %e,
                        "rule action failed"
                    );
                    report.failures.push(ItemFailure {
                        item_id: item.id_typed(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.success = report.failures.is_empty();
        let error = (!report.success).then(|| {
            report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.item_id, f.error))
                .collect::<Vec<_>>()
                .join("; ")
        });
        let record = ExecutionRecord {
            started_at,
            finished_at: self.clock.now(),
            trigger,
            success: report.success,
            affected_items: report.affected_items,
            failed_items: report.failures.len() as u32,
            details: format!(
                "{} of {} evaluated items matched, {} failed{}",
                report.affected_items,
                report.evaluated_items,
                report.failures.len(),
                if report.stopped_early { ", stopped early" } else { "" }
            ),
            error,
            aborted: false,
        };
        self.record(tenant_id, rule_id, record)?;

        info!(
            tenant = %tenant_id,
            rule_id = %rule_id,
            evaluated = report.evaluated_items,
            affected = report.affected_items,
            failed = report.failures.len(),
            "rule executed"
        );
        Ok(report)
    }

    /// Primary, then secondaries in order, then notifications. Returns deferred job ids.
    fn apply_actions(
        &self,
        rule: &AutomationRule,
        item: &InventoryItem,
        data: &Value,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<JobId>> {
        let actions = rule.actions();
        self.actions.execute(rule, item, &actions.primary, data)?;

        let mut deferred = Vec::new();
        for secondary in &actions.secondary {
            if secondary.delay_minutes == 0 {
                self.actions.execute(rule, item, &secondary.action, data)?;
            } else {
                deferred.push(self.defer(rule, item, secondary, data, now)?);
            }
        }

        for spec in &actions.notifications {
            self.actions.send_notification(rule, spec, data);
        }
        Ok(deferred)
    }

    fn defer(
        &self,
        rule: &AutomationRule,
        item: &InventoryItem,
        secondary: &SecondaryAction,
        data: &Value,
        now: DateTime<Utc>,
    ) -> DomainResult<JobId> {
        let payload = DeferredAction {
            rule_id: rule.id_typed(),
            item_id: item.id_typed(),
            action: secondary.action.clone(),
            data: data.clone(),
        }
        .to_payload()?;
        let run_at = now + chrono::Duration::minutes(i64::from(secondary.delay_minutes));
        let job = Job::new(rule.tenant_id(), JobKind::rule_action(secondary.action.kind()), payload, now)
            .with_retry_policy(self.config.deferred_retry.clone())
            .with_timeout(self.config.action_timeout)
            .scheduled_at(run_at);

        let job_id = self
            .jobs
            .enqueue(job)
            .map_err(|e| DomainError::execution(format!("failed to defer action: {e}")))?;
        debug!(
            rule_id = %rule.id_typed(),
            item_id = %item.id_typed(),
            job_id = %job_id,
            run_at = %run_at,
            "secondary action deferred"
        );
        Ok(job_id)
    }

    fn resolve_items(
        &self,
        tenant_id: TenantId,
        scope: Option<&[InventoryItemId]>,
    ) -> DomainResult<Vec<InventoryItem>> {
        let Some(ids) = scope else {
            return self.ledger.list_active_items(tenant_id);
        };
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            match self.ledger.get_item(tenant_id, *id) {
                Ok(item) if item.is_active() => items.push(item),
                Ok(_) => {}
                Err(e) if e.is_not_found() => debug!(tenant = %tenant_id, item_id = %id, "event names unknown item"),
                Err(e) => return Err(e),
            }
        }
        Ok(items)
    }

    fn still_executing(&self, tenant_id: TenantId, rule_id: RuleId) -> bool {
        matches!(self.rules.get(tenant_id, &rule_id), Ok(Some(rule)) if rule.is_executing())
    }

    fn record(&self, tenant_id: TenantId, rule_id: RuleId, record: ExecutionRecord) -> DomainResult<()> {
        let _guard = self.lock();
        let mut rule = self.load(tenant_id, rule_id)?;
        rule.record_execution(record);
        self.rules.upsert(tenant_id, rule_id, rule)?;
        Ok(())
    }

    fn modify<F>(&self, tenant_id: TenantId, rule_id: RuleId, change: F) -> DomainResult<AutomationRule>
    where
        F: FnOnce(&mut AutomationRule, DateTime<Utc>) -> DomainResult<()>,
    {
        let _guard = self.lock();
        let mut rule = self.load(tenant_id, rule_id)?;
        change(&mut rule, self.clock.now())?;
        self.rules.upsert(tenant_id, rule_id, rule.clone())?;
        debug!(tenant = %tenant_id, rule_id = %rule_id, state = ?rule.state(), "rule updated");
        Ok(rule)
    }

    fn load(&self, tenant_id: TenantId, rule_id: RuleId) -> DomainResult<AutomationRule> {
        self.rules
            .get(tenant_id, &rule_id)?
            .ok_or_else(|| DomainError::not_found(format!("automation rule {rule_id}")))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Item snapshot as JSON, with the triggering event (if any) under `event`.
pub fn condition_data(item: &InventoryItem, event: Option<&TriggerEvent>) -> DomainResult<Value> {
    let mut data = serde_json::to_value(item.snapshot())
        .map_err(|e| DomainError::execution(format!("failed to serialize item snapshot: {e}")))?;
    if let (Some(event), Some(map)) = (event, data.as_object_mut()) {
        map.insert("event".to_string(), event.payload());
    }
    Ok(data)
}

fn sort_by_priority(rules: &mut [AutomationRule]) {
    rules.sort_by(|a, b| {
        b.priority()
            .cmp(&a.priority())
            .then(a.created_at().cmp(&b.created_at()))
    });
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
