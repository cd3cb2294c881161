use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stockpilot_core::{AggregateRoot, DomainError, DomainResult, TenantId, typed_id};
use stockpilot_inventory::InventoryItemId;

use crate::action::RuleActions;
use crate::condition::Conditions;
use crate::history::{ExecutionHistory, ExecutionRecord, ExecutionTrigger, RuleStats};
use crate::schedule::Schedule;

typed_id!(
    /// Automation rule identifier.
    RuleId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    PriceAdjustment,
    Reorder,
    StockAlert,
    SupplierSwitch,
    InventoryBalance,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::PriceAdjustment => "price_adjustment",
            RuleType::Reorder => "reorder",
            RuleType::StockAlert => "stock_alert",
            RuleType::SupplierSwitch => "supplier_switch",
            RuleType::InventoryBalance => "inventory_balance",
        }
    }
}

/// Rule lifecycle.
///
/// `Inactive -> Active -> Executing -> Active`, with `Retired` terminal. Deactivating
/// a rule while it executes lets the running batch stop at the next item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleState {
    Inactive,
    Active,
    Executing,
    Retired,
}

/// Which items a rule looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTarget {
    pub is_global: bool,
    #[serde(default)]
    pub product_ids: Vec<InventoryItemId>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl RuleTarget {
    pub fn global() -> Self {
        Self {
            is_global: true,
            ..Self::default()
        }
    }

    pub fn products(ids: Vec<InventoryItemId>) -> Self {
        Self {
            is_global: false,
            product_ids: ids,
            categories: Vec::new(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !self.is_global && self.product_ids.is_empty() && self.categories.is_empty() {
            return Err(DomainError::validation(
                "non-global rule needs target products or categories",
            ));
        }
        Ok(())
    }

    /// Explicit targeting only; global filters are applied by [`AutomationRule::targets`].
    pub fn includes(&self, item_id: InventoryItemId, category: Option<&str>) -> bool {
        self.is_global
            || self.product_ids.contains(&item_id)
            || category.is_some_and(|c| self.categories.iter().any(|x| x.eq_ignore_ascii_case(c)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLimits {
    #[serde(default)]
    pub max_executions_per_day: Option<u32>,
    #[serde(default)]
    pub max_executions_per_hour: Option<u32>,
    #[serde(default)]
    pub cooldown_minutes: u32,
}

impl ExecutionLimits {
    pub fn validate(&self) -> DomainResult<()> {
        for (name, limit) in [
            ("max_executions_per_day", self.max_executions_per_day),
            ("max_executions_per_hour", self.max_executions_per_hour),
        ] {
            if limit == Some(0) {
                return Err(DomainError::validation(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}

/// User-editable part of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub conditions: Conditions,
    pub actions: RuleActions,
    /// 1 (lowest) to 10 (highest).
    pub priority: u8,
    pub target: RuleTarget,
    pub schedule: Schedule,
    #[serde(default)]
    pub limits: ExecutionLimits,
}

impl RuleDefinition {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("rule name cannot be empty"));
        }
        if !(1..=10).contains(&self.priority) {
            return Err(DomainError::validation(format!(
                "priority must be between 1 and 10 (got {})",
                self.priority
            )));
        }
        self.conditions.validate()?;
        self.actions.validate()?;
        self.target.validate()?;
        self.schedule.validate()?;
        self.limits.validate()
    }
}

/// The run that currently holds a rule in [`RuleState::Executing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningExecution {
    pub started_at: DateTime<Utc>,
    pub trigger: ExecutionTrigger,
}

/// A user-defined automation rule plus its execution bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    id: RuleId,
    tenant_id: TenantId,
    definition: RuleDefinition,
    state: RuleState,
    stats: RuleStats,
    history: ExecutionHistory,
    #[serde(default)]
    running: Option<RunningExecution>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl AutomationRule {
    /// Validate and create. New rules start inactive.
    pub fn new(
        id: RuleId,
        tenant_id: TenantId,
        definition: RuleDefinition,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        definition.validate()?;
        Ok(Self {
            id,
            tenant_id,
            definition,
            state: RuleState::Inactive,
            stats: RuleStats::default(),
            history: ExecutionHistory::default(),
            running: None,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> RuleId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn rule_type(&self) -> RuleType {
        self.definition.rule_type
    }

    pub fn priority(&self) -> u8 {
        self.definition.priority
    }

    pub fn conditions(&self) -> &Conditions {
        &self.definition.conditions
    }

    pub fn actions(&self) -> &RuleActions {
        &self.definition.actions
    }

    pub fn target(&self) -> &RuleTarget {
        &self.definition.target
    }

    pub fn schedule(&self) -> &Schedule {
        &self.definition.schedule
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.definition.limits
    }

    pub fn state(&self) -> RuleState {
        self.state
    }

    pub fn stats(&self) -> &RuleStats {
        &self.stats
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    pub fn running(&self) -> Option<&RunningExecution> {
        self.running.as_ref()
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.state == RuleState::Active
    }

    pub fn is_executing(&self) -> bool {
        self.state == RuleState::Executing
    }

    pub fn is_realtime(&self) -> bool {
        self.definition.schedule.is_realtime()
    }

    /// Replace the editable definition. Retired rules are frozen.
    pub fn update_definition(&mut self, definition: RuleDefinition, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_retired()?;
        definition.validate()?;
        self.definition = definition;
        self.touch(now);
        Ok(())
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_retired()?;
        if self.state == RuleState::Inactive {
            self.state = RuleState::Active;
            self.touch(now);
        }
        Ok(())
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_retired()?;
        if self.state != RuleState::Inactive {
            self.state = RuleState::Inactive;
            self.touch(now);
        }
        Ok(())
    }

    pub fn retire(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_retired()?;
        self.state = RuleState::Retired;
        self.touch(now);
        Ok(())
    }

    /// Pre-execution gate. Errors are [`DomainError::Gate`] with the reason.
    ///
    /// Limits count completed runs since the start of the current UTC hour/day.
    pub fn can_execute(&self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.state {
            RuleState::Active => {}
            RuleState::Executing => return Err(DomainError::gate("rule is already executing")),
            RuleState::Inactive => return Err(DomainError::gate("rule is not active")),
            RuleState::Retired => return Err(DomainError::gate("rule is retired")),
        }

        let limits = &self.definition.limits;
        if limits.cooldown_minutes > 0
            && let Some(last) = self.stats.last_executed
        {
            let ready_at = last + Duration::minutes(i64::from(limits.cooldown_minutes));
            if now < ready_at {
                return Err(DomainError::gate(format!("in cooldown until {ready_at}")));
            }
        }

        if let Some(max) = limits.max_executions_per_hour {
            let hour_start = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
            if self.history.runs_since(hour_start) >= max as usize {
                return Err(DomainError::gate(format!(
                    "hourly execution limit reached ({max})"
                )));
            }
        }

        if let Some(max) = limits.max_executions_per_day {
            let day_start = now.duration_trunc(Duration::days(1)).unwrap_or(now);
            if self.history.runs_since(day_start) >= max as usize {
                return Err(DomainError::gate(format!("daily execution limit reached ({max})")));
            }
        }

        Ok(())
    }

    /// Next scheduled run; `None` for realtime rules.
    ///
    /// Counted from the last run, or from creation for rules that never ran.
    pub fn next_scheduled_time(&self) -> Option<DateTime<Utc>> {
        let schedule = &self.definition.schedule;
        match self.stats.last_executed {
            Some(last) => schedule.next_after(last),
            None => schedule.next_after(self.created_at - Duration::seconds(1)),
        }
    }

    /// Due for the periodic sweep (gate checked separately).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_realtime() || self.next_scheduled_time().is_some_and(|next| next <= now)
    }

    /// Whether an item (as a condition snapshot) falls within this rule's scope.
    ///
    /// Global rules take every active item narrowed by the catalog filters; others
    /// take their listed products and categories.
    pub fn targets(&self, item_id: InventoryItemId, snapshot: &Value) -> bool {
        let target = &self.definition.target;
        if target.is_global {
            return self
                .definition
                .conditions
                .filters
                .as_ref()
                .is_none_or(|f| f.matches_catalog(snapshot));
        }
        let category = snapshot.get("category").and_then(Value::as_str);
        target.includes(item_id, category)
    }

    /// Gate and mark executing.
    pub fn begin_execution(&mut self, trigger: &ExecutionTrigger, now: DateTime<Utc>) -> DomainResult<()> {
        self.can_execute(now)?;
        self.state = RuleState::Executing;
        self.running = Some(RunningExecution {
            started_at: now,
            trigger: trigger.clone(),
        });
        self.touch(now);
        Ok(())
    }

    /// Append to history, update stats and leave the executing state.
    pub fn record_execution(&mut self, record: ExecutionRecord) {
        let now = record.finished_at;
        self.stats.record(&record);
        self.history.push(record);
        self.running = None;
        if self.state == RuleState::Executing {
            self.state = RuleState::Active;
        }
        self.touch(now);
    }

    /// Release a run that has held the rule in `Executing` for `lease` or longer
    /// without recording a result. The run is recorded as failed and counts toward
    /// the execution limits. Returns whether the rule was released.
    pub fn expire_execution(&mut self, now: DateTime<Utc>, lease: Duration) -> bool {
        if self.state != RuleState::Executing {
            return false;
        }
        let (started_at, trigger) = match &self.running {
            Some(run) => (run.started_at, run.trigger.clone()),
            None => (self.updated_at, ExecutionTrigger::Schedule),
        };
        if now - started_at < lease {
            return false;
        }
        let error = format!("no result recorded within {} minutes", lease.num_minutes());
        self.record_execution(ExecutionRecord {
            started_at,
            finished_at: now,
            trigger,
            success: false,
            affected_items: 0,
            failed_items: 0,
            details: "execution lease expired".to_string(),
            error: Some(error),
            aborted: false,
        });
        true
    }

    fn ensure_not_retired(&self) -> DomainResult<()> {
        if self.state == RuleState::Retired {
            return Err(DomainError::conflict(format!("rule {} is retired", self.id)));
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

impl AggregateRoot for AutomationRule {
    type Id = RuleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    use crate::action::{Action, StockUpdateMode};
    use crate::condition::{Operator, RuleFilters, Trigger};
    use crate::history::HISTORY_CAPACITY;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
    }

    fn definition() -> RuleDefinition {
        RuleDefinition {
            name: "Reorder low stock".to_string(),
            description: None,
            rule_type: RuleType::Reorder,
            conditions: Conditions {
                triggers: vec![Trigger::new("availableStock", Operator::LessThan, json!(20))],
                filters: None,
            },
            actions: RuleActions {
                primary: Action::UpdateStock {
                    mode: StockUpdateMode::Increase,
                    quantity: 10,
                    reason: None,
                },
                secondary: vec![],
                notifications: vec![],
            },
            priority: 5,
            target: RuleTarget::global(),
            schedule: Schedule::realtime(),
            limits: ExecutionLimits::default(),
        }
    }

    fn active_rule(def: RuleDefinition) -> AutomationRule {
        let mut rule = AutomationRule::new(RuleId::generate(), TenantId::new(), def, "tester", t0()).unwrap();
        rule.activate(t0()).unwrap();
        rule
    }

    fn run(rule: &mut AutomationRule, at: DateTime<Utc>) {
        rule.begin_execution(&ExecutionTrigger::Schedule, at).unwrap();
        rule.record_execution(ExecutionRecord {
            started_at: at,
            finished_at: at,
            trigger: ExecutionTrigger::Schedule,
            success: true,
            affected_items: 1,
            failed_items: 0,
            details: String::new(),
            error: None,
            aborted: false,
        });
    }

    #[test]
    fn validation_rejects_bad_priority_and_empty_targets() {
        let mut def = definition();
        def.priority = 11;
        assert!(matches!(def.validate(), Err(DomainError::Validation(_))));

        let mut def = definition();
        def.target = RuleTarget::products(vec![]);
        assert!(def.validate().is_err());

        let mut def = definition();
        def.conditions.triggers.clear();
        assert!(AutomationRule::new(RuleId::generate(), TenantId::new(), def, "t", t0()).is_err());
    }

    #[test]
    fn new_rules_are_inactive_and_gated() {
        let rule = AutomationRule::new(RuleId::generate(), TenantId::new(), definition(), "t", t0()).unwrap();
        assert_eq!(rule.state(), RuleState::Inactive);
        assert!(rule.can_execute(t0()).unwrap_err().is_gate());
    }

    #[test]
    fn daily_limit_resets_at_day_boundary() {
        let mut def = definition();
        def.limits.max_executions_per_day = Some(1);
        let mut rule = active_rule(def);

        run(&mut rule, t0());
        assert_eq!(rule.stats().execution_count, 1);
        assert!(rule.can_execute(t0() + Duration::hours(13)).unwrap_err().is_gate());

        let next_day = Utc.with_ymd_and_hms(2024, 6, 4, 0, 0, 0).unwrap();
        assert!(rule.can_execute(next_day).is_ok());
    }

    #[test]
    fn hourly_limit_counts_current_hour() {
        let mut def = definition();
        def.limits.max_executions_per_hour = Some(2);
        let mut rule = active_rule(def);

        run(&mut rule, t0() + Duration::minutes(5));
        run(&mut rule, t0() + Duration::minutes(10));
        assert!(rule.can_execute(t0() + Duration::minutes(59)).is_err());
        assert!(rule.can_execute(t0() + Duration::minutes(60)).is_ok());
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let mut def = definition();
        def.limits.cooldown_minutes = 30;
        let mut rule = active_rule(def);

        run(&mut rule, t0());
        assert!(rule.can_execute(t0() + Duration::minutes(29)).is_err());
        assert!(rule.can_execute(t0() + Duration::minutes(30)).is_ok());
    }

    #[test]
    fn executing_state_round_trip_and_mid_run_deactivation() {
        let mut rule = active_rule(definition());
        rule.begin_execution(&ExecutionTrigger::Schedule, t0()).unwrap();
        assert!(rule.is_executing());
        assert!(rule.can_execute(t0()).is_err());

        rule.deactivate(t0()).unwrap();
        rule.record_execution(ExecutionRecord::aborted(ExecutionTrigger::Schedule, "stopped", t0()));
        assert_eq!(rule.state(), RuleState::Inactive);
    }

    #[test]
    fn stuck_execution_is_released_after_its_lease() {
        let mut def = definition();
        def.limits.max_executions_per_day = Some(5);
        let mut rule = active_rule(def);
        let trigger = ExecutionTrigger::Manual {
            requested_by: "ops".to_string(),
        };
        rule.begin_execution(&trigger, t0()).unwrap();
        assert_eq!(rule.running().map(|r| r.started_at), Some(t0()));

        assert!(!rule.expire_execution(t0() + Duration::minutes(59), Duration::hours(1)));
        assert!(rule.is_executing());

        assert!(rule.expire_execution(t0() + Duration::hours(1), Duration::hours(1)));
        assert_eq!(rule.state(), RuleState::Active);
        assert!(rule.running().is_none());
        let record = rule.history().latest().unwrap();
        assert_eq!(record.trigger, trigger);
        assert!(!record.success && !record.aborted);
        assert_eq!(rule.stats().last_executed, Some(t0()));
        assert!(rule.can_execute(t0() + Duration::hours(1)).is_ok());

        // Nothing to release once the rule is back to active.
        assert!(!rule.expire_execution(t0() + Duration::hours(3), Duration::hours(1)));
    }

    #[test]
    fn retired_is_terminal() {
        let mut rule = active_rule(definition());
        rule.retire(t0()).unwrap();
        assert!(rule.activate(t0()).unwrap_err().is_conflict());
        assert!(rule.update_definition(definition(), t0()).is_err());
        assert!(rule.retire(t0()).is_err());
    }

    #[test]
    fn daily_schedule_is_due_after_slot() {
        let mut def = definition();
        def.schedule = Schedule::daily_at("12:00");
        let mut rule = active_rule(def);

        assert!(!rule.is_due(t0()));
        assert!(rule.is_due(t0() + Duration::hours(2)));

        run(&mut rule, t0() + Duration::hours(2));
        assert_eq!(
            rule.next_scheduled_time(),
            Some(Utc.with_ymd_and_hms(2024, 6, 4, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn targeting() {
        let id = InventoryItemId::generate();
        let other = InventoryItemId::generate();
        let snapshot = json!({ "category": "Tools", "supplierId": "acme" });

        let mut def = definition();
        def.conditions.filters = Some(RuleFilters {
            suppliers: vec!["globex".to_string()],
            ..RuleFilters::default()
        });
        assert!(!active_rule(def).targets(id, &snapshot));

        let mut def = definition();
        def.target = RuleTarget {
            is_global: false,
            product_ids: vec![id],
            categories: vec!["tools".to_string()],
        };
        let rule = active_rule(def);
        assert!(rule.targets(id, &json!({})));
        assert!(rule.targets(other, &snapshot));
        assert!(!rule.targets(other, &json!({ "category": "Garden" })));
    }

    proptest! {
        /// Property: history never exceeds capacity and the count/rate stay consistent.
        #[test]
        fn stats_and_history_stay_bounded(outcomes in prop::collection::vec(any::<bool>(), 1..250)) {
            let mut rule = active_rule(definition());
            for (i, ok) in outcomes.iter().enumerate() {
                let at = t0() + Duration::minutes(i as i64);
                rule.begin_execution(&ExecutionTrigger::Schedule, at).unwrap();
                rule.record_execution(ExecutionRecord {
                    started_at: at,
                    finished_at: at,
                    trigger: ExecutionTrigger::Schedule,
                    success: *ok,
                    affected_items: 0,
                    failed_items: u32::from(!ok),
                    details: String::new(),
                    error: None,
                    aborted: false,
                });
            }
            let successes = outcomes.iter().filter(|ok| **ok).count() as f64;
            prop_assert!(rule.history().len() <= HISTORY_CAPACITY);
            prop_assert_eq!(rule.stats().execution_count, outcomes.len() as u64);
            prop_assert!((rule.stats().success_rate - successes / outcomes.len() as f64).abs() < 1e-9);
        }
    }
}
