//! Secondary actions that run after a delay, as `rule_action.*` jobs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use stockpilot_core::{DomainError, DomainResult};
use stockpilot_inventory::InventoryItemId;
use stockpilot_rules::{Action, RuleId, RuleState};

use super::RuleEngine;
use crate::jobs::{Job, JobExecutor, JobResult, JobStore, RULE_ACTION_PREFIX};

/// Job payload of a deferred secondary action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredAction {
    pub rule_id: RuleId,
    pub item_id: InventoryItemId,
    pub action: Action,
    /// Condition data captured when the rule matched; used for templates.
    pub data: Value,
}

impl DeferredAction {
    pub fn to_payload(&self) -> DomainResult<Value> {
        serde_json::to_value(self).map_err(|e| DomainError::execution(format!("failed to encode deferred action: {e}")))
    }

    pub fn from_payload(payload: &Value) -> DomainResult<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|e| DomainError::validation(format!("malformed deferred action: {e}")))
    }
}

impl RuleEngine {
    /// Run one deferred action job.
    ///
    /// Skipped (not failed) when the rule was deactivated or retired, or the item is gone
    /// or inactive, since retrying would not change the outcome.
    pub fn handle_deferred(&self, job: &Job) -> JobResult {
        let deferred = match DeferredAction::from_payload(&job.payload) {
            Ok(d) => d,
            Err(e) => return JobResult::Failure(e.to_string()),
        };

        let rule = match self.get_rule(job.tenant_id, deferred.rule_id) {
            Ok(rule) => rule,
            Err(e) if e.is_not_found() => return JobResult::Skipped("rule no longer exists".to_string()),
            Err(e) => return JobResult::Failure(e.to_string()),
        };
        if !matches!(rule.state(), RuleState::Active | RuleState::Executing) {
            return JobResult::Skipped(format!("rule is {:?}", rule.state()).to_lowercase());
        }

        let item = match self.ledger().get_item(job.tenant_id, deferred.item_id) {
            Ok(item) if item.is_active() => item,
            Ok(_) => return JobResult::Skipped("item is inactive".to_string()),
            Err(e) if e.is_not_found() => return JobResult::Skipped("item no longer exists".to_string()),
            Err(e) => return JobResult::Failure(e.to_string()),
        };

        match self.actions().execute(&rule, &item, &deferred.action, &deferred.data) {
            Ok(outcome) => {
                debug!(job_id = %job.id, rule_id = %rule.id_typed(), outcome = ?outcome, "deferred action ran");
                JobResult::Success
            }
            Err(e) => JobResult::Failure(e.to_string()),
        }
    }
}

/// Route every `rule_action.*` job of `executor` to the engine.
pub fn register_deferred_handler<S>(executor: &mut JobExecutor<S>, engine: Arc<RuleEngine>)
where
    S: JobStore + 'static,
{
    executor.register_handler(format!("{RULE_ACTION_PREFIX}.*"), move |job: &Job| engine.handle_deferred(job));
}
