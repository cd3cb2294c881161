//! Automation rule domain module.
//!
//! Rule definitions and lifecycle, condition evaluation, the action sum type, price
//! formulas, schedules and execution bookkeeping. Everything here is deterministic;
//! the rule engine in infra resolves targets and dispatches actions.

pub mod action;
pub mod condition;
pub mod history;
pub mod rule;
pub mod schedule;
pub mod trigger;

pub use action::{
    Action, NotificationSpec, PriceFormula, RuleActions, SecondaryAction, StockUpdateMode,
    percentage_change, render,
};
pub use condition::{
    Conditions, LogicalOperator, NumericRange, Operator, RuleFilters, Trigger, resolve_path,
};
pub use history::{ExecutionHistory, ExecutionRecord, ExecutionTrigger, HISTORY_CAPACITY, RuleStats};
pub use rule::{
    AutomationRule, ExecutionLimits, RuleDefinition, RuleId, RuleState, RuleTarget, RuleType,
    RunningExecution,
};
pub use schedule::{Schedule, ScheduleFrequency};
pub use trigger::{OrderLine, TriggerEvent, TriggerKind};
