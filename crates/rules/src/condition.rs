//! Rule conditions: ordered triggers folded left to right, plus optional filters.
//!
//! Triggers address fields of an item snapshot by dotted path (`"stockLevel"`,
//! `"event.newStock"`). Chaining is a strict left fold: the logical operator declared
//! on trigger *n* combines trigger *n + 1* with the running result, so
//! `a OR b AND c` evaluates as `(a OR b) AND c`. A missing operator means AND.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stockpilot_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    /// Case-insensitive substring (strings) or membership (arrays).
    Contains,
    /// Inclusive range; the comparison value is `[low, high]`.
    Between,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
    /// Combines the *next* trigger with the result so far.
    #[serde(default)]
    pub logical_operator: Option<LogicalOperator>,
}

impl Trigger {
    pub fn new(field: &str, operator: Operator, value: Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
            logical_operator: None,
        }
    }

    pub fn then(mut self, op: LogicalOperator) -> Self {
        self.logical_operator = Some(op);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.field.trim().is_empty() {
            return Err(DomainError::validation("trigger field cannot be empty"));
        }
        if self.operator == Operator::Between && between_bounds(&self.value).is_none() {
            return Err(DomainError::validation(format!(
                "'between' on '{}' needs a [low, high] numeric pair",
                self.field
            )));
        }
        Ok(())
    }

    pub fn matches(&self, data: &Value) -> bool {
        let actual = resolve_path(data, &self.field);
        compare(actual, self.operator, &self.value)
    }
}

/// Inclusive numeric bounds; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericRange {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn contains(&self, v: f64) -> bool {
        self.min.is_none_or(|min| v >= min) && self.max.is_none_or(|max| v <= max)
    }
}

/// Narrowing filters; every populated filter must match.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFilters {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub suppliers: Vec<String>,
    #[serde(default)]
    pub price_range: Option<NumericRange>,
    #[serde(default)]
    pub stock_range: Option<NumericRange>,
}

impl RuleFilters {
    /// Category and supplier filters only (used to narrow global rule targets).
    pub fn matches_catalog(&self, data: &Value) -> bool {
        list_matches(&self.categories, resolve_path(data, "category"))
            && list_matches(&self.suppliers, resolve_path(data, "supplierId"))
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.matches_catalog(data)
            && range_matches(self.price_range, resolve_path(data, "price"))
            && range_matches(self.stock_range, resolve_path(data, "stockLevel"))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Conditions {
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub filters: Option<RuleFilters>,
}

impl Conditions {
    pub fn validate(&self) -> DomainResult<()> {
        if self.triggers.is_empty() {
            return Err(DomainError::validation("rule needs at least one trigger"));
        }
        self.triggers.iter().try_for_each(Trigger::validate)
    }

    /// Left fold over triggers, then filters. No triggers never matches.
    pub fn evaluate(&self, data: &Value) -> bool {
        let mut triggers = self.triggers.iter();
        let Some(first) = triggers.next() else {
            return false;
        };

        let mut result = first.matches(data);
        let mut pending = first.logical_operator.unwrap_or(LogicalOperator::And);
        for trigger in triggers {
            let current = trigger.matches(data);
            result = match pending {
                LogicalOperator::And => result && current,
                LogicalOperator::Or => result || current,
            };
            pending = trigger.logical_operator.unwrap_or(LogicalOperator::And);
        }

        result && self.filters.as_ref().is_none_or(|f| f.matches(data))
    }
}

/// Resolve a dotted path. `null` counts as missing.
pub fn resolve_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            matches!((as_number(a), as_number(b)), (Some(x), Some(y)) if x == y)
        }
        _ => a == b,
    }
}

fn between_bounds(v: &Value) -> Option<(f64, f64)> {
    match v.as_array()?.as_slice() {
        [lo, hi] => Some((as_number(lo)?, as_number(hi)?)),
        _ => None,
    }
}

fn compare(actual: Option<&Value>, op: Operator, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return op == Operator::NotEquals;
    };

    match op {
        Operator::Equals => loose_eq(actual, expected),
        Operator::NotEquals => !loose_eq(actual, expected),
        Operator::GreaterThan => {
            matches!((as_number(actual), as_number(expected)), (Some(a), Some(e)) if a > e)
        }
        Operator::LessThan => {
            matches!((as_number(actual), as_number(expected)), (Some(a), Some(e)) if a < e)
        }
        Operator::Contains => match actual {
            Value::String(s) => expected
                .as_str()
                .is_some_and(|needle| s.to_lowercase().contains(&needle.to_lowercase())),
            Value::Array(items) => items.iter().any(|item| match (item, expected) {
                (Value::String(a), Value::String(e)) => a.eq_ignore_ascii_case(e),
                _ => loose_eq(item, expected),
            }),
            _ => false,
        },
        Operator::Between => match (as_number(actual), between_bounds(expected)) {
            (Some(a), Some((lo, hi))) => a >= lo && a <= hi,
            _ => false,
        },
    }
}

fn list_matches(allowed: &[String], actual: Option<&Value>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    actual
        .and_then(Value::as_str)
        .is_some_and(|a| allowed.iter().any(|x| x.eq_ignore_ascii_case(a)))
}

fn range_matches(range: Option<NumericRange>, actual: Option<&Value>) -> bool {
    match range {
        None => true,
        Some(r) => actual.and_then(as_number).is_some_and(|v| r.contains(v)),
    }
}
