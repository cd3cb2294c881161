//! Rule actions as a closed sum type.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stockpilot_alerts::{AlertPriority, NotificationChannel};
use stockpilot_core::{DomainError, DomainResult};

use crate::condition::resolve_path;

/// How a new price is derived from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceFormula {
    Fixed { price: Decimal },
    /// `price * (1 + percent / 100)`; negative percentages discount.
    PercentChange { percent: Decimal },
    AmountChange { amount: Decimal },
    /// `unit_cost * (1 + markup_percent / 100)`.
    CostPlusMarkup { markup_percent: Decimal },
}

impl PriceFormula {
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            PriceFormula::Fixed { price } if price.is_sign_negative() => {
                Err(DomainError::validation("fixed price cannot be negative"))
            }
            PriceFormula::PercentChange { percent } if *percent <= Decimal::from(-100) => Err(
                DomainError::validation("percent change must be above -100"),
            ),
            PriceFormula::CostPlusMarkup { markup_percent } if markup_percent.is_sign_negative() => {
                Err(DomainError::validation("markup cannot be negative"))
            }
            _ => Ok(()),
        }
    }

    /// Compute the new price, rounded to cents.
    pub fn apply(&self, current: Option<Decimal>, unit_cost: Option<Decimal>) -> DomainResult<Decimal> {
        let hundred = Decimal::ONE_HUNDRED;
        let price = match *self {
            PriceFormula::Fixed { price } => price,
            PriceFormula::PercentChange { percent } => {
                current.ok_or_else(|| DomainError::execution("item has no current price"))?
                    * (hundred + percent)
                    / hundred
            }
            PriceFormula::AmountChange { amount } => {
                current.ok_or_else(|| DomainError::execution("item has no current price"))? + amount
            }
            PriceFormula::CostPlusMarkup { markup_percent } => {
                unit_cost.ok_or_else(|| DomainError::execution("item has no unit cost"))?
                    * (hundred + markup_percent)
                    / hundred
            }
        };

        let price = price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        if price.is_sign_negative() {
            return Err(DomainError::execution(format!(
                "formula produced a negative price ({price})"
            )));
        }
        Ok(price)
    }
}

/// Absolute percentage change from `old` to `new`; `None` when `old` is zero.
pub fn percentage_change(old: Decimal, new: Decimal) -> Option<Decimal> {
    if old.is_zero() {
        return None;
    }
    Some(((new - old) / old * Decimal::ONE_HUNDRED).abs())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockUpdateMode {
    Set,
    Increase,
    Decrease,
}

/// Message dispatched to the notification sink.
///
/// `subject` and `message` may reference snapshot fields as `{field}` or `{event.field}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSpec {
    pub channels: Vec<NotificationChannel>,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub subject: String,
    pub message: String,
    #[serde(default = "default_priority")]
    pub priority: AlertPriority,
}

fn default_priority() -> AlertPriority {
    AlertPriority::Medium
}

impl NotificationSpec {
    pub fn validate(&self) -> DomainResult<()> {
        if self.channels.is_empty() {
            return Err(DomainError::validation("notification needs at least one channel"));
        }
        if self.message.trim().is_empty() {
            return Err(DomainError::validation("notification message cannot be empty"));
        }
        Ok(())
    }

    pub fn render_subject(&self, data: &Value) -> String {
        render(&self.subject, data)
    }

    pub fn render_message(&self, data: &Value) -> String {
        render(&self.message, data)
    }
}

/// Substitute `{path}` placeholders (dotted paths allowed) with values from `data`.
///
/// The template is scanned once; substituted text is never scanned again, and
/// placeholders that resolve to nothing are left as written.
pub fn render(template: &str, data: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let token = after
            .find('}')
            .map(|close| &after[..close])
            .filter(|path| !path.is_empty() && !path.contains('{'));
        match token.and_then(|path| resolve_path(data, path).map(|value| (path, value))) {
            Some((path, value)) => {
                match value {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
                rest = &after[path.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Something a matching rule does to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Committed only when the change is at least `min_change_percent`.
    UpdatePrice {
        formula: PriceFormula,
        #[serde(default)]
        min_change_percent: Decimal,
    },
    /// Raise a reorder alert; `quantity` overrides the recommended amount.
    CreateReorder {
        #[serde(default)]
        quantity: Option<i64>,
        #[serde(default = "default_priority")]
        priority: AlertPriority,
    },
    UpdateStock {
        mode: StockUpdateMode,
        quantity: i64,
        #[serde(default)]
        reason: Option<String>,
    },
    CreateAlert {
        priority: AlertPriority,
        message: String,
    },
    SendNotification(NotificationSpec),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::UpdatePrice { .. } => "update_price",
            Action::CreateReorder { .. } => "create_reorder",
            Action::UpdateStock { .. } => "update_stock",
            Action::CreateAlert { .. } => "create_alert",
            Action::SendNotification(_) => "send_notification",
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Action::UpdatePrice {
                formula,
                min_change_percent,
            } => {
                if min_change_percent.is_sign_negative() {
                    return Err(DomainError::validation("min_change_percent cannot be negative"));
                }
                formula.validate()
            }
            Action::CreateReorder { quantity, .. } => match quantity {
                Some(q) if *q <= 0 => Err(DomainError::validation("reorder quantity must be positive")),
                _ => Ok(()),
            },
            Action::UpdateStock { mode, quantity, .. } => match mode {
                StockUpdateMode::Set if *quantity < 0 => {
                    Err(DomainError::validation("stock level cannot be negative"))
                }
                StockUpdateMode::Increase | StockUpdateMode::Decrease if *quantity <= 0 => {
                    Err(DomainError::validation("stock change must be positive"))
                }
                _ => Ok(()),
            },
            Action::CreateAlert { message, .. } => {
                if message.trim().is_empty() {
                    return Err(DomainError::validation("alert message cannot be empty"));
                }
                Ok(())
            }
            Action::SendNotification(spec) => spec.validate(),
        }
    }
}

/// An action run after the primary one, optionally deferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryAction {
    pub action: Action,
    #[serde(default)]
    pub delay_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleActions {
    pub primary: Action,
    #[serde(default)]
    pub secondary: Vec<SecondaryAction>,
    #[serde(default)]
    pub notifications: Vec<NotificationSpec>,
}

impl RuleActions {
    pub fn validate(&self) -> DomainResult<()> {
        self.primary.validate()?;
        self.secondary.iter().try_for_each(|s| s.action.validate())?;
        self.notifications.iter().try_for_each(NotificationSpec::validate)
    }
}
