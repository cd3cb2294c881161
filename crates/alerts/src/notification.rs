//! Notification settings and the message handed to a notification sink.

use serde::{Deserialize, Serialize};

use stockpilot_core::TenantId;

use crate::alert::{AlertId, AlertPriority, StockAlert};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Webhook,
    InApp,
}

/// How often a non-critical alert may notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationFrequency {
    Immediate,
    Hourly,
    Daily,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub channels: Vec<NotificationChannel>,
    pub recipients: Vec<String>,
    pub frequency: NotificationFrequency,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: vec![NotificationChannel::InApp],
            recipients: Vec::new(),
            frequency: NotificationFrequency::Immediate,
        }
    }
}

/// Outbound message. Delivery is the sink's problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub tenant_id: TenantId,
    pub channels: Vec<NotificationChannel>,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub priority: AlertPriority,
    pub alert_id: Option<AlertId>,
}

impl Notification {
    pub fn for_alert(alert: &StockAlert) -> Self {
        let settings = alert.notification_settings().cloned().unwrap_or_default();
        Self {
            tenant_id: alert.tenant_id(),
            channels: settings.channels,
            recipients: settings.recipients,
            subject: format!(
                "[{}] {} alert",
                alert.priority().as_str(),
                alert.alert_type().as_str()
            ),
            body: alert.message().to_string(),
            priority: alert.priority(),
            alert_id: Some(alert.id_typed()),
        }
    }
}
