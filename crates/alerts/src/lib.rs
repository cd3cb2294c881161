//! Stock alert domain module.
//!
//! Alert lifecycle (acknowledge, resolve, reopen, escalate), priority staleness,
//! the notification gate and the threshold evaluation that turns item numbers into
//! alert candidates. Pure logic; the alert engine in infra owns dedupe and storage.

pub mod alert;
pub mod evaluation;
pub mod notification;

pub use alert::{AlertId, AlertPriority, AlertStatus, AlertType, NewAlert, StockAlert};
pub use evaluation::{AlertCandidate, ThresholdAssessment, evaluate_thresholds};
pub use notification::{
    Notification, NotificationChannel, NotificationFrequency, NotificationSettings,
};
