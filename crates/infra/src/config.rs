//! Engine configuration from `STOCKPILOT_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use stockpilot_core::TenantId;
use stockpilot_observability::LogFormat;

use crate::jobs::{BackoffStrategy, RetryPolicy};

pub const ENV_PREFIX: &str = "STOCKPILOT_";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

/// Runtime settings for the automation core. Absent variables keep the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sweep_interval_secs: u64,
    pub inter_rule_delay_ms: u64,
    pub inter_item_delay_ms: u64,
    /// Wall-clock budget for one rule sweep; remaining rules wait for the next tick.
    pub sweep_budget_secs: u64,
    pub action_timeout_secs: u64,
    pub deferred_poll_ms: u64,
    pub deferred_max_attempts: u32,
    pub deferred_backoff: BackoffStrategy,
    pub deferred_base_delay_secs: u64,
    /// Upper bound for growing backoff; ignored by `fixed`.
    pub deferred_max_delay_secs: u64,
    /// A rule executing longer than this without a result is released by the sweep.
    pub execution_lease_secs: u64,
    /// Also run the stale-alert sweep on every tick.
    pub alert_sweep: bool,
    pub conflict_retries: u32,
    pub log_format: LogFormat,
    pub tenant_id: Option<TenantId>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            inter_rule_delay_ms: 100,
            inter_item_delay_ms: 10,
            sweep_budget_secs: 300,
            action_timeout_secs: 30,
            deferred_poll_ms: 500,
            deferred_max_attempts: 3,
            deferred_backoff: BackoffStrategy::Exponential,
            deferred_base_delay_secs: 30,
            deferred_max_delay_secs: 600,
            execution_lease_secs: 3600,
            alert_sweep: true,
            conflict_retries: 3,
            log_format: LogFormat::Json,
            tenant_id: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (full variable names, prefix included).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let var = |key: &str| {
            let name = format!("{ENV_PREFIX}{key}");
            lookup(&name).map(|value| (name, value))
        };

        set(&mut cfg.sweep_interval_secs, var("SWEEP_INTERVAL_SECS"))?;
        set(&mut cfg.inter_rule_delay_ms, var("INTER_RULE_DELAY_MS"))?;
        set(&mut cfg.inter_item_delay_ms, var("INTER_ITEM_DELAY_MS"))?;
        set(&mut cfg.sweep_budget_secs, var("SWEEP_BUDGET_SECS"))?;
        set(&mut cfg.action_timeout_secs, var("ACTION_TIMEOUT_SECS"))?;
        set(&mut cfg.deferred_poll_ms, var("DEFERRED_POLL_MS"))?;
        set(&mut cfg.deferred_max_attempts, var("DEFERRED_MAX_ATTEMPTS"))?;
        set(&mut cfg.deferred_backoff, var("DEFERRED_BACKOFF"))?;
        set(&mut cfg.deferred_base_delay_secs, var("DEFERRED_BASE_DELAY_SECS"))?;
        set(&mut cfg.deferred_max_delay_secs, var("DEFERRED_MAX_DELAY_SECS"))?;
        set(&mut cfg.execution_lease_secs, var("EXECUTION_LEASE_SECS"))?;
        set(&mut cfg.alert_sweep, var("ALERT_SWEEP"))?;
        set(&mut cfg.conflict_retries, var("CONFLICT_RETRIES"))?;
        set(&mut cfg.log_format, var("LOG_FORMAT"))?;
        if let Some(entry) = var("TENANT_ID") {
            cfg.tenant_id = Some(parse(entry)?);
        }

        if cfg.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: format!("{ENV_PREFIX}SWEEP_INTERVAL_SECS"),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if cfg.deferred_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: format!("{ENV_PREFIX}DEFERRED_MAX_ATTEMPTS"),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if cfg.execution_lease_secs == 0 {
            return Err(ConfigError::Invalid {
                var: format!("{ENV_PREFIX}EXECUTION_LEASE_SECS"),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(cfg)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn inter_rule_delay(&self) -> Duration {
        Duration::from_millis(self.inter_rule_delay_ms)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn sweep_budget(&self) -> Duration {
        Duration::from_secs(self.sweep_budget_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn deferred_poll_interval(&self) -> Duration {
        Duration::from_millis(self.deferred_poll_ms)
    }

    /// Retry policy for deferred rule actions.
    pub fn deferred_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.deferred_backoff,
            self.deferred_max_attempts,
            Duration::from_secs(self.deferred_base_delay_secs),
            Duration::from_secs(self.deferred_max_delay_secs),
        )
    }

    pub fn execution_lease(&self) -> Duration {
        Duration::from_secs(self.execution_lease_secs)
    }
}

fn set<T>(slot: &mut T, entry: Option<(String, String)>) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(entry) = entry {
        *slot = parse(entry)?;
    }
    Ok(())
}

fn parse<T>((var, value): (String, String)) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        reason: e.to_string(),
        var,
        value,
    })
}
