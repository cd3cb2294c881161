//! Infrastructure layer: stores, the stock ledger, the alert and rule engines,
//! deferred jobs, background runners and configuration.

pub mod alert_engine;
pub mod config;
pub mod jobs;
pub mod ledger;
pub mod rule_engine;
pub mod runners;
pub mod sinks;
pub mod store;

pub use alert_engine::{AlertEngine, AlertStore, SYSTEM_ACTOR, StaleSweepReport};
pub use config::{ConfigError, EngineConfig};
pub use ledger::{BulkFailure, BulkOutcome, BulkStockUpdate, LedgerUpdate, NewItem, StockAdjustment, StockLedger};
pub use rule_engine::{
    ActionExecutor, ActionOutcome, DispatchReport, ExecutionReport, RuleEngine, RuleEngineConfig, RuleStore,
    SweepReport,
};

#[cfg(test)]
mod integration_tests;
#[cfg(test)]
pub(crate) mod test_support;
