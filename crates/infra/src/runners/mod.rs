//! Background threads: the periodic sweep and the domain-event worker.

pub mod event_worker;
pub mod sweep_runner;

pub use event_worker::{EventWorker, WorkerHandle};
pub use sweep_runner::{SweepRunner, SweepRunnerHandle};
