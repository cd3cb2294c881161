//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes trigger events (stock changes, price changes, supplier updates,
//! new orders) to consumers such as the rule engine's event worker.
//!
//! - **Transport-agnostic**: in-memory channels here; brokers live behind the same trait
//! - **At-least-once**: consumers must tolerate duplicates
//! - **No persistence**: the bus distributes, it does not store

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to an event stream (broadcast semantics).
///
/// Designed for single-threaded consumption: one worker owns one subscription.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(envelope) => handle(envelope),
///         Err(RecvTimeoutError::Timeout) => continue, // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break,
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish()` may fail (lock poisoning, broker errors); failures surface to the
/// publisher. Each subscriber receives a copy of every message published after it
/// subscribed.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
