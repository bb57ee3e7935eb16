//! Event publication and subscription.
//!
//! The bus distributes committed envelopes to consumers after the log accepted
//! them. It is a notification channel, not storage: the log stays the source of
//! truth, so a consumer that missed a message catches up by reading the log.
//!
//! Delivery is at-least-once and ordering across publishers is not guaranteed.
//! Consumers that care about order (projection workers) read from the log in
//! position order and use the bus only to wake up.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Receiving end of a bus subscription. One consumer thread per subscription.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drop every message already queued; returns how many were discarded.
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

/// Broadcast bus: every subscriber receives a copy of every published message.
///
/// `publish` may fail; since the events are already durable, the caller may
/// log and move on, and consumers recover from the log.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

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
