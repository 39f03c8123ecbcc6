//! Publish/subscribe boundary for committed activity.
//!
//! Messages reach the bus only after they were appended to the activity log,
//! so the log stays the source of truth and a lost publish loses nothing.
//! Delivery is at-least-once per live subscriber.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use crate::envelope::EventEnvelope;

/// A message that can be routed by topic.
pub trait Routed {
    fn topic(&self) -> &str;
}

/// Envelopes are routed by the type of the stream they belong to
/// (`"enrollment"`, `"certificate"`, ...).
impl<E> Routed for EventEnvelope<E> {
    fn topic(&self) -> &str {
        self.stream_type()
    }
}

/// Receiving end of a bus subscription. Single consumer.
#[derive(Debug)]
pub struct Subscription<M> {
    topic: Option<String>,
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(topic: Option<String>, receiver: Receiver<M>) -> Self {
        Self { topic, receiver }
    }

    /// `None` for a subscription that receives every topic.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn try_next(&self) -> Option<M> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits up to `timeout`; `None` when nothing arrived or the bus is gone.
    pub fn next_within(&self, timeout: Duration) -> Option<M> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything queued so far, in publish order.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

pub trait EventBus<M>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns how many subscribers the message was delivered to.
    fn publish(&self, message: M) -> Result<usize, Self::Error>;

    /// Subscribe to every message.
    fn subscribe(&self) -> Subscription<M>;

    /// Subscribe to messages whose topic equals `topic`.
    fn subscribe_topic(&self, topic: &str) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<usize, Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }

    fn subscribe_topic(&self, topic: &str) -> Subscription<M> {
        (**self).subscribe_topic(topic)
    }
}
