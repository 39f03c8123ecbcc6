use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Routed, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("subscriber registry lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct Subscriber<M> {
    topic: Option<String>,
    sender: mpsc::Sender<M>,
}

impl<M: Routed> Subscriber<M> {
    fn wants(&self, message: &M) -> bool {
        self.topic.as_deref().is_none_or(|t| t == message.topic())
    }
}

/// Channel-backed bus for a single process. Subscribers whose receiving end
/// was dropped are pruned on the next publish.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<Subscriber<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions, as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn register(&self, topic: Option<String>) -> Subscription<M> {
        let (sender, receiver) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber {
                topic: topic.clone(),
                sender,
            });
        }
        Subscription::new(topic, receiver)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Routed + Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<usize, Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        let mut delivered = 0;
        subs.retain(|sub| {
            if !sub.wants(&message) {
                return true;
            }
            let alive = sub.sender.send(message.clone()).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });
        Ok(delivered)
    }

    fn subscribe(&self) -> Subscription<M> {
        self.register(None)
    }

    fn subscribe_topic(&self, topic: &str) -> Subscription<M> {
        self.register(Some(topic.to_string()))
    }
}
