//! Domain events, envelopes and the publish/subscribe boundary.
//!
//! Aggregates describe state changes as typed events. Infra wraps committed
//! events in an [`EventEnvelope`] and appends them to the activity log before
//! publishing them on an [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Routed, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
