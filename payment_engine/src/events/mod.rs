//! Event hooks for the payment engine.
//!
//! The engine publishes events when settlement reaches a terminal state. Hosts register
//! async handlers through [`EventHooks`]; each hook runs on its own channel-fed task, so
//! a slow handler (say, a webhook to a notification service) never blocks settlement.

mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::{OrderSettledEvent, SettlementFailedEvent};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
