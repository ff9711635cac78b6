use tokio::task::JoinHandle;

use super::{
    channel::{EventHandler, EventProducer, Handler},
    event_types::{OrderSettledEvent, SettlementFailedEvent},
};

/// The set of callbacks a host can attach to the engine. Every hook is optional; an empty
/// `EventHooks` turns the whole event system into a no-op.
#[derive(Default)]
pub struct EventHooks {
    pub on_order_settled: Option<Handler<OrderSettledEvent>>,
    pub on_settlement_failed: Option<Handler<SettlementFailedEvent>>,
}

impl EventHooks {
    pub fn on_order_settled(&mut self, f: Handler<OrderSettledEvent>) -> &mut Self {
        self.on_order_settled = Some(f);
        self
    }

    pub fn on_settlement_failed(&mut self, f: Handler<SettlementFailedEvent>) -> &mut Self {
        self.on_settlement_failed = Some(f);
        self
    }
}

/// Producer handles the engine uses to publish events. Cloneable, and cheap to pass into
/// spawned verification tasks. Hooks that were never registered simply have no producer.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_settled: Option<EventProducer<OrderSettledEvent>>,
    pub settlement_failed: Option<EventProducer<SettlementFailedEvent>>,
}

impl EventProducers {
    pub async fn publish_order_settled(&self, event: OrderSettledEvent) {
        if let Some(producer) = &self.order_settled {
            producer.publish_event(event).await;
        }
    }

    pub async fn publish_settlement_failed(&self, event: SettlementFailedEvent) {
        if let Some(producer) = &self.settlement_failed {
            producer.publish_event(event).await;
        }
    }
}

/// Owns the handler side of every registered hook. Call [`EventHandlers::producers`] to
/// get the publishing handles, then [`EventHandlers::start`] to spawn the handler tasks.
pub struct EventHandlers {
    order_settled: Option<EventHandler<OrderSettledEvent>>,
    settlement_failed: Option<EventHandler<SettlementFailedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let order_settled = hooks.on_order_settled.map(|f| EventHandler::new(buffer_size, f));
        let settlement_failed = hooks.on_settlement_failed.map(|f| EventHandler::new(buffer_size, f));
        Self { order_settled, settlement_failed }
    }

    pub fn producers(&self) -> EventProducers {
        EventProducers {
            order_settled: self.order_settled.as_ref().map(|h| h.subscribe()),
            settlement_failed: self.settlement_failed.as_ref().map(|h| h.subscribe()),
        }
    }

    /// Spawn one task per registered hook. The tasks end when the last matching
    /// [`EventProducers`] clone is dropped.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if let Some(handler) = self.order_settled {
            handles.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.settlement_failed {
            handles.push(tokio::spawn(handler.start_handler()));
        }
        handles
    }
}
