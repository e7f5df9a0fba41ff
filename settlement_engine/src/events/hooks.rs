use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, SettlementEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub settlement_producers: Vec<EventProducer<SettlementEvent>>,
}

pub struct EventHandlers {
    pub on_settlement: Option<EventHandler<SettlementEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_settlement = hooks.on_settlement.map(|f| EventHandler::new(buffer_size, f));
        Self { on_settlement }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_settlement {
            result.settlement_producers.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_settlement {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_settlement: Option<Handler<SettlementEvent>>,
}

impl EventHooks {
    pub fn on_settlement<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SettlementEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_settlement = Some(Arc::new(f));
        self
    }
}
