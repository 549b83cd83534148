//! In-process pub/sub transport

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::SchedulerResult;
use crate::traits::{BusEvent, Transport};

/// Fan-out bus delivering every published event to all live subscriptions
/// of that event name. Senders whose receiver is gone are pruned on the
/// next publish.
pub struct InProcessBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<BusEvent>>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for InProcessBus {
    async fn publish(&self, event: &str, payload: Value) -> SchedulerResult<()> {
        let mut subscribers = self.subscribers.lock().await;
        if let Some(senders) = subscribers.get_mut(event) {
            senders.retain(|tx| {
                tx.send(BusEvent {
                    event: event.to_string(),
                    payload: payload.clone(),
                })
                .is_ok()
            });
        }
        Ok(())
    }

    async fn subscribe(&self, events: Vec<String>) -> SchedulerResult<mpsc::UnboundedReceiver<BusEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().await;
        for event in events {
            subscribers.entry(event).or_default().push(tx.clone());
        }
        Ok(rx)
    }
}
