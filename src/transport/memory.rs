//! In-process message bus.
//!
//! Delivers synchronously to every handler subscribed to a topic, in publish
//! order. A connectivity switch lets callers simulate a broker outage.

use crate::error::{LipstreamError, Result};
use crate::transport::{MessageHandler, Publisher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct BusState {
    connected: bool,
    subscribers: HashMap<String, Vec<Arc<dyn MessageHandler>>>,
    published: HashMap<String, u64>,
}

/// Shared in-process broker. Clones refer to the same bus.
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl MemoryBus {
    /// Create a connected bus with no subscribers.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                connected: true,
                subscribers: HashMap::new(),
                published: HashMap::new(),
            })),
        }
    }

    /// Register a handler for every future message on `topic`.
    pub fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let mut state = self.lock()?;
        state
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    /// Publisher bound to `topic`.
    pub fn publisher(&self, topic: &str) -> MemoryPublisher {
        MemoryPublisher {
            bus: self.clone(),
            topic: topic.to_string(),
        }
    }

    /// Simulate the broker going away (false) or coming back (true).
    pub fn set_connected(&self, connected: bool) -> Result<()> {
        self.lock()?.connected = connected;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.lock().map(|s| s.connected).unwrap_or(false)
    }

    /// Number of messages accepted on `topic` so far.
    pub fn published_count(&self, topic: &str) -> u64 {
        self.lock()
            .map(|s| s.published.get(topic).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn deliver(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let handlers = {
            let mut state = self.lock()?;
            if !state.connected {
                return Err(LipstreamError::NotConnected {
                    topic: topic.to_string(),
                });
            }
            *state.published.entry(topic.to_string()).or_insert(0) += 1;
            state.subscribers.get(topic).cloned().unwrap_or_default()
        };

        // Handlers run without the bus lock so they may publish in turn.
        if let Some((last, rest)) = handlers.split_last() {
            for handler in rest {
                handler.on_message(payload.clone());
            }
            last.on_message(payload);
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BusState>> {
        self.state.lock().map_err(|_| LipstreamError::Transport {
            message: "memory bus state poisoned".to_string(),
        })
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Topic-bound publisher on a [`MemoryBus`].
#[derive(Clone)]
pub struct MemoryPublisher {
    bus: MemoryBus,
    topic: String,
}

impl Publisher for MemoryPublisher {
    fn publish(&self, payload: Vec<u8>) -> Result<()> {
        self.bus.deliver(&self.topic, payload)
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collector {
        messages: Mutex<Vec<Vec<u8>>>,
    }

    impl MessageHandler for Collector {
        fn on_message(&self, payload: Vec<u8>) {
            self.messages.lock().unwrap().push(payload);
        }
    }

    #[test]
    fn test_delivers_in_publish_order() {
        let bus = MemoryBus::new();
        let collector = Arc::new(Collector::default());
        bus.subscribe("a", collector.clone()).unwrap();

        let publisher = bus.publisher("a");
        publisher.publish(vec![1]).unwrap();
        publisher.publish(vec![2]).unwrap();
        publisher.publish(vec![3]).unwrap();

        assert_eq!(
            *collector.messages.lock().unwrap(),
            vec![vec![1], vec![2], vec![3]]
        );
        assert_eq!(bus.published_count("a"), 3);
    }

    #[test]
    fn test_topics_are_isolated() {
        let bus = MemoryBus::new();
        let a = Arc::new(Collector::default());
        let b = Arc::new(Collector::default());
        bus.subscribe("a", a.clone()).unwrap();
        bus.subscribe("b", b.clone()).unwrap();

        bus.publisher("a").publish(vec![9]).unwrap();

        assert_eq!(a.messages.lock().unwrap().len(), 1);
        assert!(b.messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fan_out_to_every_subscriber() {
        let bus = MemoryBus::new();
        let first = Arc::new(Collector::default());
        let second = Arc::new(Collector::default());
        bus.subscribe("t", first.clone()).unwrap();
        bus.subscribe("t", second.clone()).unwrap();

        bus.publisher("t").publish(vec![5, 6]).unwrap();

        assert_eq!(*first.messages.lock().unwrap(), vec![vec![5, 6]]);
        assert_eq!(*second.messages.lock().unwrap(), vec![vec![5, 6]]);
    }

    #[test]
    fn test_disconnected_publish_fails_and_drops_payload() {
        let bus = MemoryBus::new();
        let collector = Arc::new(Collector::default());
        bus.subscribe("t", collector.clone()).unwrap();
        bus.set_connected(false).unwrap();

        let result = bus.publisher("t").publish(vec![1]);
        assert!(matches!(result, Err(LipstreamError::NotConnected { .. })));
        assert!(!bus.is_connected());

        bus.set_connected(true).unwrap();
        bus.publisher("t").publish(vec![2]).unwrap();

        // The failed payload was not queued for redelivery
        assert_eq!(*collector.messages.lock().unwrap(), vec![vec![2]]);
        assert_eq!(bus.published_count("t"), 1);
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = MemoryBus::new();
        let publisher = bus.publisher("nobody");
        assert_eq!(publisher.topic(), "nobody");
        assert!(publisher.publish(vec![0]).is_ok());
    }
}
