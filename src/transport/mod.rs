//! Message bus glue.
//!
//! The pipeline only sees two seams: [`MessageHandler`] for inbound payloads
//! (called on the transport's own thread or task, must return promptly) and
//! [`Publisher`] for outbound payloads (topic-bound, non-blocking, reports
//! failure instead of retrying).

pub mod memory;
#[cfg(feature = "mqtt")]
pub mod mqtt;

use crate::error::{LipstreamError, Result};
use std::sync::Arc;
use std::time::Duration;

pub use memory::{MemoryBus, MemoryPublisher};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttLink;

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    /// Parse a numeric QoS level (0, 1 or 2).
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(LipstreamError::ConfigInvalidValue {
                key: "qos".to_string(),
                message: format!("{} is not a valid QoS level (0, 1 or 2)", other),
            }),
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }
}

/// Everything needed to open one client on one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub qos: Qos,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
    pub max_packet_bytes: usize,
}

/// Receives inbound message payloads from a subscription.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, payload: Vec<u8>);
}

impl<T: MessageHandler + ?Sized> MessageHandler for Arc<T> {
    fn on_message(&self, payload: Vec<u8>) {
        (**self).on_message(payload)
    }
}

/// Publishes payloads to a single topic.
pub trait Publisher: Send + Sync {
    /// Hand one message to the transport.
    ///
    /// Fails with a transport error when the link is down; the payload is not
    /// kept for later delivery.
    fn publish(&self, payload: Vec<u8>) -> Result<()>;

    /// Topic this publisher is bound to.
    fn topic(&self) -> &str;
}

impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    fn publish(&self, payload: Vec<u8>) -> Result<()> {
        (**self).publish(payload)
    }

    fn topic(&self) -> &str {
        (**self).topic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_from_level() {
        assert_eq!(Qos::from_level(0).unwrap(), Qos::AtMostOnce);
        assert_eq!(Qos::from_level(1).unwrap(), Qos::AtLeastOnce);
        assert_eq!(Qos::from_level(2).unwrap(), Qos::ExactlyOnce);
        assert!(Qos::from_level(3).is_err());
    }

    #[test]
    fn test_qos_level_round_trip() {
        for level in 0..=2 {
            assert_eq!(Qos::from_level(level).unwrap().level(), level);
        }
    }
}
