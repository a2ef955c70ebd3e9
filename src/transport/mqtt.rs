//! MQTT transport using rumqttc.
//!
//! Each [`MqttLink`] owns one client and one event loop task. The event loop
//! tracks connectivity, re-subscribes after every (re)connect and hands inbound
//! payloads to a [`MessageHandler`]. Must be started from within a tokio runtime.

use crate::error::{LipstreamError, Result};
use crate::transport::{Endpoint, MessageHandler, Publisher, Qos};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the request channel between the client handle and its event loop.
const REQUEST_CAPACITY: usize = 64;

/// How long `shutdown` waits for the event loop to flush the disconnect.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn to_mqtt_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// One MQTT client bound to one topic.
pub struct MqttLink {
    client: AsyncClient,
    endpoint: Endpoint,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MqttLink {
    /// Link that only publishes to `endpoint.topic`.
    pub fn publisher(endpoint: Endpoint) -> Self {
        Self::start(endpoint, None)
    }

    /// Link subscribed to `endpoint.topic`, delivering payloads to `handler`.
    pub fn subscriber(endpoint: Endpoint, handler: Arc<dyn MessageHandler>) -> Self {
        Self::start(endpoint, Some(handler))
    }

    fn start(endpoint: Endpoint, handler: Option<Arc<dyn MessageHandler>>) -> Self {
        let mut options =
            MqttOptions::new(endpoint.client_id.clone(), endpoint.host.clone(), endpoint.port);
        options.set_keep_alive(endpoint.keep_alive);
        options.set_max_packet_size(endpoint.max_packet_bytes, endpoint.max_packet_bytes);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            endpoint.clone(),
            handler,
            Arc::clone(&connected),
        ));

        Self {
            client,
            endpoint,
            connected,
            task,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Block (asynchronously) until the broker acknowledges the connection.
    ///
    /// Polls every `poll` and gives up after `timeout`.
    pub async fn wait_connected(&self, timeout: Duration, poll: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.is_connected() {
            if Instant::now() >= deadline {
                return Err(LipstreamError::Transport {
                    message: format!(
                        "{} could not connect to {}:{} within {}s",
                        self.endpoint.client_id,
                        self.endpoint.host,
                        self.endpoint.port,
                        timeout.as_secs()
                    ),
                });
            }
            info!(
                client = %self.endpoint.client_id,
                "waiting to connect to {}:{}...",
                self.endpoint.host,
                self.endpoint.port
            );
            tokio::time::sleep(poll).await;
        }
        Ok(())
    }

    /// Disconnect and stop the event loop.
    pub async fn shutdown(self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(client = %self.endpoint.client_id, "disconnect request failed: {}", e);
        }
        let abort = self.task.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.task).await.is_err() {
            abort.abort();
        }
        info!(client = %self.endpoint.client_id, "client disconnected");
    }
}

impl Publisher for MqttLink {
    fn publish(&self, payload: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(LipstreamError::NotConnected {
                topic: self.endpoint.topic.clone(),
            });
        }
        self.client
            .try_publish(
                self.endpoint.topic.clone(),
                to_mqtt_qos(self.endpoint.qos),
                false,
                payload,
            )
            .map_err(|e| LipstreamError::Transport {
                message: format!("publish to {} failed: {}", self.endpoint.topic, e),
            })
    }

    fn topic(&self) -> &str {
        &self.endpoint.topic
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    endpoint: Endpoint,
    handler: Option<Arc<dyn MessageHandler>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                info!(client = %endpoint.client_id, "connected OK");
                // Subscriptions do not survive a clean-session reconnect.
                if handler.is_some()
                    && let Err(e) =
                        client.try_subscribe(endpoint.topic.clone(), to_mqtt_qos(endpoint.qos))
                {
                    warn!(client = %endpoint.client_id, "subscribe to {} failed: {}", endpoint.topic, e);
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                info!(
                    client = %endpoint.client_id,
                    qos = endpoint.qos.level(),
                    "subscribed to {}",
                    endpoint.topic
                );
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if let Some(handler) = &handler {
                    handler.on_message(publish.payload.to_vec());
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                warn!(client = %endpoint.client_id, "broker closed the connection");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                warn!(
                    client = %endpoint.client_id,
                    "connection error: {}; retrying in {}ms",
                    e,
                    endpoint.reconnect_delay.as_millis()
                );
                tokio::time::sleep(endpoint.reconnect_delay).await;
            }
        }
    }
}
