//! # Network Transport
//!
//! The pipeline only needs a handful of things from the network: is the link
//! up, hand this payload to the broker, tell me what arrived, and try to
//! reconnect. [`Transport`] captures exactly that, and every call returns
//! immediately.
//!
//! ## Implementations
//! - [`MqttTransport`]: rumqttc client. The network event loop runs as a tokio
//!   task; the control loop talks to it through an atomic connectivity flag, a
//!   reconnect [`Notify`] and a channel of inbound messages.
//! - [`MemoryTransport`]: in-process double that records what was published,
//!   with scriptable connectivity and failures. Used by the tests and by the
//!   `--stdout` development mode.

use crate::config::MqttConfig;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

/// Errors a transport can report for a single operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The link is down; nothing was sent
    #[error("not connected")]
    NotConnected,

    /// The transport refused the message (queue full, injected failure, ...)
    #[error("publish rejected: {0}")]
    Rejected(String),

    /// The underlying client failed
    #[error("client error: {0}")]
    Client(String),
}

/// A message delivered by the broker on a subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe link with observable connectivity.
pub trait Transport {
    /// Current connectivity as last observed.
    fn is_connected(&self) -> bool;

    /// Hand `payload` to the broker on `topic`.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to `topic`, now and after every reconnect.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Messages that arrived since the last call.
    fn poll(&mut self) -> Vec<InboundMessage>;

    /// Start one reconnection attempt. Returns without waiting for the outcome.
    fn reconnect(&mut self) -> Result<(), TransportError>;
}

// ----------------------------------------------------------------------------
// MQTT (rumqttc)
// ----------------------------------------------------------------------------

/// rumqttc-backed transport. Create with [`MqttTransport::spawn`].
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    reconnect: Arc<Notify>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

impl MqttTransport {
    /// Build the client and spawn its network event loop on `runtime`.
    ///
    /// The first connection attempt starts right away. After a failure the
    /// event loop stays idle until [`Transport::reconnect`] is called, so the
    /// reconnect cadence is owned by the caller.
    pub fn spawn(runtime: &tokio::runtime::Handle, config: &MqttConfig, client_id: &str) -> Self {
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, config.queue_capacity);
        let connected = Arc::new(AtomicBool::new(false));
        let reconnect = Arc::new(Notify::new());
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        runtime.spawn(run_event_loop(
            eventloop,
            client.clone(),
            Arc::clone(&connected),
            Arc::clone(&reconnect),
            Arc::clone(&subscriptions),
            tx,
        ));

        info!(host = %config.host, port = config.port, client_id, "mqtt client started");

        Self {
            client,
            connected,
            reconnect,
            subscriptions,
            inbound: rx,
        }
    }
}

impl Transport for MqttTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e| TransportError::Client(e.to_string()))
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(topic.to_string());

        // Otherwise the ConnAck handler picks it up
        if self.is_connected() {
            self.client
                .try_subscribe(topic, QoS::AtLeastOnce)
                .map_err(|e| TransportError::Client(e.to_string()))?;
        }
        Ok(())
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnect.notify_one();
        Ok(())
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    reconnect: Arc<Notify>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");

                // Re-subscribe on every (re)connect, the broker may have dropped our session
                let topics = subscriptions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for topic in topics {
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        error!(topic = %topic, "subscribe failed: {e}");
                    }
                }
                connected.store(true, Ordering::SeqCst);
            }

            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if inbound.send(message).is_err() {
                    debug!("control loop gone, stopping mqtt event loop");
                    return;
                }
            }

            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected by broker");
                connected.store(false, Ordering::SeqCst);
            }

            Ok(_) => {}

            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    warn!("mqtt connection lost: {e}");
                } else {
                    debug!("mqtt connection attempt failed: {e}");
                }
                reconnect.notified().await;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// In-memory transport
// ----------------------------------------------------------------------------

/// In-process transport that records every published message.
///
/// # Example
/// ```
/// use greenhouse_lib::transport::{MemoryTransport, Transport};
///
/// let mut transport = MemoryTransport::new(true);
/// transport.publish("greenhouse/x/telemetry", b"{}").unwrap();
///
/// transport.set_connected(false);
/// assert!(transport.publish("greenhouse/x/telemetry", b"{}").is_err());
/// assert_eq!(transport.published().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryTransport {
    connected: bool,
    connect_on_reconnect: bool,
    successes_left: Option<usize>,
    published: Vec<InboundMessage>,
    subscriptions: Vec<String>,
    inbound: VecDeque<InboundMessage>,
    reconnect_attempts: usize,
    echo: bool,
}

impl MemoryTransport {
    pub fn new(connected: bool) -> Self {
        Self {
            connected,
            ..Default::default()
        }
    }

    /// Print each published payload to stdout instead of recording it (development mode).
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Make every [`Transport::reconnect`] call bring the link up.
    pub fn with_auto_reconnect(mut self) -> Self {
        self.connect_on_reconnect = true;
        self
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Let `successes` more publishes through, then reject the rest.
    pub fn fail_after(&mut self, successes: usize) {
        self.successes_left = Some(successes);
    }

    /// Stop rejecting publishes.
    pub fn clear_failures(&mut self) {
        self.successes_left = None;
    }

    /// Queue a message for the next [`Transport::poll`].
    pub fn inject(&mut self, topic: &str, payload: &[u8]) {
        self.inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> &[InboundMessage] {
        &self.published
    }

    /// Published payloads parsed as JSON. Non-JSON payloads become `Null`.
    pub fn published_json(&self) -> Vec<serde_json::Value> {
        self.published
            .iter()
            .map(|m| serde_json::from_slice(&m.payload).unwrap_or(serde_json::Value::Null))
            .collect()
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    pub fn reconnect_attempts(&self) -> usize {
        self.reconnect_attempts
    }
}

impl Transport for MemoryTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(left) = self.successes_left.as_mut() {
            if *left == 0 {
                return Err(TransportError::Rejected("injected failure".to_string()));
            }
            *left -= 1;
        }

        if self.echo {
            println!("{topic} {}", String::from_utf8_lossy(payload));
            return Ok(());
        }
        self.published.push(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        self.inbound.drain(..).collect()
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.reconnect_attempts += 1;
        if self.connect_on_reconnect {
            self.connected = true;
        }
        Ok(())
    }
}
