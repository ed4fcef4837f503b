//! Connection channel: owns at most one WebSocket and the reconnection policy.
//!
//! Every transport is opened under a fresh *generation*. The socket task and
//! the reconnect timers tag each event they emit with the generation they were
//! created for, and [`Connection::handle_event`] drops anything that does not
//! match the current one. Bumping the generation in [`Connection::connect`] and
//! [`Connection::disconnect`] is therefore enough to silence a discarded
//! socket and any retry scheduled against it.

use crate::config::ReconnectPolicy;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ClientMessage;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Raw events delivered to the owner of a [`Connection`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened { generation: Generation },
    Text { generation: Generation, payload: String },
    /// Transport went away after opening. `reason` is set for abnormal closes.
    Closed {
        generation: Generation,
        reason: Option<String>,
    },
    /// Transport never opened.
    Failed { generation: Generation, reason: String },
    RetryDue { generation: Generation },
}

impl ChannelEvent {
    pub fn generation(&self) -> Generation {
        match self {
            ChannelEvent::Opened { generation }
            | ChannelEvent::Text { generation, .. }
            | ChannelEvent::Closed { generation, .. }
            | ChannelEvent::Failed { generation, .. }
            | ChannelEvent::RetryDue { generation } => *generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Retry {
    Scheduled { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

/// What a current-generation event means for the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutput {
    Opened,
    Message(String),
    Lost {
        failure: Option<String>,
        retry: Retry,
    },
}

/// Write side of an opened (or opening) transport. Dropping it closes the socket.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<String>,
}

impl TransportHandle {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self { outbound }
    }

    fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }
}

/// Opens transports. The real implementation is [`WsConnector`].
pub trait Connector {
    fn open(
        &mut self,
        url: &str,
        generation: Generation,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> TransportHandle;
}

/// Connects with `tokio-tungstenite` and pumps frames on a spawned task.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &mut self,
        url: &str,
        generation: Generation,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> TransportHandle {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(url.to_string(), generation, events, outbound_rx));
        TransportHandle::new(outbound_tx)
    }
}

async fn run_socket(
    url: String,
    generation: Generation,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let _ = events.send(ChannelEvent::Failed {
                generation,
                reason: e.to_string(),
            });
            return;
        }
    };

    if events.send(ChannelEvent::Opened { generation }).is_err() {
        return;
    }

    let (mut sink, mut source) = stream.split();
    let mut reason = None;

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        reason = Some(e.to_string());
                        break;
                    }
                }
                None => {
                    // Handle dropped by the owner; nobody listens to this generation anymore.
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },

            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(ChannelEvent::Text {
                        generation,
                        payload: text.as_str().to_owned(),
                    });
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    reason = Some(e.to_string());
                    break;
                }
            },
        }
    }

    let _ = events.send(ChannelEvent::Closed { generation, reason });
}

/// Best-effort, non-queuing channel to the game server.
pub struct Connection<C: Connector = WsConnector> {
    url: String,
    policy: ReconnectPolicy,
    connector: C,
    state: ConnectionState,
    handle: Option<TransportHandle>,
    generation: Generation,
    /// Opens attempted since the last successful one.
    attempts: u32,
    exhausted: bool,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl<C: Connector> Connection<C> {
    /// Creates a disconnected channel and the receiver its events arrive on.
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        connector: C,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = Self {
            url: url.into(),
            policy,
            connector,
            state: ConnectionState::Disconnected,
            handle: None,
            generation: 0,
            attempts: 0,
            exhausted: false,
            events_tx,
        };
        (connection, events_rx)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Starts a new transport, discarding the previous one and its callbacks.
    pub fn connect(&mut self) {
        self.generation += 1;
        self.handle = None;
        self.attempts += 1;
        self.state = ConnectionState::Connecting;

        info!(
            "Connecting to {} (attempt {}/{})",
            self.url, self.attempts, self.policy.max_attempts
        );

        let handle = self
            .connector
            .open(&self.url, self.generation, self.events_tx.clone());
        self.handle = Some(handle);
    }

    /// Manual retry after the policy gave up.
    pub fn retry(&mut self) {
        self.attempts = 0;
        self.exhausted = false;
        self.connect();
    }

    /// Transmits while connected; silently drops the message otherwise.
    pub fn send(&self, message: &ClientMessage) -> bool {
        let handle = match (&self.handle, self.state) {
            (Some(handle), ConnectionState::Connected) => handle,
            _ => {
                debug!("Dropping outbound message while {:?}", self.state);
                return false;
            }
        };

        match message.to_json() {
            Ok(text) => handle.send(text),
            Err(e) => {
                warn!("Failed to encode outbound message: {}", e);
                false
            }
        }
    }

    /// Closes the transport. Idempotent, and never followed by an automatic reconnect.
    pub fn disconnect(&mut self) {
        self.generation += 1;
        if self.handle.take().is_some() {
            info!("Closing connection to {}", self.url);
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn handle_event(&mut self, event: ChannelEvent) -> Option<ChannelOutput> {
        if event.generation() != self.generation {
            debug!(
                "Ignoring event from stale transport (generation {}, current {})",
                event.generation(),
                self.generation
            );
            return None;
        }

        match event {
            ChannelEvent::Opened { .. } => {
                if self.state != ConnectionState::Connecting {
                    return None;
                }
                info!("Connected to {}", self.url);
                self.state = ConnectionState::Connected;
                self.attempts = 0;
                self.exhausted = false;
                Some(ChannelOutput::Opened)
            }

            ChannelEvent::Text { payload, .. } => {
                if self.state == ConnectionState::Connected {
                    Some(ChannelOutput::Message(payload))
                } else {
                    None
                }
            }

            ChannelEvent::Closed { reason, .. } => {
                if self.state == ConnectionState::Disconnected {
                    return None;
                }
                match &reason {
                    Some(reason) => warn!("Connection lost: {}", reason),
                    None => info!("Disconnected from server"),
                }
                Some(self.on_lost(reason))
            }

            ChannelEvent::Failed { reason, .. } => {
                if self.state == ConnectionState::Disconnected {
                    return None;
                }
                warn!("Failed to connect to {}: {}", self.url, reason);
                Some(self.on_lost(Some(reason)))
            }

            ChannelEvent::RetryDue { .. } => {
                if self.state == ConnectionState::Disconnected && !self.exhausted {
                    self.connect();
                }
                None
            }
        }
    }

    fn on_lost(&mut self, failure: Option<String>) -> ChannelOutput {
        self.handle = None;
        self.state = ConnectionState::Disconnected;

        let retry = if self.attempts < self.policy.max_attempts {
            let attempt = self.attempts + 1;
            let delay = self.policy.interval;
            self.schedule_retry(delay);
            info!(
                "Attempting to reconnect in {:?}... ({}/{})",
                delay, attempt, self.policy.max_attempts
            );
            Retry::Scheduled { attempt, delay }
        } else {
            self.exhausted = true;
            error!(
                "Giving up on {} after {} failed attempts",
                self.url, self.attempts
            );
            Retry::Exhausted {
                attempts: self.attempts,
            }
        };

        ChannelOutput::Lost { failure, retry }
    }

    fn schedule_retry(&self, delay: Duration) {
        let generation = self.generation;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ChannelEvent::RetryDue { generation });
        });
    }
}
