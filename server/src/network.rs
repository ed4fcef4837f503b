//! Server network layer handling WebSocket connections and the hub loop

use crate::client_manager::ClientManager;
use crate::lobby::LobbyRegistry;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Events sent from connection tasks to the hub loop
#[derive(Debug)]
pub enum HubEvent {
    Connected {
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<String>,
        /// Answered with the assigned player ID, or None when the hub is full.
        reply: oneshot::Sender<Option<u32>>,
    },
    Frame {
        client_id: u32,
        text: String,
    },
    Disconnected {
        client_id: u32,
    },
}

/// Lobby hub: owns every connection, lobby and world
pub struct Server {
    listener: TcpListener,
    clients: ClientManager,
    lobbies: LobbyRegistry,
    tick_duration: Duration,

    events_tx: mpsc::UnboundedSender<HubEvent>,
    events_rx: mpsc::UnboundedReceiver<HubEvent>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            clients: ClientManager::new(max_clients),
            lobbies: LobbyRegistry::new(),
            tick_duration,
            events_tx,
            events_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn lobbies(&self) -> &LobbyRegistry {
        &self.lobbies
    }

    /// Registers a connection. Sends WELCOME, or ERROR when the hub is full.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Option<u32> {
        match self.clients.add_client(addr, outbound.clone()) {
            Some(client_id) => {
                self.clients
                    .send_to(client_id, &ServerMessage::Welcome { player_id: client_id });
                Some(client_id)
            }
            None => {
                warn!("Rejecting {}: server full", addr);
                let full = ServerMessage::Error {
                    error: "Server full".to_string(),
                };
                if let Ok(text) = full.to_json() {
                    let _ = outbound.send(text);
                }
                None
            }
        }
    }

    pub fn unregister(&mut self, client_id: u32) {
        if !self.clients.remove_client(&client_id) {
            return;
        }
        if let Some(code) = self.lobbies.leave(client_id) {
            self.broadcast_lobby_update(&code);
        }
    }

    /// Processes one text frame from a registered client
    pub fn handle_frame(&mut self, client_id: u32, text: &str) {
        self.clients.touch(client_id);

        let message = match ClientMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid message from client {}: {}", client_id, e);
                self.send_error(client_id, "Invalid message");
                return;
            }
        };

        match message {
            ClientMessage::Join { lobby, player_name } => {
                match self.lobbies.join(client_id, &player_name, &lobby) {
                    Ok((code, left)) => {
                        if let Some(previous) = left {
                            self.broadcast_lobby_update(&previous);
                        }
                        self.broadcast_lobby_update(&code);
                    }
                    Err(e) => self.send_error(client_id, &e.to_string()),
                }
            }

            ClientMessage::RoleSelect { role } => match self.lobbies.select_role(client_id, role) {
                Ok(code) => self.broadcast_lobby_update(&code),
                Err(e) => self.send_error(client_id, &e.to_string()),
            },

            ClientMessage::Input(frame) => {
                self.clients.record_input(client_id, frame.seq);
                self.lobbies.record_input(client_id, &frame);
            }
        }
    }

    fn send_error(&self, client_id: u32, error: &str) {
        debug!("Sending error to client {}: {}", client_id, error);
        self.clients.send_to(
            client_id,
            &ServerMessage::Error {
                error: error.to_string(),
            },
        );
    }

    fn broadcast_lobby_update(&self, code: &str) {
        if let Some(lobby) = self.lobbies.get(code) {
            let message = ServerMessage::LobbyUpdate { lobby: lobby.info() };
            self.clients.send_to_all(&lobby.member_ids(), &message);
        }
    }

    /// Sends every lobby a full snapshot of its world
    pub fn broadcast_state(&mut self) {
        for lobby in self.lobbies.lobbies_mut() {
            let snapshot = lobby.snapshot();
            self.clients.send_to_all(&lobby.member_ids(), &snapshot);
        }
    }

    fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected {
                addr,
                outbound,
                reply,
            } => {
                let client_id = self.register(addr, outbound);
                let _ = reply.send(client_id);
            }
            HubEvent::Frame { client_id, text } => self.handle_frame(client_id, &text),
            HubEvent::Disconnected { client_id } => self.unregister(client_id),
        }
    }

    /// Main hub loop accepting connections, routing frames and broadcasting state
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_connection(stream, addr, self.events_tx.clone()));
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },

                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                },

                _ = tick_interval.tick() => {
                    self.broadcast_state();
                },
            }
        }
    }
}

/// Upgrades the socket, then shuttles frames between it and the hub
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<HubEvent>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut sink, mut source) = ws.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (reply_tx, reply_rx) = oneshot::channel();
    let registered = events.send(HubEvent::Connected {
        addr,
        outbound: outbound_tx,
        reply: reply_tx,
    });
    if registered.is_err() {
        return;
    }

    let client_id = match reply_rx.await {
        Ok(Some(client_id)) => client_id,
        _ => {
            // Flush the rejection before closing.
            while let Ok(text) = outbound_rx.try_recv() {
                let _ = sink.send(Message::Text(text.into())).await;
            }
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            queued = outbound_rx.recv() => match queued {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        debug!("Write to client {} failed: {}", client_id, e);
                        break;
                    }
                }
                None => break,
            },

            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let frame = HubEvent::Frame {
                        client_id,
                        text: text.as_str().to_owned(),
                    };
                    if events.send(frame).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Read from client {} failed: {}", client_id, e);
                    break;
                }
            },
        }
    }

    let _ = events.send(HubEvent::Disconnected { client_id });
}
