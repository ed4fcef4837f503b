//! Connection registry for the lobby hub
//!
//! This module tracks every WebSocket connection the hub has accepted:
//! - Player ID assignment and server capacity enforcement
//! - The outbound queue of each connection's writer task
//! - The last input sequence stamp reported by each player
//!
//! Lobby membership and roles live in [`crate::lobby`]; this registry only
//! knows how to reach a player.

use log::{debug, info, warn};
use shared::ServerMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// Represents a connected player and the way to reach them
#[derive(Debug)]
pub struct Client {
    /// Unique player identifier assigned by the hub
    pub id: u32,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Last time we received any frame from this client
    pub last_seen: Instant,
    /// Highest input sequence stamp seen so far
    pub last_input_seq: u64,
    outbound: mpsc::UnboundedSender<String>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_input_seq: 0,
            outbound,
        }
    }

    /// Queues a text frame for the connection's writer task
    ///
    /// Returns false when the writer is already gone; the read side will
    /// report the disconnect shortly after.
    pub fn send_text(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }
}

/// Manages all connected players
///
/// Player IDs start from 1 and are never reused while the hub is running,
/// so a stale ID from a dropped connection can never address a newer player.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available player ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent connections allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to register a new connection
    ///
    /// Returns Some(player_id) if successful, None if the hub is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, outbound));

        Some(client_id)
    }

    /// Removes a client from the hub
    ///
    /// Dropping the record drops the outbound sender, which ends the
    /// connection's writer task. Returns false if the client was already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Marks the client as active
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Records the sequence stamp of an input frame
    ///
    /// Stamps are kept monotonic: a late frame never lowers the stored value.
    /// Returns false if the client ID is invalid.
    pub fn record_input(&mut self, client_id: u32, seq: u64) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.last_seen = Instant::now();
                if seq < client.last_input_seq {
                    debug!(
                        "Client {} sent out-of-order input {} (last {})",
                        client_id, seq, client.last_input_seq
                    );
                }
                client.last_input_seq = client.last_input_seq.max(seq);
                true
            }
            None => false,
        }
    }

    /// Serializes and queues a message for one client
    pub fn send_to(&self, client_id: u32, message: &ServerMessage) -> bool {
        let client = match self.clients.get(&client_id) {
            Some(client) => client,
            None => return false,
        };

        match message.to_json() {
            Ok(text) => client.send_text(text),
            Err(e) => {
                warn!("Failed to encode message for client {}: {}", client_id, e);
                false
            }
        }
    }

    /// Serializes once and queues the message for every listed client
    pub fn send_to_all(&self, client_ids: &[u32], message: &ServerMessage) -> usize {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode broadcast: {}", e);
                return 0;
            }
        };

        client_ids
            .iter()
            .filter_map(|id| self.clients.get(id))
            .filter(|client| client.send_text(text.clone()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }
}
