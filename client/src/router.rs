//! Decodes inbound frames and picks the component that handles them.

use crate::error::ClientError;
use log::debug;
use shared::{EntityState, LobbyInfo, ServerMessage};

/// The single destination of a decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Full world snapshot for the reconciler.
    Snapshot(Vec<EntityState>),
    /// Full roster snapshot for the session.
    Lobby(LobbyInfo),
    /// Identity assignment for the session.
    Identity(u32),
    /// Server refusal of the last request, for the session.
    Rejection(String),
    /// Unrecognized; already logged.
    Dropped,
}

/// Parses a text frame. Malformed payloads are reported, never fatal.
pub fn decode(payload: &str) -> Result<ServerMessage, ClientError> {
    Ok(ServerMessage::from_json(payload)?)
}

pub fn route(message: ServerMessage) -> Route {
    match message {
        ServerMessage::State { entities, .. } => Route::Snapshot(entities),
        ServerMessage::LobbyUpdate { lobby } => Route::Lobby(lobby),
        ServerMessage::Welcome { player_id } => Route::Identity(player_id),
        ServerMessage::Error { error } => Route::Rejection(error),
        ServerMessage::Unknown => {
            debug!("Received message of unrecognized type; dropping");
            Route::Dropped
        }
    }
}
