use shared::ValidationError;
use thiserror::Error;

/// Everything the synchronization core can report to the UI layer.
///
/// None of these are fatal to the host: they are delivered through
/// [`SessionListener::on_error`](crate::presentation::SessionListener::on_error)
/// (or returned synchronously for [`ClientError::Validation`]) and the run loop
/// keeps going.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not be established or dropped. Reconnection follows.
    #[error("Connection failed. Please check if the server is running ({0})")]
    Transport(String),
    /// Terminal for the session until a manual retry.
    #[error("Failed to reconnect after {attempts} attempts. Please restart the client.")]
    ReconnectExhausted { attempts: u32 },
    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Precondition(#[from] Precondition),
    /// The server refused a request (lobby full, role taken, ...).
    #[error("Server rejected request: {0}")]
    ServerRejected(String),
}

impl ClientError {
    /// Whether the session can keep going without user action.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ClientError::ReconnectExhausted { .. })
    }
}

/// An operation was invoked in a state that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("Not connected to server")]
    NotConnected,
    #[error("Already in a lobby")]
    AlreadyJoined,
    #[error("Join a lobby first")]
    NotInLobby,
    #[error("The game has already started")]
    AlreadyInGame,
    #[error("Both a shooter and a hauler are needed to start")]
    NotReady,
}
