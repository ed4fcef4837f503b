//! Session & lobby state.
//!
//! The client is never authoritative over membership: joining only sends a
//! request, and the stored lobby changes when the next `LOBBY_UPDATE` arrives.
//! The lobby phase is recomputed from the latest roster every time it is read.

use crate::error::{ClientError, Precondition};
use log::{info, warn};
use shared::{validate_player_name, ClientMessage, LobbyInfo, Role, RoomCode, MAX_PLAYERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyPhase {
    Unjoined,
    /// Joined, roster not full yet.
    Waiting,
    /// Roster full, roles incomplete.
    RoleSelecting,
    /// Roster full with exactly one shooter and one hauler.
    Ready,
    InGame,
}

/// Pure phase derivation from the latest roster snapshot.
pub fn derive_phase(lobby: Option<&LobbyInfo>, in_game: bool) -> LobbyPhase {
    if in_game {
        return LobbyPhase::InGame;
    }
    let lobby = match lobby {
        Some(lobby) => lobby,
        None => return LobbyPhase::Unjoined,
    };
    if lobby.players.len() != MAX_PLAYERS {
        return LobbyPhase::Waiting;
    }

    let holders = |role| lobby.players.iter().filter(|p| p.role == Some(role)).count();
    if holders(Role::Shooter) == 1 && holders(Role::Hauler) == 1 {
        LobbyPhase::Ready
    } else {
        LobbyPhase::RoleSelecting
    }
}

/// Locally intended role next to the one the server last confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct RoleSlot {
    intended: Option<Role>,
    confirmed: Option<Role>,
    /// A ROLE_SELECT is in flight.
    pending: bool,
}

impl RoleSlot {
    fn effective(&self) -> Option<Role> {
        if self.pending {
            self.intended
        } else {
            self.confirmed
        }
    }

    fn confirm(&mut self, role: Option<Role>) {
        self.confirmed = role;
        if !self.pending || self.intended == role {
            self.intended = role;
            self.pending = false;
        }
    }

    fn roll_back(&mut self) -> Option<Role> {
        if !self.pending {
            return None;
        }
        let dropped = self.intended;
        self.intended = self.confirmed;
        self.pending = false;
        dropped
    }
}

/// Read model handed to the lobby UI.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyView {
    pub phase: LobbyPhase,
    pub lobby: Option<LobbyInfo>,
    pub player_id: Option<u32>,
    pub intended_role: Option<Role>,
    pub confirmed_role: Option<Role>,
}

impl LobbyView {
    pub fn role_pending(&self) -> bool {
        self.intended_role != self.confirmed_role
    }

    /// Roles nobody else in the roster holds.
    pub fn available_roles(&self) -> Vec<Role> {
        let lobby = match &self.lobby {
            Some(lobby) => lobby,
            None => return Vec::new(),
        };
        [Role::Shooter, Role::Hauler]
            .into_iter()
            .filter(|role| !lobby.role_taken(*role, self.player_id))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Session {
    player_name: Option<String>,
    player_id: Option<u32>,
    lobby: Option<LobbyInfo>,
    role: RoleSlot,
    in_game: bool,
    /// Room the server last confirmed us in.
    last_room: Option<RoomCode>,
    /// Room of a JOIN the server has not answered yet.
    pending_room: Option<RoomCode>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> LobbyPhase {
        derive_phase(self.lobby.as_ref(), self.in_game)
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    pub fn lobby(&self) -> Option<&LobbyInfo> {
        self.lobby.as_ref()
    }

    pub fn last_room(&self) -> Option<&RoomCode> {
        self.last_room.as_ref()
    }

    pub fn pending_room(&self) -> Option<&RoomCode> {
        self.pending_room.as_ref()
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    /// The role the input pump gates on: the intended one while a selection
    /// is in flight, the confirmed one otherwise.
    pub fn effective_role(&self) -> Option<Role> {
        self.role.effective()
    }

    pub fn confirmed_role(&self) -> Option<Role> {
        self.role.confirmed
    }

    pub fn view(&self) -> LobbyView {
        LobbyView {
            phase: self.phase(),
            lobby: self.lobby.clone(),
            player_id: self.player_id,
            intended_role: self.role.intended,
            confirmed_role: self.role.confirmed,
        }
    }

    /// Validates the request and builds the JOIN to send. Membership itself
    /// only changes on the next lobby update.
    pub fn join_lobby(
        &mut self,
        connected: bool,
        code: &str,
        name: &str,
    ) -> Result<ClientMessage, ClientError> {
        let name = validate_player_name(name)?;
        let code = RoomCode::parse(code)?;

        if !connected {
            return Err(Precondition::NotConnected.into());
        }
        if self.lobby.is_some() {
            return Err(Precondition::AlreadyJoined.into());
        }

        info!("Joining lobby {} as {}", code, name);
        let message = ClientMessage::Join {
            lobby: code.to_string(),
            player_name: name.clone(),
        };
        self.player_name = Some(name);
        self.pending_room = Some(code);
        Ok(message)
    }

    /// Records the role optimistically and builds the ROLE_SELECT to send.
    pub fn select_role(&mut self, connected: bool, role: Role) -> Result<ClientMessage, ClientError> {
        if !connected {
            return Err(Precondition::NotConnected.into());
        }
        if self.in_game {
            return Err(Precondition::AlreadyInGame.into());
        }
        if self.lobby.is_none() {
            return Err(Precondition::NotInLobby.into());
        }

        info!("Selecting role {}", role);
        self.role.intended = Some(role);
        self.role.pending = self.role.confirmed != Some(role);
        Ok(ClientMessage::RoleSelect { role })
    }

    pub fn assign_identity(&mut self, player_id: u32) {
        info!("Assigned player id {}", player_id);
        self.player_id = Some(player_id);
    }

    /// Replaces the stored lobby wholesale and reconciles the role slot.
    pub fn apply_lobby_update(&mut self, lobby: LobbyInfo) {
        if self.player_id.is_none() {
            // Newest roster entry carrying our name.
            if let Some(name) = &self.player_name {
                if let Some(me) = lobby.players.iter().rev().find(|p| &p.name == name) {
                    self.player_id = Some(me.id);
                }
            }
        }

        if let Some(me) = self.player_id.and_then(|id| lobby.player(id)) {
            self.role.confirm(me.role);
            let confirmed = RoomCode::parse(&lobby.code).ok();
            self.last_room = confirmed.or_else(|| self.pending_room.take());
            self.pending_room = None;
        }

        if self.role.pending {
            if let Some(intended) = self.role.intended {
                if lobby.role_taken(intended, self.player_id) {
                    warn!("Role {} was taken by another player", intended);
                    self.role.roll_back();
                }
            }
        }

        self.lobby = Some(lobby);
    }

    /// Server refused the last request. Returns the role selection that was
    /// rolled back, if any.
    pub fn reject_pending(&mut self) -> Option<Role> {
        if self.lobby.is_none() {
            // Outside a lobby the only request in flight is a JOIN (or rejoin).
            if let Some(room) = self.pending_room.take().or_else(|| self.last_room.take()) {
                warn!("Join of lobby {} rejected by server", room);
            }
        }
        let dropped = self.role.roll_back();
        if let Some(role) = dropped {
            warn!("Role selection {} rejected by server", role);
        }
        dropped
    }

    /// Enters gameplay. Returns the role to simulate with.
    pub fn start_game(&mut self) -> Result<Option<Role>, ClientError> {
        match self.phase() {
            LobbyPhase::Ready => {}
            LobbyPhase::InGame => return Err(Precondition::AlreadyInGame.into()),
            LobbyPhase::Unjoined => return Err(Precondition::NotInLobby.into()),
            _ => return Err(Precondition::NotReady.into()),
        }
        self.in_game = true;
        let role = self.effective_role();
        info!("Starting game as {:?}", role);
        Ok(role)
    }

    /// Drops everything the server has to re-establish. The chosen room, name,
    /// role and the in-game flag survive.
    pub fn on_connection_lost(&mut self) {
        self.player_id = None;
        self.lobby = None;
        self.role.confirmed = None;
        self.role.pending = false;
    }

    /// Messages that restore membership on a fresh transport.
    pub fn rejoin_messages(&mut self) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        // An unanswered JOIN is retried; a refused one was already dropped.
        let room = self.last_room.as_ref().or(self.pending_room.as_ref());
        let (name, code) = match (&self.player_name, room) {
            (Some(name), Some(code)) => (name, code),
            _ => return messages,
        };

        info!("Rejoining lobby {} as {}", code, name);
        messages.push(ClientMessage::Join {
            lobby: code.to_string(),
            player_name: name.clone(),
        });
        if let Some(role) = self.role.intended {
            self.role.pending = true;
            messages.push(ClientMessage::RoleSelect { role });
        }
        messages
    }
}
