//! Lobby membership, role assignment and per-lobby worlds.

use crate::game::LobbyWorld;
use log::info;
use shared::{
    validate_player_name, EntityKind, EntityState, InputFrame, LobbyInfo, LobbyPlayer,
    LobbyStatus, Role, RoomCode, ValidationError, MAX_PLAYERS,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors returned by lobby registry operations. The display text is sent to
/// the client verbatim in an `ERROR` message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("Lobby is full")]
    Full,
    #[error("Not in a lobby")]
    NotInLobby,
    #[error("Role already taken")]
    RoleTaken,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Last pose a pilot reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: [f32; 3],
    pub pitch: f32,
    pub yaw: f32,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: u32,
    pub name: String,
    pub role: Option<Role>,
    pub pose: Option<Pose>,
}

impl Member {
    fn ship(&self) -> Option<EntityState> {
        let pose = self.pose?;
        let [x, y, z] = pose.position;
        let mut ship = EntityState::new(self.id, EntityKind::Player, x, y, z);
        ship.pitch = Some(pose.pitch);
        ship.yaw = Some(pose.yaw);
        ship.role = self.role;
        Some(ship)
    }
}

/// One room: members in join order plus its world.
#[derive(Debug)]
pub struct Lobby {
    code: String,
    members: Vec<Member>,
    world: LobbyWorld,
}

impl Lobby {
    fn new(code: String) -> Self {
        Self {
            code,
            members: Vec::new(),
            world: LobbyWorld::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<u32> {
        self.members.iter().map(|m| m.id).collect()
    }

    fn member_mut(&mut self, id: u32) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    pub fn status(&self) -> LobbyStatus {
        if self.members.len() < MAX_PLAYERS {
            return LobbyStatus::Waiting;
        }
        let has = |role| self.members.iter().any(|m| m.role == Some(role));
        if has(Role::Shooter) && has(Role::Hauler) {
            LobbyStatus::Playing
        } else {
            LobbyStatus::Full
        }
    }

    pub fn info(&self) -> LobbyInfo {
        LobbyInfo {
            code: self.code.clone(),
            players: self
                .members
                .iter()
                .map(|m| LobbyPlayer {
                    id: m.id,
                    name: m.name.clone(),
                    role: m.role,
                    connected: true,
                })
                .collect(),
            max_players: MAX_PLAYERS,
            status: self.status(),
        }
    }

    /// Full STATE snapshot: asteroids plus every ship with a reported pose.
    pub fn snapshot(&mut self) -> shared::ServerMessage {
        let ships = self.members.iter().filter_map(Member::ship).collect();
        self.world.snapshot(ships)
    }
}

#[derive(Debug, Default)]
pub struct LobbyRegistry {
    lobbies: HashMap<String, Lobby>,
    membership: HashMap<u32, String>,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: &str) -> Option<&Lobby> {
        self.lobbies.get(code)
    }

    pub fn lobby_of(&self, player_id: u32) -> Option<&str> {
        self.membership.get(&player_id).map(String::as_str)
    }

    pub fn codes(&self) -> Vec<String> {
        self.lobbies.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Adds the player to the room, leaving any previous room first. Returns
    /// the joined code and, when the player moved, the code of the room they
    /// left if it still has members.
    pub fn join(
        &mut self,
        player_id: u32,
        name: &str,
        code: &str,
    ) -> Result<(String, Option<String>), LobbyError> {
        let name = validate_player_name(name)?;
        let code = RoomCode::parse(code)?.to_string();

        if let Some(lobby) = self.lobbies.get(&code) {
            let others = lobby.members.iter().filter(|m| m.id != player_id).count();
            if others >= MAX_PLAYERS {
                return Err(LobbyError::Full);
            }
        }

        let left = self.leave(player_id).filter(|previous| previous != &code);

        let lobby = self
            .lobbies
            .entry(code.clone())
            .or_insert_with(|| Lobby::new(code.clone()));
        lobby.members.push(Member {
            id: player_id,
            name: name.clone(),
            role: None,
            pose: None,
        });
        self.membership.insert(player_id, code.clone());

        info!("Client {} ({}) joined lobby {}", player_id, name, code);
        Ok((code, left))
    }

    /// Removes the player from their room and drops the room once empty.
    /// Returns the code of the room if it still has members.
    pub fn leave(&mut self, player_id: u32) -> Option<String> {
        let code = self.membership.remove(&player_id)?;
        let lobby = self.lobbies.get_mut(&code)?;
        lobby.members.retain(|m| m.id != player_id);

        if lobby.members.is_empty() {
            info!("Lobby {} is empty; closing it", code);
            self.lobbies.remove(&code);
            None
        } else {
            Some(code)
        }
    }

    /// Returns the code of the room whose roster changed.
    pub fn select_role(&mut self, player_id: u32, role: Role) -> Result<String, LobbyError> {
        let code = self
            .membership
            .get(&player_id)
            .cloned()
            .ok_or(LobbyError::NotInLobby)?;
        let lobby = self.lobbies.get_mut(&code).ok_or(LobbyError::NotInLobby)?;

        if lobby.info().role_taken(role, Some(player_id)) {
            return Err(LobbyError::RoleTaken);
        }

        let member = lobby.member_mut(player_id).ok_or(LobbyError::NotInLobby)?;
        member.role = Some(role);
        info!("Client {} ({}) selected role: {}", player_id, member.name, role);
        Ok(code)
    }

    /// Stores the reported pose, if the frame carries one.
    pub fn record_input(&mut self, player_id: u32, frame: &InputFrame) -> bool {
        let code = match self.membership.get(&player_id) {
            Some(code) => code,
            None => return false,
        };
        let member = match self
            .lobbies
            .get_mut(code)
            .and_then(|lobby| lobby.member_mut(player_id))
        {
            Some(member) => member,
            None => return false,
        };

        if let Some(position) = frame.position() {
            member.pose = Some(Pose {
                position,
                pitch: frame.pitch,
                yaw: frame.yaw,
            });
        }
        true
    }

    pub fn lobbies_mut(&mut self) -> impl Iterator<Item = &mut Lobby> {
        self.lobbies.values_mut()
    }
}
