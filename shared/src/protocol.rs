//! JSON wire messages exchanged over the game socket.
//!
//! Every frame is a text frame holding one object discriminated by its `type`
//! field. Field names follow the browser client's camelCase convention.

use serde::{Deserialize, Deserializer, Serialize};

/// Gameplay archetype, exclusively held by one roster member each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Shooter,
    Hauler,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Shooter => "shooter",
            Role::Hauler => "hauler",
        }
    }

    /// The role the other roster member has to take.
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Shooter => Role::Hauler,
            Role::Hauler => Role::Shooter,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shooter" => Ok(Role::Shooter),
            "hauler" => Ok(Role::Hauler),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Accepts `"shooter"`, `"hauler"`, `null` or `""` (unassigned).
fn optional_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// A `null` entity list is an empty snapshot.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<EntityState>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<EntityState>> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    Waiting,
    Playing,
    Full,
}

/// Roster entry inside a `LOBBY_UPDATE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub id: u32,
    pub name: String,
    #[serde(default, deserialize_with = "optional_role")]
    pub role: Option<Role>,
    #[serde(default)]
    pub connected: bool,
}

/// Full roster snapshot. Replaces any previously held lobby wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyInfo {
    pub code: String,
    pub players: Vec<LobbyPlayer>,
    #[serde(rename = "maxPlayers")]
    pub max_players: usize,
    pub status: LobbyStatus,
}

impl LobbyInfo {
    pub fn player(&self, id: u32) -> Option<&LobbyPlayer> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// Whether `role` is held by anyone other than `except`.
    pub fn role_taken(&self, role: Role, except: Option<u32>) -> bool {
        self.players
            .iter()
            .any(|p| p.role == Some(role) && Some(p.id) != except)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Player,
    Asteroid,
    Mineral,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One entity inside a `STATE` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: u32,
    #[serde(rename = "type", default)]
    pub kind: EntityKind,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f32>,
    #[serde(
        default,
        deserialize_with = "optional_role",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Role>,
}

impl EntityState {
    pub fn new(id: u32, kind: EntityKind, x: f32, y: f32, z: f32) -> Self {
        Self {
            id,
            kind,
            x,
            y,
            z,
            pitch: None,
            yaw: None,
            role: None,
        }
    }
}

/// Control sample streamed by the client at up to the input send rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    pub seq: u64,
    pub throttle: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub fire: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tractor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
}

impl InputFrame {
    pub fn position(&self) -> Option<[f32; 3]> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        }
    }
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "JOIN")]
    Join {
        lobby: String,
        #[serde(rename = "playerName")]
        player_name: String,
    },
    #[serde(rename = "ROLE_SELECT")]
    RoleSelect { role: Role },
    #[serde(rename = "INPUT")]
    Input(InputFrame),
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "WELCOME")]
    Welcome {
        #[serde(rename = "playerId")]
        player_id: u32,
    },
    #[serde(rename = "STATE")]
    State {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(default, deserialize_with = "null_as_empty")]
        entities: Vec<EntityState>,
    },
    #[serde(rename = "LOBBY_UPDATE")]
    LobbyUpdate { lobby: LobbyInfo },
    #[serde(rename = "ERROR")]
    Error { error: String },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
