//! Lobby UI controller.
//!
//! Turns user actions into [`UserIntent`]s for the client driver and keeps the
//! latest [`LobbyView`] plus a user-facing status line. Drawing is up to the
//! host; the headless binary runs it as an autopilot instead.

use crate::connection::ConnectionState;
use crate::error::ClientError;
use crate::presentation::SessionListener;
use crate::session::{LobbyPhase, LobbyView};
use log::{debug, info, warn};
use shared::{validate_player_name, Role, RoomCode, ValidationError, ROOM_CODE_LEN};
use tokio::sync::mpsc;

/// Requests from the UI to the client driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    Join { code: String, name: String },
    SelectRole(Role),
    StartGame,
    /// Manual reconnect after the retry policy gave up.
    Retry,
    Quit,
}

/// Uppercases room-code input, drops anything but letters and digits, and
/// caps it at the code length.
pub fn format_room_input(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(ROOM_CODE_LEN)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Autopilot {
    preferred_role: Option<Role>,
    auto_start: bool,
}

pub struct LobbyController {
    intents: mpsc::UnboundedSender<UserIntent>,
    name: String,
    room_input: String,
    connection: ConnectionState,
    view: Option<LobbyView>,
    last_error: Option<String>,
    in_game: bool,
    join_requested: bool,
    start_requested: bool,
    autopilot: Option<Autopilot>,
}

impl LobbyController {
    pub fn new(intents: mpsc::UnboundedSender<UserIntent>) -> Self {
        Self {
            intents,
            name: String::new(),
            room_input: String::new(),
            connection: ConnectionState::Disconnected,
            view: None,
            last_error: None,
            in_game: false,
            join_requested: false,
            start_requested: false,
            autopilot: None,
        }
    }

    /// Joins the room in the input box once connected, picks a role (the
    /// preferred one when free) and, if `auto_start` is set, starts the game
    /// as soon as the lobby is ready.
    pub fn with_autopilot(mut self, preferred_role: Option<Role>, auto_start: bool) -> Self {
        self.autopilot = Some(Autopilot {
            preferred_role,
            auto_start,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn room_input(&self) -> &str {
        &self.room_input
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn view(&self) -> Option<&LobbyView> {
        self.view.as_ref()
    }

    pub fn phase(&self) -> LobbyPhase {
        self.view.as_ref().map_or(LobbyPhase::Unjoined, |v| v.phase)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    pub fn set_name(&mut self, raw: &str) {
        self.name = raw.to_string();
    }

    pub fn set_room_input(&mut self, raw: &str) {
        self.room_input = format_room_input(raw);
    }

    /// Generates a fresh code and joins it.
    pub fn create_room(&mut self) -> Result<RoomCode, ValidationError> {
        let code = RoomCode::generate();
        self.room_input = code.to_string();
        self.join_room()?;
        Ok(code)
    }

    /// Validates the name and room code, then asks the driver to join.
    pub fn join_room(&mut self) -> Result<(), ValidationError> {
        let checked = validate_player_name(&self.name)
            .and_then(|name| RoomCode::parse(&self.room_input).map(|code| (name, code)));

        match checked {
            Ok((name, code)) => {
                self.last_error = None;
                self.join_requested = true;
                self.emit(UserIntent::Join {
                    code: code.to_string(),
                    name,
                });
                Ok(())
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn choose_role(&mut self, role: Role) {
        self.emit(UserIntent::SelectRole(role));
    }

    pub fn start(&mut self) {
        self.start_requested = true;
        self.emit(UserIntent::StartGame);
    }

    pub fn retry(&mut self) {
        self.last_error = None;
        self.emit(UserIntent::Retry);
    }

    pub fn quit(&mut self) {
        self.emit(UserIntent::Quit);
    }

    /// One line describing the lobby for display.
    pub fn status_line(&self) -> String {
        if let Some(error) = &self.last_error {
            return error.clone();
        }
        if self.connection != ConnectionState::Connected && !self.in_game {
            return match self.connection {
                ConnectionState::Connecting => "Connecting...".to_string(),
                _ => "Disconnected".to_string(),
            };
        }

        let view = match &self.view {
            Some(view) => view,
            None => return "Not in a lobby".to_string(),
        };
        let players = view.lobby.as_ref().map_or(0, |l| l.players.len());
        let code = view.lobby.as_ref().map_or("", |l| l.code.as_str());
        match view.phase {
            LobbyPhase::Unjoined => "Not in a lobby".to_string(),
            LobbyPhase::Waiting => format!("Room {}: waiting for players ({}/2)", code, players),
            LobbyPhase::RoleSelecting => format!("Room {}: choose your roles", code),
            LobbyPhase::Ready => format!("Room {}: ready to launch", code),
            LobbyPhase::InGame => "In game".to_string(),
        }
    }

    fn emit(&self, intent: UserIntent) {
        debug!("User intent: {:?}", intent);
        if self.intents.send(intent).is_err() {
            debug!("Client driver is gone; dropping intent");
        }
    }

    fn drive_autopilot(&mut self) {
        let autopilot = match self.autopilot {
            Some(autopilot) => autopilot,
            None => return,
        };
        let (phase, intended, available) = match &self.view {
            Some(view) => (view.phase, view.intended_role, view.available_roles()),
            None => return,
        };

        match phase {
            LobbyPhase::Waiting | LobbyPhase::RoleSelecting if intended.is_none() => {
                let pick = autopilot
                    .preferred_role
                    .filter(|role| available.contains(role))
                    .or_else(|| available.first().copied());
                if let Some(role) = pick {
                    info!("Autopilot selecting role {}", role);
                    self.choose_role(role);
                }
            }
            LobbyPhase::Ready if autopilot.auto_start && !self.start_requested => {
                info!("Autopilot starting game");
                self.start();
            }
            _ => {}
        }
    }
}

impl SessionListener for LobbyController {
    fn on_connection_changed(&mut self, state: ConnectionState) {
        self.connection = state;
        if state != ConnectionState::Connected {
            return;
        }
        self.last_error = None;

        // The session rejoins by itself after a reconnect.
        if self.autopilot.is_some() && !self.join_requested && !self.room_input.is_empty() {
            if let Err(e) = self.join_room() {
                warn!("Autopilot cannot join: {}", e);
            }
        }
    }

    fn on_lobby_changed(&mut self, view: &LobbyView) {
        if view.phase != LobbyPhase::Ready {
            self.start_requested = false;
        }
        self.view = Some(view.clone());
        self.drive_autopilot();
    }

    fn on_game_started(&mut self, role: Option<Role>) {
        info!("Game started as {:?}", role);
        self.in_game = true;
    }

    fn on_error(&mut self, error: &ClientError) {
        self.last_error = Some(error.to_string());
    }
}
