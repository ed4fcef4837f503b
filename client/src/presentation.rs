//! Seams to the host application.
//!
//! The core never draws or simulates anything itself. The host hands in a
//! [`Presentation`] (ship state in, proxy visuals out) and a [`SessionListener`]
//! (lobby UI) when it builds the [`Client`](crate::network::Client).

use crate::connection::ConnectionState;
use crate::error::ClientError;
use crate::reconciler::RemoteEntity;
use crate::session::LobbyView;
use shared::Role;

/// Locally owned ship and control intents, sampled by the input pump.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalControls {
    pub position: [f32; 3],
    pub forward: bool,
    pub backward: bool,
    /// Radians.
    pub pitch: f32,
    /// Radians.
    pub yaw: f32,
    pub fire: bool,
    pub tractor: bool,
}

impl LocalControls {
    /// Opposing intents cancel out; the result is always -1, 0 or 1.
    pub fn throttle(&self) -> f32 {
        let mut throttle = 0.0;
        if self.forward {
            throttle += 1.0;
        }
        if self.backward {
            throttle -= 1.0;
        }
        throttle
    }
}

pub trait Presentation {
    /// `None` until the host has spawned the local ship.
    fn local_controls(&self) -> Option<LocalControls>;

    /// Called once when the lobby hands over to gameplay.
    fn begin_simulation(&mut self, role: Option<Role>);

    /// Advances the host simulation by one tick.
    fn advance(&mut self, _dt: f32) {}

    fn spawn_visual(&mut self, entity: &RemoteEntity);

    fn update_visual(&mut self, _entity: &RemoteEntity) {}

    fn remove_visual(&mut self, entity: &RemoteEntity);
}

/// Lobby UI side. Every method has a no-op default.
pub trait SessionListener {
    fn on_connection_changed(&mut self, _state: ConnectionState) {}

    fn on_lobby_changed(&mut self, _view: &LobbyView) {}

    fn on_game_started(&mut self, _role: Option<Role>) {}

    fn on_error(&mut self, _error: &ClientError) {}
}
