use log::info;
use shared::{EntityKind, EntityState, ServerMessage};

pub const ASTEROID_COUNT: u32 = 20;
pub const ASTEROID_ID_BASE: u32 = 100;
pub const ASTEROID_SPACING: f32 = 20.0;
const GRID_COLUMNS: u32 = 5;

/// World owned by one lobby. The hub is not a physics authority: asteroids
/// stay where they spawned and ships are wherever their pilots last reported.
#[derive(Debug, Clone)]
pub struct LobbyWorld {
    pub tick: u64,
    asteroids: Vec<EntityState>,
}

impl LobbyWorld {
    /// Lays out the asteroid field on a grid centered on the origin.
    pub fn new() -> Self {
        let asteroids: Vec<EntityState> = (0..ASTEROID_COUNT)
            .map(|i| {
                let column = (i % GRID_COLUMNS) as f32 - 2.0;
                let row = (i / GRID_COLUMNS) as f32 - 2.0;
                EntityState::new(
                    ASTEROID_ID_BASE + i,
                    EntityKind::Asteroid,
                    column * ASTEROID_SPACING,
                    0.0,
                    row * ASTEROID_SPACING,
                )
            })
            .collect();

        info!("Created lobby world with {} asteroids", asteroids.len());
        Self { tick: 0, asteroids }
    }

    pub fn asteroids(&self) -> &[EntityState] {
        &self.asteroids
    }

    /// Advances the tick and builds a full STATE snapshot with the given ships.
    pub fn snapshot(&mut self, ships: Vec<EntityState>) -> ServerMessage {
        self.tick += 1;

        let mut entities = self.asteroids.clone();
        entities.extend(ships);

        ServerMessage::State {
            seq: Some(self.tick),
            entities,
        }
    }
}

impl Default for LobbyWorld {
    fn default() -> Self {
        Self::new()
    }
}
