use clap::Parser;
use client::config::{ClientConfig, ReconnectPolicy};
use client::lobby::LobbyController;
use client::network::Client;
use client::presentation::{LocalControls, Presentation};
use client::reconciler::RemoteEntity;
use log::{debug, info};
use shared::{Role, RoomCode, DEFAULT_SERVER_URL, INPUT_SEND_RATE};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Lobby hub WebSocket URL
    #[arg(short = 's', long, env = "SPACE_ARCADE_SERVER", default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Pilot name shown in the lobby
    #[arg(short = 'n', long, default_value = "Pilot")]
    name: String,

    /// Room code to join; a new room is created when omitted
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// Preferred role (shooter or hauler)
    #[arg(long)]
    role: Option<Role>,

    /// Stay in the lobby once both roles are taken
    #[arg(long)]
    no_auto_start: bool,

    /// Consecutive failed connects before giving up
    #[arg(long, default_value = "5")]
    reconnect_attempts: u32,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, default_value = "5000")]
    reconnect_interval_ms: u64,

    /// Input messages sent per second
    #[arg(long, default_value_t = INPUT_SEND_RATE)]
    input_rate: u32,

    /// Local simulation ticks per second
    #[arg(long, default_value = "120")]
    tick_rate: u32,
}

/// Stand-in for the 3D scene: flies the ship in a slow circle and logs proxies.
#[derive(Default)]
struct HeadlessShip {
    spawned: bool,
    role: Option<Role>,
    position: [f32; 3],
    yaw: f32,
    proxies: usize,
}

impl Presentation for HeadlessShip {
    fn local_controls(&self) -> Option<LocalControls> {
        if !self.spawned {
            return None;
        }
        Some(LocalControls {
            position: self.position,
            forward: true,
            yaw: self.yaw,
            tractor: self.role == Some(Role::Hauler),
            ..LocalControls::default()
        })
    }

    fn begin_simulation(&mut self, role: Option<Role>) {
        info!("Launching ship as {:?}", role);
        self.spawned = true;
        self.role = role;
    }

    fn advance(&mut self, dt: f32) {
        const SPEED: f32 = 10.0;
        const TURN_RATE: f32 = 0.5;

        self.yaw += TURN_RATE * dt;
        self.position[0] -= self.yaw.sin() * SPEED * dt;
        self.position[2] -= self.yaw.cos() * SPEED * dt;
    }

    fn spawn_visual(&mut self, entity: &RemoteEntity) {
        self.proxies += 1;
        debug!("Spawned {:?} {} ({} tracked)", entity.visual, entity.id, self.proxies);
    }

    fn remove_visual(&mut self, entity: &RemoteEntity) {
        self.proxies = self.proxies.saturating_sub(1);
        debug!("Removed {:?} {} ({} tracked)", entity.kind, entity.id, self.proxies);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let room = match &args.room {
        Some(code) => RoomCode::parse(code)?,
        None => RoomCode::generate(),
    };

    let config = ClientConfig {
        input_rate_hz: args.input_rate,
        tick_rate_hz: args.tick_rate,
        ..ClientConfig::default()
    }
    .with_server_url(args.server.as_str())
    .with_reconnect(ReconnectPolicy {
        max_attempts: args.reconnect_attempts,
        interval: Duration::from_millis(args.reconnect_interval_ms),
    });

    info!("Starting client...");
    info!("Connecting to: {}", config.server_url);
    info!("Room {} as {}", room, args.name);

    let (intents_tx, intents_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut lobby = LobbyController::new(intents_tx).with_autopilot(args.role, !args.no_auto_start);
    lobby.set_name(&args.name);
    lobby.set_room_input(room.as_str());

    let mut client = Client::new(config, HeadlessShip::default(), lobby);

    tokio::select! {
        _ = client.run(intents_rx) => {},
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            client.disconnect();
        }
    }

    Ok(())
}
