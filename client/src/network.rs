//! Client driver interleaving the connection, session, reconciler and input
//! pump on a single task.

use crate::config::ClientConfig;
use crate::connection::{
    ChannelEvent, ChannelOutput, Connection, ConnectionState, Connector, Retry, WsConnector,
};
use crate::error::ClientError;
use crate::input::InputPump;
use crate::lobby::UserIntent;
use crate::presentation::{Presentation, SessionListener};
use crate::reconciler::Reconciler;
use crate::router::{self, Route};
use crate::session::Session;
use log::{debug, info, warn};
use shared::{ClientMessage, Role};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

pub struct Client<P, L, C = WsConnector>
where
    P: Presentation,
    L: SessionListener,
    C: Connector,
{
    config: ClientConfig,
    connection: Connection<C>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    reported_state: ConnectionState,

    session: Session,
    reconciler: Reconciler,
    input_pump: InputPump,

    presentation: P,
    listener: L,
}

impl<P: Presentation, L: SessionListener> Client<P, L> {
    pub fn new(config: ClientConfig, presentation: P, listener: L) -> Self {
        Self::with_connector(config, presentation, listener, WsConnector)
    }
}

impl<P, L, C> Client<P, L, C>
where
    P: Presentation,
    L: SessionListener,
    C: Connector,
{
    pub fn with_connector(config: ClientConfig, presentation: P, listener: L, connector: C) -> Self {
        let (connection, events) =
            Connection::new(config.server_url.clone(), config.reconnect, connector);

        Client {
            reconciler: Reconciler::new(config.prune_players_on_snapshot),
            input_pump: InputPump::new(config.input_rate_hz),
            config,
            connection,
            events,
            reported_state: ConnectionState::Disconnected,
            session: Session::new(),
            presentation,
            listener,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection<C> {
        &self.connection
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn connect(&mut self) {
        self.connection.connect();
        self.sync_connection_state();
    }

    /// Manual reconnect after the retry policy gave up.
    pub fn retry(&mut self) {
        self.connection.retry();
        self.sync_connection_state();
    }

    /// Closes the transport for good and drops everything tied to it.
    pub fn disconnect(&mut self) {
        self.connection.disconnect();
        self.forget_server_state();
        self.sync_connection_state();
    }

    /// Validation errors are only returned. Precondition violations are
    /// returned and also reported to the listener, like network errors.
    pub fn join_lobby(&mut self, code: &str, name: &str) -> Result<(), ClientError> {
        let result = self
            .session
            .join_lobby(self.connection.is_connected(), code, name);
        let message = self.report_precondition(result)?;
        self.connection.send(&message);
        Ok(())
    }

    pub fn select_role(&mut self, role: Role) -> Result<(), ClientError> {
        let result = self.session.select_role(self.connection.is_connected(), role);
        let message = self.report_precondition(result)?;
        self.connection.send(&message);
        self.publish_view();
        Ok(())
    }

    pub fn start_game(&mut self) -> Result<(), ClientError> {
        let result = self.session.start_game();
        let role = self.report_precondition(result)?;
        self.input_pump.reset();
        self.presentation.begin_simulation(role);
        self.listener.on_game_started(role);
        self.publish_view();
        Ok(())
    }

    /// Applies one user intent. Returns `false` once the user asked to quit.
    pub fn handle_intent(&mut self, intent: UserIntent) -> bool {
        let result = match intent {
            UserIntent::Join { code, name } => self.join_lobby(&code, &name),
            UserIntent::SelectRole(role) => self.select_role(role),
            UserIntent::StartGame => self.start_game(),
            UserIntent::Retry => {
                self.retry();
                Ok(())
            }
            UserIntent::Quit => {
                info!("Quitting");
                self.disconnect();
                return false;
            }
        };

        // Preconditions already reached the listener.
        if let Err(e) = result {
            if !matches!(e, ClientError::Precondition(_)) {
                warn!("{}", e);
                self.listener.on_error(&e);
            }
        }
        true
    }

    /// Handles every channel event that is already queued.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_channel_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        let output = self.connection.handle_event(event);

        match output {
            Some(ChannelOutput::Opened) => {
                self.sync_connection_state();
                for message in self.session.rejoin_messages() {
                    self.connection.send(&message);
                }
            }

            Some(ChannelOutput::Message(payload)) => self.handle_message(&payload),

            Some(ChannelOutput::Lost { failure, retry }) => {
                self.forget_server_state();
                self.sync_connection_state();

                if let Some(reason) = failure {
                    self.listener.on_error(&ClientError::Transport(reason));
                }
                if let Retry::Exhausted { attempts } = retry {
                    self.listener
                        .on_error(&ClientError::ReconnectExhausted { attempts });
                }
            }

            // Retry timers move the channel to Connecting without output.
            None => self.sync_connection_state(),
        }
    }

    fn handle_message(&mut self, payload: &str) {
        let message = match router::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed message: {}", e);
                return;
            }
        };

        match router::route(message) {
            Route::Snapshot(entities) => {
                let report = self.reconciler.apply_snapshot(
                    &entities,
                    self.session.player_id(),
                    &mut self.presentation,
                );
                if report.created > 0 || report.removed > 0 {
                    debug!(
                        "Snapshot: {} created, {} updated, {} removed",
                        report.created, report.updated, report.removed
                    );
                }
            }

            Route::Lobby(lobby) => {
                let roster: HashSet<u32> = lobby.players.iter().map(|p| p.id).collect();
                self.session.apply_lobby_update(lobby);
                self.reconciler
                    .retain_players(&roster, &mut self.presentation);
                if let Some(local_id) = self.session.player_id() {
                    self.reconciler
                        .forget_local(local_id, &mut self.presentation);
                }
                self.publish_view();
            }

            Route::Identity(player_id) => {
                self.session.assign_identity(player_id);
                self.reconciler
                    .forget_local(player_id, &mut self.presentation);
            }

            Route::Rejection(reason) => {
                warn!("Server rejected request: {}", reason);
                self.session.reject_pending();
                self.listener.on_error(&ClientError::ServerRejected(reason));
                self.publish_view();
            }

            Route::Dropped => {}
        }
    }

    /// One host simulation tick. Gameplay only runs once the game started.
    pub fn tick(&mut self, now: Instant) {
        if !self.session.in_game() {
            return;
        }

        let dt = self.config.tick_interval().as_secs_f32();
        self.presentation.advance(dt);

        let controls = self.presentation.local_controls();
        if let Some(frame) = self
            .input_pump
            .poll(now, controls, self.session.effective_role())
        {
            self.connection.send(&ClientMessage::Input(frame));
        }
    }

    /// Connects and runs until the user quits or the intent channel closes.
    pub async fn run(&mut self, mut intents: mpsc::UnboundedReceiver<UserIntent>) {
        self.connect();

        let mut tick_interval = interval(self.config.tick_interval());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Client started");

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    self.handle_channel_event(event);
                },

                intent = intents.recv() => match intent {
                    Some(intent) => {
                        if !self.handle_intent(intent) {
                            break;
                        }
                    }
                    None => {
                        info!("Intent channel closed");
                        self.disconnect();
                        break;
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick(Instant::now());
                },
            }
        }
    }

    fn report_precondition<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e @ ClientError::Precondition(_)) = &result {
            warn!("{}", e);
            self.listener.on_error(e);
        }
        result
    }

    fn forget_server_state(&mut self) {
        let had_lobby = self.session.lobby().is_some();
        self.session.on_connection_lost();
        let removed = self.reconciler.clear(&mut self.presentation);
        if removed > 0 {
            debug!("Removed {} proxies after losing the connection", removed);
        }
        if had_lobby {
            self.publish_view();
        }
    }

    fn sync_connection_state(&mut self) {
        let state = self.connection.state();
        if state != self.reported_state {
            self.reported_state = state;
            self.listener.on_connection_changed(state);
        }
    }

    fn publish_view(&mut self) {
        let view = self.session.view();
        self.listener.on_lobby_changed(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LobbyPhase;
    use crate::test_support::{
        OpenBehavior, RecordingListener, RecordingPresentation, ScriptedConnector, ScriptedServer,
        SentLog,
    };
    use shared::{EntityKind, EntityState, LobbyInfo, LobbyPlayer, LobbyStatus, ServerMessage};
    use std::time::Duration;
    use tokio_test::assert_err;

    type TestClient = Client<RecordingPresentation, RecordingListener, ScriptedConnector>;

    fn client_with(script: Vec<OpenBehavior>) -> (TestClient, ScriptedServer, SentLog) {
        let connector = ScriptedConnector::new(script);
        let server = connector.server();
        let sent = connector.sent();
        let client = Client::with_connector(
            ClientConfig::default(),
            RecordingPresentation::with_ship(),
            RecordingListener::default(),
            connector,
        );
        (client, server, sent)
    }

    fn connected() -> (TestClient, ScriptedServer, SentLog) {
        let (mut client, server, sent) = client_with(vec![OpenBehavior::Accept]);
        client.connect();
        client.poll_events();
        (client, server, sent)
    }

    fn roster(players: &[(u32, &str, Option<Role>)]) -> ServerMessage {
        ServerMessage::LobbyUpdate {
            lobby: LobbyInfo {
                code: "AB12CD".to_string(),
                players: players
                    .iter()
                    .map(|(id, name, role)| LobbyPlayer {
                        id: *id,
                        name: name.to_string(),
                        role: *role,
                        connected: true,
                    })
                    .collect(),
                max_players: 2,
                status: LobbyStatus::Waiting,
            },
        }
    }

    fn ready_client() -> (TestClient, ScriptedServer, SentLog) {
        let (mut client, server, sent) = connected();
        server.push(&ServerMessage::Welcome { player_id: 1 });
        client.poll_events();
        client.join_lobby("AB12CD", "Nova").unwrap();
        server.push(&roster(&[(1, "Nova", None)]));
        client.poll_events();
        client.select_role(Role::Hauler).unwrap();
        server.push(&roster(&[
            (1, "Nova", Some(Role::Hauler)),
            (2, "Vega", Some(Role::Shooter)),
        ]));
        client.poll_events();
        sent.drain();
        (client, server, sent)
    }

    #[tokio::test]
    async fn test_join_scenario_reaches_waiting() {
        let (mut client, server, sent) = connected();
        assert_eq!(
            client.listener().states,
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );

        client.join_lobby("AB12CD", "Nova").unwrap();
        assert_eq!(
            sent.drain(),
            vec![r#"{"type":"JOIN","lobby":"AB12CD","playerName":"Nova"}"#.to_string()]
        );
        assert_eq!(client.session().phase(), LobbyPhase::Unjoined);

        server.push(&roster(&[(5, "Nova", None)]));
        client.poll_events();

        let view = client.listener().last_view().unwrap();
        assert_eq!(view.phase, LobbyPhase::Waiting);
        assert_eq!(view.lobby.as_ref().unwrap().players.len(), 1);
        assert_eq!(client.session().player_id(), Some(5));
    }

    #[tokio::test]
    async fn test_intents_report_errors_through_listener() {
        let (mut client, _server, sent) = client_with(vec![OpenBehavior::Silent]);
        client.connect();

        assert!(client.handle_intent(UserIntent::SelectRole(Role::Shooter)));
        assert!(client.handle_intent(UserIntent::Join {
            code: "AB12CD".to_string(),
            name: "N".to_string(),
        }));
        assert_eq!(
            client.listener().errors,
            vec![
                "Not connected to server".to_string(),
                "Please enter a name (at least 2 characters)".to_string(),
            ]
        );
        assert!(sent.drain().is_empty());
    }

    #[tokio::test]
    async fn test_direct_calls_report_preconditions() {
        let (mut client, _server, sent) = client_with(vec![OpenBehavior::Silent]);
        client.connect();

        assert_err!(client.select_role(Role::Shooter));
        assert_err!(client.start_game());
        assert_err!(client.join_lobby("AB12CD", "Nova"));
        // Validation stays synchronous.
        assert_err!(client.join_lobby("AB12CD", "N"));

        assert_eq!(
            client.listener().errors,
            vec![
                "Not connected to server".to_string(),
                "Join a lobby first".to_string(),
                "Not connected to server".to_string(),
            ]
        );
        assert!(sent.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_join_is_not_replayed_on_reconnect() {
        let (mut client, server, sent) = connected();
        server.push(&ServerMessage::Welcome { player_id: 1 });
        client.poll_events();
        client.join_lobby("AB12CD", "Nova").unwrap();
        server.push(&ServerMessage::Error {
            error: "Lobby is full".to_string(),
        });
        client.poll_events();
        assert_eq!(client.session().lobby(), None);
        sent.drain();

        server.drop_connection(None);
        client.poll_events();
        tokio::time::sleep(Duration::from_millis(5001)).await;
        client.poll_events();
        client.poll_events();

        assert!(client.connection().is_connected());
        assert!(sent.drain().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_creates_proxies_except_local() {
        let (mut client, server, _sent) = connected();
        server.push(&ServerMessage::Welcome { player_id: 1 });
        server.push(&ServerMessage::State {
            seq: Some(3),
            entities: vec![
                EntityState::new(1, EntityKind::Player, 0.0, 0.0, 0.0),
                EntityState::new(2, EntityKind::Player, 5.0, 0.0, 0.0),
                EntityState::new(100, EntityKind::Asteroid, -40.0, 0.0, -40.0),
            ],
        });
        client.poll_events();

        assert_eq!(client.reconciler().len(), 2);
        assert!(client.reconciler().get(EntityKind::Player, 1).is_none());
        assert_eq!(client.presentation().spawned.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_message_keeps_connection() {
        let (mut client, server, _sent) = connected();
        server.push_raw("{not json");
        server.push_raw(r#"{"type":"PING"}"#);
        server.push(&ServerMessage::State {
            seq: None,
            entities: vec![EntityState::new(100, EntityKind::Asteroid, 0.0, 0.0, 0.0)],
        });
        client.poll_events();

        assert!(client.connection().is_connected());
        assert_eq!(client.reconciler().len(), 1);
        assert!(client.listener().errors.is_empty());
    }

    #[tokio::test]
    async fn test_lobby_update_removes_departed_players() {
        let (mut client, server, _sent) = ready_client();
        server.push(&ServerMessage::State {
            seq: None,
            entities: vec![EntityState::new(2, EntityKind::Player, 0.0, 0.0, 0.0)],
        });
        client.poll_events();
        assert_eq!(client.reconciler().count(EntityKind::Player), 1);

        server.push(&roster(&[(1, "Nova", Some(Role::Hauler))]));
        client.poll_events();
        assert_eq!(client.reconciler().count(EntityKind::Player), 0);
        assert_eq!(client.session().phase(), LobbyPhase::Waiting);
    }

    #[tokio::test]
    async fn test_rejection_rolls_back_role() {
        let (mut client, server, _sent) = connected();
        server.push(&ServerMessage::Welcome { player_id: 1 });
        client.poll_events();
        client.join_lobby("AB12CD", "Nova").unwrap();
        server.push(&roster(&[(1, "Nova", None)]));
        client.poll_events();

        client.select_role(Role::Shooter).unwrap();
        assert_eq!(client.session().effective_role(), Some(Role::Shooter));

        server.push(&ServerMessage::Error {
            error: "Role already taken".to_string(),
        });
        client.poll_events();

        assert_eq!(client.session().effective_role(), None);
        assert_eq!(
            client.listener().errors,
            vec!["Server rejected request: Role already taken".to_string()]
        );
        assert_eq!(client.listener().last_view().unwrap().intended_role, None);
    }

    #[tokio::test]
    async fn test_start_game_begins_simulation_and_pumps_input() {
        let (mut client, _server, sent) = ready_client();
        let start = Instant::now();

        client.tick(start);
        assert!(sent.drain().is_empty());

        assert!(client.handle_intent(UserIntent::StartGame));
        assert_eq!(client.presentation().started, vec![Some(Role::Hauler)]);
        assert_eq!(client.listener().started, vec![Some(Role::Hauler)]);

        let step = Duration::from_secs(1) / 120;
        for i in 0..120 {
            client.tick(start + step * i);
        }
        let frames = sent.drain_messages();
        assert_eq!(frames.len(), 60);
        match &frames[0] {
            ClientMessage::Input(frame) => {
                assert_eq!(frame.seq, 1);
                assert_eq!(frame.tractor, Some(false));
                assert_eq!(frame.position(), Some([1.0, 2.0, 3.0]));
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(client.presentation().ticks, 120);
    }

    #[tokio::test]
    async fn test_no_input_without_local_ship() {
        let (mut client, _server, sent) = ready_client();
        client.presentation_mut().controls = None;
        client.start_game().unwrap();

        client.tick(Instant::now());
        assert!(sent.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_connection_clears_and_rejoins() {
        let (mut client, server, sent) = ready_client();
        server.push(&ServerMessage::State {
            seq: None,
            entities: vec![EntityState::new(100, EntityKind::Asteroid, 0.0, 0.0, 0.0)],
        });
        client.poll_events();
        assert_eq!(client.reconciler().len(), 1);

        server.drop_connection(Some("connection reset"));
        client.poll_events();

        assert!(client.reconciler().is_empty());
        assert_eq!(client.session().phase(), LobbyPhase::Unjoined);
        assert_eq!(client.session().player_id(), None);
        assert_eq!(
            client.listener().errors.last().map(String::as_str),
            Some("Connection failed. Please check if the server is running (connection reset)")
        );

        tokio::time::sleep(Duration::from_millis(5001)).await;
        client.poll_events(); // RetryDue -> reconnect
        client.poll_events(); // Opened

        assert!(client.connection().is_connected());
        assert_eq!(
            sent.drain_messages(),
            vec![
                ClientMessage::Join {
                    lobby: "AB12CD".to_string(),
                    player_name: "Nova".to_string(),
                },
                ClientMessage::RoleSelect { role: Role::Hauler },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_once() {
        let (mut client, _server, _sent) = client_with(vec![OpenBehavior::Refuse; 5]);
        client.connect();

        for _ in 0..5 {
            client.poll_events();
            tokio::time::sleep(Duration::from_millis(5001)).await;
        }
        client.poll_events();

        let exhausted: Vec<_> = client
            .listener()
            .errors
            .iter()
            .filter(|e| e.starts_with("Failed to reconnect"))
            .collect();
        assert_eq!(exhausted.len(), 1);
        assert!(client.connection().is_exhausted());

        client.handle_intent(UserIntent::Retry);
        client.poll_events();
        assert!(client.connection().is_connected());
    }

    #[tokio::test]
    async fn test_quit_disconnects_without_retry() {
        let (mut client, _server, _sent) = connected();
        assert!(!client.handle_intent(UserIntent::Quit));
        assert_eq!(client.connection().state(), ConnectionState::Disconnected);
        assert_eq!(
            client.listener().states.last(),
            Some(&ConnectionState::Disconnected)
        );
        assert_eq!(client.poll_events(), 0);
    }
}
