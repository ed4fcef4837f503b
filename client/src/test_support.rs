//! In-memory doubles for the transport and the host application.

use crate::connection::{ChannelEvent, ConnectionState, Connector, Generation, TransportHandle};
use crate::error::ClientError;
use crate::presentation::{LocalControls, Presentation, SessionListener};
use crate::reconciler::RemoteEntity;
use crate::session::LobbyView;
use shared::{ClientMessage, EntityKind, Role, ServerMessage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What the scripted server does with the next open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    Accept,
    Refuse,
    /// Never answers; the open stays pending.
    Silent,
}

type OpenLog = Arc<Mutex<Vec<(String, Generation)>>>;
type LiveTransport = Arc<Mutex<Option<(Generation, mpsc::UnboundedSender<ChannelEvent>)>>>;

/// Every frame written through any handle the connector handed out.
#[derive(Clone, Default)]
pub struct SentLog {
    receivers: Arc<Mutex<Vec<mpsc::UnboundedReceiver<String>>>>,
}

impl SentLog {
    pub fn drain(&self) -> Vec<String> {
        let mut frames = Vec::new();
        for receiver in self.receivers.lock().unwrap().iter_mut() {
            while let Ok(frame) = receiver.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }

    pub fn drain_messages(&self) -> Vec<ClientMessage> {
        self.drain()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }
}

/// Server side of the most recently accepted transport.
#[derive(Clone, Default)]
pub struct ScriptedServer {
    live: LiveTransport,
}

impl ScriptedServer {
    pub fn push(&self, message: &ServerMessage) {
        self.push_raw(&message.to_json().unwrap());
    }

    pub fn push_raw(&self, payload: &str) {
        if let Some((generation, events)) = self.live.lock().unwrap().as_ref() {
            let _ = events.send(ChannelEvent::Text {
                generation: *generation,
                payload: payload.to_string(),
            });
        }
    }

    pub fn drop_connection(&self, reason: Option<&str>) {
        if let Some((generation, events)) = self.live.lock().unwrap().take() {
            let _ = events.send(ChannelEvent::Closed {
                generation,
                reason: reason.map(str::to_string),
            });
        }
    }
}

pub struct ScriptedConnector {
    script: VecDeque<OpenBehavior>,
    fallback: OpenBehavior,
    opens: OpenLog,
    sent: SentLog,
    server: ScriptedServer,
}

impl ScriptedConnector {
    /// Plays `script` in order, then accepts everything.
    pub fn new(script: Vec<OpenBehavior>) -> Self {
        Self {
            script: script.into(),
            fallback: OpenBehavior::Accept,
            opens: OpenLog::default(),
            sent: SentLog::default(),
            server: ScriptedServer::default(),
        }
    }

    pub fn refusing() -> Self {
        Self {
            fallback: OpenBehavior::Refuse,
            ..Self::new(Vec::new())
        }
    }

    pub fn opens(&self) -> OpenLog {
        Arc::clone(&self.opens)
    }

    pub fn sent(&self) -> SentLog {
        self.sent.clone()
    }

    pub fn server(&self) -> ScriptedServer {
        self.server.clone()
    }
}

impl Connector for ScriptedConnector {
    fn open(
        &mut self,
        url: &str,
        generation: Generation,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> TransportHandle {
        self.opens.lock().unwrap().push((url.to_string(), generation));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.sent.receivers.lock().unwrap().push(outbound_rx);

        match self.script.pop_front().unwrap_or(self.fallback) {
            OpenBehavior::Accept => {
                let _ = events.send(ChannelEvent::Opened { generation });
                *self.server.live.lock().unwrap() = Some((generation, events));
            }
            OpenBehavior::Refuse => {
                let _ = events.send(ChannelEvent::Failed {
                    generation,
                    reason: "connection refused".to_string(),
                });
            }
            OpenBehavior::Silent => {}
        }

        TransportHandle::new(outbound_tx)
    }
}

/// Host double that records every visual callback.
#[derive(Debug, Default)]
pub struct RecordingPresentation {
    pub controls: Option<LocalControls>,
    pub started: Vec<Option<Role>>,
    pub ticks: u32,
    pub spawned: Vec<(EntityKind, u32)>,
    pub updated: usize,
    pub removed: Vec<(EntityKind, u32)>,
}

impl RecordingPresentation {
    pub fn with_ship() -> Self {
        Self {
            controls: Some(LocalControls {
                position: [1.0, 2.0, 3.0],
                forward: true,
                ..LocalControls::default()
            }),
            ..Self::default()
        }
    }
}

impl Presentation for RecordingPresentation {
    fn local_controls(&self) -> Option<LocalControls> {
        self.controls
    }

    fn begin_simulation(&mut self, role: Option<Role>) {
        self.started.push(role);
    }

    fn advance(&mut self, _dt: f32) {
        self.ticks += 1;
    }

    fn spawn_visual(&mut self, entity: &RemoteEntity) {
        self.spawned.push((entity.kind, entity.id));
    }

    fn update_visual(&mut self, _entity: &RemoteEntity) {
        self.updated += 1;
    }

    fn remove_visual(&mut self, entity: &RemoteEntity) {
        self.removed.push((entity.kind, entity.id));
    }
}

#[derive(Debug, Default)]
pub struct RecordingListener {
    pub states: Vec<ConnectionState>,
    pub views: Vec<LobbyView>,
    pub started: Vec<Option<Role>>,
    pub errors: Vec<String>,
}

impl RecordingListener {
    pub fn last_view(&self) -> Option<&LobbyView> {
        self.views.last()
    }
}

impl SessionListener for RecordingListener {
    fn on_connection_changed(&mut self, state: ConnectionState) {
        self.states.push(state);
    }

    fn on_lobby_changed(&mut self, view: &LobbyView) {
        self.views.push(view.clone());
    }

    fn on_game_started(&mut self, role: Option<Role>) {
        self.started.push(role);
    }

    fn on_error(&mut self, error: &ClientError) {
        self.errors.push(error.to_string());
    }
}
