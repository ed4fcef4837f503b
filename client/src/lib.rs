//! # Arcade Client Library
//!
//! This library is the multiplayer synchronization core of the two-player space
//! arcade client. It keeps a WebSocket connection to the lobby hub alive,
//! negotiates lobby membership and roles, streams the local ship's controls to
//! the server, and mirrors the server's world snapshots as local proxies.
//!
//! ## Architecture Overview
//!
//! Everything runs on one logical task. Inbound frames, user intents and the
//! host's simulation tick are interleaved by [`network::Client::run`] with
//! `tokio::select!`, so no component needs locks.
//!
//! ### Server Authority
//! The client never decides membership or roles. Joining sends a request and
//! waits for the next lobby snapshot; a role selection is shown optimistically
//! but rolled back when the server refuses it.
//!
//! ### Snapshot Replacement
//! Both lobby and world state arrive as full snapshots. Each one replaces the
//! previous one wholesale, which makes duplicate or late delivery harmless.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! - WebSocket transport behind the `Connector` trait
//! - Bounded fixed-interval reconnection
//! - Generation tags that silence discarded sockets and stale retry timers
//!
//! ### Router Module (`router`)
//! Decodes JSON frames and sends each message to exactly one handler.
//!
//! ### Session Module (`session`)
//! Local identity, lobby roster, role negotiation and the lobby phase machine.
//!
//! ### Input Module (`input`)
//! Rate-limited, sequenced sampling of the local ship's controls.
//!
//! ### Reconciler Module (`reconciler`)
//! Creates, updates and prunes proxies for remote players, asteroids and minerals.
//!
//! ### Lobby Module (`lobby`)
//! User intents, input normalization and an autopilot for headless play.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::lobby::LobbyController;
//! use client::network::Client;
//! use client::presentation::{LocalControls, Presentation};
//! use client::reconciler::RemoteEntity;
//! use shared::Role;
//!
//! struct Headless;
//!
//! impl Presentation for Headless {
//!     fn local_controls(&self) -> Option<LocalControls> {
//!         Some(LocalControls::default())
//!     }
//!     fn begin_simulation(&mut self, _role: Option<Role>) {}
//!     fn spawn_visual(&mut self, _entity: &RemoteEntity) {}
//!     fn remove_visual(&mut self, _entity: &RemoteEntity) {}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let (intents_tx, intents_rx) = tokio::sync::mpsc::unbounded_channel();
//!     let mut lobby = LobbyController::new(intents_tx).with_autopilot(None, true);
//!     lobby.set_name("Nova");
//!     lobby.set_room_input("AB12CD");
//!
//!     let mut client = Client::new(ClientConfig::default(), Headless, lobby);
//!     client.run(intents_rx).await;
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod input;
pub mod lobby;
pub mod network;
pub mod presentation;
pub mod reconciler;
pub mod router;
pub mod session;

#[cfg(test)]
mod test_support;
