//! # Lobby Hub Library
//!
//! This library provides the WebSocket hub that two-player space arcade
//! clients connect to. It pairs pilots into six-character rooms, arbitrates
//! the shooter and hauler roles, and relays a world snapshot to each room.
//!
//! ## Core Responsibilities
//!
//! ### Connection Registry
//! Every accepted socket gets a player ID and a `WELCOME` message. Past the
//! configured capacity the hub answers `ERROR` and closes the socket.
//!
//! ### Lobbies and Roles
//! A `JOIN` creates the room on first use and leaves whatever room the player
//! was in before. Rooms hold two players; each role can be held by one of
//! them. Every roster change is broadcast as `LOBBY_UPDATE` to the room.
//!
//! ### State Broadcasting
//! At a fixed rate each room receives a full `STATE` snapshot: its asteroid
//! field plus every ship whose pilot has reported a position. The hub does
//! not simulate; ships are wherever their pilots last said they were.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! One task owns all connections and lobbies. Per-socket tasks only move
//! text frames: inbound frames become [`network::HubEvent`]s on a channel,
//! outbound frames arrive on each connection's own queue. No locks are held
//! anywhere.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! - Player ID assignment and capacity enforcement
//! - Outbound queues and message serialization
//! - Last input sequence per player
//!
//! ### Lobby Module (`lobby`)
//! - Room membership, capacity and role arbitration
//! - Room status derivation (`waiting`, `full`, `playing`)
//!
//! ### Game Module (`game`)
//! - The per-room asteroid field and snapshot sequence
//!
//! ### Network Module (`network`)
//! - WebSocket accept and per-connection tasks
//! - Message dispatch and error replies
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 15Hz snapshots, at most 64 connections
//!     let mut server = Server::new("127.0.0.1:8080", Duration::from_millis(66), 64).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod lobby;
pub mod network;
