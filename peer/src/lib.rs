//! # Peer Library
//!
//! Everything one device needs to take part in a multiplayer falling-block
//! game: connecting to the other players, exchanging messages with them and
//! running the simulation.
//!
//! ## Roles
//!
//! One peer hosts. It accepts the others, owns the canonical wall and score,
//! docks every player's shape and forwards whatever one client sends to all
//! other clients. Clients only move their own shape and mirror the host's
//! wall. A single player game runs the host logic without any networking.
//!
//! ## Data Flow
//!
//! Outbound: player input changes the [`game::GameState`], which emits a
//! [`events::GameEvent`]; the [`coordinator::Coordinator`] turns it into a
//! [`shared::Message`], encodes it once and writes it to every
//! [`connection::PeerConnection`].
//!
//! Inbound: each connection's read task pushes raw frames onto one shared
//! queue. A single dispatch worker decodes them in arrival order, hands them
//! to the [`dispatch::Dispatcher`] and, on the host, relays them to the other
//! peers.
//!
//! ## Module Organization
//!
//! - [`config`]: command line arguments and [`config::PeerConfig`]
//! - [`error`]: the [`error::NetError`] taxonomy
//! - [`events`]: connection state, UI notifications and game events
//! - [`transport`]: TCP listener, connects, hello handshake, discovery
//! - [`connection`]: one peer stream with its read task
//! - [`coordinator`]: connection state machine and message fan-out
//! - [`dispatch`]: message routing and pause consensus
//! - [`game`]: the simulation itself
//! - [`service`]: shared game handle and the tick worker

pub mod config;
pub mod connection;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod game;
pub mod service;
pub mod transport;

pub use config::{Mode, PeerConfig};
pub use coordinator::Coordinator;
pub use error::NetError;
pub use events::{ConnectionState, GameEvent, PeerInfo, UiEvent};
pub use game::{GameState, GameView, InputHandle, Role};
pub use service::GameService;
pub use transport::{Discovery, StaticDiscovery};
