//! Typed notifications leaving the library.
//!
//! [`UiEvent`]s go to whatever presents the game to the player.
//! [`GameEvent`]s are emitted by the simulation and turned into network
//! messages by the coordinator.

use serde::{Deserialize, Serialize};
use shared::{PeerAddress, ShapeSnapshot, WallSnapshot};
use std::fmt;

/// Connection state owned by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    None,
    Listening,
    Connecting,
    Connected,
    Discovering,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::None => "none",
            ConnectionState::Listening => "listening",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Discovering => "discovering",
        };
        f.write_str(name)
    }
}

/// A remote device as reported by discovery or by the connection hello.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub address: PeerAddress,
    pub name: String,
}

impl PeerInfo {
    pub fn new(address: impl Into<PeerAddress>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    StateChanged(ConnectionState),
    /// A device showed up during discovery, or connected to this host.
    PeerDiscovered(PeerInfo),
    PeerLost(PeerInfo),
    /// This client is now connected to the host.
    ServerConnected(PeerInfo),
    DiscoveryFinished,
    /// Short user-facing notice.
    Toast(String),
    ConnectFailed(String),
    StartGame { player_number: u32, player_count: u32 },
    /// Another player paused the game.
    PauseRequested,
    /// Another player resumed the game.
    ResumeRequested,
    GameOver,
}

/// Changes of the local simulation that other peers need to learn about.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    ShapeChanged(ShapeSnapshot),
    WallChanged {
        docked_by: PeerAddress,
        wall: WallSnapshot,
    },
    ScoreChanged(u32),
    GameOver,
    PauseChanged(bool),
}
