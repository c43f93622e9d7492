//! # Shared Game Library
//!
//! Data types and algorithms used by every peer of a multiplayer falling-block
//! game. Nothing in here touches the network or an async runtime: the `peer`
//! crate drives these types from its tick worker and ships them across the
//! wire through the [`codec`] module.
//!
//! ## Module Organization
//!
//! - [`shape`]: the seven shape types, rotation layouts, motion and speed
//! - [`wall`]: the grid of docked cells, docking and row clearing
//! - [`score`]: points and cleared-row bookkeeping
//! - [`protocol`]: the `Message` tagged union and its snapshot payloads
//! - [`codec`]: length-prefixed framing and payload serialization
//! - [`pool`]: size-keyed byte buffer reuse for the receive path

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;
pub mod pool;
pub mod protocol;
pub mod score;
pub mod shape;
pub mod wall;

pub use codec::{decode, decode_payload, encode, WireError};
pub use pool::ByteBufferPool;
pub use protocol::{Message, MessageBody, MessageKind};
pub use score::Score;
pub use shape::{Motion, Shape, ShapeSnapshot, ShapeType, Speed};
pub use wall::{Wall, WallSnapshot};

/// Number of rows of the game area.
pub const ROWS: usize = 20;
/// Number of columns of the game area.
pub const COLS: usize = 10;
/// Simulation ticks per second.
pub const TICK_RATE: u32 = 40;

/// Stable identifier of a device taking part in a game.
///
/// The transport keys connections by it, discovery reports it and every
/// message carries the address of the peer that authored it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeerAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}
