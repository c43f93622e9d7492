//! Application messages exchanged between peers.
//!
//! Every frame on the wire carries exactly one [`Message`]: the address of
//! the peer that authored it and a [`MessageBody`] whose variant fixes the
//! payload type.

use crate::shape::ShapeSnapshot;
use crate::wall::WallSnapshot;
use crate::PeerAddress;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub origin: PeerAddress,
    pub body: MessageBody,
}

/// Payload of a [`Message`]. The variant order is the wire tag; append new
/// variants at the end only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Current position of the sender's falling shape.
    Shape(ShapeSnapshot),
    /// The host's wall after a docking.
    Wall(WallSnapshot),
    /// The host's point total.
    Points(u32),
    GameOver(bool),
    /// Player slot assigned to the recipient. Rewritten per peer at send time.
    StartGame { player_number: u32, player_count: u32 },
    PauseGame,
    ResumeGame,
}

/// Discriminant of a [`MessageBody`], used for routing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Shape,
    Wall,
    Points,
    GameOver,
    StartGame,
    PauseGame,
    ResumeGame,
}

impl MessageKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::Shape),
            1 => Some(MessageKind::Wall),
            2 => Some(MessageKind::Points),
            3 => Some(MessageKind::GameOver),
            4 => Some(MessageKind::StartGame),
            5 => Some(MessageKind::PauseGame),
            6 => Some(MessageKind::ResumeGame),
            _ => None,
        }
    }
}

impl Message {
    pub fn new(origin: PeerAddress, body: MessageBody) -> Self {
        Self { origin, body }
    }

    pub fn shape(origin: PeerAddress, shape: ShapeSnapshot) -> Self {
        Self::new(origin, MessageBody::Shape(shape))
    }

    pub fn wall(origin: PeerAddress, wall: WallSnapshot) -> Self {
        Self::new(origin, MessageBody::Wall(wall))
    }

    pub fn points(origin: PeerAddress, points: u32) -> Self {
        Self::new(origin, MessageBody::Points(points))
    }

    pub fn game_over(origin: PeerAddress) -> Self {
        Self::new(origin, MessageBody::GameOver(true))
    }

    pub fn start_game(origin: PeerAddress, player_number: u32, player_count: u32) -> Self {
        Self::new(
            origin,
            MessageBody::StartGame {
                player_number,
                player_count,
            },
        )
    }

    pub fn pause(origin: PeerAddress) -> Self {
        Self::new(origin, MessageBody::PauseGame)
    }

    pub fn resume(origin: PeerAddress) -> Self {
        Self::new(origin, MessageBody::ResumeGame)
    }

    pub fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::Shape(_) => MessageKind::Shape,
            MessageBody::Wall(_) => MessageKind::Wall,
            MessageBody::Points(_) => MessageKind::Points,
            MessageBody::GameOver(_) => MessageKind::GameOver,
            MessageBody::StartGame { .. } => MessageKind::StartGame,
            MessageBody::PauseGame => MessageKind::PauseGame,
            MessageBody::ResumeGame => MessageKind::ResumeGame,
        }
    }
}
