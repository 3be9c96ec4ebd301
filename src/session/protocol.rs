//! Wire protocol for multiplayer sessions.
//!
//! Every message travels as JSON of shape `{type, data, timestamp}`
//! over a persistent socket owned by the embedding layer. The enums
//! here are the single source of truth for both directions; the
//! envelope adds the timestamp.
//!
//! Also home to the rolling state checksum clients use to decide
//! whether an authoritative snapshot differs from their mirror. It is
//! change detection, not an integrity check.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::engine::{GameSnapshot, Position, Side};

/// A move kind carried by `MAKE_MOVE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveAction {
    Pick,
    Sow,
}

impl MoveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pick => "pick",
            Self::Sow => "sow",
        }
    }
}

/// Why a player left the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveReason {
    Disconnect,
    Leave,
    Timeout,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Both sessions voted to end.
    Vote,

    /// A disconnected session never came back.
    Timeout,

    /// The rules ended it (a side lost all of its houses).
    Finished,
}

/// Peer info inside `ROOM_JOINED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentInfo {
    pub name: String,
    pub connected: bool,
}

/// The move a state update describes, for opponent-move animation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastAction {
    pub player_name: String,
    pub action: MoveAction,
    pub position: Position,
}

/// Client → server intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    JoinRoom {
        room_code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
        /// Present when rejoining: reattaches the existing session.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    MakeMove {
        action: MoveAction,
        position: Position,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },
    LeaveRoom,
    VoteEndGame,
    PauseGame,
    ResumeGame,
}

/// Server → client broadcasts and replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    RoomJoined {
        room_code: String,
        session_id: String,
        side: Side,
        player_name: String,
        /// Absent until both players have joined.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<GameSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        opponent: Option<OpponentInfo>,
    },
    GameStateUpdate {
        state: GameSnapshot,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_action: Option<LastAction>,
    },
    PlayerJoined {
        player_name: String,
        side: Side,
    },
    PlayerLeft {
        player_name: String,
        side: Side,
        reason: LeaveReason,
    },
    PlayerReconnected {
        player_name: String,
        side: Side,
    },
    GamePaused {
        paused_by: String,
    },
    GameResumed {
        resumed_by: String,
    },
    GameEnded {
        reason: EndReason,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Wire envelope: the tagged message plus a Unix-millisecond timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    #[serde(flatten)]
    pub message: M,
    pub timestamp: i64,
}

impl<M> Envelope<M> {
    /// Wrap a message with the current wall-clock time.
    pub fn now(message: M) -> Self {
        Self {
            message,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Decode an inbound client envelope. A malformed payload maps to the
/// generic `INVALID_MESSAGE` error the sender gets back; the
/// connection itself stays open.
pub fn decode_client_envelope(raw: &str) -> Result<Envelope<ClientMessage>, ServerMessage> {
    serde_json::from_str(raw).map_err(|err| ServerMessage::Error {
        code: "INVALID_MESSAGE".to_string(),
        message: format!("Invalid message format: {}", err),
    })
}

/// Rolling 32-bit checksum over the canonical JSON serialization of a
/// snapshot (`h = h * 31 + byte`, wrapping). Equal states hash equal;
/// any field difference is overwhelmingly likely to change the digest.
pub fn state_checksum(state: &GameSnapshot) -> String {
    let data = match serde_json::to_string(state) {
        Ok(json) => json,
        Err(_) => return String::from("0"),
    };
    let mut hash: i32 = 0;
    for byte in data.bytes() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(byte as i32);
    }
    hash.to_string()
}
