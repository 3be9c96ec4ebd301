//! Multiplayer synchronization: the wire protocol, the server-side
//! room authority, and the client-side mirror.
//!
//! # Architecture
//!
//! ```text
//! user intent                    network                    render layer
//!     │                             │                            ▲
//!     ▼                             │                            │
//! ┌────────────┐  ClientMessage  ┌──┴──────────┐  ServerMessage ┌┴───────────┐
//! │ SyncClient │────────────────▶│ RoomManager │───────────────▶│ SyncClient │
//! │ (optimistic│                 │ (canonical  │   broadcast    │ (reconcile │
//! │  mirror)   │                 │  engine)    │                │  checksum) │
//! └────────────┘                 └─────────────┘                └────────────┘
//! ```
//!
//! The client applies an intent to its local mirror first; only moves
//! the mirror accepts are sent. The manager applies them to the one
//! canonical engine and answers every mutation with a full-state
//! broadcast to both sessions, which clients adopt whenever their
//! checksum disagrees.

pub mod client;
pub mod protocol;
pub mod room;

// Re-export commonly used types
pub use client::{ClientError, ConnectionStatus, SyncClient, SyncEvent};
pub use protocol::{
    state_checksum, ClientMessage, EndReason, Envelope, LastAction, LeaveReason, MoveAction,
    OpponentInfo, ServerMessage,
};
pub use room::{
    generate_room_code, JoinOutcome, Outbound, PlayerSession, Room, RoomError, RoomManager,
    DEFAULT_DISCONNECT_GRACE, DEFAULT_ROOM_IDLE_TIMEOUT, HOUSEKEEPING_INTERVAL,
};
