//! Pallanguzhi Turn Engine and Session State
//!
//! This crate implements the rules and the multiplayer state model for
//! Pallanguzhi, a two-player sowing-and-capture board game.
//!
//! # Overview
//!
//! The [`engine`] module provides:
//!
//! - **Board** - Two rows of pits, two capture stores, per-pit active
//!   flags, and the traversal geometry (the sowing ring and the
//!   opposite-pit mirror).
//!
//! - **Turn Engine** - The `picking → sowing → picking | ended` state
//!   machine: forced-traversal sowing, four-seed and empty-pit
//!   captures, the distribution cap, round boundaries, and the pauper
//!   refill rule.
//!
//! - **Move Sources** - Human, remote, and AI variants behind one
//!   interface, so the engine never cares where a pick comes from.
//!
//! The [`session`] module provides:
//!
//! - **Wire Protocol** - `{type, data, timestamp}` JSON messages for
//!   both directions, plus the rolling state checksum.
//!
//! - **Room Manager** - The server authority: one canonical engine per
//!   room, session reattachment with a disconnect grace period,
//!   cooperative pause, unanimous end-game votes, and idle-room
//!   housekeeping.
//!
//! - **Sync Client** - The client proxy: an optimistic local mirror,
//!   checksum reconciliation against authoritative broadcasts, and
//!   exponential-backoff reconnection.
//!
//! # Design Principles
//!
//! 1. **The server is authoritative** - Clients only ever hold
//!    disposable mirrors; any divergence is resolved by adopting the
//!    canonical snapshot wholesale.
//!
//! 2. **Rule rejections never mutate** - An invalid pick or sow is
//!    answered with a typed error and the state is untouched.
//!
//! 3. **No networking** - This crate is pure state. The embedding
//!    application owns sockets, timers, and rendering, and exchanges
//!    typed messages with the types here.
//!
//! 4. **Serialization-ready** - Snapshots and wire messages are serde
//!    types, so any JSON transport works.
//!
//! # Example
//!
//! ```rust
//! use pallanguzhi_state::engine::{GameConfig, Position, Side};
//! use pallanguzhi_state::session::{MoveAction, RoomManager};
//!
//! let mut manager = RoomManager::new(GameConfig::default());
//!
//! // Two players join the same room; the second join starts the game.
//! let host = manager.join_room("AB12X9", None, Some("Asha")).unwrap();
//! let guest = manager.join_room("AB12X9", None, Some("Bala")).unwrap();
//! assert!(manager.room("AB12X9").unwrap().is_started());
//!
//! // Side A moves first: empty a pit into hand.
//! let updates = manager
//!     .apply_move(&host.session_id, MoveAction::Pick, Position::new(Side::A, 0))
//!     .unwrap();
//!
//! // Both sessions receive the new canonical state.
//! assert_eq!(updates.len(), 2);
//! # let _ = guest;
//! ```

pub mod engine;
pub mod session;

// Re-export everything at the crate root
pub use engine::*;
pub use session::*;
