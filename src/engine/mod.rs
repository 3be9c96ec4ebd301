//! The rules core: board geometry, the turn state machine, and move
//! sources.
//!
//! Everything here is pure game state. The canonical instance lives in
//! a server room; clients run a second instance as an optimistic
//! mirror. Neither knows anything about sessions or sockets.

pub mod board;
pub mod game;
pub mod player;

pub use board::{Board, BoardState, GameConfig, Position, Side};
pub use game::{Game, GameError, GamePhase, GameSnapshot, SowOutcome};
pub use player::{MoveSource, Player};
