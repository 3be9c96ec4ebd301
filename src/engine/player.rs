//! Move sources bound to each side of a game.
//!
//! A player is a display name, a side, and a source of pit choices.
//! The engine never branches on the concrete source: interactive
//! sources (human input, remote broadcasts) have their choices fed in
//! from outside, while an AI source is asked for a proposal whenever
//! the engine is in the picking phase. Sowing needs no proposals at
//! all — it is forced, so every source just confirms
//! [`Game::valid_sow_position`].

use serde::{Deserialize, Serialize};

use crate::engine::board::{Position, Side};
use crate::engine::game::Game;

/// Where a player's moves come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveSource {
    /// Local interactive input, fed in by the UI layer.
    Human,

    /// Moves arrive over the network as authoritative broadcasts.
    Remote,

    /// Moves are computed on demand.
    Ai,
}

impl MoveSource {
    /// Interactive sources wait on external input; `Ai` computes.
    pub fn is_interactive(&self) -> bool {
        !matches!(self, Self::Ai)
    }
}

/// A participant bound to one side of the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub side: Side,
    pub source: MoveSource,
}

impl Player {
    pub fn new(name: impl Into<String>, side: Side, source: MoveSource) -> Self {
        Self {
            name: name.into(),
            side,
            source,
        }
    }

    pub fn human(name: impl Into<String>, side: Side) -> Self {
        Self::new(name, side, MoveSource::Human)
    }

    pub fn remote(name: impl Into<String>, side: Side) -> Self {
        Self::new(name, side, MoveSource::Remote)
    }

    pub fn ai(name: impl Into<String>, side: Side) -> Self {
        Self::new(name, side, MoveSource::Ai)
    }

    pub fn is_interactive(&self) -> bool {
        self.source.is_interactive()
    }

    /// Ask a computing source for a pick: the first active, non-empty
    /// pit on its own side. Interactive sources return `None` — their
    /// choice arrives from outside.
    pub fn propose_pick(&self, game: &Game) -> Option<Position> {
        if self.source.is_interactive() {
            return None;
        }
        game.board()
            .pickable_positions(self.side)
            .into_iter()
            .next()
    }
}
