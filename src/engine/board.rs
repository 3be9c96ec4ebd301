//! Board state for Pallanguzhi.
//!
//! Two rows of pits, two capture stores, and per-pit active flags. The
//! board knows the traversal geometry (the counter-clockwise ring and
//! the opposite-pit mirror) but none of the sowing rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the board a player owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl Side {
    /// The other side of the board.
    pub fn opponent(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    /// Row index into board storage.
    pub fn index(&self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::A => "a",
            Side::B => "b",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pit location: which side and which index along that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub index: usize,
}

impl Position {
    pub fn new(side: Side, index: usize) -> Self {
        Self { side, index }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.side, self.index)
    }
}

/// Board and rules parameters shared by both players of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Seeds placed in each active pit at the start of a round.
    pub initial_seeds: u32,

    /// Pits per side of the board.
    pub pits_per_side: usize,

    /// Continuation distributions allowed after the opening pick.
    pub max_distributions: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            initial_seeds: 5,
            pits_per_side: 7,
            max_distributions: 2,
        }
    }
}

/// Serializable board snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    pub pits: [Vec<u32>; 2],
    pub stores: [u32; 2],
    pub active_pits: [Vec<bool>; 2],
}

/// The physical board.
///
/// All pit accessors are total over valid positions; an out-of-range
/// index is a programming error and panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pits: [Vec<u32>; 2],
    stores: [u32; 2],
    active: [Vec<bool>; 2],
    pits_per_side: usize,
}

impl Board {
    /// Create a board with every pit active and filled for a new round.
    pub fn new(config: &GameConfig) -> Self {
        Self {
            pits: [
                vec![config.initial_seeds; config.pits_per_side],
                vec![config.initial_seeds; config.pits_per_side],
            ],
            stores: [0, 0],
            active: [
                vec![true; config.pits_per_side],
                vec![true; config.pits_per_side],
            ],
            pits_per_side: config.pits_per_side,
        }
    }

    pub fn pits_per_side(&self) -> usize {
        self.pits_per_side
    }

    // Pit operations

    pub fn pit_count(&self, pos: Position) -> u32 {
        self.pits[pos.side.index()][pos.index]
    }

    pub fn set_pit_count(&mut self, pos: Position, count: u32) {
        self.pits[pos.side.index()][pos.index] = count;
    }

    /// Add one seed to a pit, returning its new count.
    pub fn increment_pit(&mut self, pos: Position) -> u32 {
        let cell = &mut self.pits[pos.side.index()][pos.index];
        *cell += 1;
        *cell
    }

    /// Empty a pit, returning the seeds that were in it.
    pub fn empty_pit(&mut self, pos: Position) -> u32 {
        std::mem::take(&mut self.pits[pos.side.index()][pos.index])
    }

    pub fn is_pit_empty(&self, pos: Position) -> bool {
        self.pit_count(pos) == 0
    }

    pub fn is_pit_active(&self, pos: Position) -> bool {
        self.active[pos.side.index()][pos.index]
    }

    pub fn activate_pit(&mut self, pos: Position) {
        self.active[pos.side.index()][pos.index] = true;
    }

    pub fn deactivate_pit(&mut self, pos: Position) {
        self.active[pos.side.index()][pos.index] = false;
    }

    // Store operations

    pub fn store(&self, side: Side) -> u32 {
        self.stores[side.index()]
    }

    pub fn add_to_store(&mut self, side: Side, count: u32) {
        self.stores[side.index()] += count;
    }

    /// Remove seeds from a store (round refill). Panics if the store
    /// holds fewer than `count` seeds.
    pub fn take_from_store(&mut self, side: Side, count: u32) {
        let store = &mut self.stores[side.index()];
        assert!(*store >= count, "store underflow on side {}", side);
        *store -= count;
    }

    // Traversal geometry

    /// The next pit on the counter-clockwise ring: along the owner's
    /// row, then wrapping onto the first pit of the other side.
    pub fn next_position(&self, pos: Position) -> Position {
        if pos.index + 1 < self.pits_per_side {
            Position::new(pos.side, pos.index + 1)
        } else {
            Position::new(pos.side.opponent(), 0)
        }
    }

    /// The traversal successor, skipping inactive pits. Inactive pits
    /// never receive seeds, so sowing flows over them.
    pub fn next_active_position(&self, pos: Position) -> Position {
        let mut next = self.next_position(pos);
        for _ in 0..2 * self.pits_per_side {
            if self.is_pit_active(next) {
                return next;
            }
            next = self.next_position(next);
        }
        // No active pit anywhere; the game is already decided.
        next
    }

    /// The pit directly across the board: a mirror across the ring's
    /// midpoint, `(other side, pits_per_side - 1 - index)`.
    pub fn opposite_position(&self, pos: Position) -> Position {
        Position::new(pos.side.opponent(), self.pits_per_side - 1 - pos.index)
    }

    // Aggregates

    pub fn total_seeds_on_board(&self) -> u32 {
        self.pits[0].iter().sum::<u32>() + self.pits[1].iter().sum::<u32>()
    }

    pub fn active_pit_count(&self, side: Side) -> usize {
        self.active[side.index()].iter().filter(|a| **a).count()
    }

    /// Positions on `side` that may legally start a pick: active and
    /// non-empty.
    pub fn pickable_positions(&self, side: Side) -> Vec<Position> {
        (0..self.pits_per_side)
            .map(|i| Position::new(side, i))
            .filter(|p| self.is_pit_active(*p) && !self.is_pit_empty(*p))
            .collect()
    }

    // Snapshots

    pub fn state(&self) -> BoardState {
        BoardState {
            pits: self.pits.clone(),
            stores: self.stores,
            active_pits: self.active.clone(),
        }
    }

    pub fn apply_state(&mut self, state: &BoardState) {
        self.pits = state.pits.clone();
        self.stores = state.stores;
        self.active = state.active_pits.clone();
        self.pits_per_side = state.pits[0].len();
    }
}
