//! The Pallanguzhi turn engine.
//!
//! Owns the phase state machine and every sowing rule. One canonical
//! instance lives on the server per room; clients keep a disposable
//! mirror of it for optimistic input.
//!
//! # Turn flow
//!
//! ```text
//! ┌─────────┐  pick   ┌────────┐  hand empties, next pit empty  ┌─────────┐
//! │ picking │────────▶│ sowing │───────────────────────────────▶│ picking │
//! └─────────┘         └───┬────┘        (capture, switch side)  └─────────┘
//!                         │ ▲
//!                         │ │ hand empties, next pit holds seeds,
//!                         ▼ │ distribution budget left
//!                      continue (pick up next pit, keep sowing)
//! ```
//!
//! The `ended` phase is reached when a round boundary leaves a side with
//! no active pits, or when the session forcibly abandons the game.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::engine::board::{Board, BoardState, GameConfig, Position, Side};
use crate::engine::player::Player;

/// Phase of the turn state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    /// Waiting for the current side to choose a pit.
    #[default]
    Picking,

    /// Seeds in hand, being distributed one pit at a time.
    Sowing,

    /// Terminal. No further picks or sows.
    Ended,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Picking => "picking",
            Self::Sowing => "sowing",
            Self::Ended => "ended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

/// Rule-level rejection of a pick or sow. The engine state is never
/// mutated when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    WrongPhase,
    NotYourPit,
    InactivePit,
    EmptyPit,
    EmptyHand,
    NotNextInTraversal,
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongPhase => write!(f, "Action not valid in the current phase"),
            Self::NotYourPit => write!(f, "Pit belongs to the other side"),
            Self::InactivePit => write!(f, "Pit is not active"),
            Self::EmptyPit => write!(f, "Pit is empty"),
            Self::EmptyHand => write!(f, "No seeds in hand"),
            Self::NotNextInTraversal => write!(f, "Sowing must follow the traversal order"),
        }
    }
}

impl std::error::Error for GameError {}

/// What a single accepted sow did, for callers that animate or log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SowOutcome {
    /// Seeds banked into the sower's store by this step.
    pub captured: u32,

    /// The turn passed to the other side.
    pub turn_over: bool,

    /// The board emptied and a new round was set up.
    pub round_completed: bool,
}

/// Full serializable engine state, used for authoritative broadcasts
/// and client mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub board: BoardState,
    pub current_side: Side,
    pub round: u32,
    pub phase: GamePhase,
    pub in_hand: u32,
    pub distribution_count: u32,
    pub last_sow_position: Option<Position>,
}

/// The turn engine: rules state machine over a [`Board`] with two bound
/// players.
#[derive(Debug, Clone)]
pub struct Game {
    board: Board,
    config: GameConfig,
    players: [Player; 2],
    current_side: Side,
    round: u32,
    phase: GamePhase,
    in_hand: u32,
    distribution_count: u32,
    last_sow_position: Option<Position>,
}

impl Game {
    /// Create a new match. Side A always moves first.
    pub fn new(player_a: Player, player_b: Player, config: GameConfig) -> Self {
        Self {
            board: Board::new(&config),
            config,
            players: [player_a, player_b],
            current_side: Side::A,
            round: 1,
            phase: GamePhase::Picking,
            in_hand: 0,
            distribution_count: 0,
            last_sow_position: None,
        }
    }

    // Accessors

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn player(&self, side: Side) -> &Player {
        &self.players[side.index()]
    }

    pub fn current_player(&self) -> &Player {
        self.player(self.current_side)
    }

    pub fn current_side(&self) -> Side {
        self.current_side
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn in_hand(&self) -> u32 {
        self.in_hand
    }

    pub fn distribution_count(&self) -> u32 {
        self.distribution_count
    }

    pub fn last_sow_position(&self) -> Option<Position> {
        self.last_sow_position
    }

    pub fn is_over(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Seeds on the board plus seeds in both stores plus seeds in hand.
    /// Constant for the whole match.
    pub fn total_seeds_in_play(&self) -> u32 {
        self.board.total_seeds_on_board()
            + self.board.store(Side::A)
            + self.board.store(Side::B)
            + self.in_hand
    }

    /// Pits the current side may pick from right now.
    pub fn valid_pick_positions(&self) -> Vec<Position> {
        if self.phase != GamePhase::Picking {
            return Vec::new();
        }
        self.board.pickable_positions(self.current_side)
    }

    /// The single pit the next sow must target, if a sow is expected.
    pub fn valid_sow_position(&self) -> Option<Position> {
        if self.phase != GamePhase::Sowing || self.in_hand == 0 {
            return None;
        }
        self.last_sow_position
            .map(|last| self.board.next_active_position(last))
    }

    // Moves

    /// Empty a pit into hand and enter the sowing phase.
    ///
    /// The pit must belong to the current side, be active, and hold at
    /// least one seed.
    pub fn pick(&mut self, pos: Position) -> Result<(), GameError> {
        if self.phase != GamePhase::Picking {
            return Err(GameError::WrongPhase);
        }
        if pos.side != self.current_side {
            return Err(GameError::NotYourPit);
        }
        if !self.board.is_pit_active(pos) {
            return Err(GameError::InactivePit);
        }
        if self.board.is_pit_empty(pos) {
            return Err(GameError::EmptyPit);
        }

        self.in_hand = self.board.empty_pit(pos);
        self.last_sow_position = Some(pos);
        self.phase = GamePhase::Sowing;
        Ok(())
    }

    /// Drop one seed into the forced next pit.
    ///
    /// Sowing is not a free choice: the only legal target is the
    /// traversal successor of the last sown pit. A pit that reaches
    /// exactly four seeds is captured by the sower immediately,
    /// whichever side owns it. When the hand empties the end-of-hand
    /// rules run: empty-successor capture ends the turn, a non-empty
    /// successor continues the distribution while budget remains.
    pub fn sow(&mut self, pos: Position) -> Result<SowOutcome, GameError> {
        if self.phase != GamePhase::Sowing {
            return Err(GameError::WrongPhase);
        }
        if self.in_hand == 0 {
            return Err(GameError::EmptyHand);
        }
        let last = self.last_sow_position.ok_or(GameError::WrongPhase)?;
        if pos != self.board.next_active_position(last) {
            return Err(GameError::NotNextInTraversal);
        }

        let new_count = self.board.increment_pit(pos);
        self.in_hand -= 1;
        self.last_sow_position = Some(pos);

        let mut outcome = SowOutcome::default();

        // Four-seed capture fires at placement time, before any
        // end-of-hand evaluation.
        if new_count == 4 {
            let captured = self.board.empty_pit(pos);
            self.board.add_to_store(self.current_side, captured);
            outcome.captured += captured;
        }

        if self.in_hand == 0 {
            let (captured, turn_over, round_completed) = self.finish_hand(pos);
            outcome.captured += captured;
            outcome.turn_over = turn_over;
            outcome.round_completed = round_completed;
        }

        Ok(outcome)
    }

    /// Forcibly end the game (end-game vote, disconnect timeout).
    pub fn abandon(&mut self) {
        self.phase = GamePhase::Ended;
        self.in_hand = 0;
        self.distribution_count = 0;
        self.last_sow_position = None;
    }

    /// The side with the higher store, or `None` for a draw.
    pub fn winner(&self) -> Option<Side> {
        match self.board.store(Side::A).cmp(&self.board.store(Side::B)) {
            Ordering::Greater => Some(Side::A),
            Ordering::Less => Some(Side::B),
            Ordering::Equal => None,
        }
    }

    // Snapshots

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            board: self.board.state(),
            current_side: self.current_side,
            round: self.round,
            phase: self.phase,
            in_hand: self.in_hand,
            distribution_count: self.distribution_count,
            last_sow_position: self.last_sow_position,
        }
    }

    /// Replace the whole engine state with an authoritative snapshot.
    /// Player bindings are kept.
    pub fn restore(&mut self, snapshot: &GameSnapshot) {
        self.board.apply_state(&snapshot.board);
        self.current_side = snapshot.current_side;
        self.round = snapshot.round;
        self.phase = snapshot.phase;
        self.in_hand = snapshot.in_hand;
        self.distribution_count = snapshot.distribution_count;
        self.last_sow_position = snapshot.last_sow_position;
    }

    // Rule internals

    /// End-of-hand evaluation: runs when the hand has just emptied.
    /// Returns (captured, turn_over, round_completed).
    fn finish_hand(&mut self, last: Position) -> (u32, bool, bool) {
        let next = self.board.next_active_position(last);

        if self.board.is_pit_empty(next) {
            // Empty-successor capture: the successor (trivially empty)
            // plus whatever its opposite pit holds.
            let mut captured = self.board.empty_pit(next);
            let opposite = self.board.opposite_position(next);
            if !self.board.is_pit_empty(opposite) {
                captured += self.board.empty_pit(opposite);
            }
            self.board.add_to_store(self.current_side, captured);
            let round_completed = self.end_turn();
            (captured, true, round_completed)
        } else if self.distribution_count < self.config.max_distributions {
            // Continue the distribution from where it landed. No
            // ownership check on the continuation pit.
            self.distribution_count += 1;
            self.in_hand = self.board.empty_pit(next);
            self.last_sow_position = Some(next);
            (0, false, false)
        } else {
            let round_completed = self.end_turn();
            (0, true, round_completed)
        }
    }

    /// Pass the turn: switch side, reset per-turn fields, then check
    /// for a round boundary and for the pauper end condition.
    fn end_turn(&mut self) -> bool {
        self.current_side = self.current_side.opponent();
        self.phase = GamePhase::Picking;
        self.in_hand = 0;
        self.distribution_count = 0;
        self.last_sow_position = None;

        let mut round_completed = false;
        if self.board.total_seeds_on_board() == 0 {
            round_completed = true;
            self.begin_new_round();
        }

        if self.board.active_pit_count(Side::A) == 0
            || self.board.active_pit_count(Side::B) == 0
        {
            self.phase = GamePhase::Ended;
        }

        round_completed
    }

    /// Round boundary: both sides refill from their stores, then the
    /// round counter advances.
    fn begin_new_round(&mut self) {
        self.refill_side(Side::A);
        self.refill_side(Side::B);
        self.round += 1;
    }

    /// Refill left to right: every `initial_seeds` captured seeds buy
    /// one active pit for the coming round; pits that cannot be fully
    /// refilled are deactivated. Previously inactive pits take part, so
    /// captures can win houses back. The sub-`initial_seeds` remainder
    /// stays in the store.
    fn refill_side(&mut self, side: Side) {
        for index in 0..self.board.pits_per_side() {
            let pos = Position::new(side, index);
            if self.board.store(side) >= self.config.initial_seeds {
                self.board.take_from_store(side, self.config.initial_seeds);
                self.board.set_pit_count(pos, self.config.initial_seeds);
                self.board.activate_pit(pos);
            } else {
                self.board.deactivate_pit(pos);
            }
        }
    }
}
