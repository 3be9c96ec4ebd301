//! Server-side room authority.
//!
//! One canonical turn engine per room, a session index for
//! reconnection, and the pause/vote/grace-period bookkeeping that keeps
//! two remote clients consistent across disconnects.
//!
//! The manager is sans-IO: every operation returns the broadcasts it
//! produced as [`Outbound`] values for the transport to deliver, and a
//! typed [`RoomError`] is reported to the offending connection only.
//! The embedding runtime is expected to call [`RoomManager::expire_disconnected`]
//! when a grace timer fires and [`RoomManager::sweep_idle_rooms`] on a
//! periodic housekeeping schedule. Message handling is single-threaded:
//! every operation takes `&mut self`, so a multi-threaded embedding
//! must serialize access (one lock or one task per manager).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{Game, GameConfig, GameError, Player, Position, Side};
use crate::session::protocol::{
    EndReason, LastAction, LeaveReason, MoveAction, OpponentInfo, ServerMessage,
};

/// Grace period before a disconnected session is dropped (30 seconds).
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(30);

/// Rooms idle longer than this are deleted by the sweep (1 hour).
pub const DEFAULT_ROOM_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Suggested cadence for the housekeeping sweep (5 minutes).
pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(300);

const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate an opaque 6-character room code.
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Fallback display name for joiners that did not send one.
fn generate_player_name() -> String {
    const ADJECTIVES: [&str; 5] = ["Swift", "Clever", "Bold", "Wise", "Quick"];
    const NOUNS: [&str; 5] = ["Player", "Gamer", "Master", "Champion", "Hero"];

    let mut rng = rand::thread_rng();
    format!(
        "{}{}{}",
        ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())],
        NOUNS[rng.gen_range(0..NOUNS.len())],
        rng.gen_range(0..1000)
    )
}

/// A message the transport must deliver to one session's socket.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub session_id: String,
    pub message: ServerMessage,
}

/// Result of a successful join or reattach.
#[derive(Debug)]
pub struct JoinOutcome {
    /// The session the connection is now bound to.
    pub session_id: String,

    /// True when an existing session was reattached rather than a new
    /// one created.
    pub reconnected: bool,

    pub outbound: Vec<Outbound>,
}

/// Errors reported back to the connection that caused them. None of
/// these end the game or touch room state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    RoomFull,
    NoActiveSession,
    NotInRoom,
    GameNotStarted,
    GamePaused,
    NotYourTurn,
    Rule(GameError),
}

impl RoomError {
    /// Stable wire code for `ERROR` messages.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomFull => "ROOM_FULL",
            Self::NoActiveSession => "NO_ACTIVE_SESSION",
            Self::NotInRoom => "NOT_IN_ROOM",
            Self::GameNotStarted => "GAME_NOT_STARTED",
            Self::GamePaused => "GAME_PAUSED",
            Self::NotYourTurn => "NOT_YOUR_TURN",
            Self::Rule(_) => "INVALID_MOVE",
        }
    }

    /// The `ERROR` message the transport should send back.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomFull => write!(f, "Room is already full"),
            Self::NoActiveSession => write!(f, "No active session"),
            Self::NotInRoom => write!(f, "Not in any room"),
            Self::GameNotStarted => write!(f, "Game not started"),
            Self::GamePaused => write!(f, "Game is paused"),
            Self::NotYourTurn => write!(f, "It's not your turn"),
            Self::Rule(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RoomError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rule(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GameError> for RoomError {
    fn from(err: GameError) -> Self {
        Self::Rule(err)
    }
}

/// A reconnect-stable identity bound to one side of one room.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub session_id: String,
    pub player_name: String,
    pub side: Side,
    pub connected: bool,

    /// Last message or (re)connection from this session.
    pub last_seen: Instant,

    /// Set while disconnected: drop the session once this passes.
    grace_deadline: Option<Instant>,
}

impl PlayerSession {
    fn new(session_id: String, player_name: String, side: Side) -> Self {
        Self {
            session_id,
            player_name,
            side,
            connected: true,
            last_seen: Instant::now(),
            grace_deadline: None,
        }
    }

    fn disconnect(&mut self, grace: Duration) {
        self.connected = false;
        self.last_seen = Instant::now();
        self.grace_deadline = Some(Instant::now() + grace);
    }

    fn reattach(&mut self) {
        self.connected = true;
        self.last_seen = Instant::now();
        self.grace_deadline = None;
    }

    fn is_expired(&self, now: Instant) -> bool {
        !self.connected && self.grace_deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// A server-held pairing of up to two sessions sharing one canonical
/// game.
#[derive(Debug)]
pub struct Room {
    pub room_code: String,
    config: GameConfig,
    sessions: HashMap<String, PlayerSession>,
    game: Option<Game>,
    pub paused: bool,
    end_votes: HashSet<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    last_activity: Instant,
}

impl Room {
    fn new(room_code: String, config: GameConfig) -> Self {
        Self {
            room_code,
            config,
            sessions: HashMap::new(),
            game: None,
            paused: false,
            end_votes: HashSet::new(),
            created_at: chrono::Utc::now(),
            last_activity: Instant::now(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= 2
    }

    pub fn is_started(&self) -> bool {
        self.game.is_some()
    }

    pub fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    pub fn session(&self, session_id: &str) -> Option<&PlayerSession> {
        self.sessions.get(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn peer_of(&self, session_id: &str) -> Option<&PlayerSession> {
        self.sessions
            .values()
            .find(|s| s.session_id != session_id)
    }

    fn session_by_side(&self, side: Side) -> Option<&PlayerSession> {
        self.sessions.values().find(|s| s.side == side)
    }

    /// The first side not yet taken. Join order gives the first joiner
    /// side A; if a side frees up mid-game, a later joiner fills it.
    fn free_side(&self) -> Option<Side> {
        [Side::A, Side::B]
            .into_iter()
            .find(|side| self.session_by_side(*side).is_none())
    }

    /// Start the canonical engine once both seats are filled.
    fn start_game(&mut self) {
        let name_a = self
            .session_by_side(Side::A)
            .map(|s| s.player_name.clone())
            .unwrap_or_default();
        let name_b = self
            .session_by_side(Side::B)
            .map(|s| s.player_name.clone())
            .unwrap_or_default();
        self.game = Some(Game::new(
            Player::remote(name_a, Side::A),
            Player::remote(name_b, Side::B),
            self.config,
        ));
    }

    /// `ROOM_JOINED` payload for one of this room's sessions.
    fn room_joined_message(&self, session: &PlayerSession) -> ServerMessage {
        ServerMessage::RoomJoined {
            room_code: self.room_code.clone(),
            session_id: session.session_id.clone(),
            side: session.side,
            player_name: session.player_name.clone(),
            state: self.game.as_ref().map(|g| g.snapshot()),
            opponent: self.peer_of(&session.session_id).map(|peer| OpponentInfo {
                name: peer.player_name.clone(),
                connected: peer.connected,
            }),
        }
    }

    /// Address a message to every session in the room.
    fn to_all(&self, message: ServerMessage) -> Vec<Outbound> {
        self.sessions
            .keys()
            .map(|session_id| Outbound {
                session_id: session_id.clone(),
                message: message.clone(),
            })
            .collect()
    }

    /// Address a message to everyone except `session_id`.
    fn to_peer(&self, session_id: &str, message: ServerMessage) -> Vec<Outbound> {
        self.sessions
            .keys()
            .filter(|id| id.as_str() != session_id)
            .map(|id| Outbound {
                session_id: id.clone(),
                message: message.clone(),
            })
            .collect()
    }
}

/// Owns every room and the session → room index. Constructor-injected
/// state with a defined lifecycle: created at server start, dropped at
/// shutdown.
#[derive(Debug)]
pub struct RoomManager {
    rooms: HashMap<String, Room>,
    session_index: HashMap<String, String>,
    config: GameConfig,
    disconnect_grace: Duration,
    room_idle_timeout: Duration,
}

impl RoomManager {
    pub fn new(config: GameConfig) -> Self {
        Self::with_timeouts(config, DEFAULT_DISCONNECT_GRACE, DEFAULT_ROOM_IDLE_TIMEOUT)
    }

    /// Construct with explicit timeouts (tests force expiry with
    /// `Duration::ZERO`).
    pub fn with_timeouts(
        config: GameConfig,
        disconnect_grace: Duration,
        room_idle_timeout: Duration,
    ) -> Self {
        Self {
            rooms: HashMap::new(),
            session_index: HashMap::new(),
            config,
            disconnect_grace,
            room_idle_timeout,
        }
    }

    pub fn room(&self, room_code: &str) -> Option<&Room> {
        self.rooms.get(room_code)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_code_for(&self, session_id: &str) -> Option<&str> {
        self.session_index.get(session_id).map(String::as_str)
    }

    /// Join a room, reattaching when `session_id` names a live session.
    ///
    /// A fresh join creates the room on demand, assigns the first free
    /// side (join order: first joiner gets side A) and starts the
    /// canonical game when the second seat fills. A reattach restores
    /// `connected`, re-sends the full state, and notifies the peer.
    pub fn join_room(
        &mut self,
        room_code: &str,
        session_id: Option<&str>,
        player_name: Option<&str>,
    ) -> Result<JoinOutcome, RoomError> {
        if let Some(existing) = session_id {
            let known = self
                .session_index
                .get(existing)
                .and_then(|code| self.rooms.get(code))
                .map_or(false, |room| room.session(existing).is_some());
            if known {
                return Ok(self.reattach_session(existing));
            }
        }

        self.join_fresh(room_code, player_name)
    }

    fn reattach_session(&mut self, session_id: &str) -> JoinOutcome {
        // Index and membership were checked by the caller.
        let room_code = self.session_index[session_id].clone();
        let room = self.rooms.get_mut(&room_code).expect("indexed room exists");

        if let Some(session) = room.sessions.get_mut(session_id) {
            session.reattach();
        }
        room.touch();

        let session = &room.sessions[session_id];
        info!(
            room = %room_code,
            player = %session.player_name,
            "session reattached"
        );

        let mut outbound = vec![Outbound {
            session_id: session_id.to_string(),
            message: room.room_joined_message(session),
        }];
        outbound.extend(room.to_peer(
            session_id,
            ServerMessage::PlayerReconnected {
                player_name: session.player_name.clone(),
                side: session.side,
            },
        ));

        JoinOutcome {
            session_id: session_id.to_string(),
            reconnected: true,
            outbound,
        }
    }

    fn join_fresh(
        &mut self,
        room_code: &str,
        player_name: Option<&str>,
    ) -> Result<JoinOutcome, RoomError> {
        let config = self.config;
        let room = self
            .rooms
            .entry(room_code.to_string())
            .or_insert_with(|| {
                info!(room = %room_code, "room created");
                Room::new(room_code.to_string(), config)
            });

        let side = room.free_side().ok_or(RoomError::RoomFull)?;
        let session_id = Uuid::new_v4().to_string();
        let name = player_name
            .map(str::to_string)
            .unwrap_or_else(generate_player_name);

        room.sessions.insert(
            session_id.clone(),
            PlayerSession::new(session_id.clone(), name.clone(), side),
        );
        room.touch();

        if room.is_full() && !room.is_started() {
            room.start_game();
            info!(room = %room_code, "both seats filled, game started");
        }

        let session = &room.sessions[&session_id];
        let mut outbound = vec![Outbound {
            session_id: session_id.clone(),
            message: room.room_joined_message(session),
        }];
        outbound.extend(room.to_peer(
            &session_id,
            ServerMessage::PlayerJoined {
                player_name: name.clone(),
                side,
            },
        ));

        self.session_index
            .insert(session_id.clone(), room_code.to_string());
        info!(room = %room_code, player = %name, side = %side, "player joined");

        Ok(JoinOutcome {
            session_id,
            reconnected: false,
            outbound,
        })
    }

    /// Validate and apply a move on the canonical engine, broadcasting
    /// the resulting state to both sessions. A game the move finishes
    /// also broadcasts `GAME_ENDED`.
    pub fn apply_move(
        &mut self,
        session_id: &str,
        action: MoveAction,
        position: Position,
    ) -> Result<Vec<Outbound>, RoomError> {
        let room_code = self
            .session_index
            .get(session_id)
            .ok_or(RoomError::NoActiveSession)?;
        let room = self
            .rooms
            .get_mut(room_code)
            .ok_or(RoomError::NotInRoom)?;
        let session = room
            .sessions
            .get(session_id)
            .ok_or(RoomError::NoActiveSession)?;
        let side = session.side;
        let player_name = session.player_name.clone();
        let game = room.game.as_mut().ok_or(RoomError::GameNotStarted)?;

        if room.paused {
            return Err(RoomError::GamePaused);
        }
        if side != game.current_side() {
            return Err(RoomError::NotYourTurn);
        }

        match action {
            MoveAction::Pick => game.pick(position)?,
            MoveAction::Sow => {
                game.sow(position)?;
            }
        }

        debug!(
            room = %room.room_code,
            player = %player_name,
            action = action.as_str(),
            position = %position,
            "move applied"
        );

        let snapshot = game.snapshot();
        let finished = game.is_over();
        room.touch();

        let mut outbound = room.to_all(ServerMessage::GameStateUpdate {
            state: snapshot,
            last_action: Some(LastAction {
                player_name,
                action,
                position,
            }),
        });
        if finished {
            outbound.extend(room.to_all(ServerMessage::GameEnded {
                reason: EndReason::Finished,
            }));
        }
        Ok(outbound)
    }

    /// Explicitly leave: the session is removed at once, no grace.
    pub fn leave_room(&mut self, session_id: &str) -> Vec<Outbound> {
        self.remove_session(session_id, LeaveReason::Leave)
    }

    /// Record an end-game vote. The game ends when every session in the
    /// room has voted (unanimous consent); votes die with the room.
    pub fn vote_end_game(&mut self, session_id: &str) -> Result<Vec<Outbound>, RoomError> {
        let room_code = self
            .session_index
            .get(session_id)
            .ok_or(RoomError::NoActiveSession)?
            .clone();
        let room = self
            .rooms
            .get_mut(&room_code)
            .ok_or(RoomError::NotInRoom)?;

        room.end_votes.insert(session_id.to_string());
        room.touch();

        if room.end_votes.len() < room.sessions.len() {
            return Ok(Vec::new());
        }

        if let Some(game) = room.game.as_mut() {
            game.abandon();
        }
        let outbound = room.to_all(ServerMessage::GameEnded {
            reason: EndReason::Vote,
        });
        info!(room = %room_code, "game ended by unanimous vote");
        self.delete_room(&room_code);
        Ok(outbound)
    }

    /// Cooperative pause: either side may pause; both are notified and
    /// the engine accepts no moves until resumed.
    pub fn pause_game(&mut self, session_id: &str) -> Result<Vec<Outbound>, RoomError> {
        let (room_code, player_name) = self.locate(session_id)?;
        let room = self.rooms.get_mut(&room_code).ok_or(RoomError::NotInRoom)?;
        room.paused = true;
        room.touch();
        Ok(room.to_all(ServerMessage::GamePaused {
            paused_by: player_name,
        }))
    }

    /// Resume a cooperative pause; either side may resume.
    pub fn resume_game(&mut self, session_id: &str) -> Result<Vec<Outbound>, RoomError> {
        let (room_code, player_name) = self.locate(session_id)?;
        let room = self.rooms.get_mut(&room_code).ok_or(RoomError::NotInRoom)?;
        room.paused = false;
        room.touch();
        Ok(room.to_all(ServerMessage::GameResumed {
            resumed_by: player_name,
        }))
    }

    /// Socket closed: keep the session for the grace period so the
    /// same `session_id` can reattach, and tell the peer.
    pub fn handle_disconnect(&mut self, session_id: &str) -> Vec<Outbound> {
        let Some(room_code) = self.session_index.get(session_id) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(room_code) else {
            return Vec::new();
        };
        let grace = self.disconnect_grace;
        let Some(session) = room.sessions.get_mut(session_id) else {
            return Vec::new();
        };

        session.disconnect(grace);
        let player_name = session.player_name.clone();
        let side = session.side;
        info!(room = %room.room_code, player = %player_name, "player disconnected");

        room.to_peer(
            session_id,
            ServerMessage::PlayerLeft {
                player_name,
                side,
                reason: LeaveReason::Disconnect,
            },
        )
    }

    /// Grace-timer callback: permanently remove sessions whose
    /// deadline has passed. A removal forcibly ends the room's game.
    pub fn expire_disconnected(&mut self) -> Vec<Outbound> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .rooms
            .values()
            .flat_map(|room| room.sessions.values())
            .filter(|session| session.is_expired(now))
            .map(|session| session.session_id.clone())
            .collect();

        let mut outbound = Vec::new();
        for session_id in expired {
            outbound.extend(self.remove_session(&session_id, LeaveReason::Timeout));
        }
        outbound
    }

    /// Housekeeping sweep: delete rooms idle longer than the timeout.
    /// Returns the deleted room codes. Independent of the per-session
    /// grace timer; guards against orphaned rooms.
    pub fn sweep_idle_rooms(&mut self) -> Vec<String> {
        let stale: Vec<String> = self
            .rooms
            .values()
            .filter(|room| room.idle_for() >= self.room_idle_timeout)
            .map(|room| room.room_code.clone())
            .collect();

        for room_code in &stale {
            info!(room = %room_code, "sweeping idle room");
            self.delete_room(room_code);
        }
        stale
    }

    fn locate(&self, session_id: &str) -> Result<(String, String), RoomError> {
        let room_code = self
            .session_index
            .get(session_id)
            .ok_or(RoomError::NoActiveSession)?;
        let room = self.rooms.get(room_code).ok_or(RoomError::NotInRoom)?;
        let session = room
            .sessions
            .get(session_id)
            .ok_or(RoomError::NoActiveSession)?;
        Ok((room_code.clone(), session.player_name.clone()))
    }

    /// Remove a session permanently, notifying the peer; a timeout
    /// removal also ends the game. Empty rooms are deleted.
    fn remove_session(&mut self, session_id: &str, reason: LeaveReason) -> Vec<Outbound> {
        let Some(room_code) = self.session_index.remove(session_id) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&room_code) else {
            return Vec::new();
        };
        let Some(session) = room.sessions.remove(session_id) else {
            return Vec::new();
        };

        room.end_votes.remove(session_id);
        info!(
            room = %room_code,
            player = %session.player_name,
            reason = ?reason,
            "session removed"
        );

        let mut outbound = room.to_all(ServerMessage::PlayerLeft {
            player_name: session.player_name,
            side: session.side,
            reason,
        });

        if reason == LeaveReason::Timeout {
            if let Some(game) = room.game.as_mut() {
                if !game.is_over() {
                    game.abandon();
                    outbound.extend(room.to_all(ServerMessage::GameEnded {
                        reason: EndReason::Timeout,
                    }));
                }
            }
        }

        if room.sessions.is_empty() {
            self.delete_room(&room_code);
        }
        outbound
    }

    fn delete_room(&mut self, room_code: &str) {
        if let Some(room) = self.rooms.remove(room_code) {
            for session_id in room.sessions.keys() {
                self.session_index.remove(session_id);
            }
            debug!(room = %room_code, "room deleted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CODE: &str = "AB12X9";

    fn make_manager() -> RoomManager {
        RoomManager::new(GameConfig::default())
    }

    fn join_two(manager: &mut RoomManager) -> (String, String) {
        let a = manager
            .join_room(CODE, None, Some("Alice"))
            .unwrap()
            .session_id;
        let b = manager
            .join_room(CODE, None, Some("Bob"))
            .unwrap()
            .session_id;
        (a, b)
    }

    fn messages_for<'a>(outbound: &'a [Outbound], session_id: &str) -> Vec<&'a ServerMessage> {
        outbound
            .iter()
            .filter(|o| o.session_id == session_id)
            .map(|o| &o.message)
            .collect()
    }

    #[test]
    fn test_room_code_shape() {
        let code = generate_room_code();
        assert_eq!(code.len(), 6);
        assert!(code
            .bytes()
            .all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        assert_ne!(generate_room_code(), generate_room_code());
    }

    #[test]
    fn test_first_join_creates_room_as_side_a() {
        let mut manager = make_manager();

        let outcome = manager.join_room(CODE, None, Some("Alice")).unwrap();

        assert!(!outcome.reconnected);
        assert_eq!(manager.room_count(), 1);
        assert!(!manager.room(CODE).unwrap().is_started());

        match &outcome.outbound[0].message {
            ServerMessage::RoomJoined {
                room_code,
                side,
                state,
                opponent,
                ..
            } => {
                assert_eq!(room_code, CODE);
                assert_eq!(*side, Side::A);
                assert!(state.is_none());
                assert!(opponent.is_none());
            }
            other => panic!("expected ROOM_JOINED, got {:?}", other),
        }
    }

    #[test]
    fn test_second_join_starts_game_with_opponent_info() {
        let mut manager = make_manager();
        let first = manager.join_room(CODE, None, Some("Alice")).unwrap();

        let second = manager.join_room(CODE, None, Some("Bob")).unwrap();

        assert!(manager.room(CODE).unwrap().is_started());

        // Joiner sees the opponent and the initial state.
        match &second.outbound[0].message {
            ServerMessage::RoomJoined {
                side,
                state,
                opponent,
                ..
            } => {
                assert_eq!(*side, Side::B);
                assert!(state.is_some());
                assert_eq!(opponent.as_ref().unwrap().name, "Alice");
                assert!(opponent.as_ref().unwrap().connected);
            }
            other => panic!("expected ROOM_JOINED, got {:?}", other),
        }

        // The first player is told about the new arrival.
        let for_first = messages_for(&second.outbound, &first.session_id);
        assert_eq!(
            for_first,
            vec![&ServerMessage::PlayerJoined {
                player_name: "Bob".to_string(),
                side: Side::B,
            }]
        );
    }

    #[test]
    fn test_third_join_rejected() {
        let mut manager = make_manager();
        join_two(&mut manager);

        let result = manager.join_room(CODE, None, Some("Carol"));
        assert!(matches!(result, Err(RoomError::RoomFull)));
    }

    #[test]
    fn test_apply_move_broadcasts_to_both() {
        let mut manager = make_manager();
        let (a, b) = join_two(&mut manager);

        let outbound = manager
            .apply_move(&a, MoveAction::Pick, Position::new(Side::A, 3))
            .unwrap();

        for session_id in [&a, &b] {
            let msgs = messages_for(&outbound, session_id);
            assert_eq!(msgs.len(), 1);
            match msgs[0] {
                ServerMessage::GameStateUpdate { state, last_action } => {
                    assert_eq!(state.in_hand, 5);
                    let action = last_action.as_ref().unwrap();
                    assert_eq!(action.player_name, "Alice");
                    assert_eq!(action.action, MoveAction::Pick);
                }
                other => panic!("expected GAME_STATE_UPDATE, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_apply_move_rejections() {
        let mut manager = make_manager();

        // Unknown session
        let err = manager
            .apply_move("nope", MoveAction::Pick, Position::new(Side::A, 0))
            .unwrap_err();
        assert_eq!(err, RoomError::NoActiveSession);

        // Game not started with only one player
        let solo = manager
            .join_room("SOLO42", None, Some("Alice"))
            .unwrap()
            .session_id;
        let err = manager
            .apply_move(&solo, MoveAction::Pick, Position::new(Side::A, 0))
            .unwrap_err();
        assert_eq!(err, RoomError::GameNotStarted);

        // Out-of-turn move
        let (_, b) = join_two(&mut manager);
        let err = manager
            .apply_move(&b, MoveAction::Pick, Position::new(Side::B, 0))
            .unwrap_err();
        assert_eq!(err, RoomError::NotYourTurn);
    }

    #[test]
    fn test_apply_move_rule_violation_is_typed() {
        let mut manager = make_manager();
        let (a, _) = join_two(&mut manager);

        let err = manager
            .apply_move(&a, MoveAction::Pick, Position::new(Side::B, 0))
            .unwrap_err();
        assert_eq!(err, RoomError::Rule(GameError::NotYourPit));
        assert_eq!(err.code(), "INVALID_MOVE");

        // Nothing changed on the canonical engine.
        let game = manager.room(CODE).unwrap().game().unwrap();
        assert_eq!(game.in_hand(), 0);
    }

    #[test]
    fn test_pause_blocks_moves_until_resume() {
        let mut manager = make_manager();
        let (a, b) = join_two(&mut manager);

        let outbound = manager.pause_game(&b).unwrap();
        assert_eq!(outbound.len(), 2);
        assert!(manager.room(CODE).unwrap().paused);

        let err = manager
            .apply_move(&a, MoveAction::Pick, Position::new(Side::A, 0))
            .unwrap_err();
        assert_eq!(err, RoomError::GamePaused);

        manager.resume_game(&a).unwrap();
        assert!(!manager.room(CODE).unwrap().paused);
        manager
            .apply_move(&a, MoveAction::Pick, Position::new(Side::A, 0))
            .unwrap();
    }

    #[test]
    fn test_vote_end_game_requires_unanimity() {
        let mut manager = make_manager();
        let (a, b) = join_two(&mut manager);

        let outbound = manager.vote_end_game(&a).unwrap();
        assert!(outbound.is_empty());
        assert_eq!(manager.room_count(), 1);

        let outbound = manager.vote_end_game(&b).unwrap();
        assert_eq!(
            messages_for(&outbound, &a),
            vec![&ServerMessage::GameEnded {
                reason: EndReason::Vote
            }]
        );
        assert_eq!(
            messages_for(&outbound, &b),
            vec![&ServerMessage::GameEnded {
                reason: EndReason::Vote
            }]
        );

        // Room torn down, sessions unbound.
        assert_eq!(manager.room_count(), 0);
        assert_eq!(
            manager
                .apply_move(&a, MoveAction::Pick, Position::new(Side::A, 0))
                .unwrap_err(),
            RoomError::NoActiveSession
        );
    }

    #[test]
    fn test_disconnect_notifies_peer_and_allows_reattach() {
        let mut manager = make_manager();
        let (a, b) = join_two(&mut manager);
        let before = manager.room(CODE).unwrap().game().unwrap().snapshot();

        let outbound = manager.handle_disconnect(&a);
        assert_eq!(
            messages_for(&outbound, &b),
            vec![&ServerMessage::PlayerLeft {
                player_name: "Alice".to_string(),
                side: Side::A,
                reason: LeaveReason::Disconnect,
            }]
        );
        assert!(!manager.room(CODE).unwrap().session(&a).unwrap().connected);

        // Reattach with the same session ID within the grace period.
        let outcome = manager.join_room(CODE, Some(&a), None).unwrap();
        assert!(outcome.reconnected);
        assert_eq!(outcome.session_id, a);

        let session = manager.room(CODE).unwrap().session(&a).unwrap();
        assert!(session.connected);
        assert_eq!(session.side, Side::A);

        // Peer is told, and the canonical state is untouched.
        let for_peer = messages_for(&outcome.outbound, &b);
        assert_eq!(
            for_peer,
            vec![&ServerMessage::PlayerReconnected {
                player_name: "Alice".to_string(),
                side: Side::A,
            }]
        );
        match &outcome.outbound[0].message {
            ServerMessage::RoomJoined { state, .. } => {
                assert_eq!(state.as_ref().unwrap(), &before);
            }
            other => panic!("expected ROOM_JOINED, got {:?}", other),
        }
    }

    #[test]
    fn test_expired_session_is_removed_and_game_ended() {
        let mut manager = RoomManager::with_timeouts(
            GameConfig::default(),
            Duration::ZERO,
            DEFAULT_ROOM_IDLE_TIMEOUT,
        );
        let (a, b) = join_two(&mut manager);

        manager.handle_disconnect(&a);
        let outbound = manager.expire_disconnected();

        let for_peer = messages_for(&outbound, &b);
        assert_eq!(
            for_peer,
            vec![
                &ServerMessage::PlayerLeft {
                    player_name: "Alice".to_string(),
                    side: Side::A,
                    reason: LeaveReason::Timeout,
                },
                &ServerMessage::GameEnded {
                    reason: EndReason::Timeout
                },
            ]
        );

        let room = manager.room(CODE).unwrap();
        assert!(room.session(&a).is_none());
        assert!(room.game().unwrap().is_over());

        // The stale session ID no longer reattaches; the seat reopens.
        let outcome = manager.join_room(CODE, Some(&a), Some("Carol")).unwrap();
        assert!(!outcome.reconnected);
        assert_ne!(outcome.session_id, a);
    }

    #[test]
    fn test_leave_room_removes_and_deletes_empty_room() {
        let mut manager = make_manager();
        let (a, b) = join_two(&mut manager);

        let outbound = manager.leave_room(&a);
        assert_eq!(
            messages_for(&outbound, &b),
            vec![&ServerMessage::PlayerLeft {
                player_name: "Alice".to_string(),
                side: Side::A,
                reason: LeaveReason::Leave,
            }]
        );
        assert_eq!(manager.room(CODE).unwrap().session_count(), 1);

        manager.leave_room(&b);
        assert_eq!(manager.room_count(), 0);
    }

    #[test]
    fn test_sweep_deletes_idle_rooms() {
        let mut manager = RoomManager::with_timeouts(
            GameConfig::default(),
            DEFAULT_DISCONNECT_GRACE,
            Duration::ZERO,
        );
        let (a, _) = join_two(&mut manager);

        let swept = manager.sweep_idle_rooms();

        assert_eq!(swept, vec![CODE.to_string()]);
        assert_eq!(manager.room_count(), 0);
        assert!(manager.room_code_for(&a).is_none());
    }

    #[test]
    fn test_error_wire_codes() {
        assert_eq!(RoomError::RoomFull.code(), "ROOM_FULL");
        assert_eq!(RoomError::GameNotStarted.code(), "GAME_NOT_STARTED");
        match RoomError::Rule(GameError::EmptyPit).to_message() {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, "INVALID_MOVE");
                assert_eq!(message, "Pit is empty");
            }
            other => panic!("expected ERROR, got {:?}", other),
        }
    }
}
