//! Client-side session proxy.
//!
//! Keeps a local mirror of the canonical engine so the UI can respond
//! to input instantly, forwards intents to the server only when they
//! succeed against the mirror, and reconciles the mirror against
//! authoritative broadcasts by checksum: on mismatch the incoming
//! snapshot wholly replaces local state (server-authoritative
//! last-write-wins, no merging).
//!
//! Sans-IO, like the rest of the crate: the transport layer feeds in
//! socket lifecycle calls ([`SyncClient::on_connect`],
//! [`SyncClient::on_disconnect`]) and decoded [`ServerMessage`]s, and
//! sends whatever [`ClientMessage`]s the methods hand back.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{Game, GameConfig, GameError, Player, Position, Side};
use crate::session::protocol::{
    state_checksum, ClientMessage, EndReason, LastAction, LeaveReason, MoveAction, OpponentInfo,
    ServerMessage,
};

/// First reconnect delay; doubles from here.
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Reconnect delays never exceed this.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Reconnect attempts before giving up for good.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Placeholder opponent name until the second player joins.
const WAITING_NAME: &str = "Waiting...";

/// Where the client stands with the server socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No socket yet (or cleanly closed).
    #[default]
    Disconnected,

    /// Socket open and usable.
    Connected,

    /// Socket lost; a reconnect attempt is scheduled.
    Reconnecting { attempt: u32 },

    /// Attempt budget exhausted. Terminal.
    Failed,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Client-side rejection of a local intent. Nothing was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientError {
    NotConnected,
    NotInRoom,
    GamePaused,
    NotYourTurn,
    Rule(GameError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Not connected to the server"),
            Self::NotInRoom => write!(f, "Not in a room"),
            Self::GamePaused => write!(f, "Game is paused"),
            Self::NotYourTurn => write!(f, "It's not your turn"),
            Self::Rule(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rule(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GameError> for ClientError {
    fn from(err: GameError) -> Self {
        Self::Rule(err)
    }
}

/// What a server message meant, for the render layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    RoomJoined {
        room_code: String,
        side: Side,
        player_name: String,
        opponent: Option<OpponentInfo>,
    },

    /// The mirror was overwritten by an authoritative snapshot.
    StateReplaced,

    /// A move was applied on the server; animate it.
    Move(LastAction),

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
    Paused {
        by: String,
    },
    Resumed {
        by: String,
    },
    Ended {
        reason: EndReason,
    },
    ServerError {
        code: String,
        message: String,
    },
}

/// The client half of the synchronization protocol.
#[derive(Debug)]
pub struct SyncClient {
    config: GameConfig,
    status: ConnectionStatus,
    reconnect_attempts: u32,
    room_code: Option<String>,
    session_id: Option<String>,
    side: Option<Side>,
    player_name: Option<String>,
    mirror: Option<Game>,
    paused: bool,
}

impl SyncClient {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            status: ConnectionStatus::Disconnected,
            reconnect_attempts: 0,
            room_code: None,
            session_id: None,
            side: None,
            player_name: None,
            mirror: None,
            paused: false,
        }
    }

    // Accessors

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_in_room(&self) -> bool {
        self.room_code.is_some()
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The local mirror, for the render layer to draw from. Read-only.
    pub fn mirror(&self) -> Option<&Game> {
        self.mirror.as_ref()
    }

    // Socket lifecycle

    /// Socket opened. When a room was joined before the outage, the
    /// returned message reattaches the old session; send it first.
    pub fn on_connect(&mut self) -> Option<ClientMessage> {
        self.status = ConnectionStatus::Connected;
        self.reconnect_attempts = 0;

        let room_code = self.room_code.clone()?;
        info!(room = %room_code, "rejoining after reconnect");
        Some(ClientMessage::JoinRoom {
            room_code,
            player_name: self.player_name.clone(),
            session_id: self.session_id.clone(),
        })
    }

    /// Socket closed. Returns how long to wait before the next connect
    /// attempt, or `None` when the budget is spent and the client is
    /// terminally failed. Local room state is kept either way so a
    /// successful reattach can pick up where it left off.
    pub fn on_disconnect(&mut self) -> Option<Duration> {
        if self.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
            warn!("reconnect budget exhausted, giving up");
            self.status = ConnectionStatus::Failed;
            return None;
        }

        self.reconnect_attempts += 1;
        self.status = ConnectionStatus::Reconnecting {
            attempt: self.reconnect_attempts,
        };
        Some(backoff_delay(self.reconnect_attempts))
    }

    // User intents

    /// Ask to join a room. The local bindings are set once the server
    /// answers with `ROOM_JOINED`.
    pub fn join_room(
        &mut self,
        room_code: &str,
        player_name: Option<&str>,
    ) -> Result<ClientMessage, ClientError> {
        if !self.status.is_connected() {
            return Err(ClientError::NotConnected);
        }
        Ok(ClientMessage::JoinRoom {
            room_code: room_code.to_string(),
            player_name: player_name.map(str::to_string),
            session_id: self.session_id.clone(),
        })
    }

    /// Validate a move against the local mirror and, if it applies
    /// cleanly, produce the intent to send. The mirror is already
    /// updated when this returns `Ok`, so the UI renders immediately.
    pub fn make_move(
        &mut self,
        action: MoveAction,
        position: Position,
    ) -> Result<ClientMessage, ClientError> {
        if !self.status.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if self.paused {
            return Err(ClientError::GamePaused);
        }
        let side = self.side.ok_or(ClientError::NotInRoom)?;
        let mirror = self.mirror.as_mut().ok_or(ClientError::NotInRoom)?;

        if mirror.current_side() != side {
            return Err(ClientError::NotYourTurn);
        }

        match action {
            MoveAction::Pick => mirror.pick(position)?,
            MoveAction::Sow => {
                mirror.sow(position)?;
            }
        }

        Ok(ClientMessage::MakeMove {
            action,
            position,
            checksum: Some(state_checksum(&mirror.snapshot())),
        })
    }

    pub fn pause_game(&mut self) -> Result<ClientMessage, ClientError> {
        self.room_intent(ClientMessage::PauseGame)
    }

    pub fn resume_game(&mut self) -> Result<ClientMessage, ClientError> {
        self.room_intent(ClientMessage::ResumeGame)
    }

    pub fn vote_end_game(&mut self) -> Result<ClientMessage, ClientError> {
        self.room_intent(ClientMessage::VoteEndGame)
    }

    /// Leave the room and forget all local room state.
    pub fn leave_room(&mut self) -> Result<ClientMessage, ClientError> {
        let message = self.room_intent(ClientMessage::LeaveRoom)?;
        self.reset_room_state();
        Ok(message)
    }

    fn room_intent(&self, message: ClientMessage) -> Result<ClientMessage, ClientError> {
        if !self.status.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if self.room_code.is_none() {
            return Err(ClientError::NotInRoom);
        }
        Ok(message)
    }

    // Server messages

    /// Fold an authoritative message into local state, returning what
    /// the render layer should react to.
    pub fn handle_message(&mut self, message: ServerMessage) -> Vec<SyncEvent> {
        match message {
            ServerMessage::RoomJoined {
                room_code,
                session_id,
                side,
                player_name,
                state,
                opponent,
            } => {
                self.room_code = Some(room_code.clone());
                self.session_id = Some(session_id);
                self.side = Some(side);
                self.player_name = Some(player_name.clone());

                let local = Player::human(player_name.clone(), side);
                let remote = Player::remote(
                    opponent
                        .as_ref()
                        .map(|o| o.name.clone())
                        .unwrap_or_else(|| WAITING_NAME.to_string()),
                    side.opponent(),
                );
                let (player_a, player_b) = match side {
                    Side::A => (local, remote),
                    Side::B => (remote, local),
                };
                let mut mirror = Game::new(player_a, player_b, self.config);
                if let Some(state) = &state {
                    mirror.restore(state);
                }
                self.mirror = Some(mirror);

                vec![SyncEvent::RoomJoined {
                    room_code,
                    side,
                    player_name,
                    opponent,
                }]
            }

            ServerMessage::GameStateUpdate { state, last_action } => {
                let Some(mirror) = self.mirror.as_mut() else {
                    return Vec::new();
                };

                let mut events = Vec::new();
                let local_checksum = state_checksum(&mirror.snapshot());
                if local_checksum != state_checksum(&state) {
                    debug!("mirror diverged from authoritative state, resyncing");
                    mirror.restore(&state);
                    events.push(SyncEvent::StateReplaced);
                }
                if let Some(action) = last_action {
                    events.push(SyncEvent::Move(action));
                }
                events
            }

            ServerMessage::PlayerJoined { player_name, side } => {
                vec![SyncEvent::PlayerJoined { player_name, side }]
            }

            ServerMessage::PlayerLeft {
                player_name,
                side,
                reason,
            } => vec![SyncEvent::PlayerLeft {
                player_name,
                side,
                reason,
            }],

            ServerMessage::PlayerReconnected { player_name, side } => {
                vec![SyncEvent::PlayerReconnected { player_name, side }]
            }

            ServerMessage::GamePaused { paused_by } => {
                self.paused = true;
                vec![SyncEvent::Paused { by: paused_by }]
            }

            ServerMessage::GameResumed { resumed_by } => {
                self.paused = false;
                vec![SyncEvent::Resumed { by: resumed_by }]
            }

            ServerMessage::GameEnded { reason } => {
                if let Some(mirror) = self.mirror.as_mut() {
                    if !mirror.is_over() {
                        mirror.abandon();
                    }
                }
                vec![SyncEvent::Ended { reason }]
            }

            ServerMessage::Error { code, message } => {
                warn!(code = %code, "server error: {}", message);
                vec![SyncEvent::ServerError { code, message }]
            }
        }
    }

    fn reset_room_state(&mut self) {
        self.room_code = None;
        self.session_id = None;
        self.side = None;
        self.player_name = None;
        self.mirror = None;
        self.paused = false;
    }
}

/// Exponential backoff: 1s, 2s, 4s, 8s, then capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = INITIAL_RECONNECT_DELAY
        .checked_mul(1u32 << (attempt.saturating_sub(1)).min(16))
        .unwrap_or(MAX_RECONNECT_DELAY);
    exp.min(MAX_RECONNECT_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GamePhase;
    use pretty_assertions::assert_eq;

    fn make_server_game() -> Game {
        Game::new(
            Player::remote("Alice", Side::A),
            Player::remote("Bob", Side::B),
            GameConfig::default(),
        )
    }

    /// A connected client that has joined a started room as `side`.
    fn make_joined_client(side: Side) -> SyncClient {
        let mut client = SyncClient::new(GameConfig::default());
        client.on_connect();
        client.handle_message(ServerMessage::RoomJoined {
            room_code: "AB12X9".to_string(),
            session_id: "session-1".to_string(),
            side,
            player_name: "Alice".to_string(),
            state: Some(make_server_game().snapshot()),
            opponent: Some(OpponentInfo {
                name: "Bob".to_string(),
                connected: true,
            }),
        });
        client
    }

    #[test]
    fn test_join_room_requires_connection() {
        let mut client = SyncClient::new(GameConfig::default());
        assert_eq!(
            client.join_room("AB12X9", Some("Alice")).unwrap_err(),
            ClientError::NotConnected
        );

        client.on_connect();
        let message = client.join_room("AB12X9", Some("Alice")).unwrap();
        assert_eq!(
            message,
            ClientMessage::JoinRoom {
                room_code: "AB12X9".to_string(),
                player_name: Some("Alice".to_string()),
                session_id: None,
            }
        );
    }

    #[test]
    fn test_room_joined_builds_mirror() {
        let client = make_joined_client(Side::A);

        assert_eq!(client.room_code(), Some("AB12X9"));
        assert_eq!(client.session_id(), Some("session-1"));
        assert_eq!(client.side(), Some(Side::A));

        let mirror = client.mirror().unwrap();
        assert_eq!(mirror.phase(), GamePhase::Picking);
        assert!(mirror.player(Side::A).is_interactive());
        assert_eq!(mirror.player(Side::B).name, "Bob");
    }

    #[test]
    fn test_make_move_applies_optimistically() {
        let mut client = make_joined_client(Side::A);

        let message = client
            .make_move(MoveAction::Pick, Position::new(Side::A, 3))
            .unwrap();

        // The mirror already reflects the pick.
        let mirror = client.mirror().unwrap();
        assert_eq!(mirror.phase(), GamePhase::Sowing);
        assert_eq!(mirror.in_hand(), 5);

        match message {
            ClientMessage::MakeMove {
                action,
                position,
                checksum,
            } => {
                assert_eq!(action, MoveAction::Pick);
                assert_eq!(position, Position::new(Side::A, 3));
                assert_eq!(
                    checksum,
                    Some(state_checksum(&client.mirror().unwrap().snapshot()))
                );
            }
            other => panic!("expected MAKE_MOVE, got {:?}", other),
        }
    }

    #[test]
    fn test_rejected_moves_send_nothing() {
        let mut client = make_joined_client(Side::A);
        let before = client.mirror().unwrap().snapshot();

        // Rule violation: picking the opponent's pit.
        assert_eq!(
            client
                .make_move(MoveAction::Pick, Position::new(Side::B, 0))
                .unwrap_err(),
            ClientError::Rule(GameError::NotYourPit)
        );
        assert_eq!(client.mirror().unwrap().snapshot(), before);

        // Out of turn entirely.
        let mut client = make_joined_client(Side::B);
        assert_eq!(
            client
                .make_move(MoveAction::Pick, Position::new(Side::B, 0))
                .unwrap_err(),
            ClientError::NotYourTurn
        );
    }

    #[test]
    fn test_matching_checksum_keeps_mirror() {
        let mut client = make_joined_client(Side::A);
        let snapshot = client.mirror().unwrap().snapshot();

        let events = client.handle_message(ServerMessage::GameStateUpdate {
            state: snapshot,
            last_action: None,
        });
        assert!(events.is_empty());
    }

    #[test]
    fn test_diverged_mirror_is_replaced() {
        let mut client = make_joined_client(Side::A);

        // The server applied a move this client never saw.
        let mut server = make_server_game();
        server.pick(Position::new(Side::A, 0)).unwrap();
        let authoritative = server.snapshot();

        let events = client.handle_message(ServerMessage::GameStateUpdate {
            state: authoritative.clone(),
            last_action: Some(LastAction {
                player_name: "Alice".to_string(),
                action: MoveAction::Pick,
                position: Position::new(Side::A, 0),
            }),
        });

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SyncEvent::StateReplaced);
        assert!(matches!(events[1], SyncEvent::Move(_)));
        assert_eq!(client.mirror().unwrap().snapshot(), authoritative);
    }

    #[test]
    fn test_pause_blocks_local_moves() {
        let mut client = make_joined_client(Side::A);

        let events = client.handle_message(ServerMessage::GamePaused {
            paused_by: "Bob".to_string(),
        });
        assert_eq!(
            events,
            vec![SyncEvent::Paused {
                by: "Bob".to_string()
            }]
        );

        assert_eq!(
            client
                .make_move(MoveAction::Pick, Position::new(Side::A, 0))
                .unwrap_err(),
            ClientError::GamePaused
        );

        client.handle_message(ServerMessage::GameResumed {
            resumed_by: "Bob".to_string(),
        });
        assert!(client
            .make_move(MoveAction::Pick, Position::new(Side::A, 0))
            .is_ok());
    }

    #[test]
    fn test_backoff_doubles_to_cap_then_fails() {
        let mut client = make_joined_client(Side::A);

        let delays: Vec<Option<Duration>> = (0..6).map(|_| client.on_disconnect()).collect();

        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
                Some(Duration::from_secs(8)),
                Some(Duration::from_secs(10)),
                None,
            ]
        );
        assert!(client.status().is_failed());

        // The mirror survived the whole outage.
        assert!(client.mirror().is_some());
    }

    #[test]
    fn test_reconnect_resends_join_with_session_id() {
        let mut client = make_joined_client(Side::A);

        client.on_disconnect();
        assert!(!client.status().is_connected());

        let rejoin = client.on_connect();
        assert_eq!(
            rejoin,
            Some(ClientMessage::JoinRoom {
                room_code: "AB12X9".to_string(),
                player_name: Some("Alice".to_string()),
                session_id: Some("session-1".to_string()),
            })
        );
        assert!(client.status().is_connected());

        // A successful reconnect resets the attempt budget.
        assert_eq!(client.on_disconnect(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_game_ended_abandons_mirror() {
        let mut client = make_joined_client(Side::A);

        let events = client.handle_message(ServerMessage::GameEnded {
            reason: EndReason::Vote,
        });

        assert_eq!(
            events,
            vec![SyncEvent::Ended {
                reason: EndReason::Vote
            }]
        );
        assert!(client.mirror().unwrap().is_over());
    }

    #[test]
    fn test_leave_room_resets_local_state() {
        let mut client = make_joined_client(Side::A);

        let message = client.leave_room().unwrap();
        assert_eq!(message, ClientMessage::LeaveRoom);
        assert!(!client.is_in_room());
        assert!(client.mirror().is_none());
        assert_eq!(client.session_id(), None);

        // Without a room there is nothing to rejoin on reconnect.
        client.on_disconnect();
        assert_eq!(client.on_connect(), None);
    }

    #[test]
    fn test_state_update_before_join_is_ignored() {
        let mut client = SyncClient::new(GameConfig::default());
        client.on_connect();

        let events = client.handle_message(ServerMessage::GameStateUpdate {
            state: make_server_game().snapshot(),
            last_action: None,
        });
        assert!(events.is_empty());
    }
}
