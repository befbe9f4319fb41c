//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. Everything
//! travels as JSON text frames: the internally tagged event enums have no
//! self-describing binary form, so binary frames are not part of the
//! protocol and the server drops them.

use serde::{Deserialize, Serialize};

use crate::game::power_up::{PowerUpBox, PowerUpKind, PowerUpPhase};
use crate::game::state::{Ball, GameDto, MoveDirection, PlayerDto, RoomId};

// =============================================================================
// CLIENT -> SERVER EVENTS
// =============================================================================

/// Events sent from client to server. Every one is best-effort: a stale or
/// malformed request is answered with `game_not_found` or dropped, never a
/// connection error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Directly challenge another player.
    Challenge(ChallengePayload),

    /// Accept a pending challenge.
    AcceptChallenge(AcceptChallengePayload),

    /// Decline a pending challenge.
    RejectChallenge {
        /// Room of the challenge.
        room: RoomId,
    },

    /// Enter open matchmaking.
    JoinGame(JoinGamePayload),

    /// Move the paddle one step.
    Move {
        /// Step direction.
        direction: MoveDirection,
        /// Room of the game.
        room: RoomId,
    },

    /// Authoritative physics tick (accepted from player1 only).
    UpdateBall {
        /// Room of the game.
        room: RoomId,
    },

    /// Ask for a broadcast of all live games.
    GetGameList,

    /// Join a running game as a spectator.
    WatchGame {
        /// Room of the game.
        room: RoomId,
    },

    /// Voluntarily leave; equivalent to disconnecting.
    LeftGame,
}

/// Challenge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengePayload {
    /// Challenger's nickname.
    pub user_source: String,
    /// Challenged player's nickname.
    pub user_target: String,
    /// Whether the match runs in power-up mode.
    pub with_power_ups: bool,
}

/// Challenge acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptChallengePayload {
    /// Room of the pending challenge.
    pub room: RoomId,
    /// Accepting player's nickname (the original target).
    pub user_source: String,
    /// Original challenger's nickname.
    pub user_target: String,
}

/// Open matchmaking request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGamePayload {
    /// Player's nickname.
    pub name: String,
    /// Whether to match into power-up mode.
    pub with_power_ups: bool,
}

// =============================================================================
// SERVER -> CLIENT EVENTS
// =============================================================================

/// Events sent from server to a client or fanned out to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full game snapshot (lobby sync, spectator join).
    UpdateGame(GameDto),

    /// Room assigned to a freshly created game.
    GameRoom {
        /// The assigned room.
        room: RoomId,
    },

    /// Both players bound; the rally begins.
    StartGame(GameDto),

    /// Paddle/score state of both players.
    UpdatePlayer {
        /// Left player.
        player1: PlayerDto,
        /// Right player.
        player2: PlayerDto,
    },

    /// Per-tick ball position; `scored` marks ticks that also carried a goal.
    UpdateBall {
        /// Ball snapshot.
        ball: Ball,
        /// Whether a goal happened this tick.
        scored: bool,
    },

    /// Score changed.
    UpdateScore {
        /// Player1's score.
        player1: u8,
        /// Player2's score.
        player2: u8,
    },

    /// Power-up box changed phase.
    UpdatePowerUp(PowerUpDto),

    /// Terminal state reached; carries the final snapshot.
    EndGame(GameDto),

    /// Referenced game/player unavailable; optional human-readable reason.
    GameNotFound {
        /// Reason shown to the user, when one is safe to share.
        message: Option<String>,
    },

    /// A challenge was declined.
    RejectChallenge,

    /// All currently live games.
    GameList {
        /// Started, unfinished games.
        games: Vec<GameDto>,
    },
}

/// Client-facing view of the power-up box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerUpDto {
    /// Box left edge.
    pub x: f32,
    /// Box top edge.
    pub y: f32,
    /// Effect the box grants.
    pub kind: PowerUpKind,
    /// Box is on the field waiting for the ball.
    pub visible: bool,
    /// Effect currently running.
    pub is_active: bool,
}

impl PowerUpDto {
    /// Project a box into its wire form.
    pub fn from_box(power_up: &PowerUpBox) -> Self {
        Self {
            x: power_up.rect.x,
            y: power_up.rect.y,
            kind: power_up.kind,
            visible: matches!(power_up.phase, PowerUpPhase::Available),
            is_active: power_up.is_active(),
        }
    }
}

impl ClientEvent {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerEvent {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
