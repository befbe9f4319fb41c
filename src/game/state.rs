//! Match State Machine
//!
//! One `Game` per match: two player slots, the ball, the optional power-up
//! box, and the lifecycle flags. A game is `Waiting` until both connections
//! are bound, `Started` while the rally runs, and `Ended` once a winner is
//! decided or a bound player quits.
//!
//! Everything here is synchronous and transport-free; the gateway owns the
//! only instance of each game and drives it from client events.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::vec2::Vec2;
use crate::game::geometry::{circle_intersects_rect, crossed_face, vertical_overlap, Rect};
use crate::game::power_up::{PowerUpBox, PowerUpKind, PowerUpTransition};
use crate::{
    BALL_RADIUS, FIELD_HEIGHT, FIELD_WIDTH, PADDLE_HEIGHT, PADDLE_MARGIN, PADDLE_STEP,
    PADDLE_WIDTH, SERVE_MAX_DRIFT, SERVE_SPEED, SPEED_INCREMENT, WINNING_SCORE,
};

/// Match room identifier, also the broadcast scope.
pub type RoomId = u32;

/// Transport-session identifier of a connected socket.
pub type ConnectionId = Uuid;

/// Paddle height while a grow effect is running.
pub const GROWN_PADDLE_HEIGHT: f32 = 150.0;

/// Paddle height while a shrink effect is running.
pub const SHRUNK_PADDLE_HEIGHT: f32 = 60.0;

/// Ball speed multiplier while a slow-ball effect is running.
pub const SLOW_BALL_FACTOR: f32 = 0.6;

/// Which side of the field a player occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Left slot; its connection is the authoritative tick source.
    Player1,
    /// Right slot.
    Player2,
}

impl Side {
    /// The other side.
    pub fn opponent(self) -> Side {
        match self {
            Side::Player1 => Side::Player2,
            Side::Player2 => Side::Player1,
        }
    }
}

/// Paddle move direction, step-quantized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    /// Toward the top wall.
    Up,
    /// Toward the bottom wall.
    Down,
}

impl MoveDirection {
    fn dy(self) -> f32 {
        match self {
            MoveDirection::Up => -PADDLE_STEP,
            MoveDirection::Down => PADDLE_STEP,
        }
    }
}

/// One player slot of a game.
///
/// `name` may be unset while the slot waits for open matchmaking;
/// `connection` stays unset until a socket binds to the slot.
#[derive(Clone, Debug)]
pub struct PlayerSlot {
    /// Nickname, once known.
    pub name: Option<String>,
    /// Bound transport session, once joined.
    pub connection: Option<ConnectionId>,
    /// Paddle rectangle.
    pub paddle: Rect,
    /// Goals scored.
    pub score: u8,
    /// Set when the player's connection dropped mid-game.
    pub quit: bool,
}

impl PlayerSlot {
    fn new(side: Side) -> Self {
        let x = match side {
            Side::Player1 => PADDLE_MARGIN,
            Side::Player2 => FIELD_WIDTH - PADDLE_MARGIN - PADDLE_WIDTH,
        };
        Self {
            name: None,
            connection: None,
            paddle: Rect::new(x, (FIELD_HEIGHT - PADDLE_HEIGHT) / 2.0, PADDLE_WIDTH, PADDLE_HEIGHT),
            score: 0,
            quit: false,
        }
    }

    /// Whether a connection is bound to this slot.
    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }
}

/// The ball.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    /// Center position.
    pub pos: Vec2,
    /// Velocity per tick.
    pub vel: Vec2,
    /// Radius.
    pub radius: f32,
}

/// A single match and its whole lifecycle.
#[derive(Clone, Debug)]
pub struct Game {
    /// Room identifier, unique among queued games.
    pub room: RoomId,
    /// Left player.
    pub player1: PlayerSlot,
    /// Right player.
    pub player2: PlayerSlot,
    /// The ball.
    pub ball: Ball,
    /// Power-up box, present iff the game runs in power-up mode.
    pub power_up: Option<PowerUpBox>,
    /// Mode selector, fixed at creation.
    pub with_power_ups: bool,
    /// Created through a direct challenge (never matched openly).
    pub is_challenge: bool,
    /// Both players bound, rally running.
    pub has_started: bool,
    /// Terminal state reached.
    pub has_ended: bool,
    /// Still waiting for a second player.
    pub waiting: bool,
    /// Winning nickname, once decided. Unset for a double-quit abort.
    pub winner: Option<String>,
    /// Side that last reflected the ball; owns a claimed power-up.
    last_touch: Option<Side>,
}

impl Game {
    /// Create a waiting game.
    pub fn new(room: RoomId, with_power_ups: bool, is_challenge: bool) -> Self {
        let mut rng = rand::thread_rng();
        let toward = if rng.gen_bool(0.5) {
            Side::Player1
        } else {
            Side::Player2
        };
        Self {
            room,
            player1: PlayerSlot::new(Side::Player1),
            player2: PlayerSlot::new(Side::Player2),
            ball: Ball {
                pos: Vec2::new(FIELD_WIDTH / 2.0, FIELD_HEIGHT / 2.0),
                vel: serve_velocity(toward, &mut rng),
                radius: BALL_RADIUS,
            },
            power_up: with_power_ups.then(PowerUpBox::new),
            with_power_ups,
            is_challenge,
            has_started: false,
            has_ended: false,
            waiting: true,
            winner: None,
            last_touch: None,
        }
    }

    /// Slot for a side.
    pub fn slot(&self, side: Side) -> &PlayerSlot {
        match side {
            Side::Player1 => &self.player1,
            Side::Player2 => &self.player2,
        }
    }

    /// Mutable slot for a side.
    pub fn slot_mut(&mut self, side: Side) -> &mut PlayerSlot {
        match side {
            Side::Player1 => &mut self.player1,
            Side::Player2 => &mut self.player2,
        }
    }

    /// Bind a connection (and nickname) to a slot.
    pub fn bind(&mut self, side: Side, connection: ConnectionId, name: &str) {
        let slot = self.slot_mut(side);
        slot.connection = Some(connection);
        slot.name = Some(name.to_string());
    }

    /// Transition `Waiting -> Started` once both slots are bound.
    pub fn start(&mut self) {
        self.has_started = true;
        self.waiting = false;
    }

    /// Which side a connection is bound to, if any.
    pub fn side_of(&self, connection: ConnectionId) -> Option<Side> {
        if self.player1.connection == Some(connection) {
            Some(Side::Player1)
        } else if self.player2.connection == Some(connection) {
            Some(Side::Player2)
        } else {
            None
        }
    }

    /// Whether either slot still has no bound connection.
    pub fn has_open_slot(&self) -> bool {
        !self.player1.is_bound() || !self.player2.is_bound()
    }

    /// Whether the nickname occupies either slot.
    pub fn involves_name(&self, name: &str) -> bool {
        self.player1.name.as_deref() == Some(name) || self.player2.name.as_deref() == Some(name)
    }

    /// Advance the simulation one tick. Returns whether a goal was scored
    /// this tick, so the caller knows to broadcast score and player state.
    ///
    /// No-op on a game that has not started or has already ended; callers
    /// feed only the authoritative client's ticks in here.
    pub fn update(&mut self) -> bool {
        if !self.has_started || self.has_ended {
            return false;
        }
        let mut rng = rand::thread_rng();
        let prev = self.ball.pos;
        self.ball.pos += self.ball.vel;

        self.bounce_walls();
        self.check_paddle_hit(Side::Player1, prev);
        self.check_paddle_hit(Side::Player2, prev);
        self.advance_power_up(&mut rng);

        // Goal: ball fully past a goal line
        if self.ball.pos.x + self.ball.radius < 0.0 {
            self.player2.score += 1;
            self.reset_ball(Side::Player2, &mut rng);
            return true;
        }
        if self.ball.pos.x - self.ball.radius > FIELD_WIDTH {
            self.player1.score += 1;
            self.reset_ball(Side::Player1, &mut rng);
            return true;
        }
        false
    }

    fn bounce_walls(&mut self) {
        let r = self.ball.radius;
        if self.ball.pos.y - r <= 0.0 {
            self.ball.pos.y = r;
            self.ball.vel.y = self.ball.vel.y.abs();
        } else if self.ball.pos.y + r >= FIELD_HEIGHT {
            self.ball.pos.y = FIELD_HEIGHT - r;
            self.ball.vel.y = -self.ball.vel.y.abs();
        }
    }

    /// Swept paddle collision: the ball's leading edge crossing the paddle
    /// face during the step counts, so a fast ball cannot tunnel through.
    fn check_paddle_hit(&mut self, side: Side, prev: Vec2) {
        let r = self.ball.radius;
        let paddle = self.slot(side).paddle;
        let hit = match side {
            Side::Player1 if self.ball.vel.x < 0.0 => {
                let face = paddle.right();
                crossed_face(prev.x - r, self.ball.pos.x - r, face)
                    && vertical_overlap(self.ball.pos.y, r, &paddle)
                    || circle_intersects_rect(self.ball.pos, r, &paddle)
            }
            Side::Player2 if self.ball.vel.x > 0.0 => {
                let face = paddle.x;
                crossed_face(prev.x + r, self.ball.pos.x + r, face)
                    && vertical_overlap(self.ball.pos.y, r, &paddle)
                    || circle_intersects_rect(self.ball.pos, r, &paddle)
            }
            _ => false,
        };
        if !hit {
            return;
        }
        let speed = self.ball.vel.x.abs() + SPEED_INCREMENT;
        match side {
            Side::Player1 => {
                self.ball.pos.x = paddle.right() + r;
                self.ball.vel.x = speed;
            }
            Side::Player2 => {
                self.ball.pos.x = paddle.x - r;
                self.ball.vel.x = -speed;
            }
        }
        self.last_touch = Some(side);
    }

    fn advance_power_up(&mut self, rng: &mut impl Rng) {
        let Some(power_up) = self.power_up.as_mut() else {
            return;
        };
        let transition =
            power_up.advance(self.ball.pos, self.ball.radius, self.last_touch, rng);
        match transition {
            Some(PowerUpTransition::Triggered { owner, kind }) => self.apply_effect(owner, kind),
            Some(PowerUpTransition::Expired { owner, kind }) => self.revert_effect(owner, kind),
            Some(PowerUpTransition::Spawned) | None => {}
        }
    }

    fn apply_effect(&mut self, owner: Side, kind: PowerUpKind) {
        match kind {
            PowerUpKind::GrowPaddle => self.resize_paddle(owner, GROWN_PADDLE_HEIGHT),
            PowerUpKind::ShrinkOpponent => {
                self.resize_paddle(owner.opponent(), SHRUNK_PADDLE_HEIGHT)
            }
            PowerUpKind::SlowBall => {
                self.ball.vel = self.ball.vel.scale(SLOW_BALL_FACTOR);
            }
        }
    }

    fn revert_effect(&mut self, owner: Side, kind: PowerUpKind) {
        match kind {
            PowerUpKind::GrowPaddle => self.resize_paddle(owner, PADDLE_HEIGHT),
            PowerUpKind::ShrinkOpponent => self.resize_paddle(owner.opponent(), PADDLE_HEIGHT),
            PowerUpKind::SlowBall => {
                self.ball.vel = self.ball.vel.scale(1.0 / SLOW_BALL_FACTOR);
            }
        }
    }

    fn resize_paddle(&mut self, side: Side, height: f32) {
        let paddle = &mut self.slot_mut(side).paddle;
        // Keep the paddle centered on its previous middle, inside the field
        let center = paddle.y + paddle.h / 2.0;
        paddle.h = height;
        paddle.y = (center - height / 2.0).clamp(0.0, FIELD_HEIGHT - height);
    }

    fn reset_ball(&mut self, scorer: Side, rng: &mut impl Rng) {
        self.ball.pos = Vec2::new(FIELD_WIDTH / 2.0, FIELD_HEIGHT / 2.0);
        self.ball.vel = serve_velocity(scorer, rng);
        self.last_touch = None;
    }

    /// Evaluate score and quit flags. Returns true exactly on the call that
    /// transitions the game to `Ended`; the winner never changes afterwards.
    pub fn check_winner(&mut self) -> bool {
        if self.has_ended {
            return false;
        }
        if self.player1.quit && self.player2.quit {
            // Both players gone: forced end, no winner
            self.has_ended = true;
            return true;
        }
        let winning_side = if self.player1.quit || self.player2.score >= WINNING_SCORE {
            Side::Player2
        } else if self.player2.quit || self.player1.score >= WINNING_SCORE {
            Side::Player1
        } else {
            return false;
        };
        self.winner = self.slot(winning_side).name.clone();
        self.has_ended = true;
        true
    }

    /// Pre-move validation: true if the step would leave the play field,
    /// in which case the move must be rejected instead of clamped.
    pub fn is_paddle_collision(&self, side: Side, direction: MoveDirection) -> bool {
        let bounds = Rect::new(0.0, 0.0, FIELD_WIDTH, FIELD_HEIGHT);
        !self
            .slot(side)
            .paddle
            .translated(0.0, direction.dy())
            .within(&bounds)
    }

    /// Apply a validated move.
    pub fn apply_move(&mut self, side: Side, direction: MoveDirection) {
        let dy = direction.dy();
        self.slot_mut(side).paddle.y += dy;
    }

    /// Live-sync projection for clients.
    pub fn game_dto(&self) -> GameDto {
        GameDto {
            room: self.room,
            player1: self.player_dto(Side::Player1),
            player2: self.player_dto(Side::Player2),
            with_power_ups: self.with_power_ups,
            is_challenge: self.is_challenge,
            has_started: self.has_started,
            has_ended: self.has_ended,
            waiting: self.waiting,
            winner: self.winner.clone(),
        }
    }

    /// Per-player projection for `update_player` broadcasts.
    pub fn player_dto(&self, side: Side) -> PlayerDto {
        let slot = self.slot(side);
        PlayerDto {
            name: slot.name.clone(),
            paddle: slot.paddle,
            score: slot.score,
        }
    }

    /// Result record for the persistence collaborator. Winner and loser are
    /// both unset for a double-quit abort.
    pub fn result_dto(&self) -> MatchResultDto {
        let winning_side = self.winner.as_deref().and_then(|w| {
            if self.player1.name.as_deref() == Some(w) {
                Some(Side::Player1)
            } else if self.player2.name.as_deref() == Some(w) {
                Some(Side::Player2)
            } else {
                None
            }
        });
        match winning_side {
            Some(side) => MatchResultDto {
                winner: self.slot(side).name.clone(),
                loser: self.slot(side.opponent()).name.clone(),
                winner_score: self.slot(side).score,
                loser_score: self.slot(side.opponent()).score,
                ended_at: Utc::now(),
            },
            None => MatchResultDto {
                winner: None,
                loser: None,
                winner_score: self.player1.score,
                loser_score: self.player2.score,
                ended_at: Utc::now(),
            },
        }
    }
}

fn serve_velocity(toward: Side, rng: &mut impl Rng) -> Vec2 {
    let vx = match toward {
        Side::Player1 => -SERVE_SPEED,
        Side::Player2 => SERVE_SPEED,
    };
    Vec2::new(vx, rng.gen_range(-SERVE_MAX_DRIFT..=SERVE_MAX_DRIFT))
}

// =============================================================================
// DTOS
// =============================================================================

/// Client-facing view of one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerDto {
    /// Nickname, once known.
    pub name: Option<String>,
    /// Paddle rectangle.
    pub paddle: Rect,
    /// Goals scored.
    pub score: u8,
}

/// Client-facing view of a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameDto {
    /// Room identifier.
    pub room: RoomId,
    /// Left player.
    pub player1: PlayerDto,
    /// Right player.
    pub player2: PlayerDto,
    /// Power-up mode flag.
    pub with_power_ups: bool,
    /// Challenge flag.
    pub is_challenge: bool,
    /// Lifecycle: started.
    pub has_started: bool,
    /// Lifecycle: ended.
    pub has_ended: bool,
    /// Lifecycle: waiting for an opponent.
    pub waiting: bool,
    /// Winning nickname, once decided.
    pub winner: Option<String>,
}

/// Immutable result record handed to the persistence collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResultDto {
    /// Winner nickname; unset on a double-quit abort.
    pub winner: Option<String>,
    /// Loser nickname; unset on a double-quit abort.
    pub loser: Option<String>,
    /// Winner's final score (player1's on an abort).
    pub winner_score: u8,
    /// Loser's final score (player2's on an abort).
    pub loser_score: u8,
    /// When the match ended.
    pub ended_at: DateTime<Utc>,
}
