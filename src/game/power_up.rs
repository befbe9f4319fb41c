//! Power-Up Boxes
//!
//! Optional mid-match modifier for games created in power-up mode. A box
//! charges for a while, appears at a random mid-field position, and is
//! claimed by the side that last touched the ball when the ball runs into
//! it. Effects are timed and reverted on expiry.
//!
//! The box only tracks its own lifecycle; applying and reverting effects
//! against paddles and the ball is the state machine's job.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::vec2::Vec2;
use crate::game::geometry::{circle_intersects_rect, Rect};
use crate::game::state::Side;
use crate::{FIELD_HEIGHT, FIELD_WIDTH};

/// Box side length.
pub const POWER_UP_SIZE: f32 = 40.0;

/// Ticks between an effect ending and the next box appearing.
pub const CHARGE_TICKS: u32 = 600;

/// Ticks an effect stays active.
pub const EFFECT_TICKS: u32 = 480;

/// Kind of modifier a box grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    /// Enlarge the claiming player's paddle.
    GrowPaddle,
    /// Shrink the opponent's paddle.
    ShrinkOpponent,
    /// Slow the ball down.
    SlowBall,
}

impl PowerUpKind {
    fn random(rng: &mut impl Rng) -> Self {
        match rng.gen_range(0..3) {
            0 => Self::GrowPaddle,
            1 => Self::ShrinkOpponent,
            _ => Self::SlowBall,
        }
    }
}

/// Lifecycle phase of the box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PowerUpPhase {
    /// Counting down until the box appears.
    Charging {
        /// Ticks until the box spawns.
        ticks_left: u32,
    },
    /// On the field, waiting for the ball.
    Available,
    /// Effect running for the owning side.
    Active {
        /// Side the effect belongs to.
        owner: Side,
        /// Ticks until the effect reverts.
        ticks_left: u32,
    },
}

/// Lifecycle change produced by one tick, for the caller to act on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PowerUpTransition {
    /// Box appeared on the field.
    Spawned,
    /// Ball claimed the box for `owner`.
    Triggered {
        /// Claiming side.
        owner: Side,
        /// Granted effect.
        kind: PowerUpKind,
    },
    /// Effect ran out and must be reverted.
    Expired {
        /// Side that held the effect.
        owner: Side,
        /// Effect to revert.
        kind: PowerUpKind,
    },
}

/// The power-up box of a single game.
#[derive(Clone, Debug)]
pub struct PowerUpBox {
    /// Current position and size (meaningful while `Available`).
    pub rect: Rect,
    /// Effect the current box grants.
    pub kind: PowerUpKind,
    /// Lifecycle phase.
    pub phase: PowerUpPhase,
    /// Set on every phase change; the gateway clears it after broadcasting.
    pub update_send: bool,
}

impl PowerUpBox {
    /// Create a charging box.
    pub fn new() -> Self {
        Self {
            rect: Rect::new(0.0, 0.0, POWER_UP_SIZE, POWER_UP_SIZE),
            kind: PowerUpKind::GrowPaddle,
            phase: PowerUpPhase::Charging {
                ticks_left: CHARGE_TICKS,
            },
            update_send: false,
        }
    }

    /// Whether an effect is currently running.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, PowerUpPhase::Active { .. })
    }

    /// Advance the box one tick.
    ///
    /// `last_touch` is the side that last hit the ball; an available box
    /// ignores the ball until someone has touched it, so a fresh serve
    /// cannot claim a box for nobody.
    pub fn advance(
        &mut self,
        ball_center: Vec2,
        ball_radius: f32,
        last_touch: Option<Side>,
        rng: &mut impl Rng,
    ) -> Option<PowerUpTransition> {
        match self.phase {
            PowerUpPhase::Charging { ticks_left } => {
                if ticks_left > 1 {
                    self.phase = PowerUpPhase::Charging {
                        ticks_left: ticks_left - 1,
                    };
                    return None;
                }
                self.spawn(rng);
                Some(PowerUpTransition::Spawned)
            }
            PowerUpPhase::Available => {
                let owner = last_touch?;
                if !circle_intersects_rect(ball_center, ball_radius, &self.rect) {
                    return None;
                }
                self.phase = PowerUpPhase::Active {
                    owner,
                    ticks_left: EFFECT_TICKS,
                };
                self.update_send = true;
                Some(PowerUpTransition::Triggered {
                    owner,
                    kind: self.kind,
                })
            }
            PowerUpPhase::Active { owner, ticks_left } => {
                if ticks_left > 1 {
                    self.phase = PowerUpPhase::Active {
                        owner,
                        ticks_left: ticks_left - 1,
                    };
                    return None;
                }
                let kind = self.kind;
                self.phase = PowerUpPhase::Charging {
                    ticks_left: CHARGE_TICKS,
                };
                self.update_send = true;
                Some(PowerUpTransition::Expired { owner, kind })
            }
        }
    }

    fn spawn(&mut self, rng: &mut impl Rng) {
        // Middle third of the field, clear of the top/bottom walls
        let x = rng.gen_range(FIELD_WIDTH / 3.0..FIELD_WIDTH * 2.0 / 3.0 - POWER_UP_SIZE);
        let y = rng.gen_range(50.0..FIELD_HEIGHT - 50.0 - POWER_UP_SIZE);
        self.rect = Rect::new(x, y, POWER_UP_SIZE, POWER_UP_SIZE);
        self.kind = PowerUpKind::random(rng);
        self.phase = PowerUpPhase::Available;
        self.update_send = true;
    }
}

impl Default for PowerUpBox {
    fn default() -> Self {
        Self::new()
    }
}
