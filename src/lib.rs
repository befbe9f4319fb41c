//! # Pong Arena Server
//!
//! Authoritative match server for the arena Pong game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PONG ARENA SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  └── vec2.rs     - Float 2D vector                           │
//! │                                                              │
//! │  game/           - Match logic (transport-free)              │
//! │  ├── geometry.rs - Rects, collision tests, reflection        │
//! │  ├── state.rs    - Per-match state machine                   │
//! │  ├── power_up.rs - Power-up box lifecycle                    │
//! │  └── queue.rs    - In-memory matchmaking queue               │
//! │                                                              │
//! │  network/        - Transport and orchestration               │
//! │  ├── protocol.rs - Client/server event types                 │
//! │  ├── external.rs - Online/blocked checks, result sink        │
//! │  ├── gateway.rs  - Event dispatcher (pure, effect lists)     │
//! │  └── server.rs   - WebSocket server, rooms, fan-out          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `game/` modules never touch a socket: the gateway maps each inbound
//! client event to a list of outbound effects, which the server layer
//! executes against the room registry. That keeps every match rule unit
//! testable without a transport.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::vec2::Vec2;
pub use game::queue::{GameQueue, QueueError, QueueRepository};
pub use game::state::{Game, MatchResultDto, RoomId, Side};
pub use network::gateway::{Effect, Gateway};
pub use network::protocol::{ClientEvent, ServerEvent};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Play-field width in world units.
pub const FIELD_WIDTH: f32 = 800.0;

/// Play-field height in world units.
pub const FIELD_HEIGHT: f32 = 600.0;

/// Paddle width.
pub const PADDLE_WIDTH: f32 = 20.0;

/// Paddle height.
pub const PADDLE_HEIGHT: f32 = 100.0;

/// Gap between a paddle and its goal line.
pub const PADDLE_MARGIN: f32 = 10.0;

/// Distance a paddle travels per move command.
pub const PADDLE_STEP: f32 = 20.0;

/// Ball radius.
pub const BALL_RADIUS: f32 = 10.0;

/// Horizontal ball speed on serve.
pub const SERVE_SPEED: f32 = 5.0;

/// Maximum vertical ball speed on serve (actual value is randomized).
pub const SERVE_MAX_DRIFT: f32 = 3.0;

/// Speed added on every paddle hit, so rallies cannot stall forever.
pub const SPEED_INCREMENT: f32 = 0.5;

/// Score that ends the match.
pub const WINNING_SCORE: u8 = 5;
