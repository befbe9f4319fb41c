//! Match logic: geometry, per-game state machine, power-ups, and the
//! matchmaking queue. Transport-free and synchronous throughout.

pub mod geometry;
pub mod power_up;
pub mod queue;
pub mod state;
