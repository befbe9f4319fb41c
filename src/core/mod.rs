//! Core primitives shared by game and network layers.

pub mod vec2;

pub use vec2::Vec2;
