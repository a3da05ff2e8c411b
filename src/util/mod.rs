//! Internal utilities for the Covent runtime.

pub mod arena;

pub use arena::{Arena, ArenaIndex};
