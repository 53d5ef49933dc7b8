//! Battlescape - tactical battle simulation core

pub mod battle;
pub mod core;
