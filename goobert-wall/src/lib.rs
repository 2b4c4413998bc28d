//! # Goobert Wall Library (goobert-wall)
//!
//! Orchestrator for a wall of independently playing media cells.
//!
//! **Purpose:** Own the grid of playback cells, route user actions to one or
//! many cells, restart dead cells, manage tile fullscreen, and account watch
//! time per file.
//!
//! **Architecture:** A single async loop (`runtime::run_wall`) owns the
//! `Wall`. Engines signal through the `bridge`; everything else reaches the
//! wall as `WallCommand`s.

pub mod accounting;
pub mod action;
pub mod bridge;
pub mod cell;
pub mod engine;
pub mod error;
pub mod fullscreen;
pub mod keymap;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod scanner;
pub mod scheduler;
pub mod wall;
pub mod watchdog;

pub use action::Action;
pub use error::{Error, Result};
pub use keymap::{ActionResolver, KeyMap};
pub use runtime::{spawn_wall, WallCommand, WallHandle, WallReport};
pub use wall::{CellCommand, GridRequest, Wall, WallSnapshot};
