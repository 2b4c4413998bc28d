//! # Goobert Common Library
//!
//! Shared code for the Goobert video wall:
//! - Error type and `Result` alias
//! - UI-facing event types (`WallEvent`) and the `EventBus`
//! - TOML configuration loading
//! - Media path normalization and kind detection
//! - SQLite statistics database

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod paths;
pub mod time;

pub use config::WallConfig;
pub use error::{Error, Result};
pub use events::{CellId, EventBus, FullscreenMode, WallEvent};
