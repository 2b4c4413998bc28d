//! Cell identity and layout types shared by events and the orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid position of one cell
///
/// Ordering is row-major, which is also the order cells are built, drained
/// and fanned out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub row: usize,
    pub col: usize,
}

impl CellId {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.row, self.col)
    }
}

/// Window/tile presentation mode of the wall
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FullscreenMode {
    /// Regular window with chrome visible
    #[default]
    Normal,
    /// Window fullscreen, grid layout intact
    Window,
    /// One cell spans the whole grid (implies window fullscreen)
    Tile { cell: CellId },
}

impl FullscreenMode {
    pub fn is_window_fullscreen(&self) -> bool {
        !matches!(self, FullscreenMode::Normal)
    }

    pub fn tile_cell(&self) -> Option<CellId> {
        match self {
            FullscreenMode::Tile { cell } => Some(*cell),
            _ => None,
        }
    }
}

impl fmt::Display for FullscreenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullscreenMode::Normal => write!(f, "normal"),
            FullscreenMode::Window => write!(f, "window"),
            FullscreenMode::Tile { cell } => write!(f, "tile {}", cell),
        }
    }
}
