//! Cell registry
//!
//! Owns the grid topology and every `PlaybackCell`. Cells are stored in
//! row-major order, which is also the order engines are created, drained
//! and commanded in.

use crate::accounting::SessionAccountant;
use crate::bridge::EngineWaker;
use crate::cell::PlaybackCell;
use crate::engine::EngineFactory;
use crate::error::{Error, Result};
use goobert_common::CellId;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Default)]
pub struct CellRegistry {
    rows: usize,
    cols: usize,
    cells: Vec<PlaybackCell>,
    selected: Option<CellId>,
}

impl CellRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create one engine session per cell, row-major
    ///
    /// **Requires** an empty registry. If any engine fails to create, the
    /// engines already created are released and the registry stays empty.
    pub fn build(
        &mut self,
        rows: usize,
        cols: usize,
        factory: &mut dyn EngineFactory,
        waker: &EngineWaker,
        now: Instant,
    ) -> Result<Vec<CellId>> {
        if !self.cells.is_empty() {
            return Err(Error::InvalidState(
                "Grid already built; destroy it first".to_string(),
            ));
        }
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidState(format!(
                "Grid dimensions must be positive, got {}x{}",
                rows, cols
            )));
        }

        let mut cells = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let id = CellId::new(row, col);
                // On error `cells` drops here, releasing the sessions made so far
                let mut engine = factory.create(id)?;
                engine.set_waker(waker.clone());
                cells.push(PlaybackCell::new(id, engine, now));
            }
        }

        self.rows = rows;
        self.cols = cols;
        self.cells = cells;
        self.selected = None;
        info!("Built {}x{} grid", rows, cols);
        Ok(self.ids())
    }

    /// Tear the grid down
    ///
    /// Open watch sessions are force-flushed before any engine is released.
    /// Returns the number of sessions flushed.
    pub fn destroy(&mut self, accountant: &mut SessionAccountant) -> usize {
        let flushed = accountant.stop_all();
        for cell in self.cells.iter_mut() {
            cell.engine_mut().stop();
        }
        let released = self.cells.len();
        self.cells.clear();
        self.selected = None;
        self.rows = 0;
        self.cols = 0;
        debug!(released, flushed, "Grid destroyed");
        flushed
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    fn index_of(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&PlaybackCell> {
        self.index_of(row, col).and_then(|i| self.cells.get(i))
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut PlaybackCell> {
        self.index_of(row, col).and_then(move |i| self.cells.get_mut(i))
    }

    pub fn cell(&self, id: CellId) -> Option<&PlaybackCell> {
        self.get(id.row, id.col)
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut PlaybackCell> {
        self.get_mut(id.row, id.col)
    }

    pub fn cells(&self) -> impl Iterator<Item = &PlaybackCell> {
        self.cells.iter()
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut PlaybackCell> {
        self.cells.iter_mut()
    }

    pub fn ids(&self) -> Vec<CellId> {
        self.cells.iter().map(PlaybackCell::id).collect()
    }

    pub fn selected(&self) -> Option<CellId> {
        self.selected
    }

    pub fn selected_mut(&mut self) -> Option<&mut PlaybackCell> {
        let id = self.selected?;
        self.cell_mut(id)
    }

    /// Select a cell, deselecting the previous one
    ///
    /// Returns false (and changes nothing) if the cell does not exist.
    pub fn select(&mut self, row: usize, col: usize) -> bool {
        if self.get(row, col).is_none() {
            return false;
        }
        let id = CellId::new(row, col);
        if self.selected == Some(id) {
            return true;
        }
        if let Some(previous) = self.selected.take() {
            if let Some(cell) = self.cell_mut(previous) {
                cell.set_selected(false);
            }
        }
        if let Some(cell) = self.cell_mut(id) {
            cell.set_selected(true);
        }
        self.selected = Some(id);
        true
    }

    /// Move the selection with wraparound
    ///
    /// With nothing selected this selects (0,0) instead of moving. Returns
    /// the newly selected cell, or `None` on an empty grid.
    pub fn navigate(&mut self, col_delta: isize, row_delta: isize) -> Option<CellId> {
        if self.cells.is_empty() {
            return None;
        }
        let (row, col) = match self.selected {
            None => (0, 0),
            Some(current) => (
                (current.row as isize + row_delta).rem_euclid(self.rows as isize) as usize,
                (current.col as isize + col_delta).rem_euclid(self.cols as isize) as usize,
            ),
        };
        self.select(row, col);
        self.selected
    }
}
