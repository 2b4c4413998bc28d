//! Fullscreen controller
//!
//! State machine over `FullscreenMode`:
//!
//! ```text
//! Normal <-> Window <-> Tile(cell)
//! ```
//!
//! Tile fullscreen always implies window fullscreen. Every method returns
//! true when the mode (or the layout) actually changed, so the caller knows
//! when to broadcast `FullscreenChanged`.

use crate::cell::Placement;
use crate::registry::CellRegistry;
use goobert_common::{CellId, FullscreenMode};
use tracing::info;

#[derive(Debug, Default)]
pub struct FullscreenController {
    mode: FullscreenMode,
}

impl FullscreenController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> FullscreenMode {
        self.mode
    }

    pub fn tile_cell(&self) -> Option<CellId> {
        self.mode.tile_cell()
    }

    /// True for cells hidden because another cell is tile fullscreen
    pub fn is_excluded(&self, cell: CellId) -> bool {
        matches!(self.mode, FullscreenMode::Tile { cell: tiled } if tiled != cell)
    }

    pub fn enter_tile(&mut self, cell: CellId, registry: &mut CellRegistry) -> bool {
        if registry.cell(cell).is_none() {
            return false;
        }
        match self.mode {
            FullscreenMode::Tile { cell: tiled } if tiled == cell => return false,
            FullscreenMode::Tile { .. } => {
                self.exit_tile(registry);
            }
            _ => {}
        }

        let full = Placement {
            row: 0,
            col: 0,
            row_span: registry.rows(),
            col_span: registry.cols(),
        };
        for other in registry.cells_mut() {
            if other.id() == cell {
                other.set_placement(full);
                other.set_overlay_enabled(true);
            } else {
                other.set_hidden(true);
                other.engine_mut().pause();
                other.mute();
            }
        }

        self.mode = FullscreenMode::Tile { cell };
        info!("Tile fullscreen: {}", cell);
        true
    }

    /// Leave tile fullscreen; the window stays fullscreen
    pub fn exit_tile(&mut self, registry: &mut CellRegistry) -> bool {
        let Some(tiled) = self.mode.tile_cell() else {
            return false;
        };
        if let Some(cell) = registry.cell_mut(tiled) {
            cell.set_overlay_enabled(false);
        }
        for cell in registry.cells_mut() {
            cell.restore_placement();
            cell.set_hidden(false);
            cell.unmute();
            cell.engine_mut().play();
        }
        self.mode = FullscreenMode::Window;
        info!("Tile fullscreen off");
        true
    }

    pub fn toggle_window_fullscreen(&mut self, registry: &mut CellRegistry) -> bool {
        match self.mode {
            FullscreenMode::Normal => {
                self.mode = FullscreenMode::Window;
                info!("Fullscreen on");
                true
            }
            _ => self.exit_window_fullscreen(registry),
        }
    }

    /// Back to Normal, leaving tile fullscreen first if needed
    pub fn exit_window_fullscreen(&mut self, registry: &mut CellRegistry) -> bool {
        if self.mode == FullscreenMode::Normal {
            return false;
        }
        self.exit_tile(registry);
        self.mode = FullscreenMode::Normal;
        info!("Fullscreen off");
        true
    }

    pub fn toggle_tile_selected(&mut self, registry: &mut CellRegistry) -> bool {
        if self.mode.tile_cell().is_some() {
            return self.exit_tile(registry);
        }
        match registry.selected() {
            Some(cell) => self.enter_tile(cell, registry),
            None => false,
        }
    }

    /// Forget the mode without touching any cell (grid already gone)
    pub fn reset(&mut self) -> bool {
        let changed = self.mode != FullscreenMode::Normal;
        self.mode = FullscreenMode::Normal;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::EngineEventBridge;
    use crate::engine::SimulatedEngineFactory;
    use tokio::time::Instant;

    fn grid(rows: usize, cols: usize) -> (CellRegistry, SimulatedEngineFactory) {
        let mut factory = SimulatedEngineFactory::new();
        let bridge = EngineEventBridge::new();
        let mut registry = CellRegistry::new();
        registry
            .build(rows, cols, &mut factory, &bridge.waker(), Instant::now())
            .unwrap();
        for cell in registry.cells_mut() {
            cell.load_playlist(vec!["/m/a.mp4".to_string()]);
        }
        (registry, factory)
    }

    #[test]
    fn test_enter_tile_hides_pauses_and_mutes_others() {
        let (mut registry, factory) = grid(3, 3);
        let mut fs = FullscreenController::new();
        let target = CellId::new(1, 1);

        assert!(fs.enter_tile(target, &mut registry));
        assert_eq!(fs.mode(), FullscreenMode::Tile { cell: target });
        assert!(fs.mode().is_window_fullscreen());

        let tiled = registry.cell(target).unwrap();
        assert_eq!(tiled.placement(), Placement { row: 0, col: 0, row_span: 3, col_span: 3 });
        assert!(tiled.overlay_enabled() && !tiled.is_hidden() && !tiled.is_muted());

        for cell in registry.cells().filter(|c| c.id() != target) {
            assert!(cell.is_hidden() && cell.is_muted());
            assert!(fs.is_excluded(cell.id()));
            assert!(factory.handle(cell.id()).unwrap().snapshot().paused);
        }
        assert!(!fs.is_excluded(target));
    }

    #[test]
    fn test_exit_tile_restores_layout() {
        let (mut registry, factory) = grid(3, 3);
        let mut fs = FullscreenController::new();
        fs.enter_tile(CellId::new(1, 1), &mut registry);

        assert!(fs.exit_tile(&mut registry));
        assert_eq!(fs.mode(), FullscreenMode::Window);
        for cell in registry.cells() {
            assert_eq!(cell.placement(), Placement::single(cell.id()));
            assert!(!cell.is_hidden() && !cell.is_muted() && !cell.overlay_enabled());
            assert!(!factory.handle(cell.id()).unwrap().snapshot().paused);
        }
        assert!(!fs.exit_tile(&mut registry));
    }

    #[test]
    fn test_enter_tile_is_idempotent_and_switches_cells() {
        let (mut registry, _factory) = grid(2, 2);
        let mut fs = FullscreenController::new();
        assert!(fs.enter_tile(CellId::new(0, 0), &mut registry));
        assert!(!fs.enter_tile(CellId::new(0, 0), &mut registry));

        assert!(fs.enter_tile(CellId::new(1, 1), &mut registry));
        assert!(registry.get(0, 0).unwrap().is_hidden());
        assert!(!registry.get(0, 0).unwrap().overlay_enabled());
        assert_eq!(registry.get(0, 0).unwrap().placement(), Placement::single(CellId::new(0, 0)));
        assert!(!registry.get(1, 1).unwrap().is_hidden());
    }

    #[test]
    fn test_enter_tile_on_missing_cell() {
        let (mut registry, _factory) = grid(2, 2);
        let mut fs = FullscreenController::new();
        assert!(!fs.enter_tile(CellId::new(5, 5), &mut registry));
        assert_eq!(fs.mode(), FullscreenMode::Normal);
    }

    #[test]
    fn test_window_fullscreen_transitions() {
        let (mut registry, _factory) = grid(2, 2);
        let mut fs = FullscreenController::new();
        assert!(fs.toggle_window_fullscreen(&mut registry));
        assert_eq!(fs.mode(), FullscreenMode::Window);
        assert!(registry.cells().all(|c| !c.is_hidden()));

        fs.enter_tile(CellId::new(0, 1), &mut registry);
        assert!(fs.exit_window_fullscreen(&mut registry));
        assert_eq!(fs.mode(), FullscreenMode::Normal);
        assert!(registry.cells().all(|c| !c.is_hidden()));
        assert!(!fs.exit_window_fullscreen(&mut registry));
    }

    #[test]
    fn test_toggle_tile_selected() {
        let (mut registry, _factory) = grid(2, 2);
        let mut fs = FullscreenController::new();
        assert!(!fs.toggle_tile_selected(&mut registry));

        registry.select(1, 0);
        assert!(fs.toggle_tile_selected(&mut registry));
        assert_eq!(fs.tile_cell(), Some(CellId::new(1, 0)));
        assert!(fs.toggle_tile_selected(&mut registry));
        assert_eq!(fs.mode(), FullscreenMode::Window);
    }

    #[test]
    fn test_reset() {
        let (mut registry, _factory) = grid(1, 2);
        let mut fs = FullscreenController::new();
        fs.enter_tile(CellId::new(0, 0), &mut registry);
        assert!(fs.reset());
        assert_eq!(fs.mode(), FullscreenMode::Normal);
        assert!(!fs.reset());
    }
}
