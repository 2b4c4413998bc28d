//! Command router
//!
//! Translates one `Action` into per-cell engine commands following the
//! action's fan-out policy. The router never waits on an engine: it issues
//! commands and the resulting state comes back through engine events.
//!
//! Actions it cannot complete alone (chained next, fullscreen, panic
//! reset) are returned to the caller as a `RouteOutcome`.

use crate::action::{Action, FanOut};
use crate::registry::CellRegistry;
use crate::scheduler::DeferredTask;
use goobert_common::config::PlaybackConfig;
use goobert_common::CellId;
use std::time::Duration;
use tracing::debug;

/// Zoom change per ZoomIn/ZoomOut (log2 scale)
pub const ZOOM_STEP: f64 = 0.1;

/// Requests only the orchestrator can carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallRequest {
    ToggleWindowFullscreen,
    ExitFullscreen,
    ToggleTileSelected,
    PanicReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Commands issued to `cells` engines
    Handled { cells: usize },
    /// Selected-cell action with nothing selected, or an empty grid
    NoTarget,
    SelectionChanged {
        previous: Option<CellId>,
        selected: CellId,
    },
    VolumeChanged(u8),
    /// Immediate part done; `task` must run after `delay`
    Deferred { task: DeferredTask, delay: Duration },
    Wall(WallRequest),
}

pub struct CommandRouter {
    volume: u8,
    volume_step: u8,
    seek_step: f64,
    shuffle_next_delay: Duration,
}

impl CommandRouter {
    pub fn new(playback: &PlaybackConfig) -> Self {
        Self {
            volume: playback.default_volume.min(100),
            volume_step: playback.volume_step,
            seek_step: playback.seek_step_seconds,
            shuffle_next_delay: Duration::from_millis(playback.shuffle_next_delay_ms),
        }
    }

    /// Current wall volume (0-100)
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Set the wall volume on every cell; returns the clamped value
    pub fn set_volume(&mut self, volume: u8, registry: &mut CellRegistry) -> u8 {
        self.volume = volume.min(100);
        for cell in registry.cells_mut() {
            cell.engine_mut().set_volume(self.volume);
        }
        self.volume
    }

    pub fn execute(&mut self, action: Action, registry: &mut CellRegistry) -> RouteOutcome {
        debug!(%action, "Routing action");
        match action.fan_out() {
            FanOut::All => self.execute_all(action, registry),
            FanOut::AllUnlessLooping => {
                let forward = action == Action::NextAll;
                handled(step_unless_looping(registry, forward))
            }
            FanOut::Selected => self.execute_selected(action, registry),
            FanOut::Navigate { col_delta, row_delta } => {
                let previous = registry.selected();
                match registry.navigate(col_delta, row_delta) {
                    Some(selected) => RouteOutcome::SelectionChanged { previous, selected },
                    None => RouteOutcome::NoTarget,
                }
            }
            FanOut::Chained => {
                if registry.is_empty() {
                    return RouteOutcome::NoTarget;
                }
                for cell in registry.cells_mut() {
                    cell.engine_mut().shuffle();
                }
                RouteOutcome::Deferred {
                    task: DeferredTask::NextAllUnlessLooping,
                    delay: self.shuffle_next_delay,
                }
            }
            FanOut::Wall => RouteOutcome::Wall(match action {
                Action::FullscreenGlobal => WallRequest::ToggleWindowFullscreen,
                Action::ExitFullscreen => WallRequest::ExitFullscreen,
                Action::FullscreenSelected => WallRequest::ToggleTileSelected,
                _ => WallRequest::PanicReset,
            }),
        }
    }

    fn execute_all(&mut self, action: Action, registry: &mut CellRegistry) -> RouteOutcome {
        match action {
            Action::VolumeUp => {
                let volume = self.volume.saturating_add(self.volume_step);
                RouteOutcome::VolumeChanged(self.set_volume(volume, registry))
            }
            Action::VolumeDown => {
                let volume = self.volume.saturating_sub(self.volume_step);
                RouteOutcome::VolumeChanged(self.set_volume(volume, registry))
            }
            _ => {
                let mut count = 0;
                for cell in registry.cells_mut() {
                    match action {
                        Action::PauseAll => cell.engine_mut().toggle_pause(),
                        Action::ShuffleAll => cell.engine_mut().shuffle(),
                        Action::MuteAll => cell.toggle_mute(),
                        _ => continue,
                    }
                    count += 1;
                }
                handled(count)
            }
        }
    }

    fn execute_selected(&mut self, action: Action, registry: &mut CellRegistry) -> RouteOutcome {
        let seek_step = self.seek_step;
        let Some(cell) = registry.selected_mut() else {
            return RouteOutcome::NoTarget;
        };
        let looping = cell.state().looping;
        let engine = cell.engine_mut();
        match action {
            Action::SeekForward => engine.seek_relative(seek_step),
            Action::SeekBackward => engine.seek_relative(-seek_step),
            Action::FrameStepForward => engine.frame_step(),
            Action::FrameStepBackward => engine.frame_back_step(),
            Action::ToggleLoop => engine.set_loop(!looping),
            Action::TogglePauseSelected => engine.toggle_pause(),
            Action::NextSelected => engine.next(),
            Action::PrevSelected => engine.prev(),
            Action::ZoomIn => engine.zoom_by(ZOOM_STEP),
            Action::ZoomOut => engine.zoom_by(-ZOOM_STEP),
            Action::ResetZoom => engine.reset_zoom(),
            Action::Rotate => engine.rotate(),
            Action::Screenshot => engine.screenshot(),
            _ => return RouteOutcome::NoTarget,
        }
        RouteOutcome::Handled { cells: 1 }
    }
}

/// Next (or prev) on every cell whose mirrored loop flag is off
pub fn step_unless_looping(registry: &mut CellRegistry, forward: bool) -> usize {
    let mut count = 0;
    for cell in registry.cells_mut().filter(|c| !c.state().looping) {
        if forward {
            cell.engine_mut().next();
        } else {
            cell.engine_mut().prev();
        }
        count += 1;
    }
    count
}

fn handled(cells: usize) -> RouteOutcome {
    if cells == 0 {
        RouteOutcome::NoTarget
    } else {
        RouteOutcome::Handled { cells }
    }
}
