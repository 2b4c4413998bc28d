//! Wall actions
//!
//! The closed set of abstract commands a user (or the system) can issue.
//! `Action::fan_out()` is the dispatch table deciding which cells an action
//! reaches.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    // Global actions
    PauseAll,
    NextAll,
    PrevAll,
    ShuffleAll,
    ShuffleThenNextAll,
    MuteAll,
    VolumeUp,
    VolumeDown,

    // Window, tile and reset
    FullscreenGlobal,
    ExitFullscreen,
    PanicReset,

    // Navigation
    NavigateUp,
    NavigateDown,
    NavigateLeft,
    NavigateRight,

    // Selected cell actions
    FullscreenSelected,
    SeekForward,
    SeekBackward,
    FrameStepForward,
    FrameStepBackward,
    ToggleLoop,
    TogglePauseSelected,
    NextSelected,
    PrevSelected,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    Rotate,
    Screenshot,
}

/// Which cells an action reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// Every cell
    All,
    /// Every cell whose mirrored loop flag is off
    AllUnlessLooping,
    /// Only the selected cell; no-op without a selection
    Selected,
    /// Move the selection
    Navigate { col_delta: isize, row_delta: isize },
    /// Shuffle now, loop-aware next after a delay
    Chained,
    /// Handled by the orchestrator (fullscreen controller, grid stop)
    Wall,
}

impl Action {
    pub const ALL: [Action; 29] = [
        Action::PauseAll,
        Action::NextAll,
        Action::PrevAll,
        Action::ShuffleAll,
        Action::ShuffleThenNextAll,
        Action::MuteAll,
        Action::VolumeUp,
        Action::VolumeDown,
        Action::FullscreenGlobal,
        Action::ExitFullscreen,
        Action::PanicReset,
        Action::NavigateUp,
        Action::NavigateDown,
        Action::NavigateLeft,
        Action::NavigateRight,
        Action::FullscreenSelected,
        Action::SeekForward,
        Action::SeekBackward,
        Action::FrameStepForward,
        Action::FrameStepBackward,
        Action::ToggleLoop,
        Action::TogglePauseSelected,
        Action::NextSelected,
        Action::PrevSelected,
        Action::ZoomIn,
        Action::ZoomOut,
        Action::ResetZoom,
        Action::Rotate,
        Action::Screenshot,
    ];

    pub fn fan_out(self) -> FanOut {
        use Action::*;
        match self {
            PauseAll | ShuffleAll | MuteAll | VolumeUp | VolumeDown => FanOut::All,
            NextAll | PrevAll => FanOut::AllUnlessLooping,
            ShuffleThenNextAll => FanOut::Chained,
            NavigateUp => FanOut::Navigate { col_delta: 0, row_delta: -1 },
            NavigateDown => FanOut::Navigate { col_delta: 0, row_delta: 1 },
            NavigateLeft => FanOut::Navigate { col_delta: -1, row_delta: 0 },
            NavigateRight => FanOut::Navigate { col_delta: 1, row_delta: 0 },
            SeekForward | SeekBackward | FrameStepForward | FrameStepBackward | ToggleLoop
            | TogglePauseSelected | NextSelected | PrevSelected | ZoomIn | ZoomOut | ResetZoom
            | Rotate | Screenshot => FanOut::Selected,
            FullscreenGlobal | ExitFullscreen | FullscreenSelected | PanicReset => FanOut::Wall,
        }
    }

    /// snake_case name, accepted by `Action::from_name`
    pub fn name(self) -> &'static str {
        use Action::*;
        match self {
            PauseAll => "pause_all",
            NextAll => "next_all",
            PrevAll => "prev_all",
            ShuffleAll => "shuffle_all",
            ShuffleThenNextAll => "shuffle_then_next_all",
            MuteAll => "mute_all",
            VolumeUp => "volume_up",
            VolumeDown => "volume_down",
            FullscreenGlobal => "fullscreen_global",
            ExitFullscreen => "exit_fullscreen",
            PanicReset => "panic_reset",
            NavigateUp => "navigate_up",
            NavigateDown => "navigate_down",
            NavigateLeft => "navigate_left",
            NavigateRight => "navigate_right",
            FullscreenSelected => "fullscreen_selected",
            SeekForward => "seek_forward",
            SeekBackward => "seek_backward",
            FrameStepForward => "frame_step_forward",
            FrameStepBackward => "frame_step_backward",
            ToggleLoop => "toggle_loop",
            TogglePauseSelected => "toggle_pause_selected",
            NextSelected => "next_selected",
            PrevSelected => "prev_selected",
            ZoomIn => "zoom_in",
            ZoomOut => "zoom_out",
            ResetZoom => "reset_zoom",
            Rotate => "rotate",
            Screenshot => "screenshot",
        }
    }

    pub fn from_name(name: &str) -> Option<Action> {
        let name = name.trim().to_ascii_lowercase().replace('-', "_");
        Action::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn description(self) -> &'static str {
        use Action::*;
        match self {
            PauseAll => "Pause/Play all cells",
            NextAll => "Next video (all cells)",
            PrevAll => "Previous video (all cells)",
            ShuffleAll => "Shuffle all playlists",
            ShuffleThenNextAll => "Shuffle then next",
            MuteAll => "Mute all",
            VolumeUp => "Volume up",
            VolumeDown => "Volume down",
            FullscreenGlobal => "Toggle fullscreen",
            ExitFullscreen => "Exit fullscreen",
            PanicReset => "Stop the grid",
            NavigateUp => "Navigate up",
            NavigateDown => "Navigate down",
            NavigateLeft => "Navigate left",
            NavigateRight => "Navigate right",
            FullscreenSelected => "Fullscreen selected",
            SeekForward => "Seek forward",
            SeekBackward => "Seek backward",
            FrameStepForward => "Frame step forward",
            FrameStepBackward => "Frame step backward",
            ToggleLoop => "Toggle loop",
            TogglePauseSelected => "Pause/Play selected cell",
            NextSelected => "Next video (selected cell)",
            PrevSelected => "Previous video (selected cell)",
            ZoomIn => "Zoom in",
            ZoomOut => "Zoom out",
            ResetZoom => "Reset zoom",
            Rotate => "Rotate video",
            Screenshot => "Take screenshot",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
