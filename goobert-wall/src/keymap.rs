//! Key map
//!
//! Pure lookup table from key bindings to `Action`s. Input drivers hand key
//! names such as `"space"`, `"shift+n"` or `"ctrl+r"` to an `ActionResolver`.

use crate::action::Action;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Resolves an input name to an action
pub trait ActionResolver {
    fn resolve(&self, input: &str) -> Option<Action>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyBinding {
    pub key: String,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyBinding {
    pub fn simple(key: &str) -> Self {
        Self {
            key: key.to_ascii_lowercase(),
            ctrl: false,
            shift: false,
            alt: false,
        }
    }

    pub fn with_shift(key: &str) -> Self {
        Self {
            shift: true,
            ..Self::simple(key)
        }
    }

    pub fn with_ctrl(key: &str) -> Self {
        Self {
            ctrl: true,
            ..Self::simple(key)
        }
    }

    /// Parse `"Ctrl+Shift+R"` style names (case-insensitive)
    pub fn parse(input: &str) -> Option<Self> {
        let mut binding = Self::simple("");
        let parts: Vec<&str> = input.trim().split('+').map(str::trim).collect();
        let (key, modifiers) = parts.split_last()?;
        for modifier in modifiers {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => binding.ctrl = true,
                "shift" => binding.shift = true,
                "alt" => binding.alt = true,
                _ => return None,
            }
        }
        let key = match key.to_ascii_lowercase().as_str() {
            "" => return None,
            "esc" => "escape".to_string(),
            " " => "space".to_string(),
            other => other.to_string(),
        };
        binding.key = key;
        Some(binding)
    }
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        match self.key.as_str() {
            "space" => f.write_str("Space"),
            "escape" => f.write_str("Esc"),
            key => f.write_str(&key.to_ascii_uppercase()),
        }
    }
}

pub struct KeyMap {
    bindings: HashMap<KeyBinding, Action>,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyMap {
    /// Key map with the default bindings
    pub fn new() -> Self {
        let mut keymap = Self {
            bindings: HashMap::new(),
        };
        keymap.setup_default_bindings();
        keymap
    }

    fn setup_default_bindings(&mut self) {
        use Action::*;

        self.bind(KeyBinding::simple("space"), PauseAll);
        self.bind(KeyBinding::simple("p"), PauseAll);

        self.bind(KeyBinding::simple("u"), VolumeUp);
        self.bind(KeyBinding::simple("i"), VolumeDown);
        self.bind(KeyBinding::simple("m"), MuteAll);

        // WASD
        self.bind(KeyBinding::simple("w"), NavigateUp);
        self.bind(KeyBinding::simple("s"), NavigateDown);
        self.bind(KeyBinding::simple("a"), NavigateLeft);
        self.bind(KeyBinding::simple("d"), NavigateRight);

        self.bind(KeyBinding::simple("v"), SeekForward);
        self.bind(KeyBinding::simple("c"), SeekBackward);
        self.bind(KeyBinding::simple("t"), Screenshot);
        self.bind(KeyBinding::simple("b"), FrameStepBackward);
        self.bind(KeyBinding::simple("n"), FrameStepForward);

        self.bind(KeyBinding::with_shift("n"), NextAll);
        self.bind(KeyBinding::simple("q"), ShuffleAll);
        self.bind(KeyBinding::simple("x"), ShuffleThenNextAll);

        self.bind(KeyBinding::simple("f11"), FullscreenGlobal);
        self.bind(KeyBinding::simple("escape"), ExitFullscreen);
        self.bind(KeyBinding::simple("f"), FullscreenSelected);

        self.bind(KeyBinding::simple("l"), ToggleLoop);
        self.bind(KeyBinding::simple("z"), ZoomIn);
        self.bind(KeyBinding::with_shift("z"), ZoomOut);
        self.bind(KeyBinding::with_ctrl("r"), Rotate);
    }

    /// Add or replace a binding
    pub fn bind(&mut self, binding: KeyBinding, action: Action) {
        self.bindings.insert(binding, action);
    }

    pub fn get_action(&self, binding: &KeyBinding) -> Option<Action> {
        self.bindings.get(binding).copied()
    }

    /// Bindings of one action, sorted for display
    pub fn keys_for(&self, action: Action) -> Vec<&KeyBinding> {
        let mut keys: Vec<&KeyBinding> = self
            .bindings
            .iter()
            .filter(|(_, a)| **a == action)
            .map(|(k, _)| k)
            .collect();
        keys.sort();
        keys
    }

    pub fn generate_help_text(&self) -> String {
        let mut lines = vec!["Keyboard Shortcuts:".to_string(), String::new()];

        let section = |title: &str, actions: &[Action], lines: &mut Vec<String>| {
            lines.push(title.to_string());
            for action in actions {
                let keys = self.keys_for(*action);
                if keys.is_empty() {
                    continue;
                }
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                lines.push(format!("  {} - {}", keys.join("/"), action.description()));
            }
        };

        section(
            "Global:",
            &[
                Action::PauseAll,
                Action::VolumeUp,
                Action::VolumeDown,
                Action::MuteAll,
                Action::NextAll,
                Action::ShuffleAll,
                Action::ShuffleThenNextAll,
                Action::FullscreenGlobal,
                Action::ExitFullscreen,
            ],
            &mut lines,
        );
        lines.push(String::new());
        lines.push("Navigation: WASD".to_string());
        lines.push(String::new());
        section(
            "Selected Cell:",
            &[
                Action::FullscreenSelected,
                Action::SeekForward,
                Action::SeekBackward,
                Action::FrameStepForward,
                Action::FrameStepBackward,
                Action::Screenshot,
                Action::ToggleLoop,
                Action::ZoomIn,
                Action::ZoomOut,
                Action::Rotate,
            ],
            &mut lines,
        );

        lines.join("\n")
    }

    /// Every binding grouped by action, in `Action::ALL` order
    pub fn listing(&self) -> BTreeMap<usize, (Action, Vec<String>)> {
        Action::ALL
            .iter()
            .enumerate()
            .map(|(i, action)| {
                let keys = self.keys_for(*action).iter().map(|k| k.to_string()).collect();
                (i, (*action, keys))
            })
            .collect()
    }
}

impl ActionResolver for KeyMap {
    /// Key binding first, then the action's snake_case name
    fn resolve(&self, input: &str) -> Option<Action> {
        KeyBinding::parse(input)
            .and_then(|binding| self.get_action(&binding))
            .or_else(|| Action::from_name(input))
    }
}
