//! Hotkey system
//!
//! Key bindings of the session and the help menu built from them.
//!
//! # Architecture
//!
//! - **HotkeyAction**: semantic actions a key can trigger
//! - **HotkeyContext**: which bindings are live given the session state
//! - **handle_hotkey()**: maps a key name plus modifiers to an action
//! - **help_menu()**: the grouped binding list shown once a video loads
//!
//! # Adding New Hotkeys
//!
//! 1. Add a variant to `HotkeyAction`
//! 2. Add the binding to `BINDINGS`
//! 3. Handle the action in the host's dispatcher

use serde::{Deserialize, Serialize};

/// All possible actions that can be triggered by hotkeys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotkeyAction {
    // ═══════════════════════════════════════════════════════════════
    // Playback
    // ═══════════════════════════════════════════════════════════════
    PlayPause,
    StepForward,
    StepBackward,

    // ═══════════════════════════════════════════════════════════════
    // Timeline
    // ═══════════════════════════════════════════════════════════════
    TimelineZoomIn,
    TimelineZoomOut,
    ToggleAllGroups,

    // ═══════════════════════════════════════════════════════════════
    // Markers
    // ═══════════════════════════════════════════════════════════════
    /// Start a period marker, or complete the open one
    MarkPeriod,
    MarkMoment,
    SplitMarker,
    DeleteMarker,
    /// Drop the marker being created
    CancelMarker,
}

impl HotkeyAction {
    pub fn description(&self) -> &'static str {
        match self {
            HotkeyAction::PlayPause => "Play / pause",
            HotkeyAction::StepForward => "Next frame",
            HotkeyAction::StepBackward => "Previous frame",
            HotkeyAction::TimelineZoomIn => "Zoom in",
            HotkeyAction::TimelineZoomOut => "Zoom out",
            HotkeyAction::ToggleAllGroups => "Collapse or expand all groups",
            HotkeyAction::MarkPeriod => "Start or finish a period marker",
            HotkeyAction::MarkMoment => "Add a moment marker",
            HotkeyAction::SplitMarker => "Split the selected marker",
            HotkeyAction::DeleteMarker => "Delete the selected marker",
            HotkeyAction::CancelMarker => "Discard the marker being created",
        }
    }

    fn section(&self) -> &'static str {
        match self {
            HotkeyAction::PlayPause | HotkeyAction::StepForward | HotkeyAction::StepBackward => {
                "Playback"
            }
            HotkeyAction::TimelineZoomIn
            | HotkeyAction::TimelineZoomOut
            | HotkeyAction::ToggleAllGroups => "Timeline",
            HotkeyAction::MarkPeriod
            | HotkeyAction::MarkMoment
            | HotkeyAction::SplitMarker
            | HotkeyAction::DeleteMarker
            | HotkeyAction::CancelMarker => "Markers",
        }
    }
}

/// Key name (as reported by the host), shift flag, action
const BINDINGS: &[(&str, bool, HotkeyAction)] = &[
    (" ", false, HotkeyAction::PlayPause),
    ("ArrowRight", false, HotkeyAction::StepForward),
    ("ArrowLeft", false, HotkeyAction::StepBackward),
    ("+", false, HotkeyAction::TimelineZoomIn),
    ("-", false, HotkeyAction::TimelineZoomOut),
    ("g", true, HotkeyAction::ToggleAllGroups),
    ("i", false, HotkeyAction::MarkPeriod),
    ("m", false, HotkeyAction::MarkMoment),
    ("s", true, HotkeyAction::SplitMarker),
    ("Delete", false, HotkeyAction::DeleteMarker),
    ("Escape", false, HotkeyAction::CancelMarker),
];

/// Context information that affects which hotkeys are active.
#[derive(Debug, Clone, Default)]
pub struct HotkeyContext {
    /// Whether an input field has focus (should suppress most hotkeys)
    pub input_focused: bool,
    /// Whether a marker is selected
    pub has_marker_selection: bool,
    /// Whether a period marker is still open
    pub creating_marker: bool,
}

/// Result of processing a key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyResult {
    /// A hotkey action was matched and should be executed
    Action(HotkeyAction),
    /// No matching hotkey for this key/context combination
    NoMatch,
    /// Hotkey would match but is suppressed (e.g., input field focused)
    Suppressed,
}

/// Maps a key event to an action, considering the current context.
pub fn handle_hotkey(key: &str, shift: bool, context: &HotkeyContext) -> HotkeyResult {
    // Suppress hotkeys when typing in an input field
    if context.input_focused {
        return HotkeyResult::Suppressed;
    }

    let action = BINDINGS
        .iter()
        .find(|(bound, bound_shift, _)| bound.eq_ignore_ascii_case(key) && *bound_shift == shift)
        .map(|(_, _, action)| *action);

    match action {
        Some(HotkeyAction::SplitMarker | HotkeyAction::DeleteMarker)
            if !context.has_marker_selection =>
        {
            HotkeyResult::Suppressed
        }
        Some(HotkeyAction::CancelMarker) if !context.creating_marker => HotkeyResult::Suppressed,
        Some(action) => HotkeyResult::Action(action),
        None => HotkeyResult::NoMatch,
    }
}

/// One line of the help menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpEntry {
    pub keys: String,
    pub description: String,
}

/// A titled block of the help menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpMenuGroup {
    pub title: String,
    pub entries: Vec<HelpEntry>,
}

fn key_label(key: &str, shift: bool) -> String {
    let key = match key {
        " " => "Space".to_string(),
        other if other.chars().count() == 1 => other.to_uppercase(),
        other => other.to_string(),
    };
    if shift {
        format!("Shift+{}", key)
    } else {
        key
    }
}

/// The help menu, one group per section in binding order
pub fn help_menu() -> Vec<HelpMenuGroup> {
    let mut groups: Vec<HelpMenuGroup> = Vec::new();
    for (key, shift, action) in BINDINGS {
        let entry = HelpEntry {
            keys: key_label(key, *shift),
            description: action.description().to_string(),
        };
        match groups.iter_mut().find(|g| g.title == action.section()) {
            Some(group) => group.entries.push(entry),
            None => groups.push(HelpMenuGroup {
                title: action.section().to_string(),
                entries: vec![entry],
            }),
        }
    }
    groups
}
