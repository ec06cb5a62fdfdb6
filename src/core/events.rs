//! Session-level events, user notifications and load phases.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;
use crate::hotkeys::HelpMenuGroup;
use crate::timeline::LaneId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Fatal,
}

/// A message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    /// Stays until dismissed
    pub persistent: bool,
    pub dismissible: bool,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            persistent: false,
            dismissible: true,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            persistent: false,
            dismissible: true,
        }
    }

    /// Blocking error; persists until the user dismisses it
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            message: message.into(),
            persistent: true,
            dismissible: true,
        }
    }
}

impl From<&SessionError> for Notification {
    fn from(err: &SessionError) -> Self {
        if err.is_fatal() {
            Notification::fatal(err.to_string())
        } else {
            Notification::warning(err.to_string())
        }
    }
}

/// Events broadcast by the session orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoadStarted { manifest_id: String },
    HelpMenuPopulated(Vec<HelpMenuGroup>),
    LanesAdded { lanes: Vec<LaneId> },
    Reloaded { manifest_id: String },
    LoadFailed { message: String },
    Notification(Notification),
    MarkerSelected { lane: LaneId, marker_id: Uuid },
    /// A panel depending on a lane that no longer exists was closed
    PanelClosed { lane: LaneId },
}

/// Progress of the current manifest load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadPhase {
    #[default]
    Idle,
    /// A new load tore the previous timeline down and is fetching the session
    Pending,
    Loading { manifest_id: String },
    VideoLoaded { manifest_id: String },
    LanesAdded { manifest_id: String },
    Reloaded { manifest_id: String },
    Failed { message: String },
}

impl LoadPhase {
    pub fn manifest_id(&self) -> Option<&str> {
        match self {
            LoadPhase::Loading { manifest_id }
            | LoadPhase::VideoLoaded { manifest_id }
            | LoadPhase::LanesAdded { manifest_id }
            | LoadPhase::Reloaded { manifest_id } => Some(manifest_id),
            LoadPhase::Idle | LoadPhase::Pending | LoadPhase::Failed { .. } => None,
        }
    }

    /// Loading finished, one way or the other
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadPhase::Reloaded { .. } | LoadPhase::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_from_error_severity() {
        let fatal = Notification::from(&SessionError::NoSupportedManifest);
        assert_eq!(fatal.severity, Severity::Fatal);
        assert!(fatal.persistent && fatal.dismissible);

        let soft = Notification::from(&SessionError::LaneNotFound("audio-1".into()));
        assert_eq!(soft.severity, Severity::Warning);
        assert!(!soft.persistent);
    }

    #[test]
    fn test_load_phase_settled() {
        assert!(!LoadPhase::Idle.is_settled());
        assert!(!LoadPhase::Pending.is_settled());
        assert_eq!(LoadPhase::Pending.manifest_id(), None);
        let phase = LoadPhase::LanesAdded {
            manifest_id: "m1".into(),
        };
        assert_eq!(phase.manifest_id(), Some("m1"));
        assert!(!phase.is_settled());
        assert!(LoadPhase::Failed {
            message: "boom".into()
        }
        .is_settled());
    }
}
