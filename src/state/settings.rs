use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CUE_FADE_OUT_MS, DEFAULT_CUE_GRACE_SECONDS,
    DEFAULT_EASED_CHILDREN_LIMIT, DEFAULT_LANE_EASE_MS, DEFAULT_MARKER_DELETE_DELAY_MS,
    DEFAULT_MARKER_FADE_MS, DEFAULT_MAX_CUES, SEGMENTATION_PALETTE, SPLIT_HIGHLIGHT_COLOR,
};
use crate::error::{Result, SessionError};
use crate::state::MediaFormat;

/// Session-level settings, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Author recorded on new annotations
    #[serde(default = "default_user")]
    pub user: String,
    /// Colors handed out to segmentation tracks
    #[serde(default = "default_palette")]
    pub segmentation_palette: Vec<String>,
    /// Transient color of the second half of a split marker
    #[serde(default = "default_split_highlight_color")]
    pub split_highlight_color: String,
    /// Children animated with easing on a group toggle; the rest snap
    #[serde(default = "default_eased_children_limit")]
    pub eased_children_limit: usize,
    #[serde(default = "default_lane_ease_ms")]
    pub lane_ease_ms: u64,
    /// Delay before a removed marker's record is dropped from the store
    #[serde(default = "default_marker_delete_delay_ms")]
    pub marker_delete_delay_ms: u64,
    /// Marker fade animation length, independent of the delete delay
    #[serde(default = "default_marker_fade_ms")]
    pub marker_fade_ms: u64,
    #[serde(default)]
    pub cue_window: CueWindowSettings,
    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<MediaFormat>,
}

/// Telemetry cue window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueWindowSettings {
    /// Maximum simultaneously displayed cues
    #[serde(default = "default_max_cues")]
    pub max_cues: usize,
    /// Seconds a cue lingers past its end before fading
    #[serde(default = "default_cue_grace_secs")]
    pub grace_secs: f64,
    /// Visual exit time between fade-out and removal
    #[serde(default = "default_cue_fade_out_ms")]
    pub fade_out_ms: u64,
}

fn default_user() -> String {
    "anonymous".to_string()
}

fn default_palette() -> Vec<String> {
    SEGMENTATION_PALETTE.iter().map(|c| c.to_string()).collect()
}

fn default_split_highlight_color() -> String {
    SPLIT_HIGHLIGHT_COLOR.to_string()
}

fn default_eased_children_limit() -> usize {
    DEFAULT_EASED_CHILDREN_LIMIT
}

fn default_lane_ease_ms() -> u64 {
    DEFAULT_LANE_EASE_MS
}

fn default_marker_delete_delay_ms() -> u64 {
    DEFAULT_MARKER_DELETE_DELAY_MS
}

fn default_marker_fade_ms() -> u64 {
    DEFAULT_MARKER_FADE_MS
}

fn default_max_cues() -> usize {
    DEFAULT_MAX_CUES
}

fn default_cue_grace_secs() -> f64 {
    DEFAULT_CUE_GRACE_SECONDS
}

fn default_cue_fade_out_ms() -> u64 {
    DEFAULT_CUE_FADE_OUT_MS
}

fn default_supported_formats() -> Vec<MediaFormat> {
    vec![MediaFormat::Hls, MediaFormat::Mp4]
}

impl Default for CueWindowSettings {
    fn default() -> Self {
        Self {
            max_cues: default_max_cues(),
            grace_secs: default_cue_grace_secs(),
            fade_out_ms: default_cue_fade_out_ms(),
        }
    }
}

impl CueWindowSettings {
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user: default_user(),
            segmentation_palette: default_palette(),
            split_highlight_color: default_split_highlight_color(),
            eased_children_limit: default_eased_children_limit(),
            lane_ease_ms: default_lane_ease_ms(),
            marker_delete_delay_ms: default_marker_delete_delay_ms(),
            marker_fade_ms: default_marker_fade_ms(),
            cue_window: CueWindowSettings::default(),
            supported_formats: default_supported_formats(),
        }
    }
}

impl SessionSettings {
    /// Load settings from a JSON file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Settings file missing, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        let settings: SessionSettings = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.segmentation_palette.is_empty() {
            return Err(SessionError::Config(
                "segmentation palette must not be empty".to_string(),
            ));
        }
        if self.eased_children_limit == 0 {
            return Err(SessionError::Config(
                "eased children limit must be at least 1".to_string(),
            ));
        }
        if self.cue_window.max_cues == 0 {
            return Err(SessionError::Config(
                "cue window must display at least one cue".to_string(),
            ));
        }
        Ok(())
    }

    pub fn marker_delete_delay(&self) -> Duration {
        Duration::from_millis(self.marker_delete_delay_ms)
    }

    pub fn marker_fade(&self) -> Duration {
        Duration::from_millis(self.marker_fade_ms)
    }

    pub fn lane_ease(&self) -> Duration {
        Duration::from_millis(self.lane_ease_ms)
    }
}
