//! Session document and manifest model.
//!
//! A session lists one or more manifests; each manifest describes the media
//! tracks (video, audio, text) and telemetry files that become timeline lanes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_FRAME_RATE;
use crate::error::{Result, SessionError};

/// Container format of a manifest's media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Hls,
    Mp4,
    Dash,
    #[serde(other)]
    Unknown,
}

/// Kind of data an analysis lane renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Events,
    LineChart,
    BarChart,
    Thumbnails,
}

/// The bootstrap session document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub manifests: Vec<Manifest>,
    /// Declared top-to-bottom order of track ids
    #[serde(default)]
    pub track_order: Option<Vec<String>>,
    /// When present, only these track ids get lanes
    #[serde(default)]
    pub visible_tracks: Option<Vec<String>>,
}

/// One playable variant of the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub name: String,
    pub format: MediaFormat,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    #[serde(default)]
    pub video: Vec<VideoTrack>,
    #[serde(default)]
    pub audio: Vec<AudioTrack>,
    #[serde(default)]
    pub text: Vec<TextTrack>,
    #[serde(default)]
    pub telemetry: Vec<TelemetryTrack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTrack {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub visual_reference: Vec<VisualReference>,
    #[serde(default)]
    pub analysis: Vec<AnalysisTrack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub language: Option<String>,
    /// One child lane is built per channel
    #[serde(default = "default_channels")]
    pub channels: u32,
    #[serde(default)]
    pub visual_reference: Vec<VisualReference>,
    #[serde(default)]
    pub analysis: Vec<AnalysisTrack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTrack {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub language: Option<String>,
    pub src: String,
    #[serde(default)]
    pub analysis: Vec<AnalysisTrack>,
}

/// Thumbnail or waveform strip shown under a media group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualReference {
    pub id: String,
    pub label: String,
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTrack {
    pub id: String,
    pub name: String,
    pub kind: AnalysisKind,
    /// Analysis-group tag used by the group visibility filter
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
}

/// Time-coded measurement/comment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryTrack {
    pub id: String,
    pub label: String,
    pub src: String,
    /// Media track the lane nests under; defaults to the first video track
    #[serde(default)]
    pub parent: Option<String>,
}

fn default_frame_rate() -> f64 {
    DEFAULT_FRAME_RATE
}

fn default_channels() -> u32 {
    2
}

impl SessionDocument {
    /// Parse and validate a session document
    pub fn from_json(json: &str) -> Result<Self> {
        let document: SessionDocument = serde_json::from_str(json)
            .map_err(|err| SessionError::InvalidSession(err.to_string()))?;
        document.validate()?;
        Ok(document)
    }

    /// Check structural invariants the lane builder relies on
    pub fn validate(&self) -> Result<()> {
        if self.manifests.is_empty() {
            return Err(SessionError::InvalidSession(
                "session has no manifests".to_string(),
            ));
        }

        let mut manifest_ids = HashSet::new();
        for manifest in self.manifests.iter() {
            if !manifest_ids.insert(manifest.id.as_str()) {
                return Err(SessionError::InvalidSession(format!(
                    "duplicate manifest id: {}",
                    manifest.id
                )));
            }
            manifest.validate()?;
        }
        Ok(())
    }

    pub fn find_manifest(&self, id: &str) -> Option<&Manifest> {
        self.manifests.iter().find(|m| m.id == id)
    }

    /// First manifest whose format is in the supported set
    pub fn first_supported(&self, supported: &[MediaFormat]) -> Option<&Manifest> {
        self.manifests
            .iter()
            .find(|m| supported.contains(&m.format))
    }
}

impl Manifest {
    fn validate(&self) -> Result<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(SessionError::InvalidSession(format!(
                "manifest {} has invalid frame rate {}",
                self.id, self.frame_rate
            )));
        }
        if self.video.is_empty() {
            return Err(SessionError::InvalidSession(format!(
                "manifest {} has no video track",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for id in self.track_ids() {
            if !seen.insert(id) {
                return Err(SessionError::InvalidSession(format!(
                    "manifest {} repeats track id {}",
                    self.id, id
                )));
            }
        }
        Ok(())
    }

    /// Every track id declared by this manifest, including analysis tracks
    pub fn track_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        for track in self.video.iter() {
            ids.push(track.id.as_str());
            ids.extend(track.visual_reference.iter().map(|v| v.id.as_str()));
            ids.extend(track.analysis.iter().map(|a| a.id.as_str()));
        }
        for track in self.audio.iter() {
            ids.push(track.id.as_str());
            ids.extend(track.visual_reference.iter().map(|v| v.id.as_str()));
            ids.extend(track.analysis.iter().map(|a| a.id.as_str()));
        }
        for track in self.text.iter() {
            ids.push(track.id.as_str());
            ids.extend(track.analysis.iter().map(|a| a.id.as_str()));
        }
        ids.extend(self.telemetry.iter().map(|t| t.id.as_str()));
        ids
    }
}
