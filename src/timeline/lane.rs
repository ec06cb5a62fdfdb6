use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::AnalysisKind;

/// Identifier of a lane in the timeline engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(String);

impl LaneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Media a grouping lane stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMedia {
    Video,
    Audio,
    Text,
}

/// What a lane renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LaneKind {
    /// Parent lane of a media track
    Group { media: GroupMedia },
    /// Thumbnail or waveform strip
    VisualReference,
    /// One audio channel of an audio track
    AudioChannel { channel: u32 },
    Subtitles,
    Analysis { kind: AnalysisKind },
    Telemetry,
    /// Annotation or segmentation markers
    Markers,
}

/// Collapsed state of a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneVisibility {
    Minimized,
    #[default]
    Maximized,
}

/// Description of a lane handed to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSpec {
    pub id: LaneId,
    pub kind: LaneKind,
    pub label: String,
    /// Grouping lane this lane nests under
    pub parent: Option<LaneId>,
    /// Manifest track id the lane was built from
    pub source_track: Option<String>,
}

impl LaneSpec {
    pub fn new(id: LaneId, kind: LaneKind, label: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            label: label.into(),
            parent: None,
            source_track: None,
        }
    }

    pub fn with_parent(mut self, parent: &LaneId) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn with_source(mut self, track_id: impl Into<String>) -> Self {
        self.source_track = Some(track_id.into());
        self
    }
}
