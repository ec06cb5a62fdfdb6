use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timeline::{LaneId, TimeObservation};

/// A marker recorded on a segmentation track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub marker_id: Uuid,
    pub observation: TimeObservation,
}

/// A user-defined segmentation track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationTrack {
    /// Unique identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Hex color shared by the track's markers
    pub color: String,
    /// Lane in the timeline engine that renders this track
    pub marker_lane_id: LaneId,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl SegmentationTrack {
    /// Create a new, empty track
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            name: name.into(),
            color: color.into(),
            marker_lane_id: LaneId::new(format!("segmentation-{}", id)),
            visible: true,
            segments: Vec::new(),
        }
    }

    pub fn find_segment(&self, marker_id: Uuid) -> Option<&Segment> {
        self.segments.iter().find(|s| s.marker_id == marker_id)
    }
}

fn default_visible() -> bool {
    true
}
