//! Contract of the timeline engine collaborator.
//!
//! The engine owns lanes, markers and playback. The session core only holds
//! lane ids and pushes changes through this trait.

use futures_util::future::BoxFuture;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::timeline_snap::seconds_from_frames;
use crate::error::Result;

use super::{LaneId, LaneSpec, LaneVisibility, Marker, TimeObservation};

/// Completion signal of an eased lane animation
pub type EaseHandle = BoxFuture<'static, ()>;

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    /// The user moved or resized a marker inside the engine
    MarkerUpdated {
        lane: LaneId,
        marker_id: Uuid,
        observation: TimeObservation,
    },
    MarkerSelected { lane: LaneId, marker_id: Uuid },
    TimeUpdate(f64),
    Seeked(f64),
    Play,
    Ended,
}

pub trait TimelineEngine: Send + Sync {
    /// Add lanes in one batch; ids already present are skipped
    fn add_lanes(&self, lanes: Vec<LaneSpec>);
    fn remove_lane(&self, id: &LaneId) -> bool;
    fn has_lane(&self, id: &LaneId) -> bool;
    /// Lane ids, top to bottom
    fn lane_ids(&self) -> Vec<LaneId>;
    /// Move the listed lanes to the top in the given order
    fn reorder_lanes(&self, order: &[LaneId]);

    fn minimize_lane(&self, id: &LaneId);
    fn maximize_lane(&self, id: &LaneId);
    fn minimize_lane_eased(&self, id: &LaneId) -> EaseHandle;
    fn maximize_lane_eased(&self, id: &LaneId) -> EaseHandle;
    fn lane_visibility(&self, id: &LaneId) -> Option<LaneVisibility>;
    fn set_lane_hidden(&self, id: &LaneId, hidden: bool);
    fn is_lane_hidden(&self, id: &LaneId) -> bool;
    /// Ignore clicks on a lane filtered out by the analysis groups
    fn set_lane_click_filtered(&self, id: &LaneId, filtered: bool);

    fn add_marker(&self, lane: &LaneId, marker: Marker) -> Result<()>;
    fn update_marker(&self, lane: &LaneId, marker_id: Uuid, observation: TimeObservation) -> bool;
    fn set_marker_color(&self, lane: &LaneId, marker_id: Uuid, color: &str) -> bool;
    /// Keep the marker rendered but flag it for its exit animation
    fn set_marker_removing(&self, lane: &LaneId, marker_id: Uuid) -> bool;
    fn remove_marker(&self, lane: &LaneId, marker_id: Uuid) -> bool;
    fn markers(&self, lane: &LaneId) -> Vec<Marker>;
    /// Highlight a marker and move the playhead to it
    fn select_marker(&self, lane: &LaneId, marker_id: Uuid) -> bool;

    fn current_time(&self) -> f64;
    fn frame_rate(&self) -> f64;
    fn seek_to_time(&self, time: f64);
    fn seek_to_frame(&self, frame: u64) {
        self.seek_to_time(seconds_from_frames(frame as f64, self.frame_rate()));
    }
    fn zoom_to(&self, percent: f64);
    fn zoom(&self) -> f64;

    fn events(&self) -> broadcast::Receiver<TimelineEvent>;
}
