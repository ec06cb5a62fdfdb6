//! Timeline engine contract and the lane model the session core builds on.
//!
//! - TimelineEngine: lanes, markers, playback and events of the engine
//! - InMemoryTimeline: headless engine implementation
//! - GroupingLane / AnalysisGroups: lane hierarchy and visibility filters

mod analysis_groups;
mod engine;
mod grouping;
mod lane;
mod marker;
mod memory;

pub use analysis_groups::AnalysisGroups;
pub use engine::{EaseHandle, TimelineEngine, TimelineEvent};
pub use grouping::GroupingLane;
pub use lane::{GroupMedia, LaneId, LaneKind, LaneSpec, LaneVisibility};
pub use marker::{Marker, MarkerKind, MarkerStyle, TimeObservation};
pub use memory::{InMemoryTimeline, LaneTransition};
