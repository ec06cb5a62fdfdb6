pub mod annotations;
pub mod colors;
pub mod events;
pub mod lane_builder;
pub mod markers;
pub mod media;
pub mod orchestrator;
pub mod segmentation;
pub mod session;
pub mod telemetry_window;
pub mod timeline_snap;

pub use session::{FeatureTab, TimelineSession};
