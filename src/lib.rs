//! Timeline Session
//!
//! Session core for a media annotation timeline. Keeps the timeline engine's
//! lanes and markers consistent with the durable annotation/segmentation model
//! while manifests are loaded, switched and edited.
//!
//! - `state`: durable, serializable session model and the in-process store
//! - `timeline`: the timeline engine contract, lanes, markers and grouping lanes
//! - `core`: frame math, marker state machine, annotations, telemetry cues,
//!   manifest orchestration and the session facade
//! - `hotkeys`: key bindings and the help menu built from them

pub mod constants;
pub mod core;
pub mod error;
pub mod hotkeys;
pub mod state;
pub mod timeline;
pub mod utils;

pub use crate::core::{FeatureTab, TimelineSession};
pub use error::{Result, SessionError};
