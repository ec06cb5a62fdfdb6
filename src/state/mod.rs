//! State management module
//!
//! This module contains the durable data structures of a session:
//! - SessionDocument / Manifest: the loaded media description
//! - Annotation: comments and their reply threads
//! - SegmentationTrack: user-defined marker tracks
//! - SessionState / DurableStore: the store the features dispatch into

mod annotation;
mod manifest;
mod segmentation;
mod selection;
mod settings;
mod store;

pub use annotation::Annotation;
pub use manifest::*;
pub use segmentation::{Segment, SegmentationTrack};
pub use selection::SelectionState;
pub use settings::{CueWindowSettings, SessionSettings};
pub use store::{DurableStore, InMemoryStore, SessionState, StoreCommand};
