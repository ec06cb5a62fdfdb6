//! Contracts of the media player and the session source.
//!
//! The orchestrator never touches decoding or networking itself; it drives
//! these two collaborators and reacts to what they report.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::core::telemetry_window::TelemetryCue;
use crate::error::Result;
use crate::state::{Manifest, SessionDocument};

/// What the player reports once a video is ready
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub duration: f64,
    pub frame_rate: f64,
}

/// An audio or subtitle track as exposed by the playing media
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerTrack {
    pub id: String,
    pub label: String,
    pub language: Option<String>,
}

impl PlayerTrack {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            language: None,
        }
    }
}

/// Media player driving the video element
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Load the manifest's video; resolves once playback can start
    async fn load_video(&self, manifest: &Manifest) -> Result<VideoInfo>;

    /// Audio tracks of the loaded media, available once discovered
    async fn audio_tracks(&self) -> Result<Vec<PlayerTrack>>;

    /// Subtitle tracks of the loaded media, available once discovered
    async fn subtitle_tracks(&self) -> Result<Vec<PlayerTrack>>;

    fn active_audio_track(&self) -> Option<PlayerTrack>;
    fn set_active_audio_track(&self, id: &str) -> bool;
    fn active_subtitle_track(&self) -> Option<PlayerTrack>;
    fn set_active_subtitle_track(&self, id: Option<&str>) -> bool;

    /// Playback errors raised while the media is loaded
    fn errors(&self) -> broadcast::Receiver<String>;
}

/// Where session documents and telemetry files come from
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn fetch_session(&self) -> Result<SessionDocument>;
    async fn fetch_telemetry(&self, src: &str) -> Result<Vec<TelemetryCue>>;
}
