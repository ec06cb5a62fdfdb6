//! Segmentation track management.
//!
//! Tracks are tabs of period/moment markers, each rendered on its own marker
//! lane. Track switching and deletion wait until the marker feature has no
//! incomplete marker.

use std::sync::Arc;

use uuid::Uuid;

use crate::core::colors::least_used_color;
use crate::core::markers::{FeatureKind, MarkerFeature};
use crate::error::{Result, SessionError};
use crate::state::{DurableStore, SegmentationTrack, SessionSettings, StoreCommand};
use crate::timeline::{LaneKind, LaneSpec, TimelineEngine};

pub struct SegmentationTracks {
    feature: Arc<MarkerFeature>,
}

impl SegmentationTracks {
    pub fn new(
        engine: Arc<dyn TimelineEngine>,
        store: Arc<dyn DurableStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            feature: Arc::new(MarkerFeature::new(
                FeatureKind::Segmentation,
                engine,
                store,
                settings,
            )),
        }
    }

    /// Marker operations on the active track
    pub fn markers(&self) -> &Arc<MarkerFeature> {
        &self.feature
    }

    pub fn tracks(&self) -> Vec<SegmentationTrack> {
        self.feature.store().snapshot().tracks.clone()
    }

    /// Whether tabs and tracks may change right now
    pub fn can_switch(&self) -> bool {
        !self.feature.is_creating()
    }

    /// Add a track colored with the least used palette color. The first
    /// track becomes active.
    pub fn add_track(&self, name: impl Into<String>) -> Result<SegmentationTrack> {
        let store = self.feature.store();
        let snapshot = store.snapshot();
        let color = least_used_color(&self.feature.settings().segmentation_palette, &snapshot.tracks);
        let track = SegmentationTrack::new(name, color);

        self.feature.engine().add_lanes(vec![LaneSpec::new(
            track.marker_lane_id.clone(),
            LaneKind::Markers,
            track.name.clone(),
        )]);
        store.dispatch(StoreCommand::AddTrack(track.clone()));
        if store.snapshot().active_track.is_none() {
            store.dispatch(StoreCommand::SetActiveTrack(Some(track.id)));
        }
        tracing::info!(track = %track.id, name = %track.name, color = %track.color, "Segmentation track added");
        Ok(track)
    }

    pub fn rename_track(&self, track_id: Uuid, name: impl Into<String>) -> bool {
        self.feature.store().dispatch(StoreCommand::RenameTrack {
            id: track_id,
            name: name.into(),
        })
    }

    /// Make a track receive new markers. Refused while a marker is incomplete.
    pub fn set_active_track(&self, track_id: Option<Uuid>) -> bool {
        if !self.can_switch() {
            tracing::debug!("Active track change blocked by incomplete marker");
            return false;
        }
        self.feature
            .store()
            .dispatch(StoreCommand::SetActiveTrack(track_id))
    }

    /// Delete a track with its lane and markers. Refused while a marker is incomplete.
    pub fn delete_track(&self, track_id: Uuid) -> Result<bool> {
        if !self.can_switch() {
            tracing::debug!(track = %track_id, "Track deletion blocked by incomplete marker");
            return Ok(false);
        }
        let store = self.feature.store();
        let snapshot = store.snapshot();
        let track = snapshot
            .find_track(track_id)
            .ok_or_else(|| SessionError::Config(format!("unknown segmentation track {}", track_id)))?;
        self.feature.engine().remove_lane(&track.marker_lane_id);
        Ok(store.dispatch(StoreCommand::DeleteTrack(track_id)))
    }

    /// Replace every track, e.g. when a saved session is restored. The old
    /// lanes are dropped and the new ones replayed.
    pub fn set_tracks(&self, tracks: Vec<SegmentationTrack>) -> Result<bool> {
        if !self.can_switch() {
            return Ok(false);
        }
        let store = self.feature.store();
        for old in store.snapshot().tracks.iter() {
            self.feature.engine().remove_lane(&old.marker_lane_id);
        }
        store.dispatch(StoreCommand::SetTracks(tracks));
        if store.snapshot().active_track.is_none() {
            let first = store.snapshot().tracks.first().map(|t| t.id);
            store.dispatch(StoreCommand::SetActiveTrack(first));
        }
        self.feature.reset();
        self.feature.attach()?;
        Ok(true)
    }

    /// Flip a track's visibility in the store and hide or show its lane
    pub fn toggle_track_visibility(&self, track_id: Uuid) -> Option<bool> {
        let store = self.feature.store();
        let snapshot = store.snapshot();
        let track = snapshot.find_track(track_id)?;
        let visible = !track.visible;
        store.dispatch(StoreCommand::SetTrackVisibility {
            id: track_id,
            visible,
        });
        self.feature
            .engine()
            .set_lane_hidden(&track.marker_lane_id, !visible);
        Some(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::markers::PeriodBounds;
    use crate::state::InMemoryStore;
    use crate::timeline::{InMemoryTimeline, TimeObservation};

    fn tracks() -> (Arc<InMemoryTimeline>, SegmentationTracks) {
        let engine = Arc::new(InMemoryTimeline::default());
        let store = Arc::new(InMemoryStore::default());
        let tracks = SegmentationTracks::new(engine.clone(), store, SessionSettings::default());
        (engine, tracks)
    }

    #[test]
    fn test_add_track_picks_unused_colors() {
        let (engine, tracks) = tracks();
        let first = tracks.add_track("Shots").unwrap();
        let second = tracks.add_track("Scenes").unwrap();
        assert_ne!(first.color, second.color);
        assert!(engine.has_lane(&first.marker_lane_id));
        let snapshot = tracks.markers().store().snapshot();
        assert_eq!(snapshot.active_track, Some(first.id));
    }

    #[test]
    fn test_incomplete_marker_blocks_track_changes() {
        let (_engine, tracks) = tracks();
        let first = tracks.add_track("Shots").unwrap();
        let second = tracks.add_track("Scenes").unwrap();
        tracks
            .markers()
            .add_period_marker(Some(PeriodBounds::open(1.0)))
            .unwrap();

        assert!(!tracks.set_active_track(Some(second.id)));
        assert!(!tracks.delete_track(first.id).unwrap());

        tracks.markers().complete_marker(3.0).unwrap();
        assert!(tracks.set_active_track(Some(second.id)));
        assert!(tracks.delete_track(first.id).unwrap());
        assert_eq!(tracks.tracks().len(), 1);
    }

    #[test]
    fn test_toggle_visibility_hides_lane() {
        let (engine, tracks) = tracks();
        let track = tracks.add_track("Shots").unwrap();
        assert_eq!(tracks.toggle_track_visibility(track.id), Some(false));
        assert!(engine.is_lane_hidden(&track.marker_lane_id));
        assert_eq!(tracks.toggle_track_visibility(track.id), Some(true));
        assert!(!engine.is_lane_hidden(&track.marker_lane_id));
    }

    #[test]
    fn test_set_tracks_replays_segments() {
        let (engine, tracks) = tracks();
        let old = tracks.add_track("Old").unwrap();
        let mut restored = SegmentationTrack::new("Restored", "#22c55e");
        let marker_id = Uuid::new_v4();
        restored.segments.push(crate::state::Segment {
            marker_id,
            observation: TimeObservation::period(1.0, 2.0),
        });

        assert!(tracks.set_tracks(vec![restored.clone()]).unwrap());
        assert!(!engine.has_lane(&old.marker_lane_id));
        let markers = engine.markers(&restored.marker_lane_id);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id, marker_id);
        assert_eq!(
            tracks.markers().store().snapshot().active_track,
            Some(restored.id)
        );
    }
}
