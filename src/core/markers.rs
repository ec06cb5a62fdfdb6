//! Marker state machine shared by the annotation and segmentation features.
//!
//! Each feature instance moves through `Idle -> Creating -> Complete` with at
//! most one incomplete period marker at a time. Every mutation is pushed to
//! the timeline engine first and mirrored into the durable store second; the
//! marker owns geometry, the store record owns content.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::constants::ANNOTATION_LANE_ID;
use crate::core::colors::annotation_color;
use crate::core::timeline_snap::split_point;
use crate::error::{Result, SessionError};
use crate::state::{Annotation, DurableStore, Segment, SessionSettings, StoreCommand};
use crate::timeline::{
    LaneId, LaneKind, LaneSpec, Marker, TimeObservation, TimelineEngine, TimelineEvent,
};

/// Which feature a marker state machine serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Single annotation lane, markers mirrored as annotations
    Annotation,
    /// One lane per segmentation track, markers mirrored as segments
    Segmentation,
}

/// Caller-supplied bounds of a new period marker
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodBounds {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl PeriodBounds {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn open(start: f64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }
}

/// Content of an annotation created together with its marker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationDraft {
    pub body: String,
    pub is_private: bool,
}

/// Where a selection request comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionContext {
    /// A marker list: selection toggles the highlighted row
    MarkerList,
    /// The lane/player: selection moves the playhead to the marker
    Player,
}

/// Target of a new marker
struct Placement {
    lane: LaneId,
    color: String,
    track_id: Option<Uuid>,
}

#[derive(Debug, Default)]
struct FeatureState {
    incomplete: Option<Uuid>,
    /// Marker recolored by a split, with the color to restore
    split_highlight: Option<(LaneId, Uuid, String)>,
}

pub struct MarkerFeature {
    kind: FeatureKind,
    engine: Arc<dyn TimelineEngine>,
    store: Arc<dyn DurableStore>,
    settings: SessionSettings,
    state: Mutex<FeatureState>,
}

impl MarkerFeature {
    pub fn new(
        kind: FeatureKind,
        engine: Arc<dyn TimelineEngine>,
        store: Arc<dyn DurableStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            kind,
            engine,
            store,
            settings,
            state: Mutex::new(FeatureState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FeatureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub(crate) fn engine(&self) -> &Arc<dyn TimelineEngine> {
        &self.engine
    }

    pub(crate) fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    pub(crate) fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Id of the marker currently being created, if any
    pub fn incomplete_marker(&self) -> Option<Uuid> {
        self.state().incomplete
    }

    /// Track switching, track deletion and tab changes wait for this to clear
    pub fn is_creating(&self) -> bool {
        self.incomplete_marker().is_some()
    }

    /// Create the feature's lanes in the engine and replay stored markers
    pub fn attach(&self) -> Result<()> {
        let snapshot = self.store.snapshot();
        match self.kind {
            FeatureKind::Annotation => {
                let lane = LaneId::new(ANNOTATION_LANE_ID);
                self.engine.add_lanes(vec![LaneSpec::new(
                    lane.clone(),
                    LaneKind::Markers,
                    "Annotations",
                )]);
                let color = annotation_color(&self.settings.segmentation_palette);
                let fps = snapshot.frame_rate;
                for annotation in snapshot.annotations.iter().filter(|a| !a.is_reply()) {
                    let Some(start) = annotation.start else {
                        continue;
                    };
                    let observation = match annotation.end {
                        Some(end) => TimeObservation::period(start.to_seconds(fps), end.to_seconds(fps)),
                        None => TimeObservation::moment(start.to_seconds(fps)),
                    };
                    let mut marker = Marker::new(observation, color.clone());
                    marker.id = annotation.id;
                    self.engine.add_marker(&lane, marker)?;
                }
            }
            FeatureKind::Segmentation => {
                for track in snapshot.tracks.iter() {
                    self.engine.add_lanes(vec![LaneSpec::new(
                        track.marker_lane_id.clone(),
                        LaneKind::Markers,
                        track.name.clone(),
                    )]);
                    for segment in track.segments.iter() {
                        let mut marker = Marker::new(segment.observation, track.color.clone());
                        marker.id = segment.marker_id;
                        self.engine.add_marker(&track.marker_lane_id, marker)?;
                    }
                    if !track.visible {
                        self.engine.set_lane_hidden(&track.marker_lane_id, true);
                    }
                }
            }
        }
        Ok(())
    }

    /// Add a period marker. Without an end it becomes the incomplete marker.
    /// While one is incomplete, a call without both bounds completes it at
    /// the given end (or start); a fully bounded period is created alongside.
    pub fn add_period_marker(&self, bounds: Option<PeriodBounds>) -> Result<Marker> {
        self.add_period_marker_with(bounds, None)
    }

    pub(crate) fn add_period_marker_with(
        &self,
        bounds: Option<PeriodBounds>,
        draft: Option<AnnotationDraft>,
    ) -> Result<Marker> {
        let bounds = bounds.unwrap_or_default();
        if let Some(open_id) = self.incomplete_marker() {
            // A fully bounded period is a new marker; anything else targets the pending one.
            let bounded = bounds.start.is_some() && bounds.end.is_some();
            if !bounded {
                if draft.is_some() {
                    return Err(SessionError::InvalidMarker(format!(
                        "period marker {} is still being created",
                        open_id
                    )));
                }
                let end = bounds
                    .end
                    .or(bounds.start)
                    .unwrap_or_else(|| self.engine.current_time());
                return self.complete(open_id, end);
            }
        }

        let start = bounds.start.unwrap_or(0.0);
        if let Some(end) = bounds.end {
            if end < start {
                return Err(SessionError::InvalidMarker(format!(
                    "period ends at {} before it starts at {}",
                    end, start
                )));
            }
        }
        let observation = TimeObservation::Period {
            start,
            end: bounds.end,
        };
        let marker = self.create(observation, None, draft)?;
        if bounds.end.is_none() {
            tracing::debug!(marker = %marker.id, feature = ?self.kind, "Period marker incomplete");
            self.state().incomplete = Some(marker.id);
        }
        Ok(marker)
    }

    /// Add a moment marker; moments are always complete.
    pub fn add_moment_marker(&self, time: Option<f64>) -> Result<Marker> {
        self.add_moment_marker_with(time, None)
    }

    pub(crate) fn add_moment_marker_with(
        &self,
        time: Option<f64>,
        draft: Option<AnnotationDraft>,
    ) -> Result<Marker> {
        self.create(TimeObservation::moment(time.unwrap_or(0.0)), None, draft)
    }

    /// Complete the incomplete marker at `end`. Returns `None` when nothing is incomplete.
    pub fn complete_marker(&self, end: f64) -> Result<Option<Marker>> {
        match self.incomplete_marker() {
            Some(open_id) => self.complete(open_id, end).map(Some),
            None => Ok(None),
        }
    }

    /// Drop the incomplete marker without animation
    pub fn discard_incomplete(&self) -> Result<bool> {
        match self.incomplete_marker() {
            Some(open_id) => self.delete_marker(open_id, true),
            None => Ok(false),
        }
    }

    fn complete(&self, open_id: Uuid, end: f64) -> Result<Marker> {
        let (lane, marker) = self.find_marker(open_id)?;
        let start = marker.observation.start();
        let observation = TimeObservation::period(start, end.max(start));
        self.update_marker(open_id, observation)?;
        let (_, completed) = self.find_marker(open_id).unwrap_or((lane, marker));
        Ok(completed)
    }

    fn create(
        &self,
        observation: TimeObservation,
        color: Option<String>,
        draft: Option<AnnotationDraft>,
    ) -> Result<Marker> {
        let placement = self.placement()?;
        let observation = observation.quantized(self.engine.frame_rate());
        let marker = Marker::new(observation, color.unwrap_or(placement.color));

        self.engine.add_marker(&placement.lane, marker.clone())?;
        match self.kind {
            FeatureKind::Annotation => {
                let draft = draft.unwrap_or_default();
                let mut annotation = Annotation::new(draft.body, self.settings.user.clone());
                annotation.id = marker.id;
                annotation.is_private = draft.is_private;
                annotation.set_observation(&observation, self.store.snapshot().frame_rate);
                self.store.dispatch(StoreCommand::AddAnnotation(annotation));
            }
            FeatureKind::Segmentation => {
                if let Some(track_id) = placement.track_id {
                    self.store.dispatch(StoreCommand::AddSegment {
                        track_id,
                        segment: Segment {
                            marker_id: marker.id,
                            observation,
                        },
                    });
                }
            }
        }
        tracing::debug!(marker = %marker.id, lane = %placement.lane, feature = ?self.kind, "Marker created");
        Ok(marker)
    }

    /// Lane and color for a new marker
    fn placement(&self) -> Result<Placement> {
        match self.kind {
            FeatureKind::Annotation => Ok(Placement {
                lane: LaneId::new(ANNOTATION_LANE_ID),
                color: annotation_color(&self.settings.segmentation_palette),
                track_id: None,
            }),
            FeatureKind::Segmentation => {
                let snapshot = self.store.snapshot();
                let track = snapshot.active_track().ok_or(SessionError::NoActiveTrack)?;
                Ok(Placement {
                    lane: track.marker_lane_id.clone(),
                    color: track.color.clone(),
                    track_id: Some(track.id),
                })
            }
        }
    }

    /// Lane a marker of this feature lives on
    fn lane_of(&self, marker_id: Uuid) -> Result<LaneId> {
        match self.kind {
            FeatureKind::Annotation => Ok(LaneId::new(ANNOTATION_LANE_ID)),
            FeatureKind::Segmentation => self
                .store
                .snapshot()
                .track_of_segment(marker_id)
                .map(|track| track.marker_lane_id.clone())
                .ok_or(SessionError::MarkerNotFound(marker_id)),
        }
    }

    fn owns_lane(&self, lane: &LaneId) -> bool {
        match self.kind {
            FeatureKind::Annotation => lane.as_str() == ANNOTATION_LANE_ID,
            FeatureKind::Segmentation => self
                .store
                .snapshot()
                .tracks
                .iter()
                .any(|t| &t.marker_lane_id == lane),
        }
    }

    fn find_marker(&self, marker_id: Uuid) -> Result<(LaneId, Marker)> {
        let lane = self.lane_of(marker_id)?;
        self.engine
            .markers(&lane)
            .into_iter()
            .find(|m| m.id == marker_id)
            .map(|marker| (lane, marker))
            .ok_or(SessionError::MarkerNotFound(marker_id))
    }

    /// Markers of this feature currently rendered by the engine
    pub fn markers(&self) -> Vec<Marker> {
        match self.kind {
            FeatureKind::Annotation => self.engine.markers(&LaneId::new(ANNOTATION_LANE_ID)),
            FeatureKind::Segmentation => self
                .store
                .snapshot()
                .tracks
                .iter()
                .flat_map(|t| self.engine.markers(&t.marker_lane_id))
                .collect(),
        }
    }

    pub fn update_period_marker(&self, marker_id: Uuid, start: f64, end: Option<f64>) -> Result<bool> {
        self.update_marker(marker_id, TimeObservation::Period { start, end })
    }

    pub fn update_moment_marker(&self, marker_id: Uuid, time: f64) -> Result<bool> {
        self.update_marker(marker_id, TimeObservation::moment(time))
    }

    /// Push new geometry to the engine, then to the store. Updating the
    /// incomplete marker clears the incomplete state.
    pub fn update_marker(&self, marker_id: Uuid, observation: TimeObservation) -> Result<bool> {
        let (lane, existing) = self.find_marker(marker_id)?;
        if existing.kind() != observation.kind() {
            return Err(SessionError::InvalidMarker(format!(
                "cannot turn a {:?} marker into a {:?}",
                existing.kind(),
                observation.kind()
            )));
        }
        let observation = observation.quantized(self.engine.frame_rate());
        if !self.engine.update_marker(&lane, marker_id, observation) {
            return Ok(false);
        }
        self.mirror_update(marker_id, observation);

        let mut state = self.state();
        if state.incomplete == Some(marker_id) {
            tracing::debug!(marker = %marker_id, "Incomplete marker completed");
            state.incomplete = None;
        }
        Ok(true)
    }

    fn mirror_update(&self, marker_id: Uuid, observation: TimeObservation) {
        let command = match self.kind {
            FeatureKind::Annotation => StoreCommand::UpdateAnnotationTime {
                id: marker_id,
                observation,
            },
            FeatureKind::Segmentation => StoreCommand::UpdateSegment {
                marker_id,
                observation,
            },
        };
        self.store.dispatch(command);
    }

    /// A marker changed inside the engine (user drag). Only the store is
    /// updated; the engine already holds the new geometry.
    pub fn on_engine_marker_updated(&self, lane: &LaneId, marker_id: Uuid, observation: TimeObservation) {
        if !self.owns_lane(lane) {
            return;
        }
        self.mirror_update(marker_id, observation);
        let mut state = self.state();
        if state.incomplete == Some(marker_id) && observation.is_complete() {
            state.incomplete = None;
        }
    }

    /// Mirror engine-side marker edits into the store until `token` fires
    pub fn sync_engine_events(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let feature = Arc::clone(self);
        let mut events = self.engine.events();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(TimelineEvent::MarkerUpdated { lane, marker_id, observation }) => {
                            feature.on_engine_marker_updated(&lane, marker_id, observation);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Marker event stream lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// Split a complete period at its midpoint. The original keeps the first
    /// half; the new marker starts one frame later and is highlighted until
    /// the marker-list selection next changes.
    pub fn split_marker(&self, marker_id: Uuid) -> Result<Marker> {
        let (lane, marker) = self.find_marker(marker_id)?;
        let (start, end) = match marker.observation {
            TimeObservation::Period {
                start,
                end: Some(end),
            } => (start, end),
            TimeObservation::Period { end: None, .. } => {
                return Err(SessionError::InvalidMarker(
                    "cannot split an incomplete period".to_string(),
                ))
            }
            TimeObservation::Moment { .. } => {
                return Err(SessionError::InvalidMarker(
                    "cannot split a moment marker".to_string(),
                ))
            }
        };

        let (mid, next_start) = split_point(start, end, self.engine.frame_rate());
        if next_start > end {
            return Err(SessionError::InvalidMarker(
                "period too short to split".to_string(),
            ));
        }

        self.update_marker(marker_id, TimeObservation::period(start, mid))?;

        let draft = match self.kind {
            FeatureKind::Annotation => self
                .store
                .snapshot()
                .find_annotation(marker_id)
                .map(|a| AnnotationDraft {
                    body: a.body.clone(),
                    is_private: a.is_private,
                }),
            FeatureKind::Segmentation => None,
        };
        self.restore_split_highlight();
        let created = self.create(
            TimeObservation::period(next_start, end),
            Some(self.settings.split_highlight_color.clone()),
            draft,
        )?;
        self.state().split_highlight = Some((lane, created.id, marker.style.color.clone()));
        Ok(created)
    }

    /// Restore the color of the last split marker, once
    fn restore_split_highlight(&self) {
        let pending = self.state().split_highlight.take();
        if let Some((lane, marker_id, color)) = pending {
            // The marker may be gone by now.
            self.engine.set_marker_color(&lane, marker_id, &color);
        }
    }

    /// The marker list selection changed
    pub fn on_marker_list_selection_changed(&self) {
        self.restore_split_highlight();
    }

    /// Delete a marker and its store record. Animated deletes keep the marker
    /// rendered with the `removing` flag and drop it after the fade; the store
    /// record goes after the delete delay. Neither timer is cancelled by
    /// `reset`.
    pub fn delete_marker(&self, marker_id: Uuid, skip_animation: bool) -> Result<bool> {
        let lane = self.lane_of(marker_id)?;
        {
            let mut state = self.state();
            if state.incomplete == Some(marker_id) {
                state.incomplete = None;
            }
        }
        let command = match self.kind {
            FeatureKind::Annotation => StoreCommand::DeleteAnnotation(marker_id),
            FeatureKind::Segmentation => StoreCommand::DeleteSegment(marker_id),
        };

        if skip_animation {
            let removed = self.engine.remove_marker(&lane, marker_id);
            let dropped = self.store.dispatch(command);
            return Ok(removed || dropped);
        }

        if !self.engine.set_marker_removing(&lane, marker_id) {
            return Ok(false);
        }

        let engine = Arc::clone(&self.engine);
        let fade = self.settings.marker_fade();
        let fade_lane = lane.clone();
        tokio::spawn(async move {
            tokio::time::sleep(fade).await;
            if !engine.remove_marker(&fade_lane, marker_id) {
                tracing::trace!(marker = %marker_id, "Marker already gone after fade");
            }
        });

        let store = Arc::clone(&self.store);
        let delay = self.settings.marker_delete_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !store.dispatch(command) {
                tracing::trace!(marker = %marker_id, "Deferred removal found no record");
            }
        });
        Ok(true)
    }

    /// Select a marker. Ends any reply editing.
    pub fn select_marker(&self, marker_id: Uuid, context: SelectionContext) -> Result<bool> {
        let lane = self.lane_of(marker_id)?;
        match context {
            SelectionContext::MarkerList => {
                self.store.dispatch(StoreCommand::ToggleMarkerRow(marker_id));
                self.on_marker_list_selection_changed();
                Ok(true)
            }
            SelectionContext::Player => {
                if self.kind == FeatureKind::Annotation {
                    self.store
                        .dispatch(StoreCommand::SelectAnnotation(Some(marker_id)));
                }
                Ok(self.engine.select_marker(&lane, marker_id))
            }
        }
    }

    /// Forget the feature's bookkeeping. Pending deferred removals still run.
    pub fn reset(&self) {
        let mut state = self.state();
        state.incomplete = None;
        state.split_highlight = None;
    }
}
