//! Headless timeline engine.
//!
//! Keeps lanes, markers and the playhead in memory. Hosts without a visual
//! timeline and the test suite drive the session core through it.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::DEFAULT_FRAME_RATE;
use crate::error::{Result, SessionError};
use crate::state::SessionSettings;

use super::{
    EaseHandle, LaneId, LaneSpec, LaneVisibility, Marker, TimeObservation, TimelineEngine,
    TimelineEvent,
};

/// One committed visibility change, for inspection
#[derive(Debug, Clone, PartialEq)]
pub struct LaneTransition {
    pub lane: LaneId,
    pub visibility: LaneVisibility,
    pub eased: bool,
}

struct LaneState {
    spec: LaneSpec,
    visibility: LaneVisibility,
    hidden: bool,
    click_filtered: bool,
    markers: Vec<Marker>,
}

struct Inner {
    lanes: Vec<LaneState>,
    transitions: Vec<LaneTransition>,
    selected_marker: Option<Uuid>,
    current_time: f64,
    frame_rate: f64,
    zoom: f64,
}

impl Inner {
    fn lane(&self, id: &LaneId) -> Option<&LaneState> {
        self.lanes.iter().find(|l| &l.spec.id == id)
    }

    fn lane_mut(&mut self, id: &LaneId) -> Option<&mut LaneState> {
        self.lanes.iter_mut().find(|l| &l.spec.id == id)
    }

    fn set_visibility(&mut self, id: &LaneId, visibility: LaneVisibility, eased: bool) -> bool {
        let Some(lane) = self.lane_mut(id) else {
            return false;
        };
        lane.visibility = visibility;
        self.transitions.push(LaneTransition {
            lane: id.clone(),
            visibility,
            eased,
        });
        true
    }
}

pub struct InMemoryTimeline {
    inner: Mutex<Inner>,
    events: broadcast::Sender<TimelineEvent>,
    ease: Duration,
}

impl InMemoryTimeline {
    pub fn new(ease: Duration) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Inner {
                lanes: Vec::new(),
                transitions: Vec::new(),
                selected_marker: None,
                current_time: 0.0,
                frame_rate: DEFAULT_FRAME_RATE,
                zoom: 100.0,
            }),
            events,
            ease,
        }
    }

    /// Engine easing lane animations over the configured duration
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(settings.lane_ease())
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: TimelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn set_frame_rate(&self, fps: f64) {
        if fps.is_finite() && fps > 0.0 {
            self.state().frame_rate = fps;
        }
    }

    /// Advance the playhead as playback would
    pub fn set_current_time(&self, time: f64) {
        self.state().current_time = time.max(0.0);
        self.emit(TimelineEvent::TimeUpdate(time.max(0.0)));
    }

    pub fn play(&self) {
        self.emit(TimelineEvent::Play);
    }

    pub fn end(&self) {
        self.emit(TimelineEvent::Ended);
    }

    /// Apply a user drag to a marker and report it like the engine would
    pub fn drag_marker(&self, lane: &LaneId, marker_id: Uuid, observation: TimeObservation) -> bool {
        if !self.update_marker(lane, marker_id, observation) {
            return false;
        }
        let observation = self
            .markers(lane)
            .into_iter()
            .find(|m| m.id == marker_id)
            .map(|m| m.observation)
            .unwrap_or(observation);
        self.emit(TimelineEvent::MarkerUpdated {
            lane: lane.clone(),
            marker_id,
            observation,
        });
        true
    }

    pub fn transitions(&self) -> Vec<LaneTransition> {
        self.state().transitions.clone()
    }

    pub fn lane_spec(&self, id: &LaneId) -> Option<LaneSpec> {
        self.state().lane(id).map(|l| l.spec.clone())
    }

    pub fn is_click_filtered(&self, id: &LaneId) -> bool {
        self.state().lane(id).map(|l| l.click_filtered).unwrap_or(false)
    }

    pub fn selected_marker(&self) -> Option<Uuid> {
        self.state().selected_marker
    }

    fn eased(&self) -> EaseHandle {
        let ease = self.ease;
        async move { tokio::time::sleep(ease).await }.boxed()
    }
}

impl Default for InMemoryTimeline {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

impl TimelineEngine for InMemoryTimeline {
    fn add_lanes(&self, lanes: Vec<LaneSpec>) {
        let mut state = self.state();
        for spec in lanes {
            if state.lane(&spec.id).is_some() {
                tracing::debug!(lane = %spec.id, "Lane already present, skipping");
                continue;
            }
            state.lanes.push(LaneState {
                spec,
                visibility: LaneVisibility::Maximized,
                hidden: false,
                click_filtered: false,
                markers: Vec::new(),
            });
        }
    }

    fn remove_lane(&self, id: &LaneId) -> bool {
        let mut state = self.state();
        let len = state.lanes.len();
        state.lanes.retain(|l| &l.spec.id != id);
        state.lanes.len() < len
    }

    fn has_lane(&self, id: &LaneId) -> bool {
        self.state().lane(id).is_some()
    }

    fn lane_ids(&self) -> Vec<LaneId> {
        self.state().lanes.iter().map(|l| l.spec.id.clone()).collect()
    }

    fn reorder_lanes(&self, order: &[LaneId]) {
        let mut state = self.state();
        let mut ordered = Vec::with_capacity(state.lanes.len());
        for id in order {
            if let Some(index) = state.lanes.iter().position(|l| &l.spec.id == id) {
                ordered.push(state.lanes.remove(index));
            }
        }
        ordered.append(&mut state.lanes);
        state.lanes = ordered;
    }

    fn minimize_lane(&self, id: &LaneId) {
        self.state().set_visibility(id, LaneVisibility::Minimized, false);
    }

    fn maximize_lane(&self, id: &LaneId) {
        self.state().set_visibility(id, LaneVisibility::Maximized, false);
    }

    fn minimize_lane_eased(&self, id: &LaneId) -> EaseHandle {
        self.state().set_visibility(id, LaneVisibility::Minimized, true);
        self.eased()
    }

    fn maximize_lane_eased(&self, id: &LaneId) -> EaseHandle {
        self.state().set_visibility(id, LaneVisibility::Maximized, true);
        self.eased()
    }

    fn lane_visibility(&self, id: &LaneId) -> Option<LaneVisibility> {
        self.state().lane(id).map(|l| l.visibility)
    }

    fn set_lane_hidden(&self, id: &LaneId, hidden: bool) {
        if let Some(lane) = self.state().lane_mut(id) {
            lane.hidden = hidden;
        }
    }

    fn is_lane_hidden(&self, id: &LaneId) -> bool {
        self.state().lane(id).map(|l| l.hidden).unwrap_or(false)
    }

    fn set_lane_click_filtered(&self, id: &LaneId, filtered: bool) {
        if let Some(lane) = self.state().lane_mut(id) {
            lane.click_filtered = filtered;
        }
    }

    fn add_marker(&self, lane: &LaneId, mut marker: Marker) -> Result<()> {
        let mut state = self.state();
        let fps = state.frame_rate;
        let lane_state = state
            .lane_mut(lane)
            .ok_or_else(|| SessionError::LaneNotFound(lane.to_string()))?;
        marker.observation = marker.observation.quantized(fps);
        lane_state.markers.push(marker);
        Ok(())
    }

    fn update_marker(&self, lane: &LaneId, marker_id: Uuid, observation: TimeObservation) -> bool {
        let mut state = self.state();
        let fps = state.frame_rate;
        let Some(lane_state) = state.lane_mut(lane) else {
            return false;
        };
        match lane_state.markers.iter_mut().find(|m| m.id == marker_id) {
            Some(marker) => {
                marker.observation = observation.quantized(fps);
                true
            }
            None => false,
        }
    }

    fn set_marker_color(&self, lane: &LaneId, marker_id: Uuid, color: &str) -> bool {
        let mut state = self.state();
        let Some(lane_state) = state.lane_mut(lane) else {
            return false;
        };
        match lane_state.markers.iter_mut().find(|m| m.id == marker_id) {
            Some(marker) => {
                marker.style.color = color.to_string();
                true
            }
            None => false,
        }
    }

    fn set_marker_removing(&self, lane: &LaneId, marker_id: Uuid) -> bool {
        let mut state = self.state();
        let Some(lane_state) = state.lane_mut(lane) else {
            return false;
        };
        match lane_state.markers.iter_mut().find(|m| m.id == marker_id) {
            Some(marker) => {
                marker.removing = true;
                true
            }
            None => false,
        }
    }

    fn remove_marker(&self, lane: &LaneId, marker_id: Uuid) -> bool {
        let mut state = self.state();
        if state.selected_marker == Some(marker_id) {
            state.selected_marker = None;
        }
        let Some(lane_state) = state.lane_mut(lane) else {
            return false;
        };
        let len = lane_state.markers.len();
        lane_state.markers.retain(|m| m.id != marker_id);
        lane_state.markers.len() < len
    }

    fn markers(&self, lane: &LaneId) -> Vec<Marker> {
        self.state()
            .lane(lane)
            .map(|l| l.markers.clone())
            .unwrap_or_default()
    }

    fn select_marker(&self, lane: &LaneId, marker_id: Uuid) -> bool {
        let start = {
            let mut state = self.state();
            let Some(start) = state
                .lane(lane)
                .and_then(|l| l.markers.iter().find(|m| m.id == marker_id))
                .map(|m| m.observation.start())
            else {
                return false;
            };
            state.selected_marker = Some(marker_id);
            state.current_time = start;
            start
        };
        self.emit(TimelineEvent::MarkerSelected {
            lane: lane.clone(),
            marker_id,
        });
        self.emit(TimelineEvent::Seeked(start));
        true
    }

    fn current_time(&self) -> f64 {
        self.state().current_time
    }

    fn frame_rate(&self) -> f64 {
        self.state().frame_rate
    }

    fn seek_to_time(&self, time: f64) {
        let time = time.max(0.0);
        self.state().current_time = time;
        self.emit(TimelineEvent::Seeked(time));
    }

    fn zoom_to(&self, percent: f64) {
        self.state().zoom = percent.clamp(100.0, 2000.0);
    }

    fn zoom(&self) -> f64 {
        self.state().zoom
    }

    fn events(&self) -> broadcast::Receiver<TimelineEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::LaneKind;

    fn lane(id: &str) -> LaneSpec {
        LaneSpec::new(LaneId::new(id), LaneKind::Markers, id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ease_duration_follows_settings() {
        let settings = SessionSettings {
            lane_ease_ms: 50,
            ..SessionSettings::default()
        };
        let engine = InMemoryTimeline::from_settings(&settings);
        engine.add_lanes(vec![lane("a")]);
        let started = tokio::time::Instant::now();
        engine.minimize_lane_eased(&LaneId::new("a")).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(100));
        assert_eq!(engine.lane_visibility(&LaneId::new("a")), Some(LaneVisibility::Minimized));
    }

    #[test]
    fn test_add_lanes_skips_duplicates() {
        let engine = InMemoryTimeline::default();
        engine.add_lanes(vec![lane("a"), lane("b")]);
        engine.add_lanes(vec![lane("b"), lane("c")]);
        assert_eq!(
            engine.lane_ids(),
            vec![LaneId::new("a"), LaneId::new("b"), LaneId::new("c")]
        );
    }

    #[test]
    fn test_reorder_moves_listed_lanes_first() {
        let engine = InMemoryTimeline::default();
        engine.add_lanes(vec![lane("a"), lane("b"), lane("c")]);
        engine.reorder_lanes(&[LaneId::new("c"), LaneId::new("missing"), LaneId::new("a")]);
        assert_eq!(
            engine.lane_ids(),
            vec![LaneId::new("c"), LaneId::new("a"), LaneId::new("b")]
        );
    }

    #[test]
    fn test_markers_quantized_to_frames() {
        let engine = InMemoryTimeline::default();
        engine.set_frame_rate(25.0);
        engine.add_lanes(vec![lane("m")]);
        let marker = Marker::new(TimeObservation::period(1.013, 2.0), "#fff");
        let id = marker.id;
        engine.add_marker(&LaneId::new("m"), marker).unwrap();
        assert_eq!(engine.markers(&LaneId::new("m"))[0].observation.start(), 1.0);
        assert!(engine.remove_marker(&LaneId::new("m"), id));
        assert!(!engine.remove_marker(&LaneId::new("m"), id));
    }

    #[test]
    fn test_add_marker_to_missing_lane_fails() {
        let engine = InMemoryTimeline::default();
        let err = engine
            .add_marker(&LaneId::new("nope"), Marker::new(TimeObservation::moment(1.0), "#fff"))
            .unwrap_err();
        assert!(matches!(err, SessionError::LaneNotFound(_)));
    }

    #[test]
    fn test_seek_to_frame_uses_frame_rate() {
        let engine = InMemoryTimeline::default();
        engine.set_frame_rate(50.0);
        engine.seek_to_frame(100);
        assert_eq!(engine.current_time(), 2.0);
    }

    #[tokio::test]
    async fn test_select_marker_moves_playhead() {
        let engine = InMemoryTimeline::default();
        engine.add_lanes(vec![lane("m")]);
        let marker = Marker::new(TimeObservation::moment(4.0), "#fff");
        let id = marker.id;
        engine.add_marker(&LaneId::new("m"), marker).unwrap();
        let mut events = engine.events();
        assert!(engine.select_marker(&LaneId::new("m"), id));
        assert_eq!(engine.current_time(), 4.0);
        assert_eq!(
            events.recv().await.unwrap(),
            TimelineEvent::MarkerSelected {
                lane: LaneId::new("m"),
                marker_id: id
            }
        );
    }
}
