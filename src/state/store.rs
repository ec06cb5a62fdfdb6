//! The durable session store.
//!
//! `SessionState` is the serializable model of annotations and segmentation
//! tracks. It only changes through `StoreCommand`s applied by a
//! `DurableStore`; `InMemoryStore` publishes every change on a watch channel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::constants::DEFAULT_FRAME_RATE;
use crate::timeline::TimeObservation;

use super::{Annotation, Segment, SegmentationTrack, SelectionState};

/// Durable model of the current session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// All annotations, roots and replies, in insertion order
    pub annotations: Vec<Annotation>,
    /// Segmentation tracks (ordered top to bottom)
    pub tracks: Vec<SegmentationTrack>,
    /// Track that receives new segmentation markers
    pub active_track: Option<Uuid>,
    /// Frame rate every annotation timecode is encoded in; changing it
    /// re-encodes them
    pub frame_rate: f64,
    #[serde(skip)]
    pub selection: SelectionState,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            annotations: Vec::new(),
            tracks: Vec::new(),
            active_track: None,
            frame_rate: DEFAULT_FRAME_RATE,
            selection: SelectionState::default(),
        }
    }
}

/// State-changing commands understood by the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    AddAnnotation(Annotation),
    UpdateAnnotationTime { id: Uuid, observation: TimeObservation },
    UpdateAnnotationBody { id: Uuid, body: String },
    /// Deletes a root together with its replies
    DeleteAnnotation(Uuid),
    SelectAnnotation(Option<Uuid>),
    ToggleMarkerRow(Uuid),
    BeginReplyEdit(Uuid),
    AddTrack(SegmentationTrack),
    RenameTrack { id: Uuid, name: String },
    SetTrackVisibility { id: Uuid, visible: bool },
    DeleteTrack(Uuid),
    SetTracks(Vec<SegmentationTrack>),
    SetActiveTrack(Option<Uuid>),
    AddSegment { track_id: Uuid, segment: Segment },
    UpdateSegment { marker_id: Uuid, observation: TimeObservation },
    DeleteSegment(Uuid),
    SetFrameRate(f64),
}

impl SessionState {
    pub fn find_annotation(&self, id: Uuid) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn find_track(&self, id: Uuid) -> Option<&SegmentationTrack> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// The track owning a segmentation marker
    pub fn track_of_segment(&self, marker_id: Uuid) -> Option<&SegmentationTrack> {
        self.tracks
            .iter()
            .find(|t| t.find_segment(marker_id).is_some())
    }

    pub fn active_track(&self) -> Option<&SegmentationTrack> {
        self.active_track.and_then(|id| self.find_track(id))
    }

    /// Apply a command; returns whether the state changed.
    pub fn apply(&mut self, command: StoreCommand) -> bool {
        match command {
            StoreCommand::AddAnnotation(annotation) => self.add_annotation(annotation),
            StoreCommand::UpdateAnnotationTime { id, observation } => {
                let fps = self.frame_rate;
                match self.annotations.iter_mut().find(|a| a.id == id) {
                    Some(annotation) => {
                        annotation.set_observation(&observation, fps);
                        true
                    }
                    None => false,
                }
            }
            StoreCommand::UpdateAnnotationBody { id, body } => {
                match self.annotations.iter_mut().find(|a| a.id == id) {
                    Some(annotation) => {
                        annotation.body = body;
                        true
                    }
                    None => false,
                }
            }
            StoreCommand::DeleteAnnotation(id) => self.remove_annotation(id) > 0,
            StoreCommand::SelectAnnotation(Some(id)) => {
                if self.find_annotation(id).is_none() {
                    return false;
                }
                self.selection.select_annotation(id);
                true
            }
            StoreCommand::SelectAnnotation(None) => {
                let changed = !self.selection.annotation_ids.is_empty();
                self.selection.annotation_ids.clear();
                changed
            }
            StoreCommand::ToggleMarkerRow(id) => {
                self.selection.toggle_marker_row(id);
                true
            }
            StoreCommand::BeginReplyEdit(id) => {
                match self.find_annotation(id) {
                    Some(annotation) if annotation.is_reply() => {
                        self.selection.begin_reply_edit(id);
                        true
                    }
                    _ => false,
                }
            }
            StoreCommand::AddTrack(track) => {
                if self.find_track(track.id).is_some() {
                    return false;
                }
                self.tracks.push(track);
                true
            }
            StoreCommand::RenameTrack { id, name } => {
                match self.tracks.iter_mut().find(|t| t.id == id) {
                    Some(track) => {
                        track.name = name;
                        true
                    }
                    None => false,
                }
            }
            StoreCommand::SetTrackVisibility { id, visible } => {
                match self.tracks.iter_mut().find(|t| t.id == id) {
                    Some(track) if track.visible != visible => {
                        track.visible = visible;
                        true
                    }
                    _ => false,
                }
            }
            StoreCommand::DeleteTrack(id) => self.remove_track(id),
            StoreCommand::SetTracks(tracks) => {
                if let Some(active) = self.active_track {
                    if !tracks.iter().any(|t| t.id == active) {
                        self.active_track = None;
                    }
                }
                self.tracks = tracks;
                true
            }
            StoreCommand::SetActiveTrack(id) => {
                if let Some(id) = id {
                    if self.find_track(id).is_none() {
                        return false;
                    }
                }
                let changed = self.active_track != id;
                self.active_track = id;
                changed
            }
            StoreCommand::AddSegment { track_id, segment } => {
                match self.tracks.iter_mut().find(|t| t.id == track_id) {
                    Some(track) => {
                        track.segments.push(segment);
                        true
                    }
                    None => false,
                }
            }
            StoreCommand::UpdateSegment {
                marker_id,
                observation,
            } => {
                for track in self.tracks.iter_mut() {
                    if let Some(segment) =
                        track.segments.iter_mut().find(|s| s.marker_id == marker_id)
                    {
                        segment.observation = observation;
                        return true;
                    }
                }
                false
            }
            StoreCommand::DeleteSegment(marker_id) => {
                let mut removed = false;
                for track in self.tracks.iter_mut() {
                    let len = track.segments.len();
                    track.segments.retain(|s| s.marker_id != marker_id);
                    removed |= track.segments.len() < len;
                }
                if removed {
                    self.selection.remove(marker_id);
                }
                removed
            }
            StoreCommand::SetFrameRate(fps) => {
                if !(fps.is_finite() && fps > 0.0) || fps == self.frame_rate {
                    return false;
                }
                let previous = self.frame_rate;
                for annotation in self.annotations.iter_mut() {
                    annotation.rebase(previous, fps);
                }
                self.frame_rate = fps;
                true
            }
        }
    }

    /// Add an annotation, keeping threads one level deep
    fn add_annotation(&mut self, annotation: Annotation) -> bool {
        if self.find_annotation(annotation.id).is_some() {
            return false;
        }
        if let Some(root_id) = annotation.thread {
            match self.find_annotation(root_id) {
                Some(root) if !root.is_reply() => {}
                _ => {
                    tracing::debug!(root = %root_id, "Rejecting reply to a missing root or a reply");
                    return false;
                }
            }
        }
        self.annotations.push(annotation);
        true
    }

    /// Remove an annotation and, for a root, all of its replies.
    /// Returns the number of removed records.
    fn remove_annotation(&mut self, id: Uuid) -> usize {
        let doomed: Vec<Uuid> = self
            .annotations
            .iter()
            .filter(|a| a.id == id || a.thread == Some(id))
            .map(|a| a.id)
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        self.annotations.retain(|a| !doomed.contains(&a.id));
        for removed in doomed.iter() {
            self.selection.remove(*removed);
        }
        doomed.len()
    }

    fn remove_track(&mut self, id: Uuid) -> bool {
        let len = self.tracks.len();
        self.tracks.retain(|t| t.id != id);
        if self.tracks.len() == len {
            return false;
        }
        if self.active_track == Some(id) {
            self.active_track = None;
        }
        true
    }
}

/// Contract of the application-level store
pub trait DurableStore: Send + Sync {
    /// Apply a command; returns whether the state changed
    fn dispatch(&self, command: StoreCommand) -> bool;
    /// Synchronous read of the current state
    fn snapshot(&self) -> Arc<SessionState>;
    /// Reactive view of the state
    fn subscribe(&self) -> watch::Receiver<Arc<SessionState>>;
}

/// In-process store publishing each change on a watch channel
#[derive(Clone)]
pub struct InMemoryStore {
    tx: Arc<watch::Sender<Arc<SessionState>>>,
}

impl InMemoryStore {
    pub fn new(state: SessionState) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(state));
        Self { tx: Arc::new(tx) }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}

impl DurableStore for InMemoryStore {
    fn dispatch(&self, command: StoreCommand) -> bool {
        tracing::trace!(?command, "Dispatching store command");
        self.tx
            .send_if_modified(|state| Arc::make_mut(state).apply(command))
    }

    fn snapshot(&self) -> Arc<SessionState> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<SessionState>> {
        self.tx.subscribe()
    }
}
