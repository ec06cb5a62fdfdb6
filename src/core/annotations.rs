//! Annotation threads on top of the marker state machine.
//!
//! Roots may carry a marker on the annotation lane; replies never do and are
//! only one level deep. The threaded and flattened lists are always derived
//! from the store snapshot.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::markers::{
    AnnotationDraft, FeatureKind, MarkerFeature, PeriodBounds, SelectionContext,
};
use crate::error::{Result, SessionError};
use crate::state::{Annotation, DurableStore, SessionSettings, StoreCommand};
use crate::timeline::{TimeObservation, TimelineEngine};

/// Ordering of root annotations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnnotationSort {
    /// Unanchored first, then by start timecode
    #[default]
    Timecode,
    /// Oldest first
    Creation,
}

impl AnnotationSort {
    /// Total order; ties fall through to `created_at` and then the id.
    pub fn compare(&self, a: &Annotation, b: &Annotation) -> Ordering {
        let primary = match self {
            AnnotationSort::Timecode => a.start.cmp(&b.start),
            AnnotationSort::Creation => Ordering::Equal,
        };
        primary
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// A root annotation with its replies in creation order
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationThread {
    pub root: Annotation,
    pub replies: Vec<Annotation>,
}

pub struct Annotations {
    feature: Arc<MarkerFeature>,
}

impl Annotations {
    pub fn new(
        engine: Arc<dyn TimelineEngine>,
        store: Arc<dyn DurableStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            feature: Arc::new(MarkerFeature::new(
                FeatureKind::Annotation,
                engine,
                store,
                settings,
            )),
        }
    }

    /// Marker operations on the annotation lane
    pub fn markers(&self) -> &Arc<MarkerFeature> {
        &self.feature
    }

    /// Add a root annotation. With an observation it gets a marker; an open
    /// period becomes the feature's incomplete marker.
    pub fn add_annotation(
        &self,
        draft: AnnotationDraft,
        observation: Option<TimeObservation>,
    ) -> Result<Annotation> {
        let id = match observation {
            Some(TimeObservation::Period { start, end }) => {
                self.feature
                    .add_period_marker_with(Some(PeriodBounds { start: Some(start), end }), Some(draft))?
                    .id
            }
            Some(TimeObservation::Moment { time }) => {
                self.feature.add_moment_marker_with(Some(time), Some(draft))?.id
            }
            None => {
                let mut annotation = Annotation::new(draft.body, self.feature.settings().user.clone());
                annotation.is_private = draft.is_private;
                let id = annotation.id;
                self.feature.store().dispatch(StoreCommand::AddAnnotation(annotation));
                id
            }
        };
        self.find(id).ok_or(SessionError::MarkerNotFound(id))
    }

    /// Reply to a root annotation
    pub fn add_reply(&self, root_id: Uuid, body: impl Into<String>) -> Result<Annotation> {
        let reply = Annotation::reply_to(root_id, body, self.feature.settings().user.clone());
        if !self
            .feature
            .store()
            .dispatch(StoreCommand::AddAnnotation(reply.clone()))
        {
            return Err(SessionError::InvalidMarker(format!(
                "{} is not a root annotation",
                root_id
            )));
        }
        Ok(reply)
    }

    pub fn edit_body(&self, id: Uuid, body: impl Into<String>) -> bool {
        self.feature.store().dispatch(StoreCommand::UpdateAnnotationBody {
            id,
            body: body.into(),
        })
    }

    /// Delete an annotation. A root takes its marker and all replies with it.
    pub fn delete_annotation(&self, id: Uuid, skip_animation: bool) -> Result<bool> {
        let anchored = self
            .find(id)
            .map(|a| !a.is_reply() && a.start.is_some())
            .ok_or(SessionError::MarkerNotFound(id))?;
        if anchored {
            self.feature.delete_marker(id, skip_animation)
        } else {
            Ok(self
                .feature
                .store()
                .dispatch(StoreCommand::DeleteAnnotation(id)))
        }
    }

    /// Select an annotation, moving the playhead to its marker if it has one
    pub fn select_annotation(&self, id: Uuid) -> bool {
        let store = self.feature.store();
        if !store.dispatch(StoreCommand::SelectAnnotation(Some(id))) {
            return false;
        }
        if self.find(id).is_some_and(|a| a.start.is_some()) {
            if let Err(err) = self.feature.select_marker(id, SelectionContext::Player) {
                tracing::debug!(annotation = %id, error = %err, "Annotation marker not selectable");
            }
        }
        true
    }

    /// Start editing a reply; clears every other selection
    pub fn begin_reply_edit(&self, reply_id: Uuid) -> bool {
        self.feature
            .store()
            .dispatch(StoreCommand::BeginReplyEdit(reply_id))
    }

    pub fn find(&self, id: Uuid) -> Option<Annotation> {
        self.feature.store().snapshot().find_annotation(id).cloned()
    }

    /// Roots sorted by `sort`, each with its replies oldest first
    pub fn threaded(&self, sort: AnnotationSort) -> Vec<AnnotationThread> {
        let snapshot = self.feature.store().snapshot();
        let mut roots: Vec<&Annotation> = snapshot.annotations.iter().filter(|a| !a.is_reply()).collect();
        roots.sort_by(|a, b| sort.compare(a, b));
        roots
            .into_iter()
            .map(|root| {
                let mut replies: Vec<Annotation> = snapshot
                    .annotations
                    .iter()
                    .filter(|a| a.thread == Some(root.id))
                    .cloned()
                    .collect();
                replies.sort_by(|a, b| AnnotationSort::Creation.compare(a, b));
                AnnotationThread {
                    root: root.clone(),
                    replies,
                }
            })
            .collect()
    }

    /// Roots and replies as siblings, in creation order
    pub fn flattened(&self) -> Vec<Annotation> {
        let mut all = self.feature.store().snapshot().annotations.clone();
        all.sort_by(|a, b| AnnotationSort::Creation.compare(a, b));
        all
    }

    /// Flattened annotations whose body contains `term` (case-insensitive) or
    /// that were created after `since`
    pub fn filtered(&self, term: &str, since: Option<DateTime<Utc>>) -> Vec<Annotation> {
        let needle = term.to_lowercase();
        self.flattened()
            .into_iter()
            .filter(|a| {
                a.body.to_lowercase().contains(&needle)
                    || since.map(|since| a.created_at > since).unwrap_or(false)
            })
            .collect()
    }
}
