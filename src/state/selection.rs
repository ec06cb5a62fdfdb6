//! Selection state shared across the annotation and segmentation views.

use uuid::Uuid;

/// Tracks the current selection across lists and lanes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    /// Selected annotation IDs.
    pub annotation_ids: Vec<Uuid>,
    /// Highlighted rows in a marker list.
    pub marker_ids: Vec<Uuid>,
    /// Reply currently being edited; exclusive with any selection.
    pub editing_reply: Option<Uuid>,
}

impl SelectionState {
    /// Clear all selections.
    pub fn clear(&mut self) {
        self.annotation_ids.clear();
        self.marker_ids.clear();
        self.editing_reply = None;
    }

    /// Replace the selection with a single annotation.
    pub fn select_annotation(&mut self, annotation_id: Uuid) {
        self.clear();
        self.annotation_ids.push(annotation_id);
    }

    /// Return the primary selected annotation, if any.
    pub fn primary_annotation(&self) -> Option<Uuid> {
        self.annotation_ids.first().copied()
    }

    /// Highlight a marker-list row, or un-highlight it if it already is.
    pub fn toggle_marker_row(&mut self, marker_id: Uuid) {
        let already = self.marker_ids.contains(&marker_id);
        self.clear();
        if !already {
            self.marker_ids.push(marker_id);
        }
    }

    /// Return the highlighted marker row, if any.
    pub fn primary_marker(&self) -> Option<Uuid> {
        self.marker_ids.first().copied()
    }

    /// Start editing a reply, dropping any selection.
    pub fn begin_reply_edit(&mut self, reply_id: Uuid) {
        self.clear();
        self.editing_reply = Some(reply_id);
    }

    /// Forget an id that no longer exists.
    pub fn remove(&mut self, id: Uuid) {
        self.annotation_ids.retain(|existing| *existing != id);
        self.marker_ids.retain(|existing| *existing != id);
        if self.editing_reply == Some(id) {
            self.editing_reply = None;
        }
    }
}
