use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timeline::TimeObservation;
use crate::utils::Timecode;

/// A comment on the media, optionally anchored to a time range.
///
/// Roots with a time range share their id with the marker drawn for them on
/// the annotation lane. Replies are never anchored and never have replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Unique identifier
    pub id: Uuid,
    /// Comment text
    pub body: String,
    #[serde(default)]
    pub start: Option<Timecode>,
    #[serde(default)]
    pub end: Option<Timecode>,
    #[serde(default)]
    pub is_private: bool,
    /// Root annotation id for replies
    #[serde(default)]
    pub thread: Option<Uuid>,
    pub user: String,
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    /// Create an unanchored root annotation
    pub fn new(body: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            body: body.into(),
            start: None,
            end: None,
            is_private: false,
            thread: None,
            user: user.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a reply in the thread of `root`
    pub fn reply_to(root: Uuid, body: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            thread: Some(root),
            ..Self::new(body, user)
        }
    }

    pub fn is_reply(&self) -> bool {
        self.thread.is_some()
    }

    /// Copy a marker's geometry onto the annotation as timecodes
    /// Re-encode the timecodes written at `from` fps into `to` fps
    pub fn rebase(&mut self, from: f64, to: f64) {
        let convert = |tc: Timecode| Timecode::from_seconds(tc.to_seconds(from), to);
        self.start = self.start.map(convert);
        self.end = self.end.map(convert);
    }

    pub fn set_observation(&mut self, observation: &TimeObservation, fps: f64) {
        match observation {
            TimeObservation::Period { start, end } => {
                self.start = Some(Timecode::from_seconds(*start, fps));
                self.end = end.map(|end| Timecode::from_seconds(end, fps));
            }
            TimeObservation::Moment { time } => {
                self.start = Some(Timecode::from_seconds(*time, fps));
                self.end = None;
            }
        }
    }
}
