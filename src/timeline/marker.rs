use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::timeline_snap::snap_time_to_frame;

/// Marker shape discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// Interval with a start and (once complete) an end
    Period,
    /// Single point in time
    Moment,
}

/// Time geometry of a marker, in media seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeObservation {
    Period { start: f64, end: Option<f64> },
    Moment { time: f64 },
}

impl TimeObservation {
    pub fn period(start: f64, end: f64) -> Self {
        TimeObservation::Period {
            start,
            end: Some(end),
        }
    }

    pub fn open_period(start: f64) -> Self {
        TimeObservation::Period { start, end: None }
    }

    pub fn moment(time: f64) -> Self {
        TimeObservation::Moment { time }
    }

    pub fn kind(&self) -> MarkerKind {
        match self {
            TimeObservation::Period { .. } => MarkerKind::Period,
            TimeObservation::Moment { .. } => MarkerKind::Moment,
        }
    }

    /// Start of a period, or the time of a moment.
    pub fn start(&self) -> f64 {
        match self {
            TimeObservation::Period { start, .. } => *start,
            TimeObservation::Moment { time } => *time,
        }
    }

    /// End of a period, the time of a moment, `None` for an open period.
    pub fn end(&self) -> Option<f64> {
        match self {
            TimeObservation::Period { end, .. } => *end,
            TimeObservation::Moment { time } => Some(*time),
        }
    }

    /// A moment is always complete; a period once it has an end.
    pub fn is_complete(&self) -> bool {
        match self {
            TimeObservation::Period { end, .. } => end.is_some(),
            TimeObservation::Moment { .. } => true,
        }
    }

    /// Round every boundary to a frame.
    pub fn quantized(&self, fps: f64) -> Self {
        match *self {
            TimeObservation::Period { start, end } => TimeObservation::Period {
                start: snap_time_to_frame(start, fps),
                end: end.map(|end| snap_time_to_frame(end, fps)),
            },
            TimeObservation::Moment { time } => TimeObservation::Moment {
                time: snap_time_to_frame(time, fps),
            },
        }
    }
}

/// Visual style of a marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerStyle {
    /// Hex color, e.g. "#f97316"
    pub color: String,
}

/// A time-anchored marker rendered on a lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Unique identifier, never reused
    pub id: Uuid,
    /// Time geometry
    pub observation: TimeObservation,
    pub style: MarkerStyle,
    /// User-created markers are always editable
    pub editable: bool,
    /// Set while a deferred removal plays its exit animation
    #[serde(default)]
    pub removing: bool,
}

impl Marker {
    /// Create a new editable marker
    pub fn new(observation: TimeObservation, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            observation,
            style: MarkerStyle {
                color: color.into(),
            },
            editable: true,
            removing: false,
        }
    }

    pub fn kind(&self) -> MarkerKind {
        self.observation.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_period_is_incomplete() {
        let open = TimeObservation::open_period(3.0);
        assert_eq!(open.kind(), MarkerKind::Period);
        assert!(!open.is_complete());
        assert_eq!(open.end(), None);
        assert!(TimeObservation::moment(3.0).is_complete());
    }

    #[test]
    fn test_quantized_snaps_both_edges() {
        let obs = TimeObservation::period(1.013, 2.03).quantized(25.0);
        assert_eq!(obs.start(), 1.0);
        assert!((obs.end().unwrap() - 2.04).abs() < 1e-9);
    }

    #[test]
    fn test_observation_serialization_is_tagged() {
        let json = serde_json::to_string(&TimeObservation::moment(2.0)).unwrap();
        assert_eq!(json, r#"{"kind":"moment","time":2.0}"#);
    }
}
