use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// An `HH:MM:SS:FF` timecode as stored on annotations.
///
/// Ordering is numeric over the components, so it does not depend on the
/// frame rate the timecode was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl Timecode {
    /// Build a timecode from media seconds at the given frame rate.
    pub fn from_seconds(time_seconds: f64, fps: f64) -> Self {
        let nominal = nominal_fps(fps);
        let total_frames = (time_seconds.max(0.0) * fps.max(1.0)).round() as u64;
        let frames = (total_frames % nominal) as u32;
        let total_seconds = total_frames / nominal;
        let seconds = (total_seconds % 60) as u32;
        let total_minutes = total_seconds / 60;
        let minutes = (total_minutes % 60) as u32;
        let hours = (total_minutes / 60) as u32;
        Self {
            hours,
            minutes,
            seconds,
            frames,
        }
    }

    /// Total frame count at the given frame rate.
    pub fn total_frames(&self, fps: f64) -> u64 {
        let nominal = nominal_fps(fps);
        let whole_seconds =
            (self.hours as u64 * 60 + self.minutes as u64) * 60 + self.seconds as u64;
        whole_seconds * nominal + self.frames as u64
    }

    /// Convert back to media seconds at the given frame rate.
    pub fn to_seconds(&self, fps: f64) -> f64 {
        self.total_frames(fps) as f64 / fps.max(1.0)
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

impl FromStr for Timecode {
    type Err = SessionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        // Drop-frame timecodes use ';' before the frame field.
        let parts: Vec<&str> = trimmed.split([':', ';']).collect();
        if parts.len() != 4 {
            return Err(SessionError::InvalidSession(format!(
                "malformed timecode: {}",
                value
            )));
        }
        let mut fields = [0u32; 4];
        for (slot, part) in fields.iter_mut().zip(parts.iter()) {
            *slot = part.parse::<u32>().map_err(|_| {
                SessionError::InvalidSession(format!("malformed timecode: {}", value))
            })?;
        }
        if fields[1] >= 60 || fields[2] >= 60 {
            return Err(SessionError::InvalidSession(format!(
                "timecode out of range: {}",
                value
            )));
        }
        Ok(Self {
            hours: fields[0],
            minutes: fields[1],
            seconds: fields[2],
            frames: fields[3],
        })
    }
}

impl TryFrom<String> for Timecode {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timecode> for String {
    fn from(value: Timecode) -> Self {
        value.to_string()
    }
}

fn nominal_fps(fps: f64) -> u64 {
    (fps.max(1.0).round() as u64).max(1)
}
