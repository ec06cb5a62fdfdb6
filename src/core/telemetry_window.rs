//! Sliding display window over time-coded telemetry cues.
//!
//! At most `max_cues` cues are shown at once. Cues that playback has left
//! behind fade out after a grace period and are dropped once their fade
//! finishes; fading is wall-clock driven while the window itself follows
//! media time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::state::CueWindowSettings;
use crate::timeline::{LaneId, TimelineEngine, TimelineEvent};

/// One telemetry data point as stored in a telemetry file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryCue {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: Option<f64>,
}

impl TelemetryCue {
    fn covers(&self, time: f64) -> bool {
        self.start <= time && time <= self.end
    }

    fn overlaps(&self, from: f64, to: f64) -> bool {
        self.start <= to && self.end >= from
    }

    /// Zero inside the cue, otherwise the gap to its nearest edge
    fn distance(&self, time: f64) -> f64 {
        if self.covers(time) {
            0.0
        } else {
            (self.start - time).abs().min((self.end - time).abs())
        }
    }
}

/// Identity of a cue inside the window
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CueKey {
    pub lane: LaneId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCue {
    pub key: CueKey,
    pub cue: TelemetryCue,
    /// Set once the cue starts fading; it leaves the window at this instant
    pub fade_until: Option<Instant>,
}

impl ActiveCue {
    pub fn is_fading(&self) -> bool {
        self.fade_until.is_some()
    }
}

#[derive(Debug)]
pub struct CueWindow {
    settings: CueWindowSettings,
    tracks: BTreeMap<LaneId, Vec<TelemetryCue>>,
    /// Oldest first; after a seek, nearest last
    active: Vec<ActiveCue>,
    ended: bool,
}

impl CueWindow {
    pub fn new(settings: CueWindowSettings) -> Self {
        Self {
            settings,
            tracks: BTreeMap::new(),
            active: Vec::new(),
            ended: false,
        }
    }

    pub fn set_track(&mut self, lane: LaneId, cues: Vec<TelemetryCue>) {
        tracing::debug!(lane = %lane, cues = cues.len(), "Telemetry cues loaded");
        self.active.retain(|a| a.key.lane != lane);
        self.tracks.insert(lane, cues);
    }

    pub fn remove_track(&mut self, lane: &LaneId) -> bool {
        self.active.retain(|a| &a.key.lane != lane);
        self.tracks.remove(lane).is_some()
    }

    /// Drop tracks whose lane is gone
    pub fn retain_lanes(&mut self, mut keep: impl FnMut(&LaneId) -> bool) {
        let gone: Vec<LaneId> = self.tracks.keys().filter(|l| !keep(l)).cloned().collect();
        for lane in gone.iter() {
            tracing::trace!(lane = %lane, "Skipping telemetry for removed lane");
            self.remove_track(lane);
        }
    }

    pub fn track_lanes(&self) -> Vec<LaneId> {
        self.tracks.keys().cloned().collect()
    }

    pub fn active(&self) -> &[ActiveCue] {
        &self.active
    }

    /// Cues currently shown and not fading
    pub fn visible(&self) -> Vec<&ActiveCue> {
        self.active.iter().filter(|a| !a.is_fading()).collect()
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Earliest pending fade completion
    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.iter().filter_map(|a| a.fade_until).min()
    }

    /// Drop cues whose fade has finished
    pub fn sweep(&mut self, now: Instant) {
        self.active
            .retain(|a| a.fade_until.map(|until| until > now).unwrap_or(true));
    }

    fn contains(&self, key: &CueKey) -> bool {
        self.active.iter().any(|a| &a.key == key)
    }

    /// Playback moved forward to `time`
    pub fn on_time_update(&mut self, time: f64, now: Instant) {
        let grace = self.settings.grace_secs;
        let fade_until = now + self.settings.fade_out();
        for active in self.active.iter_mut() {
            if !active.is_fading() && time > active.cue.end + grace {
                active.fade_until = Some(fade_until);
            }
        }

        let entering: Vec<(CueKey, TelemetryCue)> = self
            .tracks
            .iter()
            .flat_map(|(lane, cues)| {
                cues.iter().enumerate().filter(|(_, c)| c.covers(time)).map(|(index, cue)| {
                    (
                        CueKey {
                            lane: lane.clone(),
                            index,
                        },
                        cue.clone(),
                    )
                })
            })
            .collect();
        for (key, cue) in entering {
            if !self.contains(&key) {
                self.insert(key, cue, fade_until);
            }
        }
        self.sweep(now);
    }

    /// Add a cue, fading the oldest visible ones beyond `max_cues`
    fn insert(&mut self, key: CueKey, cue: TelemetryCue, fade_until: Instant) {
        self.active.push(ActiveCue {
            key,
            cue,
            fade_until: None,
        });
        let mut surplus = self.visible().len().saturating_sub(self.settings.max_cues);
        for active in self.active.iter_mut() {
            if surplus == 0 {
                break;
            }
            if !active.is_fading() {
                active.fade_until = Some(fade_until);
                surplus -= 1;
            }
        }
    }

    /// Rebuild the window around a seek target
    pub fn on_seek(&mut self, time: f64) {
        self.ended = false;
        let grace = self.settings.grace_secs;
        let mut candidates: Vec<(f64, CueKey, TelemetryCue)> = self
            .tracks
            .iter()
            .flat_map(|(lane, cues)| {
                cues.iter()
                    .enumerate()
                    .filter(|(_, c)| c.overlaps(time - grace, time + grace))
                    .map(|(index, cue)| {
                        (
                            cue.distance(time),
                            CueKey {
                                lane: lane.clone(),
                                index,
                            },
                            cue.clone(),
                        )
                    })
            })
            .collect();

        let nearest = candidates
            .iter()
            .map(|(distance, _, _)| *distance)
            .fold(f64::INFINITY, f64::min);
        candidates.retain(|(distance, _, _)| *distance == nearest);
        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.2.start.total_cmp(&b.2.start))
                .then_with(|| a.1.cmp(&b.1))
        });
        let skip = candidates.len().saturating_sub(self.settings.max_cues);

        self.active = candidates
            .into_iter()
            .skip(skip)
            .map(|(_, key, cue)| ActiveCue {
                key,
                cue,
                fade_until: None,
            })
            .collect();
    }

    pub fn on_ended(&mut self) {
        self.ended = true;
    }

    /// Replaying after the end starts from an empty window
    pub fn on_play(&mut self) {
        if self.ended {
            tracing::debug!("Replay after end, clearing cue window");
            self.active.clear();
        }
        self.ended = false;
    }
}

/// Shared handle to a cue window
pub type SharedCueWindow = Arc<Mutex<CueWindow>>;

fn lock(window: &SharedCueWindow) -> MutexGuard<'_, CueWindow> {
    window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drive a cue window from engine playback events until `token` fires
pub async fn run_cue_window(
    window: SharedCueWindow,
    engine: Arc<dyn TimelineEngine>,
    mut events: broadcast::Receiver<TimelineEvent>,
    token: CancellationToken,
) {
    loop {
        let deadline = lock(&window).next_deadline();
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                lock(&window).sweep(Instant::now());
            }
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Cue window lagged behind playback events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let mut window = lock(&window);
                window.retain_lanes(|lane| engine.has_lane(lane));
                match event {
                    TimelineEvent::TimeUpdate(time) => window.on_time_update(time, Instant::now()),
                    TimelineEvent::Seeked(time) => window.on_seek(time),
                    TimelineEvent::Ended => window.on_ended(),
                    TimelineEvent::Play => window.on_play(),
                    _ => {}
                }
            }
        }
    }
    tracing::debug!("Cue window driver stopped");
}
