//! Manifest orchestration.
//!
//! `ManifestOrchestrator::load_manifest` rebuilds the whole timeline for a
//! manifest. Each load owns a fresh cancellation token (the breaker); starting
//! a new load cancels the previous one, so every pending step of the stale
//! load resolves to nothing and none of its commits reach the engine.
//!
//! Step order within one load:
//! fetch → select manifest → load video → help menu → build lanes →
//! attach → reconcile audio/subtitles → lanes added → telemetry → reloaded.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{join, join_all};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::events::{LoadPhase, Notification, SessionEvent};
use crate::core::lane_builder::{LaneBuilder, TimelineLayout};
use crate::core::media::{MediaEngine, PlayerTrack, SessionSource};
use crate::core::telemetry_window::{run_cue_window, CueWindow, SharedCueWindow};
use crate::error::{Result, SessionError};
use crate::hotkeys::help_menu;
use crate::state::{DurableStore, Manifest, SessionDocument, SessionSettings, StoreCommand};
use crate::timeline::{
    EaseHandle, LaneId, LaneSpec, LaneVisibility, TimelineEngine, TimelineEvent,
};

/// How a load ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Reloaded { manifest_id: String },
    /// A newer load cancelled this one
    Superseded,
}

/// Playback state carried across a manifest switch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestorePoint {
    pub time: f64,
    pub audio_label: Option<String>,
    pub subtitle_label: Option<String>,
    /// Keys of the collapsed grouping lanes
    pub collapsed_groups: HashSet<String>,
}

struct Loaded {
    manifest: Manifest,
    layout: TimelineLayout,
}

struct LoadState {
    breaker: CancellationToken,
    current: Option<Loaded>,
    /// Captured from the last attached timeline; consumed by the load that
    /// reaches "reloaded"
    pending_restore: Option<RestorePoint>,
}

pub struct ManifestOrchestrator {
    engine: Arc<dyn TimelineEngine>,
    media: Arc<dyn MediaEngine>,
    source: Arc<dyn SessionSource>,
    store: Arc<dyn DurableStore>,
    settings: SessionSettings,
    state: Mutex<LoadState>,
    cues: SharedCueWindow,
    events: broadcast::Sender<SessionEvent>,
    phase: watch::Sender<LoadPhase>,
}

/// Await `fut` unless the breaker fires first
async fn step<T>(token: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

impl ManifestOrchestrator {
    pub fn new(
        engine: Arc<dyn TimelineEngine>,
        media: Arc<dyn MediaEngine>,
        source: Arc<dyn SessionSource>,
        store: Arc<dyn DurableStore>,
        settings: SessionSettings,
    ) -> Self {
        let (events, _rx) = broadcast::channel(64);
        let (phase, _rx) = watch::channel(LoadPhase::Idle);
        let cues = Arc::new(Mutex::new(CueWindow::new(settings.cue_window.clone())));
        Self {
            engine,
            media,
            source,
            store,
            settings,
            state: Mutex::new(LoadState {
                breaker: CancellationToken::new(),
                current: None,
                pending_restore: None,
            }),
            cues,
            events,
            phase,
        }
    }

    fn state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notify(&self, notification: Notification) {
        self.emit(SessionEvent::Notification(notification));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> watch::Receiver<LoadPhase> {
        self.phase.subscribe()
    }

    pub fn cue_window(&self) -> SharedCueWindow {
        Arc::clone(&self.cues)
    }

    /// Id of the manifest whose lanes are attached
    pub fn current_manifest(&self) -> Option<String> {
        self.state().current.as_ref().map(|l| l.manifest.id.clone())
    }

    /// Lane ids owned by the current load, top to bottom
    pub fn lane_ids(&self) -> Vec<LaneId> {
        self.state()
            .current
            .as_ref()
            .map(|l| l.layout.lane_ids())
            .unwrap_or_default()
    }

    /// Resolve once the current load finishes. Returns the manifest id, or
    /// `None` when it failed.
    pub async fn wait_reloaded(&self) -> Option<String> {
        let mut rx = self.phase.subscribe();
        let phase = rx.wait_for(|phase| phase.is_settled()).await.ok()?;
        match &*phase {
            LoadPhase::Reloaded { manifest_id } => Some(manifest_id.clone()),
            _ => None,
        }
    }

    /// Run `commit` against the load state unless `token` was cancelled.
    /// The check and the mutation happen under the same lock a newer load
    /// takes to fire the breaker.
    fn commit<R>(&self, token: &CancellationToken, commit: impl FnOnce(&mut LoadState) -> R) -> Option<R> {
        let mut state = self.state();
        if token.is_cancelled() {
            return None;
        }
        Some(commit(&mut state))
    }

    /// Fire the previous breaker, capture what a switch restores and tear the
    /// previous timeline down. A restore point captured by a load that never
    /// finished is kept for this one.
    fn begin_load(&self) -> CancellationToken {
        let mut state = self.state();
        state.breaker.cancel();
        state.breaker = CancellationToken::new();
        self.phase.send_replace(LoadPhase::Pending);
        if let Some(previous) = state.current.take() {
            state.pending_restore = Some(self.capture(&previous));
            self.teardown(previous);
        }
        state.breaker.clone()
    }

    fn capture(&self, loaded: &Loaded) -> RestorePoint {
        RestorePoint {
            time: self.engine.current_time(),
            audio_label: self.media.active_audio_track().map(|t| t.label),
            subtitle_label: self.media.active_subtitle_track().map(|t| t.label),
            collapsed_groups: loaded
                .layout
                .groups
                .iter()
                .filter(|g| g.visibility() == LaneVisibility::Minimized)
                .map(|g| g.key().to_string())
                .collect(),
        }
    }

    /// Remove the lanes a load attached; feature lanes stay
    fn teardown(&self, previous: Loaded) {
        for lane in previous.layout.lane_ids().iter().rev() {
            self.engine.remove_lane(lane);
        }
        let mut cues = self.cues.lock().unwrap_or_else(|p| p.into_inner());
        for telemetry in previous.layout.telemetry.iter() {
            cues.remove_track(&telemetry.lane);
        }
        cues.clear();
        tracing::debug!(manifest = %previous.manifest.id, "Previous timeline torn down");
    }

    /// Load a manifest, replacing any timeline built before. Without an id
    /// the first manifest in a supported format is chosen.
    pub async fn load_manifest(&self, manifest_id: Option<&str>) -> Result<LoadOutcome> {
        let token = self.begin_load();
        match self.run_load(manifest_id, &token).await {
            Ok(Some(manifest_id)) => Ok(LoadOutcome::Reloaded { manifest_id }),
            Ok(None) => {
                tracing::debug!("Manifest load superseded");
                Ok(LoadOutcome::Superseded)
            }
            Err(err) => {
                let failed = self.commit(&token, |state| {
                    if let Some(partial) = state.current.take() {
                        self.teardown(partial);
                    }
                });
                if failed.is_none() {
                    return Ok(LoadOutcome::Superseded);
                }
                tracing::error!(error = %err, "Manifest load failed");
                self.notify(Notification::from(&err));
                self.emit(SessionEvent::LoadFailed {
                    message: err.to_string(),
                });
                self.phase.send_replace(LoadPhase::Failed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// `Ok(None)` means the breaker fired
    async fn run_load(
        &self,
        manifest_id: Option<&str>,
        token: &CancellationToken,
    ) -> Result<Option<String>> {
        let Some(document) = step(token, self.source.fetch_session()).await else {
            return Ok(None);
        };
        let document = document?;
        document.validate()?;
        let manifest = self.select_manifest(&document, manifest_id)?.clone();

        let started = self.commit(token, |_| {
            tracing::info!(manifest = %manifest.id, format = ?manifest.format, "Loading manifest");
            self.phase.send_replace(LoadPhase::Loading {
                manifest_id: manifest.id.clone(),
            });
            self.emit(SessionEvent::LoadStarted {
                manifest_id: manifest.id.clone(),
            });
        });
        if started.is_none() {
            return Ok(None);
        }

        let Some(video) = step(token, self.media.load_video(&manifest)).await else {
            return Ok(None);
        };
        let video = video?;
        let loaded = self.commit(token, |_| {
            tracing::debug!(duration = video.duration, fps = video.frame_rate, "Video loaded");
            self.store.dispatch(StoreCommand::SetFrameRate(manifest.frame_rate));
            self.phase.send_replace(LoadPhase::VideoLoaded {
                manifest_id: manifest.id.clone(),
            });
            self.emit(SessionEvent::HelpMenuPopulated(help_menu()));
        });
        if loaded.is_none() {
            return Ok(None);
        }
        self.forward_media_errors(token.clone());

        let mut builder = LaneBuilder::new(&manifest, &document, self.settings.eased_children_limit);
        builder.build_media();
        let Some((audio, subtitles)) = step(
            token,
            join(self.media.audio_tracks(), self.media.subtitle_tracks()),
        )
        .await
        else {
            return Ok(None);
        };
        let audio = audio.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Audio track discovery failed");
            Vec::new()
        });
        let subtitles = subtitles.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Subtitle track discovery failed");
            Vec::new()
        });
        builder.build_text(&subtitles);
        builder.build_telemetry();
        let layout = builder.finish();

        let telemetry = layout.telemetry.clone();
        let attached = self.commit(token, |state| {
            self.attach(&document, &manifest, layout, &audio, &subtitles, state)
        });
        let Some(lanes) = attached else {
            return Ok(None);
        };
        self.emit(SessionEvent::LanesAdded { lanes });
        self.spawn_listeners(token.clone());

        let fetches = telemetry
            .iter()
            .map(|t| self.source.fetch_telemetry(&t.src));
        let Some(results) = step(token, join_all(fetches)).await else {
            return Ok(None);
        };
        let reloaded = self.commit(token, |_| {
            let mut cues = self.cues.lock().unwrap_or_else(|p| p.into_inner());
            for (telemetry, result) in telemetry.iter().zip(results) {
                match result {
                    Ok(track) => cues.set_track(telemetry.lane.clone(), track),
                    Err(err) => {
                        tracing::warn!(lane = %telemetry.lane, error = %err, "Telemetry unavailable");
                        self.notify(Notification::warning(format!(
                            "Telemetry {} unavailable: {}",
                            telemetry.src, err
                        )));
                    }
                }
            }
            drop(cues);
            tracing::info!(manifest = %manifest.id, "Manifest reloaded");
            self.phase.send_replace(LoadPhase::Reloaded {
                manifest_id: manifest.id.clone(),
            });
            self.emit(SessionEvent::Reloaded {
                manifest_id: manifest.id.clone(),
            });
        });
        if reloaded.is_none() {
            return Ok(None);
        }

        self.commit(token, |state| {
            if let Some(restore) = state.pending_restore.take() {
                self.restore(&restore, state);
            }
        });
        Ok(Some(manifest.id))
    }

    fn select_manifest<'d>(&self, document: &'d SessionDocument, manifest_id: Option<&str>) -> Result<&'d Manifest> {
        match manifest_id {
            Some(id) => document
                .find_manifest(id)
                .ok_or_else(|| SessionError::ManifestNotFound(id.to_string())),
            None => document
                .first_supported(&self.settings.supported_formats)
                .ok_or(SessionError::NoSupportedManifest),
        }
    }

    /// Attach every lane in one batch, order them, reconcile the player's
    /// tracks and record the load. Returns the attached lane ids.
    fn attach(
        &self,
        document: &SessionDocument,
        manifest: &Manifest,
        mut layout: TimelineLayout,
        audio: &[PlayerTrack],
        subtitles: &[PlayerTrack],
        state: &mut LoadState,
    ) -> Vec<LaneId> {
        self.engine.add_lanes(layout.lanes.clone());
        if let Some(order) = document.track_order.as_deref() {
            self.engine.reorder_lanes(&layout.ordered_lane_ids(order));
        }
        layout.reconcile_audio(manifest, audio);
        layout.reconcile_subtitles(manifest, subtitles);

        let lanes = layout.lane_ids();
        tracing::debug!(lanes = lanes.len(), manifest = %manifest.id, "Lanes added");
        self.phase.send_replace(LoadPhase::LanesAdded {
            manifest_id: manifest.id.clone(),
        });
        state.current = Some(Loaded {
            manifest: manifest.clone(),
            layout,
        });
        lanes
    }

    /// Best-effort restore after a switch; missing counterparts are skipped
    fn restore(&self, restore: &RestorePoint, state: &mut LoadState) {
        let Some(loaded) = state.current.as_mut() else {
            return;
        };
        self.engine.seek_to_time(restore.time);

        if let Some(label) = restore.audio_label.as_deref() {
            match loaded.layout.audio_bindings.values().find(|t| t.label == label) {
                Some(track) => {
                    self.media.set_active_audio_track(&track.id);
                }
                None => tracing::debug!(label, "Audio track not in new manifest"),
            }
        }
        if let Some(label) = restore.subtitle_label.as_deref() {
            match loaded.layout.subtitle_bindings.values().find(|t| t.label == label) {
                Some(track) => {
                    self.media.set_active_subtitle_track(Some(&track.id));
                }
                None => tracing::debug!(label, "Subtitle track not in new manifest"),
            }
        }
        for group in loaded.layout.groups.iter_mut() {
            if restore.collapsed_groups.contains(group.key()) {
                group.minimize(self.engine.as_ref());
            }
        }
    }

    /// Playback errors become warnings until the breaker fires
    fn forward_media_errors(&self, token: CancellationToken) {
        let mut errors = self.media.errors();
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    error = errors.recv() => match error {
                        Ok(message) => {
                            tracing::warn!(%message, "Media error");
                            let _ = events.send(SessionEvent::Notification(Notification::warning(message)));
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    /// Per-load engine listeners: marker selection forwarding and the cue
    /// window driver
    fn spawn_listeners(&self, token: CancellationToken) {
        let mut engine_events = self.engine.events();
        let events = self.events.clone();
        let forward_token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = forward_token.cancelled() => break,
                    event = engine_events.recv() => match event {
                        Ok(TimelineEvent::MarkerSelected { lane, marker_id }) => {
                            let _ = events.send(SessionEvent::MarkerSelected { lane, marker_id });
                        }
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        tokio::spawn(run_cue_window(
            Arc::clone(&self.cues),
            Arc::clone(&self.engine),
            self.engine.events(),
            token,
        ));
    }

    /// Look up a lane of the current load. A stale lane (e.g. after a
    /// manifest switch) closes the panel that depended on it.
    pub fn lane_or_close(&self, lane: &LaneId) -> Option<LaneSpec> {
        let found = self.state().current.as_ref().and_then(|loaded| {
            loaded
                .layout
                .lanes
                .iter()
                .find(|spec| &spec.id == lane)
                .cloned()
        });
        if found.is_none() {
            tracing::debug!(lane = %lane, "Stale lane, closing panel");
            self.emit(SessionEvent::PanelClosed { lane: lane.clone() });
        }
        found
    }

    fn with_layout<R>(&self, f: impl FnOnce(&mut TimelineLayout) -> R) -> Result<R> {
        let mut state = self.state();
        let loaded = state
            .current
            .as_mut()
            .ok_or_else(|| SessionError::LaneNotFound("no manifest loaded".to_string()))?;
        Ok(f(&mut loaded.layout))
    }

    pub fn minimize_group(&self, lane: &LaneId) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        self.with_layout(|layout| {
            let group = layout
                .groups
                .iter_mut()
                .find(|g| g.id() == lane)
                .ok_or_else(|| SessionError::LaneNotFound(lane.to_string()))?;
            group.minimize(engine.as_ref());
            Ok(())
        })?
    }

    pub fn maximize_group(&self, lane: &LaneId) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        self.with_layout(|layout| {
            let group = layout
                .groups
                .iter_mut()
                .find(|g| g.id() == lane)
                .ok_or_else(|| SessionError::LaneNotFound(lane.to_string()))?;
            group.maximize(engine.as_ref());
            Ok(())
        })?
    }

    /// Eased toggle of one group; a toggle already in flight is dropped
    pub fn toggle_group(&self, lane: &LaneId) -> Result<EaseHandle> {
        let engine = Arc::clone(&self.engine);
        self.with_layout(|layout| {
            let group = layout
                .groups
                .iter_mut()
                .find(|g| g.id() == lane)
                .ok_or_else(|| SessionError::LaneNotFound(lane.to_string()))?;
            Ok(group.toggle_eased(engine.as_ref()))
        })?
    }

    /// Collapse every group, or expand them all when all are collapsed
    pub fn toggle_all_groups(&self) -> Result<EaseHandle> {
        let engine = Arc::clone(&self.engine);
        self.with_layout(|layout| {
            let all_minimized = layout
                .groups
                .iter()
                .all(|g| g.visibility() == LaneVisibility::Minimized);
            let handles: Vec<EaseHandle> = layout
                .groups
                .iter_mut()
                .map(|group| {
                    if all_minimized {
                        group.maximize_eased(engine.as_ref())
                    } else {
                        group.minimize_eased(engine.as_ref())
                    }
                })
                .collect();
            let all: EaseHandle = Box::pin(async move {
                join_all(handles).await;
            });
            all
        })
    }

    pub fn analysis_groups(&self) -> Vec<(String, bool)> {
        self.with_layout(|layout| layout.analysis.groups())
            .unwrap_or_default()
    }

    pub fn set_analysis_group_visible(&self, group: &str, visible: bool) -> bool {
        let engine = Arc::clone(&self.engine);
        self.with_layout(|layout| {
            let TimelineLayout {
                analysis, groups, ..
            } = layout;
            analysis.set_group_visible(group, visible, engine.as_ref(), groups)
        })
        .unwrap_or(false)
    }

    /// Switch the player to the audio track bound to an audio group
    pub fn select_audio_lane(&self, lane: &LaneId) -> bool {
        let track = self
            .with_layout(|layout| layout.audio_bindings.get(lane).cloned())
            .ok()
            .flatten();
        match track {
            Some(track) => self.media.set_active_audio_track(&track.id),
            None => false,
        }
    }

    /// Show the subtitles bound to a text group, or none
    pub fn select_subtitle_lane(&self, lane: Option<&LaneId>) -> bool {
        let Some(lane) = lane else {
            return self.media.set_active_subtitle_track(None);
        };
        let track = self
            .with_layout(|layout| layout.subtitle_bindings.get(lane).cloned())
            .ok()
            .flatten();
        match track {
            Some(track) => self.media.set_active_subtitle_track(Some(&track.id)),
            None => false,
        }
    }

    /// Cancel any load in flight and remove the timeline
    pub fn shutdown(&self) {
        let mut state = self.state();
        state.breaker.cancel();
        state.pending_restore = None;
        if let Some(previous) = state.current.take() {
            self.teardown(previous);
        }
        self.phase.send_replace(LoadPhase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::core::events::Severity;
    use crate::core::media::VideoInfo;
    use crate::core::telemetry_window::TelemetryCue;
    use crate::state::InMemoryStore;
    use crate::timeline::{InMemoryTimeline, LaneKind};

    const SESSION: &str = r#"{
        "manifests": [
            {
                "id": "x",
                "name": "Camera X",
                "format": "hls",
                "video": [{"id": "v1", "label": "Video",
                           "analysis": [{"id": "luma", "name": "Luma", "kind": "line_chart", "group": "quality"}]}],
                "audio": [{"id": "en", "label": "English", "language": "en", "channels": 2}],
                "text": [{"id": "sub-en", "label": "English", "language": "en", "src": "en.vtt"}]
            },
            {
                "id": "y",
                "name": "Camera Y",
                "format": "mp4",
                "frameRate": 50,
                "video": [{"id": "v1", "label": "Video"}],
                "audio": [{"id": "en-y", "label": "English", "channels": 1}],
                "telemetry": [{"id": "gps", "label": "GPS", "src": "gps.json"}]
            }
        ],
        "trackOrder": ["en", "v1"]
    }"#;

    struct FakeSource {
        document: Option<SessionDocument>,
        telemetry: HashMap<String, Vec<TelemetryCue>>,
        fetch_gate: Mutex<Option<Arc<Notify>>>,
    }

    impl FakeSource {
        /// Hold the next session fetch until the returned gate is notified
        fn gate(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.fetch_gate.lock().unwrap() = Some(gate.clone());
            gate
        }
    }

    #[async_trait]
    impl SessionSource for FakeSource {
        async fn fetch_session(&self) -> Result<SessionDocument> {
            let gate = self.fetch_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.document
                .clone()
                .ok_or_else(|| SessionError::Fetch("session unavailable".to_string()))
        }

        async fn fetch_telemetry(&self, src: &str) -> Result<Vec<TelemetryCue>> {
            self.telemetry
                .get(src)
                .cloned()
                .ok_or_else(|| SessionError::Fetch(src.to_string()))
        }
    }

    struct FakeMedia {
        gates: Mutex<HashMap<String, Arc<Notify>>>,
        audio: Vec<PlayerTrack>,
        subtitles: Vec<PlayerTrack>,
        active_audio: Mutex<Option<PlayerTrack>>,
        active_subtitle: Mutex<Option<PlayerTrack>>,
        errors: broadcast::Sender<String>,
    }

    impl FakeMedia {
        fn new() -> Self {
            let (errors, _rx) = broadcast::channel(8);
            Self {
                gates: Mutex::new(HashMap::new()),
                audio: vec![PlayerTrack::new("a0", "English")],
                subtitles: vec![PlayerTrack::new("s0", "English")],
                active_audio: Mutex::new(None),
                active_subtitle: Mutex::new(None),
                errors,
            }
        }

        /// Hold `load_video` for a manifest until the returned gate is notified
        fn gate(&self, manifest_id: &str) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates
                .lock()
                .unwrap()
                .insert(manifest_id.to_string(), gate.clone());
            gate
        }
    }

    #[async_trait]
    impl MediaEngine for FakeMedia {
        async fn load_video(&self, manifest: &Manifest) -> Result<VideoInfo> {
            let gate = self.gates.lock().unwrap().get(&manifest.id).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(VideoInfo {
                duration: 60.0,
                frame_rate: manifest.frame_rate,
            })
        }

        async fn audio_tracks(&self) -> Result<Vec<PlayerTrack>> {
            Ok(self.audio.clone())
        }

        async fn subtitle_tracks(&self) -> Result<Vec<PlayerTrack>> {
            Ok(self.subtitles.clone())
        }

        fn active_audio_track(&self) -> Option<PlayerTrack> {
            self.active_audio.lock().unwrap().clone()
        }

        fn set_active_audio_track(&self, id: &str) -> bool {
            let track = self.audio.iter().find(|t| t.id == id).cloned();
            let found = track.is_some();
            *self.active_audio.lock().unwrap() = track;
            found
        }

        fn active_subtitle_track(&self) -> Option<PlayerTrack> {
            self.active_subtitle.lock().unwrap().clone()
        }

        fn set_active_subtitle_track(&self, id: Option<&str>) -> bool {
            let track = id.and_then(|id| self.subtitles.iter().find(|t| t.id == id).cloned());
            let found = id.is_none() || track.is_some();
            *self.active_subtitle.lock().unwrap() = track;
            found
        }

        fn errors(&self) -> broadcast::Receiver<String> {
            self.errors.subscribe()
        }
    }

    struct Fixture {
        engine: Arc<InMemoryTimeline>,
        media: Arc<FakeMedia>,
        source: Arc<FakeSource>,
        store: Arc<InMemoryStore>,
        orchestrator: Arc<ManifestOrchestrator>,
    }

    fn fixture_with(document: Option<SessionDocument>) -> Fixture {
        let engine = Arc::new(InMemoryTimeline::default());
        let media = Arc::new(FakeMedia::new());
        let store = Arc::new(InMemoryStore::default());
        let mut telemetry = HashMap::new();
        telemetry.insert(
            "gps.json".to_string(),
            vec![TelemetryCue {
                start: 0.0,
                end: 2.0,
                text: "fix".to_string(),
                value: Some(1.0),
            }],
        );
        let source = Arc::new(FakeSource {
            document,
            telemetry,
            fetch_gate: Mutex::new(None),
        });
        let orchestrator = Arc::new(ManifestOrchestrator::new(
            engine.clone(),
            media.clone(),
            source.clone(),
            store.clone(),
            SessionSettings::default(),
        ));
        Fixture {
            engine,
            media,
            source,
            store,
            orchestrator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Some(SessionDocument::from_json(SESSION).unwrap()))
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_load_builds_lanes_in_order() {
        let f = fixture();
        let mut rx = f.orchestrator.subscribe();

        let outcome = f.orchestrator.load_manifest(None).await.unwrap();
        assert_eq!(
            outcome,
            LoadOutcome::Reloaded {
                manifest_id: "x".to_string()
            }
        );

        let lanes = f.engine.lane_ids();
        assert_eq!(lanes[0], LaneId::new("audio-en"));
        assert!(lanes.contains(&LaneId::new("video-v1")));
        assert!(lanes.contains(&LaneId::new("text-sub-en")));
        assert_eq!(f.orchestrator.wait_reloaded().await, Some("x".to_string()));

        let events = drain(&mut rx);
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                SessionEvent::LoadStarted { .. } => "started",
                SessionEvent::HelpMenuPopulated(_) => "help",
                SessionEvent::LanesAdded { .. } => "lanes",
                SessionEvent::Reloaded { .. } => "reloaded",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["started", "help", "lanes", "reloaded"]);
    }

    #[tokio::test]
    async fn test_newer_load_cancels_older() {
        let f = fixture();
        let gate = f.media.gate("x");

        let first = tokio::spawn({
            let orchestrator = f.orchestrator.clone();
            async move { orchestrator.load_manifest(Some("x")).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = f.orchestrator.load_manifest(Some("y")).await.unwrap();
        assert_eq!(
            second,
            LoadOutcome::Reloaded {
                manifest_id: "y".to_string()
            }
        );

        // The stale video load resolves only after the newer load finished.
        gate.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), LoadOutcome::Superseded);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let lanes = f.engine.lane_ids();
        assert!(lanes.contains(&LaneId::new("audio-en-y")));
        assert!(!lanes.contains(&LaneId::new("audio-en")));
        assert!(!lanes.contains(&LaneId::new("analysis-luma")));
        assert_eq!(f.orchestrator.current_manifest(), Some("y".to_string()));
        assert_eq!(f.store.snapshot().frame_rate, 50.0);
    }

    #[tokio::test]
    async fn test_switch_restores_playback_state() {
        let f = fixture();
        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        f.media.set_active_audio_track("a0");
        f.orchestrator.minimize_group(&LaneId::new("video-v1")).unwrap();
        f.engine.seek_to_time(12.0);

        f.orchestrator.load_manifest(Some("y")).await.unwrap();
        assert_eq!(f.engine.current_time(), 12.0);
        assert_eq!(f.media.active_audio_track().unwrap().id, "a0");
        assert_eq!(
            f.engine.lane_visibility(&LaneId::new("video-v1")),
            Some(LaneVisibility::Minimized)
        );
        // "y" has no text track, so the subtitle restore is dropped.
        assert!(f.media.active_subtitle_track().is_none());
    }

    #[tokio::test]
    async fn test_wait_reloaded_during_switch_waits_for_new_manifest() {
        let f = fixture();
        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        let gate = f.source.gate();

        let switch = tokio::spawn({
            let orchestrator = f.orchestrator.clone();
            async move { orchestrator.load_manifest(Some("y")).await }
        });
        let mut phase = f.orchestrator.phase();
        phase
            .wait_for(|phase| *phase == LoadPhase::Pending)
            .await
            .unwrap();
        assert!(f.engine.lane_ids().is_empty());

        let waiter = tokio::spawn({
            let orchestrator = f.orchestrator.clone();
            async move { orchestrator.wait_reloaded().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        gate.notify_one();
        assert_eq!(waiter.await.unwrap(), Some("y".to_string()));
        assert_eq!(
            switch.await.unwrap().unwrap(),
            LoadOutcome::Reloaded {
                manifest_id: "y".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_restore_survives_superseded_switch() {
        let f = fixture();
        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        f.media.set_active_audio_track("a0");
        f.orchestrator.minimize_group(&LaneId::new("video-v1")).unwrap();
        f.engine.seek_to_time(12.0);

        let gate = f.media.gate("y");
        let abandoned = tokio::spawn({
            let orchestrator = f.orchestrator.clone();
            async move { orchestrator.load_manifest(Some("y")).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        // The player resets while the abandoned video loads.
        f.engine.seek_to_time(0.0);
        f.media.set_active_audio_track("none");

        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        gate.notify_one();
        assert_eq!(abandoned.await.unwrap().unwrap(), LoadOutcome::Superseded);

        assert_eq!(f.engine.current_time(), 12.0);
        assert_eq!(f.media.active_audio_track().unwrap().id, "a0");
        assert_eq!(
            f.engine.lane_visibility(&LaneId::new("video-v1")),
            Some(LaneVisibility::Minimized)
        );
    }

    #[tokio::test]
    async fn test_feature_lanes_survive_switch() {
        let f = fixture();
        f.engine.add_lanes(vec![LaneSpec::new(
            LaneId::new("annotations"),
            LaneKind::Markers,
            "Annotations",
        )]);
        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        f.orchestrator.load_manifest(Some("y")).await.unwrap();
        assert!(f.engine.has_lane(&LaneId::new("annotations")));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let f = fixture_with(None);
        let mut rx = f.orchestrator.subscribe();
        let err = f.orchestrator.load_manifest(None).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(f.engine.lane_ids().is_empty());
        assert_eq!(f.orchestrator.wait_reloaded().await, None);

        let events = drain(&mut rx);
        let fatal = events.iter().find_map(|e| match e {
            SessionEvent::Notification(n) => Some(n.clone()),
            _ => None,
        });
        let fatal = fatal.unwrap();
        assert_eq!(fatal.severity, Severity::Fatal);
        assert!(fatal.persistent);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_previous_torn_down() {
        let f = fixture();
        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        let err = f.orchestrator.load_manifest(Some("missing")).await.unwrap_err();
        assert!(matches!(err, SessionError::ManifestNotFound(_)));
        assert!(f.engine.lane_ids().is_empty());
        assert_eq!(f.orchestrator.current_manifest(), None);
    }

    #[tokio::test]
    async fn test_telemetry_loaded_before_reloaded() {
        let f = fixture();
        f.orchestrator.load_manifest(Some("y")).await.unwrap();
        let window = f.orchestrator.cue_window();
        let lanes = window.lock().unwrap().track_lanes();
        assert_eq!(lanes, vec![LaneId::new("telemetry-gps")]);
    }

    #[tokio::test]
    async fn test_stale_lane_closes_panel() {
        let f = fixture();
        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        let mut rx = f.orchestrator.subscribe();
        assert!(f.orchestrator.lane_or_close(&LaneId::new("audio-en")).is_some());
        f.orchestrator.load_manifest(Some("y")).await.unwrap();
        drain(&mut rx);

        assert!(f.orchestrator.lane_or_close(&LaneId::new("audio-en")).is_none());
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::PanelClosed {
                lane: LaneId::new("audio-en")
            }
        );
    }

    #[tokio::test]
    async fn test_engine_marker_selection_is_forwarded() {
        let f = fixture();
        let lane = LaneId::new("annotations");
        f.engine.add_lanes(vec![LaneSpec::new(lane.clone(), LaneKind::Markers, "Annotations")]);
        let marker = crate::timeline::Marker::new(crate::timeline::TimeObservation::moment(4.0), "#fff");
        let marker_id = marker.id;
        f.engine.add_marker(&lane, marker).unwrap();
        f.orchestrator.load_manifest(Some("x")).await.unwrap();

        let mut rx = f.orchestrator.subscribe();
        assert!(f.engine.select_marker(&lane, marker_id));
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SessionEvent::MarkerSelected { lane, marker_id });
    }

    #[tokio::test]
    async fn test_media_errors_become_warnings() {
        let f = fixture();
        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        let mut rx = f.orchestrator.subscribe();
        f.media.errors.send("decode error".to_string()).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SessionEvent::Notification(n) => {
                assert_eq!(n.severity, Severity::Warning);
                assert_eq!(n.message, "decode error");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_toggle_drops_reentrant_request() {
        let f = fixture();
        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        let lane = LaneId::new("video-v1");
        let first = f.orchestrator.toggle_group(&lane).unwrap();
        let second = f.orchestrator.toggle_group(&lane).unwrap();
        second.await;
        first.await;

        let group_transitions = f
            .engine
            .transitions()
            .into_iter()
            .filter(|t| t.lane == lane)
            .count();
        assert_eq!(group_transitions, 1);
        assert_eq!(
            f.engine.lane_visibility(&lane),
            Some(LaneVisibility::Minimized)
        );
    }

    #[tokio::test]
    async fn test_analysis_group_filter_and_audio_selection() {
        let f = fixture();
        f.orchestrator.load_manifest(Some("x")).await.unwrap();
        assert_eq!(
            f.orchestrator.analysis_groups(),
            vec![("quality".to_string(), true)]
        );
        assert!(f.orchestrator.set_analysis_group_visible("quality", false));
        // Every group off means no filter.
        assert!(!f.engine.is_lane_hidden(&LaneId::new("analysis-luma")));
        assert!(!f.orchestrator.set_analysis_group_visible("missing", false));

        assert!(f.orchestrator.select_audio_lane(&LaneId::new("audio-en")));
        assert_eq!(f.media.active_audio_track().unwrap().id, "a0");
        assert!(f.orchestrator.select_subtitle_lane(Some(&LaneId::new("text-sub-en"))));
        assert!(f.orchestrator.select_subtitle_lane(None));
        assert!(f.media.active_subtitle_track().is_none());
    }
}
