//! A running session: both marker features, the manifest orchestrator and
//! the hotkey dispatch wired to one timeline engine and one store.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::annotations::Annotations;
use crate::core::markers::{MarkerFeature, PeriodBounds};
use crate::core::media::{MediaEngine, SessionSource};
use crate::core::orchestrator::ManifestOrchestrator;
use crate::core::segmentation::SegmentationTracks;
use crate::core::timeline_snap::frames_from_seconds;
use crate::error::Result;
use crate::hotkeys::{handle_hotkey, HotkeyAction, HotkeyContext, HotkeyResult};
use crate::state::{DurableStore, SessionSettings};
use crate::timeline::TimelineEngine;

const ZOOM_STEP: f64 = 1.25;

/// Which marker feature receives marker hotkeys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeatureTab {
    #[default]
    Annotations,
    Segmentation,
}

pub struct TimelineSession {
    engine: Arc<dyn TimelineEngine>,
    store: Arc<dyn DurableStore>,
    orchestrator: Arc<ManifestOrchestrator>,
    annotations: Annotations,
    segmentation: SegmentationTracks,
    tab: Mutex<FeatureTab>,
    token: CancellationToken,
}

impl TimelineSession {
    /// Validate settings, attach the feature lanes and start mirroring engine
    /// marker edits into the store. Must run inside a tokio runtime.
    pub fn start(
        engine: Arc<dyn TimelineEngine>,
        media: Arc<dyn MediaEngine>,
        source: Arc<dyn SessionSource>,
        store: Arc<dyn DurableStore>,
        settings: SessionSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let annotations = Annotations::new(engine.clone(), store.clone(), settings.clone());
        let segmentation = SegmentationTracks::new(engine.clone(), store.clone(), settings.clone());
        annotations.markers().attach()?;
        segmentation.markers().attach()?;

        let token = CancellationToken::new();
        annotations.markers().sync_engine_events(token.child_token());
        segmentation.markers().sync_engine_events(token.child_token());

        let orchestrator = Arc::new(ManifestOrchestrator::new(
            engine.clone(),
            media,
            source,
            store.clone(),
            settings,
        ));
        tracing::info!(annotations = store.snapshot().annotations.len(), "Session started");
        Ok(Self {
            engine,
            store,
            orchestrator,
            annotations,
            segmentation,
            tab: Mutex::new(FeatureTab::default()),
            token,
        })
    }

    pub fn orchestrator(&self) -> &Arc<ManifestOrchestrator> {
        &self.orchestrator
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn segmentation(&self) -> &SegmentationTracks {
        &self.segmentation
    }

    fn tab(&self) -> MutexGuard<'_, FeatureTab> {
        self.tab.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn active_tab(&self) -> FeatureTab {
        *self.tab()
    }

    fn feature(&self, tab: FeatureTab) -> &Arc<MarkerFeature> {
        match tab {
            FeatureTab::Annotations => self.annotations.markers(),
            FeatureTab::Segmentation => self.segmentation.markers(),
        }
    }

    fn active_feature(&self) -> &Arc<MarkerFeature> {
        self.feature(self.active_tab())
    }

    /// Switch tabs; refused while the current tab has an incomplete marker
    pub fn set_tab(&self, tab: FeatureTab) -> bool {
        let mut current = self.tab();
        if *current != tab && self.feature(*current).is_creating() {
            tracing::debug!(from = ?*current, to = ?tab, "Tab switch blocked by incomplete marker");
            return false;
        }
        *current = tab;
        true
    }

    fn selected_marker(&self) -> Option<Uuid> {
        let snapshot = self.store.snapshot();
        snapshot
            .selection
            .primary_marker()
            .or_else(|| snapshot.selection.primary_annotation())
    }

    pub fn hotkey_context(&self, input_focused: bool) -> HotkeyContext {
        HotkeyContext {
            input_focused,
            has_marker_selection: self.selected_marker().is_some(),
            creating_marker: self.active_feature().is_creating(),
        }
    }

    /// Map a key press and perform it. Returns the action when one ran.
    pub fn handle_key(&self, key: &str, shift: bool, input_focused: bool) -> Result<Option<HotkeyAction>> {
        match handle_hotkey(key, shift, &self.hotkey_context(input_focused)) {
            HotkeyResult::Action(action) => {
                let handled = self.perform(action)?;
                Ok(handled.then_some(action))
            }
            HotkeyResult::NoMatch | HotkeyResult::Suppressed => Ok(None),
        }
    }

    /// Perform an action; `false` means it is left to the host (playback)
    pub fn perform(&self, action: HotkeyAction) -> Result<bool> {
        let now = self.engine.current_time();
        match action {
            HotkeyAction::PlayPause => return Ok(false),
            HotkeyAction::StepForward | HotkeyAction::StepBackward => {
                let frame = frames_from_seconds(now, self.engine.frame_rate()).round();
                let target = if action == HotkeyAction::StepForward {
                    frame + 1.0
                } else {
                    (frame - 1.0).max(0.0)
                };
                self.engine.seek_to_frame(target as u64);
            }
            HotkeyAction::TimelineZoomIn => self.engine.zoom_to(self.engine.zoom() * ZOOM_STEP),
            HotkeyAction::TimelineZoomOut => self.engine.zoom_to(self.engine.zoom() / ZOOM_STEP),
            HotkeyAction::ToggleAllGroups => {
                let eased = self.orchestrator.toggle_all_groups()?;
                tokio::spawn(eased);
            }
            HotkeyAction::MarkPeriod => {
                self.active_feature()
                    .add_period_marker(Some(PeriodBounds::open(now)))?;
            }
            HotkeyAction::MarkMoment => {
                self.active_feature().add_moment_marker(Some(now))?;
            }
            HotkeyAction::SplitMarker => {
                if let Some(id) = self.selected_marker() {
                    self.active_feature().split_marker(id)?;
                }
            }
            HotkeyAction::DeleteMarker => {
                if let Some(id) = self.selected_marker() {
                    self.active_feature().delete_marker(id, false)?;
                }
            }
            HotkeyAction::CancelMarker => {
                self.active_feature().discard_incomplete()?;
            }
        }
        Ok(true)
    }

    /// Stop the engine sync tasks and any manifest load
    pub fn shutdown(&self) {
        self.token.cancel();
        self.orchestrator.shutdown();
        self.annotations.markers().reset();
        self.segmentation.markers().reset();
    }
}
