//! Grouping lanes.
//!
//! A grouping lane is the parent of a media track's child lanes (visual
//! references, audio channels, analysis and telemetry lanes). Minimizing or
//! maximizing it cascades to the children, either immediately or eased.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::{self, join_all};
use futures_util::FutureExt;

use super::{EaseHandle, GroupMedia, LaneId, LaneVisibility, TimelineEngine};

/// Clears the in-flight flag when the eased toggle completes or is dropped
struct ToggleGuard(Arc<AtomicBool>);

impl Drop for ToggleGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Parent lane owning an ordered list of child lanes
#[derive(Debug)]
pub struct GroupingLane {
    id: LaneId,
    media: GroupMedia,
    /// Manifest track id; stable across manifests that share the track
    key: String,
    children: Vec<LaneId>,
    /// Last commanded state, not an aggregate of the children
    visibility: LaneVisibility,
    toggling: Arc<AtomicBool>,
    eased_limit: usize,
}

impl GroupingLane {
    pub fn new(id: LaneId, media: GroupMedia, key: impl Into<String>, eased_limit: usize) -> Self {
        Self {
            id,
            media,
            key: key.into(),
            children: Vec::new(),
            visibility: LaneVisibility::Maximized,
            toggling: Arc::new(AtomicBool::new(false)),
            eased_limit: eased_limit.max(1),
        }
    }

    pub fn id(&self) -> &LaneId {
        &self.id
    }

    pub fn media(&self) -> GroupMedia {
        self.media
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn children(&self) -> &[LaneId] {
        &self.children
    }

    pub fn add_child(&mut self, child: LaneId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub fn visibility(&self) -> LaneVisibility {
        self.visibility
    }

    pub fn is_toggling(&self) -> bool {
        self.toggling.load(Ordering::SeqCst)
    }

    /// Minimize the group and every child immediately
    pub fn minimize(&mut self, engine: &dyn TimelineEngine) {
        self.visibility = LaneVisibility::Minimized;
        engine.minimize_lane(&self.id);
        for child in self.children.iter() {
            engine.minimize_lane(child);
        }
    }

    /// Maximize the group and every child immediately
    pub fn maximize(&mut self, engine: &dyn TimelineEngine) {
        self.visibility = LaneVisibility::Maximized;
        engine.maximize_lane(&self.id);
        for child in self.children.iter() {
            engine.maximize_lane(child);
        }
    }

    pub fn minimize_eased(&mut self, engine: &dyn TimelineEngine) -> EaseHandle {
        self.transition_eased(engine, LaneVisibility::Minimized)
    }

    pub fn maximize_eased(&mut self, engine: &dyn TimelineEngine) -> EaseHandle {
        self.transition_eased(engine, LaneVisibility::Maximized)
    }

    /// Flip the group with easing
    pub fn toggle_eased(&mut self, engine: &dyn TimelineEngine) -> EaseHandle {
        match self.visibility {
            LaneVisibility::Minimized => self.maximize_eased(engine),
            LaneVisibility::Maximized => self.minimize_eased(engine),
        }
    }

    /// Only the first `eased_limit` children animate; the rest snap. A request
    /// arriving while another is in flight is dropped and returns a completed
    /// handle.
    fn transition_eased(
        &mut self,
        engine: &dyn TimelineEngine,
        target: LaneVisibility,
    ) -> EaseHandle {
        if self.toggling.swap(true, Ordering::SeqCst) {
            tracing::debug!(lane = %self.id, "Group toggle already in flight, dropping request");
            return future::ready(()).boxed();
        }
        let guard = ToggleGuard(Arc::clone(&self.toggling));
        self.visibility = target;

        let mut animations = Vec::with_capacity(self.eased_limit + 1);
        animations.push(ease_lane(engine, &self.id, target));
        for (index, child) in self.children.iter().enumerate() {
            if index < self.eased_limit {
                animations.push(ease_lane(engine, child, target));
            } else {
                match target {
                    LaneVisibility::Minimized => engine.minimize_lane(child),
                    LaneVisibility::Maximized => engine.maximize_lane(child),
                }
            }
        }

        async move {
            join_all(animations).await;
            drop(guard);
        }
        .boxed()
    }
}

fn ease_lane(engine: &dyn TimelineEngine, id: &LaneId, target: LaneVisibility) -> EaseHandle {
    match target {
        LaneVisibility::Minimized => engine.minimize_lane_eased(id),
        LaneVisibility::Maximized => engine.maximize_lane_eased(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{InMemoryTimeline, LaneKind, LaneSpec};

    fn setup(children: usize, limit: usize) -> (InMemoryTimeline, GroupingLane) {
        let engine = InMemoryTimeline::default();
        let group_id = LaneId::new("video-v1");
        let mut group = GroupingLane::new(group_id.clone(), GroupMedia::Video, "v1", limit);
        let mut specs = vec![LaneSpec::new(
            group_id.clone(),
            LaneKind::Group {
                media: GroupMedia::Video,
            },
            "Video",
        )];
        for i in 0..children {
            let child = LaneId::new(format!("child-{}", i));
            specs.push(LaneSpec::new(child.clone(), LaneKind::VisualReference, "ref").with_parent(&group_id));
            group.add_child(child);
        }
        engine.add_lanes(specs);
        (engine, group)
    }

    #[test]
    fn test_minimize_cascades_to_children() {
        let (engine, mut group) = setup(3, 2);
        group.minimize(&engine);
        assert_eq!(group.visibility(), LaneVisibility::Minimized);
        for child in group.children() {
            assert_eq!(engine.lane_visibility(child), Some(LaneVisibility::Minimized));
        }
        group.maximize(&engine);
        assert_eq!(engine.lane_visibility(group.id()), Some(LaneVisibility::Maximized));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eased_only_first_children_animate() {
        let (engine, mut group) = setup(5, 2);
        group.minimize_eased(&engine).await;
        let transitions = engine.transitions();
        let eased: Vec<_> = transitions.iter().filter(|t| t.eased).collect();
        let snapped: Vec<_> = transitions.iter().filter(|t| !t.eased).collect();
        // the group itself plus two children
        assert_eq!(eased.len(), 3);
        assert_eq!(snapped.len(), 3);
        assert!(transitions
            .iter()
            .all(|t| t.visibility == LaneVisibility::Minimized));
        assert!(!group.is_toggling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eased_toggle_is_not_reentrant() {
        let (engine, mut group) = setup(2, 3);
        let first = group.minimize_eased(&engine);
        assert!(group.is_toggling());
        let second = group.minimize_eased(&engine);
        second.await;
        assert!(group.is_toggling());
        first.await;
        assert!(!group.is_toggling());

        let group_transitions = engine
            .transitions()
            .into_iter()
            .filter(|t| &t.lane == group.id())
            .count();
        assert_eq!(group_transitions, 1);
        assert_eq!(group.visibility(), LaneVisibility::Minimized);

        group.toggle_eased(&engine).await;
        assert_eq!(group.visibility(), LaneVisibility::Maximized);
    }

    #[test]
    fn test_visibility_is_commanded_state() {
        let (engine, mut group) = setup(2, 1);
        engine.maximize_lane(&group.children()[0].clone());
        group.minimize(&engine);
        engine.maximize_lane(&group.children()[1].clone());
        assert_eq!(group.visibility(), LaneVisibility::Minimized);
    }
}
