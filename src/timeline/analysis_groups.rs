//! Visibility filter over analysis lanes keyed by their group tag.

use std::collections::{BTreeMap, HashSet};

use crate::constants::UNGROUPED_ANALYSIS_GROUP;

use super::{GroupingLane, LaneId, LaneVisibility, TimelineEngine};

#[derive(Debug, Clone, PartialEq)]
struct AnalysisLane {
    lane: LaneId,
    parent: LaneId,
    group: String,
}

/// Per-group visibility of analysis lanes
#[derive(Debug, Default)]
pub struct AnalysisGroups {
    lanes: Vec<AnalysisLane>,
    enabled: BTreeMap<String, bool>,
    /// Parents this filter collapsed, so a user collapse is never undone
    auto_minimized: HashSet<LaneId>,
}

impl AnalysisGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analysis lane; lanes without a tag join the ungrouped bucket
    pub fn register(&mut self, lane: LaneId, parent: LaneId, group: Option<&str>) {
        let group = group.unwrap_or(UNGROUPED_ANALYSIS_GROUP).to_string();
        self.enabled.entry(group.clone()).or_insert(true);
        self.lanes.push(AnalysisLane {
            lane,
            parent,
            group,
        });
    }

    /// Group names with their toggle state
    pub fn groups(&self) -> Vec<(String, bool)> {
        self.enabled
            .iter()
            .map(|(name, enabled)| (name.clone(), *enabled))
            .collect()
    }

    pub fn is_enabled(&self, group: &str) -> bool {
        self.enabled.get(group).copied().unwrap_or(false)
    }

    pub fn lanes_in(&self, group: &str) -> Vec<LaneId> {
        self.lanes
            .iter()
            .filter(|l| l.group == group)
            .map(|l| l.lane.clone())
            .collect()
    }

    /// Toggle a group and re-apply the filter. Returns false for unknown groups.
    pub fn set_group_visible(
        &mut self,
        group: &str,
        visible: bool,
        engine: &dyn TimelineEngine,
        parents: &mut [GroupingLane],
    ) -> bool {
        match self.enabled.get_mut(group) {
            Some(enabled) => *enabled = visible,
            None => return false,
        }
        self.apply(engine, parents);
        true
    }

    /// With every group switched off no filter applies and all lanes show.
    fn desired_visible(&self, group: &str) -> bool {
        let all_off = self.enabled.values().all(|enabled| !enabled);
        all_off || self.is_enabled(group)
    }

    fn apply(&mut self, engine: &dyn TimelineEngine, parents: &mut [GroupingLane]) {
        let mut touched_parents = Vec::new();
        for analysis in self.lanes.iter() {
            let visible = self.desired_visible(&analysis.group);
            engine.set_lane_click_filtered(&analysis.lane, !visible);
            if engine.is_lane_hidden(&analysis.lane) == visible {
                engine.set_lane_hidden(&analysis.lane, !visible);
            }
            if !touched_parents.contains(&analysis.parent) {
                touched_parents.push(analysis.parent.clone());
            }
        }

        for parent_id in touched_parents {
            let Some(parent) = parents.iter_mut().find(|p| p.id() == &parent_id) else {
                continue;
            };
            let looks_empty = parent
                .children()
                .iter()
                .all(|child| engine.is_lane_hidden(child));
            match (looks_empty, parent.visibility()) {
                (true, LaneVisibility::Maximized) => {
                    tracing::debug!(lane = %parent_id, "Collapsing group with no visible lanes");
                    parent.minimize(engine);
                    self.auto_minimized.insert(parent_id);
                }
                (false, LaneVisibility::Minimized) if self.auto_minimized.remove(&parent_id) => {
                    parent.maximize(engine);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AnalysisKind;
    use crate::timeline::{GroupMedia, InMemoryTimeline, LaneKind, LaneSpec};

    struct Fixture {
        engine: InMemoryTimeline,
        groups: AnalysisGroups,
        parents: Vec<GroupingLane>,
    }

    fn fixture() -> Fixture {
        let engine = InMemoryTimeline::default();
        let mut groups = AnalysisGroups::new();
        let mut parents = Vec::new();
        let mut specs = Vec::new();

        for (parent, lanes) in [
            ("video", vec![("luma", Some("quality")), ("chroma", Some("quality"))]),
            ("audio", vec![("loudness", Some("levels")), ("misc", None)]),
        ] {
            let parent_id = LaneId::new(parent);
            let mut grouping = GroupingLane::new(parent_id.clone(), GroupMedia::Video, parent, 3);
            specs.push(LaneSpec::new(
                parent_id.clone(),
                LaneKind::Group {
                    media: GroupMedia::Video,
                },
                parent,
            ));
            for (lane, group) in lanes {
                let lane_id = LaneId::new(lane);
                specs.push(
                    LaneSpec::new(
                        lane_id.clone(),
                        LaneKind::Analysis {
                            kind: AnalysisKind::LineChart,
                        },
                        lane,
                    )
                    .with_parent(&parent_id),
                );
                grouping.add_child(lane_id.clone());
                groups.register(lane_id, parent_id.clone(), group);
            }
            parents.push(grouping);
        }
        engine.add_lanes(specs);
        Fixture {
            engine,
            groups,
            parents,
        }
    }

    #[test]
    fn test_untagged_lanes_are_ungrouped() {
        let f = fixture();
        assert_eq!(f.groups.lanes_in(UNGROUPED_ANALYSIS_GROUP), vec![LaneId::new("misc")]);
        assert_eq!(f.groups.groups().len(), 3);
    }

    #[test]
    fn test_hiding_group_hides_lanes_and_collapses_empty_parent() {
        let mut f = fixture();
        assert!(f.groups.set_group_visible("quality", false, &f.engine, &mut f.parents));
        assert!(f.engine.is_lane_hidden(&LaneId::new("luma")));
        assert!(f.engine.is_click_filtered(&LaneId::new("chroma")));
        assert!(!f.engine.is_lane_hidden(&LaneId::new("loudness")));
        assert_eq!(f.parents[0].visibility(), LaneVisibility::Minimized);
        assert_eq!(f.parents[1].visibility(), LaneVisibility::Maximized);

        f.groups.set_group_visible("quality", true, &f.engine, &mut f.parents);
        assert!(!f.engine.is_lane_hidden(&LaneId::new("luma")));
        assert_eq!(f.parents[0].visibility(), LaneVisibility::Maximized);
    }

    #[test]
    fn test_all_groups_off_shows_everything() {
        let mut f = fixture();
        for group in ["quality", "levels", UNGROUPED_ANALYSIS_GROUP] {
            f.groups.set_group_visible(group, false, &f.engine, &mut f.parents);
        }
        for lane in ["luma", "chroma", "loudness", "misc"] {
            assert!(!f.engine.is_lane_hidden(&LaneId::new(lane)));
            assert!(!f.engine.is_click_filtered(&LaneId::new(lane)));
        }
        assert!(f
            .parents
            .iter()
            .all(|p| p.visibility() == LaneVisibility::Maximized));
    }

    #[test]
    fn test_user_collapse_is_not_undone() {
        let mut f = fixture();
        f.parents[1].minimize(&f.engine);
        f.groups.set_group_visible("levels", false, &f.engine, &mut f.parents);
        f.groups.set_group_visible("levels", true, &f.engine, &mut f.parents);
        assert_eq!(f.parents[1].visibility(), LaneVisibility::Minimized);
    }

    #[test]
    fn test_unknown_group_rejected() {
        let mut f = fixture();
        assert!(!f.groups.set_group_visible("nope", false, &f.engine, &mut f.parents));
    }
}
