//! Builds the lane hierarchy of a manifest.
//!
//! Video and audio groups can be built as soon as the manifest is known;
//! text groups need the subtitle tracks the player discovered so declared
//! text tracks can be matched to real ones. Nothing touches the engine here:
//! the finished layout is attached in a single batch.

use std::collections::HashMap;

use crate::core::media::PlayerTrack;
use crate::state::{AnalysisTrack, Manifest, SessionDocument, VisualReference};
use crate::timeline::{AnalysisGroups, GroupMedia, GroupingLane, LaneId, LaneKind, LaneSpec};

/// Telemetry lane waiting for its data file
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryLane {
    pub lane: LaneId,
    pub src: String,
}

/// The built lane hierarchy of one manifest
#[derive(Debug)]
pub struct TimelineLayout {
    /// Every lane, each group directly followed by its children
    pub lanes: Vec<LaneSpec>,
    pub groups: Vec<GroupingLane>,
    pub analysis: AnalysisGroups,
    pub telemetry: Vec<TelemetryLane>,
    /// Player audio track bound to each audio group lane
    pub audio_bindings: HashMap<LaneId, PlayerTrack>,
    /// Player subtitle track bound to each text group lane
    pub subtitle_bindings: HashMap<LaneId, PlayerTrack>,
}

impl TimelineLayout {
    pub fn lane_ids(&self) -> Vec<LaneId> {
        self.lanes.iter().map(|l| l.id.clone()).collect()
    }

    pub fn group(&self, id: &LaneId) -> Option<&GroupingLane> {
        self.groups.iter().find(|g| g.id() == id)
    }

    pub fn group_by_key(&self, key: &str) -> Option<&GroupingLane> {
        self.groups.iter().find(|g| g.key() == key)
    }

    /// Lane order honoring the declared track order: listed groups first,
    /// each followed by its children
    pub fn ordered_lane_ids(&self, track_order: &[String]) -> Vec<LaneId> {
        let mut order = Vec::with_capacity(self.lanes.len());
        for key in track_order {
            let Some(group) = self.group_by_key(key) else {
                continue;
            };
            order.push(group.id().clone());
            order.extend(group.children().iter().cloned());
        }
        order
    }

    /// Bind player audio tracks onto audio groups by label, then language
    pub fn reconcile_audio(&mut self, manifest: &Manifest, tracks: &[PlayerTrack]) {
        for declared in manifest.audio.iter() {
            let lane = group_lane_id(GroupMedia::Audio, &declared.id);
            if !self.groups.iter().any(|g| g.id() == &lane) {
                continue;
            }
            match match_track(tracks, &declared.label, declared.language.as_deref()) {
                Some(track) => {
                    self.audio_bindings.insert(lane, track.clone());
                }
                None => tracing::debug!(track = %declared.id, "No player audio track for declared track"),
            }
        }
    }

    /// Bind player subtitle tracks onto the text groups built for them
    pub fn reconcile_subtitles(&mut self, manifest: &Manifest, tracks: &[PlayerTrack]) {
        for declared in manifest.text.iter() {
            let lane = group_lane_id(GroupMedia::Text, &declared.id);
            if !self.groups.iter().any(|g| g.id() == &lane) {
                continue;
            }
            if let Some(track) = match_track(tracks, &declared.label, declared.language.as_deref()) {
                self.subtitle_bindings.insert(lane, track.clone());
            }
        }
    }
}

pub fn group_lane_id(media: GroupMedia, track_id: &str) -> LaneId {
    let prefix = match media {
        GroupMedia::Video => "video",
        GroupMedia::Audio => "audio",
        GroupMedia::Text => "text",
    };
    LaneId::new(format!("{}-{}", prefix, track_id))
}

fn match_track<'a>(
    tracks: &'a [PlayerTrack],
    label: &str,
    language: Option<&str>,
) -> Option<&'a PlayerTrack> {
    tracks
        .iter()
        .find(|t| t.label.eq_ignore_ascii_case(label))
        .or_else(|| {
            let language = language?;
            tracks
                .iter()
                .find(|t| t.language.as_deref() == Some(language))
        })
}

/// Incremental builder of a `TimelineLayout`
pub struct LaneBuilder<'a> {
    manifest: &'a Manifest,
    visible_tracks: Option<&'a [String]>,
    eased_limit: usize,
    layout: TimelineLayout,
}

impl<'a> LaneBuilder<'a> {
    pub fn new(manifest: &'a Manifest, document: &'a SessionDocument, eased_limit: usize) -> Self {
        Self {
            manifest,
            visible_tracks: document.visible_tracks.as_deref(),
            eased_limit,
            layout: TimelineLayout {
                lanes: Vec::new(),
                groups: Vec::new(),
                analysis: AnalysisGroups::new(),
                telemetry: Vec::new(),
                audio_bindings: HashMap::new(),
                subtitle_bindings: HashMap::new(),
            },
        }
    }

    fn is_visible(&self, track_id: &str) -> bool {
        self.visible_tracks
            .map(|visible| visible.iter().any(|id| id == track_id))
            .unwrap_or(true)
    }

    /// Start a group and return its index in `layout.groups`
    fn open_group(&mut self, media: GroupMedia, track_id: &str, label: &str) -> usize {
        let id = group_lane_id(media, track_id);
        self.layout.lanes.push(
            LaneSpec::new(id.clone(), LaneKind::Group { media }, label).with_source(track_id),
        );
        self.layout
            .groups
            .push(GroupingLane::new(id, media, track_id, self.eased_limit));
        self.layout.groups.len() - 1
    }

    fn add_child(&mut self, group: usize, spec: LaneSpec) {
        let parent = self.layout.groups[group].id().clone();
        let spec = spec.with_parent(&parent);
        self.layout.groups[group].add_child(spec.id.clone());
        self.layout.lanes.push(spec);
    }

    fn add_visual_references(&mut self, group: usize, references: &[VisualReference]) {
        for reference in references {
            self.add_child(
                group,
                LaneSpec::new(
                    LaneId::new(format!("ref-{}", reference.id)),
                    LaneKind::VisualReference,
                    reference.label.clone(),
                )
                .with_source(reference.id.clone()),
            );
        }
    }

    fn add_analysis(&mut self, group: usize, analysis: &[AnalysisTrack]) {
        for track in analysis {
            let lane = LaneId::new(format!("analysis-{}", track.id));
            self.add_child(
                group,
                LaneSpec::new(lane.clone(), LaneKind::Analysis { kind: track.kind }, track.name.clone())
                    .with_source(track.id.clone()),
            );
            let parent = self.layout.groups[group].id().clone();
            self.layout
                .analysis
                .register(lane, parent, track.group.as_deref());
        }
    }

    /// Video and audio groups with their children
    pub fn build_media(&mut self) {
        let manifest = self.manifest;
        for video in manifest.video.iter() {
            if !self.is_visible(&video.id) {
                continue;
            }
            let group = self.open_group(GroupMedia::Video, &video.id, &video.label);
            self.add_visual_references(group, &video.visual_reference);
            self.add_analysis(group, &video.analysis);
        }
        for audio in manifest.audio.iter() {
            if !self.is_visible(&audio.id) {
                continue;
            }
            let group = self.open_group(GroupMedia::Audio, &audio.id, &audio.label);
            self.add_visual_references(group, &audio.visual_reference);
            for channel in 0..audio.channels {
                self.add_child(
                    group,
                    LaneSpec::new(
                        LaneId::new(format!("channel-{}-{}", audio.id, channel)),
                        LaneKind::AudioChannel { channel },
                        format!("{} ch{}", audio.label, channel + 1),
                    ),
                );
            }
            self.add_analysis(group, &audio.analysis);
        }
    }

    /// Text groups for declared text tracks the player actually exposes
    pub fn build_text(&mut self, subtitles: &[PlayerTrack]) {
        let manifest = self.manifest;
        for text in manifest.text.iter() {
            if !self.is_visible(&text.id) {
                continue;
            }
            if match_track(subtitles, &text.label, text.language.as_deref()).is_none() {
                tracing::debug!(track = %text.id, "No player subtitle track, skipping text lane");
                continue;
            }
            let group = self.open_group(GroupMedia::Text, &text.id, &text.label);
            self.add_child(
                group,
                LaneSpec::new(
                    LaneId::new(format!("subtitles-{}", text.id)),
                    LaneKind::Subtitles,
                    text.label.clone(),
                )
                .with_source(text.id.clone()),
            );
            self.add_analysis(group, &text.analysis);
        }
    }

    /// Telemetry lanes nest under their declared parent, else the first group
    pub fn build_telemetry(&mut self) {
        let manifest = self.manifest;
        for telemetry in manifest.telemetry.iter() {
            if !self.is_visible(&telemetry.id) {
                continue;
            }
            let parent = telemetry
                .parent
                .as_deref()
                .and_then(|key| self.layout.groups.iter().position(|g| g.key() == key))
                .or_else(|| (!self.layout.groups.is_empty()).then_some(0));
            let Some(group) = parent else {
                tracing::warn!(track = %telemetry.id, "No group to attach telemetry lane to");
                continue;
            };
            let lane = LaneId::new(format!("telemetry-{}", telemetry.id));
            self.add_child(
                group,
                LaneSpec::new(lane.clone(), LaneKind::Telemetry, telemetry.label.clone())
                    .with_source(telemetry.id.clone()),
            );
            self.layout.telemetry.push(TelemetryLane {
                lane,
                src: telemetry.src.clone(),
            });
        }
    }

    pub fn finish(self) -> TimelineLayout {
        self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = r#"{
        "manifests": [{
            "id": "main",
            "name": "Main",
            "format": "hls",
            "video": [{"id": "v1", "label": "Video",
                       "visualReference": [{"id": "thumbs", "label": "Thumbnails", "src": "t.vtt"}],
                       "analysis": [{"id": "luma", "name": "Luma", "kind": "line_chart", "group": "quality"}]}],
            "audio": [{"id": "en", "label": "English", "language": "en", "channels": 2},
                      {"id": "de", "label": "Deutsch", "language": "de", "channels": 1}],
            "text": [{"id": "sub-en", "label": "English CC", "language": "en", "src": "en.vtt"},
                     {"id": "sub-fr", "label": "French", "language": "fr", "src": "fr.vtt"}],
            "telemetry": [{"id": "gps", "label": "GPS", "src": "gps.json", "parent": "en"}]
        }],
        "trackOrder": ["en", "v1"]
    }"#;

    fn document() -> SessionDocument {
        SessionDocument::from_json(SESSION).unwrap()
    }

    fn build(document: &SessionDocument, subtitles: &[PlayerTrack]) -> TimelineLayout {
        let manifest = &document.manifests[0];
        let mut builder = LaneBuilder::new(manifest, document, 3);
        builder.build_media();
        builder.build_text(subtitles);
        builder.build_telemetry();
        builder.finish()
    }

    fn english_subtitles() -> Vec<PlayerTrack> {
        vec![PlayerTrack {
            id: "0".into(),
            label: "Subtitles".into(),
            language: Some("en".into()),
        }]
    }

    #[test]
    fn test_builds_groups_with_children() {
        let document = document();
        let layout = build(&document, &english_subtitles());

        let video = layout.group(&LaneId::new("video-v1")).unwrap();
        assert_eq!(
            video.children(),
            &[LaneId::new("ref-thumbs"), LaneId::new("analysis-luma")]
        );
        let english = layout.group(&LaneId::new("audio-en")).unwrap();
        assert_eq!(
            english.children(),
            &[
                LaneId::new("channel-en-0"),
                LaneId::new("channel-en-1"),
                LaneId::new("telemetry-gps")
            ]
        );
        assert_eq!(layout.telemetry[0].src, "gps.json");
        assert_eq!(layout.analysis.lanes_in("quality"), vec![LaneId::new("analysis-luma")]);
    }

    #[test]
    fn test_channel_lanes_do_not_collide_across_tracks() {
        let document = SessionDocument::from_json(
            r#"{"manifests": [{
                "id": "m", "name": "M", "format": "hls",
                "video": [{"id": "v1", "label": "Video"}],
                "audio": [{"id": "audio", "label": "Main", "channels": 1},
                          {"id": "channel-0", "label": "Alt", "channels": 1}]
            }]}"#,
        )
        .unwrap();
        let layout = build(&document, &[]);
        let ids = layout.lane_ids();
        let unique: std::collections::HashSet<&LaneId> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.contains(&LaneId::new("channel-audio-0")));
        assert!(ids.contains(&LaneId::new("channel-channel-0-0")));
    }

    #[test]
    fn test_text_lanes_need_player_subtitles() {
        let document = document();
        let layout = build(&document, &english_subtitles());
        assert!(layout.group(&LaneId::new("text-sub-en")).is_some());
        assert!(layout.group(&LaneId::new("text-sub-fr")).is_none());

        let layout = build(&document, &[]);
        assert!(layout.groups.iter().all(|g| g.media() != GroupMedia::Text));
    }

    #[test]
    fn test_children_follow_their_group() {
        let document = document();
        let layout = build(&document, &english_subtitles());
        for spec in layout.lanes.iter() {
            if let Some(parent) = spec.parent.as_ref() {
                let parent_pos = layout.lanes.iter().position(|l| &l.id == parent).unwrap();
                let child_pos = layout.lanes.iter().position(|l| l.id == spec.id).unwrap();
                assert!(parent_pos < child_pos);
            }
        }
    }

    #[test]
    fn test_ordered_lane_ids_follow_track_order() {
        let document = document();
        let layout = build(&document, &[]);
        let order = layout.ordered_lane_ids(document.track_order.as_deref().unwrap_or(&[]));
        assert_eq!(order[0], LaneId::new("audio-en"));
        assert_eq!(order[4], LaneId::new("video-v1"));
    }

    #[test]
    fn test_visible_tracks_filter() {
        let mut document = document();
        document.visible_tracks = Some(vec!["v1".into(), "de".into()]);
        let layout = build(&document, &english_subtitles());
        let keys: Vec<_> = layout.groups.iter().map(|g| g.key().to_string()).collect();
        assert_eq!(keys, vec!["v1", "de"]);
        assert!(layout.telemetry.is_empty());
    }

    #[test]
    fn test_reconcile_audio_by_label_then_language() {
        let document = document();
        let mut layout = build(&document, &[]);
        let tracks = vec![
            PlayerTrack::new("a0", "english"),
            PlayerTrack {
                id: "a1".into(),
                label: "Track 2".into(),
                language: Some("de".into()),
            },
        ];
        layout.reconcile_audio(&document.manifests[0], &tracks);
        assert_eq!(layout.audio_bindings[&LaneId::new("audio-en")].id, "a0");
        assert_eq!(layout.audio_bindings[&LaneId::new("audio-de")].id, "a1");
    }
}
