//! Marker color heuristics.

use crate::constants::SEGMENTATION_PALETTE;
use crate::state::SegmentationTrack;

/// Palette color used by the fewest existing tracks, ties broken by palette order.
pub fn least_used_color(palette: &[String], tracks: &[SegmentationTrack]) -> String {
    palette
        .iter()
        .enumerate()
        .min_by_key(|(index, color)| {
            let uses = tracks
                .iter()
                .filter(|t| t.color.eq_ignore_ascii_case(color))
                .count();
            (uses, *index)
        })
        .map(|(_, color)| color.clone())
        .unwrap_or_else(|| SEGMENTATION_PALETTE[0].to_string())
}

/// The single annotation lane always uses the first palette color.
pub fn annotation_color(palette: &[String]) -> String {
    palette
        .first()
        .cloned()
        .unwrap_or_else(|| SEGMENTATION_PALETTE[0].to_string())
}
