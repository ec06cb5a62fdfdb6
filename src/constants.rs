//! Shared defaults such as palette colors and timing constants.
//! Runtime values live in `SessionSettings`; these only seed its defaults.

pub const SEGMENTATION_PALETTE: [&str; 8] = [
    "#f97316", "#3b82f6", "#22c55e", "#eab308", "#a855f7", "#ec4899", "#14b8a6", "#ef4444",
];

pub const SPLIT_HIGHLIGHT_COLOR: &str = "#fafafa";

pub const DEFAULT_EASED_CHILDREN_LIMIT: usize = 3;
pub const DEFAULT_LANE_EASE_MS: u64 = 200;
pub const DEFAULT_MARKER_DELETE_DELAY_MS: u64 = 1000;
pub const DEFAULT_MARKER_FADE_MS: u64 = 300;

pub const DEFAULT_MAX_CUES: usize = 3;
pub const DEFAULT_CUE_GRACE_SECONDS: f64 = 1.5;
pub const DEFAULT_CUE_FADE_OUT_MS: u64 = 300;

pub const DEFAULT_FRAME_RATE: f64 = 25.0;

pub const ANNOTATION_LANE_ID: &str = "annotations";
pub const UNGROUPED_ANALYSIS_GROUP: &str = "ungrouped";
