//! Frame math shared by marker geometry and seeking.

/// Convert seconds to frame units using the given fps.
pub fn frames_from_seconds(time_seconds: f64, fps: f64) -> f64 {
    time_seconds * fps.max(1.0)
}

/// Convert frame units back to seconds using the given fps.
pub fn seconds_from_frames(frames: f64, fps: f64) -> f64 {
    let fps = fps.max(1.0);
    frames / fps
}

/// Duration of a single frame in seconds.
pub fn frame_duration(fps: f64) -> f64 {
    seconds_from_frames(1.0, fps)
}

/// Round a time value to the nearest frame boundary.
pub fn snap_time_to_frame(time_seconds: f64, fps: f64) -> f64 {
    let fps = fps.max(1.0);
    (time_seconds * fps).round() / fps
}

/// Midpoint of a period and the first frame after it.
///
/// Returns `(mid, next_start)`; the second half of a split begins one frame
/// after the first half ends so the two periods never share a frame.
pub fn split_point(start: f64, end: f64, fps: f64) -> (f64, f64) {
    let mid = start + (end - start) / 2.0;
    (mid, mid + frame_duration(fps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let frames = frames_from_seconds(2.0, 25.0);
        assert_eq!(frames, 50.0);
        assert_eq!(seconds_from_frames(frames, 25.0), 2.0);
    }

    #[test]
    fn test_snap_time_to_frame() {
        assert!((snap_time_to_frame(1.013, 25.0) - 1.0).abs() < 1e-9);
        assert!((snap_time_to_frame(1.03, 25.0) - 1.04).abs() < 1e-9);
    }

    #[test]
    fn test_fps_floor_guards_zero() {
        assert_eq!(frame_duration(0.0), 1.0);
        assert_eq!(seconds_from_frames(10.0, 0.0), 10.0);
    }

    #[test]
    fn test_split_point() {
        let (mid, next) = split_point(0.0, 10.0, 25.0);
        assert_eq!(mid, 5.0);
        assert!((next - (5.0 + 1.0 / 25.0)).abs() < 1e-12);
    }
}
