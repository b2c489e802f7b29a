//! Words-per-minute from lyric word count and track duration.
//!
//! The undefined case (unknown duration, zero-length track, no lyrics) is
//! reported as 0.0, which is also what gets persisted.

use crate::models::TrackDuration;

/// Sentinel for a rate that cannot be computed.
pub const WPM_UNDEFINED: f64 = 0.0;

/// Number of whitespace-delimited tokens in `text`.
pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// `word_count / total_minutes`, or `WPM_UNDEFINED` when either side is missing.
pub fn words_per_minute(word_count: u32, duration: TrackDuration) -> f64 {
    match duration.total_minutes() {
        Some(minutes) if minutes > 0.0 && word_count > 0 => word_count as f64 / minutes,
        _ => WPM_UNDEFINED,
    }
}

/// Same as `words_per_minute` for persisted `m:ss` text.
/// Malformed text is treated like the `Unknown` sentinel.
pub fn words_per_minute_str(word_count: u32, duration: &str) -> f64 {
    words_per_minute(
        word_count,
        TrackDuration::parse(duration).unwrap_or(TrackDuration::Unknown),
    )
}
