//! Core data models for chart enrichment.
//!
//! This module contains the entry, track, and record types that flow through
//! the pipeline, plus the run statistics written at the end of each phase.

use serde::Serialize;
use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Nominal catalog size. Aggregation and truncation both cap ranks here.
pub const MAX_RANK: u32 = 100;

/// Persisted marker for a duration the metadata provider could not resolve.
pub const UNKNOWN_DURATION: &str = "Unknown";

// ============================================================================
// Source Models
// ============================================================================

/// One position of the aggregated chart. Immutable once aggregated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub rank: u32,
    pub artist: String,
    pub title: String,
}

impl RankedEntry {
    pub fn new(rank: u32, artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            rank,
            artist: artist.into(),
            title: title.into(),
        }
    }
}

/// Normalized (artist, title) pair used for queries and duplicate detection.
/// Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormalizedKey {
    pub artist_norm: String,
    pub title_norm: String,
}

// ============================================================================
// Duration
// ============================================================================

/// Track length as persisted: `m:ss` text or the `Unknown` sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackDuration {
    Known { minutes: u32, seconds: u32 },
    Unknown,
}

impl TrackDuration {
    /// Build from a provider duration in milliseconds, rounded to the nearest second.
    /// Negative values are treated as unresolved.
    pub fn from_millis(ms: i64) -> Self {
        if ms < 0 {
            return TrackDuration::Unknown;
        }
        let total_secs = ((ms + 500) / 1000) as u32;
        TrackDuration::Known {
            minutes: total_secs / 60,
            seconds: total_secs % 60,
        }
    }

    /// Parse persisted text. Returns None for anything that is neither
    /// `m:ss` nor the sentinel.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s == UNKNOWN_DURATION {
            return Some(TrackDuration::Unknown);
        }
        let (mins, secs) = s.split_once(':')?;
        let minutes: u32 = mins.trim().parse().ok()?;
        let seconds: u32 = secs.trim().parse().ok()?;
        if seconds >= 60 {
            return None;
        }
        Some(TrackDuration::Known { minutes, seconds })
    }

    /// Total length in minutes (`minutes + seconds / 60`), None when unknown.
    pub fn total_minutes(&self) -> Option<f64> {
        match self {
            TrackDuration::Known { minutes, seconds } => {
                Some(*minutes as f64 + *seconds as f64 / 60.0)
            }
            TrackDuration::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, TrackDuration::Known { .. })
    }
}

impl fmt::Display for TrackDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackDuration::Known { minutes, seconds } => write!(f, "{}:{:02}", minutes, seconds),
            TrackDuration::Unknown => f.write_str(UNKNOWN_DURATION),
        }
    }
}

// ============================================================================
// Provider Models
// ============================================================================

/// Raw candidate returned by a metadata provider search, best first.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackCandidate {
    pub external_id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub popularity: i32, // 0-100
    pub duration_ms: i64,
}

/// Track record attached to an entry after a successful match.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalTrack {
    pub external_id: String,
    pub popularity: i32,
    pub album: String,
    pub duration: TrackDuration,
}

impl From<&TrackCandidate> for ExternalTrack {
    fn from(c: &TrackCandidate) -> Self {
        Self {
            external_id: c.external_id.clone(),
            popularity: c.popularity,
            album: c.album.clone(),
            duration: TrackDuration::from_millis(c.duration_ms),
        }
    }
}

/// Lyric-derived statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LyricStats {
    pub word_count: u32,
}

/// Result of a provider lookup after every fallback and retry is spent.
/// NotFound is a normal terminal state, not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(&self) -> Option<&T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

// ============================================================================
// Persisted Models
// ============================================================================

/// Row of the `songs` table.
///
/// `popularity` and `word_count` are NULL until resolved. `wpm` uses 0.0 as
/// its "undefined" sentinel once written.
#[derive(Clone, Debug, PartialEq)]
pub struct SongRecord {
    pub rank: u32,
    pub title: String,
    pub artist: String,
    pub popularity: Option<i32>,
    pub word_count: Option<u32>,
    pub duration: TrackDuration,
    pub wpm: Option<f64>,
    pub album: Option<String>,
    pub external_id: Option<String>,
}

impl SongRecord {
    /// Row still lacks a resolved track (duration or popularity).
    pub fn needs_metadata(&self) -> bool {
        !self.duration.is_known() || self.popularity.is_none()
    }

    /// Row has no usable lyric count.
    pub fn needs_lyrics(&self) -> bool {
        matches!(self.word_count, None | Some(0))
    }
}

/// Optional column values for an upsert. `None` means "leave as is".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SongFields {
    pub popularity: Option<i32>,
    pub word_count: Option<u32>,
    pub duration: Option<TrackDuration>,
    pub wpm: Option<f64>,
    pub album: Option<String>,
    pub external_id: Option<String>,
}

/// One pending write keyed by (artist, title).
#[derive(Clone, Debug, PartialEq)]
pub struct SongWrite {
    pub rank: u32,
    pub artist: String,
    pub title: String,
    pub fields: SongFields,
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Counters for one enrichment run.
#[derive(Default, Debug, Clone, Serialize)]
pub struct RunStats {
    pub total_entries: usize,
    pub skipped_completed: usize,
    pub processed: usize,
    pub duplicate_keys: usize,

    // Metadata matcher
    pub metadata_matched: usize,
    pub metadata_fallback_matches: usize,
    pub metadata_unmatched: usize,
    pub low_confidence_matches: usize,

    // Lyric fetcher
    pub lyrics_found: usize,
    pub lyrics_missing: usize,

    // Provider traffic
    pub provider_calls: usize,
    pub transient_retries: usize,

    pub batches_committed: usize,
    pub elapsed_seconds: f64,
}

impl RunStats {
    /// Metadata match rate over processed entries, as a percentage.
    pub fn match_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            100.0 * self.metadata_matched as f64 / self.processed as f64
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Counters for one backfill pass.
#[derive(Default, Debug, Clone, Serialize)]
pub struct BackfillStats {
    pub rows_scanned: usize,
    pub metadata_attempted: usize,
    pub metadata_filled: usize,
    pub lyrics_attempted: usize,
    pub lyrics_filled: usize,
    pub rows_updated: usize,
    pub provider_calls: usize,
    pub transient_retries: usize,
    pub elapsed_seconds: f64,
}

impl BackfillStats {
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_millis() {
        assert_eq!(
            TrackDuration::from_millis(228_000),
            TrackDuration::Known { minutes: 3, seconds: 48 }
        );
        // Rounds to the nearest second
        assert_eq!(TrackDuration::from_millis(227_600).to_string(), "3:48");
        assert_eq!(TrackDuration::from_millis(59_400).to_string(), "0:59");
        assert_eq!(TrackDuration::from_millis(-1), TrackDuration::Unknown);
    }

    #[test]
    fn test_duration_parse() {
        assert_eq!(
            TrackDuration::parse("3:48"),
            Some(TrackDuration::Known { minutes: 3, seconds: 48 })
        );
        assert_eq!(TrackDuration::parse("Unknown"), Some(TrackDuration::Unknown));
        assert_eq!(TrackDuration::parse("12:05").map(|d| d.to_string()), Some("12:05".to_string()));
        assert_eq!(TrackDuration::parse("3:75"), None);
        assert_eq!(TrackDuration::parse("abc"), None);
        assert_eq!(TrackDuration::parse(""), None);
    }

    #[test]
    fn test_total_minutes() {
        let d = TrackDuration::parse("3:48").unwrap();
        assert!((d.total_minutes().unwrap() - 3.8).abs() < 1e-9);
        assert_eq!(TrackDuration::Unknown.total_minutes(), None);
    }

    #[test]
    fn test_record_needs() {
        let mut record = SongRecord {
            rank: 1,
            title: "T".into(),
            artist: "A".into(),
            popularity: Some(50),
            word_count: Some(0),
            duration: TrackDuration::Unknown,
            wpm: Some(0.0),
            album: None,
            external_id: None,
        };
        assert!(record.needs_metadata());
        assert!(record.needs_lyrics());

        record.duration = TrackDuration::Known { minutes: 3, seconds: 0 };
        record.word_count = Some(120);
        assert!(!record.needs_metadata());
        assert!(!record.needs_lyrics());
    }

    #[test]
    fn test_match_rate() {
        let stats = RunStats {
            processed: 4,
            metadata_matched: 3,
            ..Default::default()
        };
        assert!((stats.match_rate() - 75.0).abs() < 1e-9);
        assert_eq!(RunStats::default().match_rate(), 0.0);
    }
}
