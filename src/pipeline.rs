//! Pipeline orchestration.
//!
//! Per entry: match metadata, fetch lyrics, compute wpm, then upsert.
//! Entries are committed in batches of `PipelineConfig::batch_size`, so an
//! interrupted run loses at most the batch in flight. A rank completed by an
//! earlier run is skipped only while it still holds the same (artist, title);
//! a different pair at that rank stops the run before any provider is called.

use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use rayon::ThreadPool;
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::StoreError;
use crate::lyrics::{LyricFetcher, LyricReport, LyricsProvider};
use crate::matcher::{MatchReport, MetadataMatcher, MetadataProvider};
use crate::metrics::words_per_minute;
use crate::models::{
    BackfillStats, Lookup, RankedEntry, RunStats, SongFields, SongRecord, SongWrite, TrackDuration,
};
use crate::normalize::normalize_key;
use crate::progress::{create_progress_bar, format_duration, log_progress};
use crate::store::SongStore;

/// One entry after both lookups, ready to be written.
#[derive(Debug, Clone)]
pub struct Enriched {
    pub write: SongWrite,
    pub metadata: MatchReport,
    pub lyrics: LyricReport,
}

/// Outcome of backfilling one stored row.
#[derive(Debug, Clone, Default)]
struct Backfilled {
    rank: u32,
    fields: SongFields,
    metadata_attempted: bool,
    metadata_filled: bool,
    lyrics_attempted: bool,
    lyrics_filled: bool,
    calls: u32,
    retries: u32,
}

pub struct Pipeline<M, L> {
    matcher: MetadataMatcher<M>,
    fetcher: LyricFetcher<L>,
    config: PipelineConfig,
}

impl<M: MetadataProvider, L: LyricsProvider> Pipeline<M, L> {
    pub fn new(matcher: MetadataMatcher<M>, fetcher: LyricFetcher<L>, config: PipelineConfig) -> Self {
        Self {
            matcher,
            fetcher,
            config,
        }
    }

    pub fn matcher(&self) -> &MetadataMatcher<M> {
        &self.matcher
    }

    pub fn fetcher(&self) -> &LyricFetcher<L> {
        &self.fetcher
    }

    /// Run both lookups for one entry and build its write.
    ///
    /// `word_count` and `wpm` are always set (0 when undefined) so the row
    /// counts as completed. Metadata columns are only set on a match.
    pub fn enrich(&self, entry: &RankedEntry) -> Enriched {
        let metadata = self.matcher.match_track(&entry.title, &entry.artist);
        let lyrics = self.fetcher.fetch(&entry.title, &entry.artist);

        let word_count = lyrics.word_count();
        let mut fields = SongFields {
            word_count: Some(word_count),
            ..Default::default()
        };

        let duration = match &metadata.lookup {
            Lookup::Found(track) => {
                fields.popularity = Some(track.popularity);
                fields.duration = Some(track.duration);
                fields.album = Some(track.album.clone());
                fields.external_id = Some(track.external_id.clone());
                track.duration
            }
            Lookup::NotFound => TrackDuration::Unknown,
        };
        fields.wpm = Some(words_per_minute(word_count, duration));

        Enriched {
            write: SongWrite {
                rank: entry.rank,
                artist: entry.artist.clone(),
                title: entry.title.clone(),
                fields,
            },
            metadata,
            lyrics,
        }
    }

    fn thread_pool(&self) -> Result<Option<ThreadPool>> {
        if self.config.workers <= 1 {
            return Ok(None);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .context("Failed to build enrichment thread pool")?;
        Ok(Some(pool))
    }

    /// Map `items` through `f`, in parallel when a pool is given.
    /// Output order always matches input order.
    fn map_chunk<T, R, F>(pool: Option<&ThreadPool>, items: &[T], pb: &ProgressBar, f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        let step = |item: &T| {
            let result = f(item);
            pb.inc(1);
            result
        };
        match pool {
            Some(pool) => pool.install(|| items.par_iter().map(step).collect()),
            None => items.iter().map(step).collect(),
        }
    }

    /// Enrich every pending entry and persist the results.
    ///
    /// Returns an error only for store failures; the batch in flight is then
    /// rolled back and earlier batches stay committed.
    pub fn run(&self, store: &mut SongStore, entries: &[RankedEntry]) -> Result<RunStats> {
        let start = Instant::now();
        let mut stats = RunStats {
            total_entries: entries.len(),
            ..Default::default()
        };

        let completed = store
            .completed_songs()
            .context("Failed to read completed ranks")?;
        let completed_pairs: FxHashSet<(&str, &str)> = completed
            .values()
            .map(|(artist, title)| (artist.as_str(), title.as_str()))
            .collect();

        let mut seen_pairs = FxHashSet::default();
        let mut seen_keys = FxHashSet::default();
        let mut pending = Vec::with_capacity(entries.len());
        for entry in entries.iter().filter(|e| e.rank <= self.config.max_rank) {
            let pair = (entry.artist.as_str(), entry.title.as_str());
            if !seen_pairs.insert(pair) {
                // The earlier rank owns the row
                warn!(
                    rank = entry.rank,
                    artist = %entry.artist,
                    title = %entry.title,
                    "Song listed twice in chart, keeping the earlier rank"
                );
                stats.duplicate_keys += 1;
                continue;
            }

            let key = normalize_key(entry);
            if !seen_keys.insert(key.clone()) {
                warn!(
                    rank = entry.rank,
                    artist = %entry.artist,
                    title = %entry.title,
                    "Duplicate normalized key ({} / {})",
                    key.artist_norm,
                    key.title_norm
                );
                stats.duplicate_keys += 1;
            }
            match completed.get(&entry.rank) {
                Some((artist, title)) if *artist == entry.artist && *title == entry.title => {
                    stats.skipped_completed += 1;
                }
                Some((artist, title)) => {
                    return Err(anyhow::Error::new(StoreError::RankConflict {
                        rank: entry.rank,
                        existing_artist: artist.clone(),
                        existing_title: title.clone(),
                        artist: entry.artist.clone(),
                        title: entry.title.clone(),
                    })
                    .context("Chart differs from the stored catalog"));
                }
                None if completed_pairs.contains(&pair) => {
                    debug!(
                        rank = entry.rank,
                        artist = %entry.artist,
                        title = %entry.title,
                        "Already completed at another rank"
                    );
                    stats.skipped_completed += 1;
                }
                None => pending.push(entry.clone()),
            }
        }

        info!(
            "Enriching {} entries ({} already completed)",
            pending.len(),
            stats.skipped_completed
        );

        let pool = self.thread_pool()?;
        let batch_size = self.config.batch_size.max(1);
        let total = pending.len() as u64;
        let pb = create_progress_bar(total, "Enriching entries");

        for chunk in pending.chunks(batch_size) {
            let enriched = Self::map_chunk(pool.as_ref(), chunk, &pb, |entry| self.enrich(entry));

            let writes: Vec<SongWrite> = enriched.iter().map(|e| e.write.clone()).collect();
            let first = chunk.first().map_or(0, |e| e.rank);
            let last = chunk.last().map_or(0, |e| e.rank);
            store
                .write_batch(&writes)
                .with_context(|| format!("Failed to commit batch for ranks {}..={}", first, last))?;

            stats.batches_committed += 1;
            for e in &enriched {
                record_entry(&mut stats, e);
            }
            log_progress("enrich", stats.processed as u64, total, batch_size as u64);
        }

        pb.finish_with_message(format!("Enriched {} entries", stats.processed));
        stats.elapsed_seconds = start.elapsed().as_secs_f64();
        info!(
            "Run finished in {}: {} processed, {:.1}% matched",
            format_duration(start.elapsed()),
            stats.processed,
            stats.match_rate()
        );
        stats.log_phase("run");
        Ok(stats)
    }

    fn backfill_one(&self, record: &SongRecord) -> Backfilled {
        let mut out = Backfilled {
            rank: record.rank,
            ..Default::default()
        };
        let mut duration = record.duration;
        let mut word_count = record.word_count.unwrap_or(0);

        if record.needs_metadata() {
            out.metadata_attempted = true;
            let report = self.matcher.match_track(&record.title, &record.artist);
            out.calls += report.calls;
            out.retries += report.retries;
            if let Lookup::Found(track) = report.lookup {
                out.metadata_filled = true;
                if !duration.is_known() {
                    duration = track.duration;
                }
                out.fields.popularity = Some(track.popularity);
                out.fields.duration = Some(track.duration);
                out.fields.album = Some(track.album);
                out.fields.external_id = Some(track.external_id);
            }
        }

        if record.needs_lyrics() {
            out.lyrics_attempted = true;
            let report = self.fetcher.fetch(&record.title, &record.artist);
            out.calls += report.calls;
            out.retries += report.retries;
            word_count = report.word_count();
            out.lyrics_filled = word_count > 0;
            out.fields.word_count = Some(word_count);
        }

        if record.wpm.map_or(true, |wpm| wpm == 0.0) {
            out.fields.wpm = Some(words_per_minute(word_count, duration));
        }

        out
    }

    /// Retry lookups for stored rows that still carry sentinels, writing
    /// only into the columns that are missing.
    pub fn backfill(&self, store: &mut SongStore) -> Result<BackfillStats> {
        let start = Instant::now();
        let candidates = store
            .backfill_candidates()
            .context("Failed to read backfill candidates")?;
        let mut stats = BackfillStats {
            rows_scanned: candidates.len(),
            ..Default::default()
        };
        info!("Backfilling {} rows", candidates.len());

        let pool = self.thread_pool()?;
        let batch_size = self.config.batch_size.max(1);
        let total = candidates.len() as u64;
        let pb = create_progress_bar(total, "Backfilling rows");
        let mut done = 0u64;

        for chunk in candidates.chunks(batch_size) {
            let results = Self::map_chunk(pool.as_ref(), chunk, &pb, |record| self.backfill_one(record));

            let updates: Vec<(u32, SongFields)> = results
                .iter()
                .filter(|r| r.fields != SongFields::default())
                .map(|r| (r.rank, r.fields.clone()))
                .collect();
            stats.rows_updated += store
                .fill_missing_batch(&updates)
                .context("Failed to commit backfill batch")?;

            for r in &results {
                stats.metadata_attempted += r.metadata_attempted as usize;
                stats.metadata_filled += r.metadata_filled as usize;
                stats.lyrics_attempted += r.lyrics_attempted as usize;
                stats.lyrics_filled += r.lyrics_filled as usize;
                stats.provider_calls += r.calls as usize;
                stats.transient_retries += r.retries as usize;
            }
            done += chunk.len() as u64;
            log_progress("backfill", done, total, batch_size as u64);
        }

        pb.finish_with_message(format!("Backfilled {} rows", stats.rows_updated));
        stats.elapsed_seconds = start.elapsed().as_secs_f64();
        stats.log_phase("backfill");
        Ok(stats)
    }
}

fn record_entry(stats: &mut RunStats, e: &Enriched) {
    stats.processed += 1;
    if e.metadata.lookup.is_found() {
        stats.metadata_matched += 1;
        if e.metadata.used_fallback() {
            stats.metadata_fallback_matches += 1;
        }
        if e.metadata.is_low_confidence() {
            stats.low_confidence_matches += 1;
        }
    } else {
        stats.metadata_unmatched += 1;
    }
    if e.lyrics.lookup.is_found() {
        stats.lyrics_found += 1;
    } else {
        stats.lyrics_missing += 1;
    }
    stats.provider_calls += (e.metadata.calls + e.lyrics.calls) as usize;
    stats.transient_retries += (e.metadata.retries + e.lyrics.retries) as usize;
}
