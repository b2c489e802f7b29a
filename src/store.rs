//! SQLite persistence for the song catalog.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE songs (
//!     rank        INTEGER PRIMARY KEY,
//!     title       TEXT NOT NULL,
//!     artist      TEXT NOT NULL,
//!     popularity  INTEGER,                            -- NULL until matched
//!     word_count  INTEGER,                            -- 0 when lyrics unavailable
//!     duration    TEXT NOT NULL DEFAULT 'Unknown',    -- m:ss
//!     wpm         REAL,                               -- 0.0 when undefined
//!     album       TEXT,
//!     external_id TEXT,
//!     UNIQUE(artist, title)
//! );
//! ```
//!
//! Migrations are versioned in `schema_migrations` and only ever add tables,
//! indexes, or columns. A table left by an older tool without `duration`/`wpm`
//! gains them in place; existing rows are kept.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::models::{SongFields, SongRecord, SongWrite, TrackDuration, UNKNOWN_DURATION};

// ============================================================================
// Migrations
// ============================================================================

struct Migration {
    version: u32,
    name: &'static str,
    apply: fn(&Connection) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_songs",
        apply: create_songs,
    },
    Migration {
        version: 2,
        name: "add_duration_and_wpm",
        apply: add_duration_and_wpm,
    },
    Migration {
        version: 3,
        name: "add_album_and_external_id",
        apply: add_album_and_external_id,
    },
];

/// Latest schema version this build knows about.
pub const SCHEMA_VERSION: u32 = 3;

fn create_songs(conn: &Connection) -> rusqlite::Result<()> {
    // The unique index also covers tables created before the constraint existed.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS songs (
            rank INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            popularity INTEGER,
            word_count INTEGER,
            UNIQUE(artist, title)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_songs_artist_title ON songs(artist, title);",
    )
}

fn add_duration_and_wpm(conn: &Connection) -> rusqlite::Result<()> {
    add_column_if_missing(conn, "songs", "duration", "TEXT NOT NULL DEFAULT 'Unknown'")?;
    add_column_if_missing(conn, "songs", "wpm", "REAL")?;
    // An older tool may have left a nullable duration column behind
    let filled = conn.execute(
        "UPDATE songs SET duration = ?1 WHERE duration IS NULL",
        [UNKNOWN_DURATION],
    )?;
    if filled > 0 {
        info!("Marked {} NULL durations as {}", filled, UNKNOWN_DURATION);
    }
    Ok(())
}

fn add_album_and_external_id(conn: &Connection) -> rusqlite::Result<()> {
    add_column_if_missing(conn, "songs", "album", "TEXT")?;
    add_column_if_missing(conn, "songs", "external_id", "TEXT")?;
    Ok(())
}

fn column_names(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Additive column change. Returns true when the column was added.
fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> rusqlite::Result<bool> {
    if column_names(conn, table)?.iter().any(|c| c.eq_ignore_ascii_case(column)) {
        return Ok(false);
    }
    conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))?;
    info!("Added column {}.{}", table, column);
    Ok(true)
}

fn migrate(conn: &mut Connection) -> StoreResult<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        (migration.apply)(&tx).map_err(|source| StoreError::Migration {
            version: migration.version,
            name: migration.name,
            source,
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        info!("Applied migration {} ({})", migration.version, migration.name);
    }

    Ok(current.max(SCHEMA_VERSION))
}

// ============================================================================
// Row Mapping
// ============================================================================

const SELECT_SONG: &str = "SELECT rank, title, artist, popularity, word_count, duration, wpm, album, external_id
     FROM songs";

/// Record plus its raw duration text, parsed after the row is read so a bad
/// value surfaces as `StoreError::Malformed`. NULL reads as the sentinel.
fn read_row(row: &Row) -> rusqlite::Result<(SongRecord, String)> {
    let record = SongRecord {
        rank: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        popularity: row.get(3)?,
        word_count: row.get(4)?,
        duration: TrackDuration::Unknown,
        wpm: row.get(6)?,
        album: row.get(7)?,
        external_id: row.get(8)?,
    };
    let duration: Option<String> = row.get(5)?;
    Ok((record, duration.unwrap_or_else(|| UNKNOWN_DURATION.to_string())))
}

fn finish_row((mut record, duration): (SongRecord, String)) -> StoreResult<SongRecord> {
    record.duration = TrackDuration::parse(&duration).ok_or_else(|| StoreError::Malformed {
        rank: record.rank,
        reason: format!("unparseable duration '{}'", duration),
    })?;
    Ok(record)
}

fn duration_param(duration: Option<TrackDuration>) -> Option<String> {
    duration.map(|d| d.to_string())
}

// ============================================================================
// Writes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub inserted: usize,
    pub updated: usize,
}

fn upsert_on(conn: &Connection, write: &SongWrite) -> StoreResult<UpsertOutcome> {
    let occupant: Option<(String, String)> = conn
        .query_row(
            "SELECT artist, title FROM songs WHERE rank = ?1",
            [write.rank],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((existing_artist, existing_title)) = occupant {
        if existing_artist != write.artist || existing_title != write.title {
            return Err(StoreError::RankConflict {
                rank: write.rank,
                existing_artist,
                existing_title,
                artist: write.artist.clone(),
                title: write.title.clone(),
            });
        }
    }

    let f = &write.fields;
    let updated = conn
        .prepare_cached(
            "UPDATE songs SET
                popularity = COALESCE(?1, popularity),
                word_count = COALESCE(?2, word_count),
                duration = COALESCE(?3, duration),
                wpm = COALESCE(?4, wpm),
                album = COALESCE(?5, album),
                external_id = COALESCE(?6, external_id)
             WHERE artist = ?7 AND title = ?8",
        )?
        .execute(params![
            f.popularity,
            f.word_count,
            duration_param(f.duration),
            f.wpm,
            f.album,
            f.external_id,
            write.artist,
            write.title,
        ])?;

    if updated > 0 {
        return Ok(UpsertOutcome::Updated);
    }

    conn.prepare_cached(
        "INSERT INTO songs (rank, title, artist, popularity, word_count, duration, wpm, album, external_id)
         VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, ?10), ?7, ?8, ?9)",
    )?
    .execute(params![
        write.rank,
        write.title,
        write.artist,
        f.popularity,
        f.word_count,
        duration_param(f.duration),
        f.wpm,
        f.album,
        f.external_id,
        UNKNOWN_DURATION,
    ])?;
    Ok(UpsertOutcome::Inserted)
}

fn fill_missing_on(conn: &Connection, rank: u32, fields: &SongFields) -> StoreResult<bool> {
    let changed = conn
        .prepare_cached(
            "UPDATE songs SET
                popularity = COALESCE(popularity, ?2),
                word_count = CASE WHEN word_count IS NULL OR word_count = 0
                                  THEN COALESCE(?3, word_count) ELSE word_count END,
                duration = CASE WHEN duration = ?8
                                THEN COALESCE(?4, duration) ELSE duration END,
                wpm = CASE WHEN wpm IS NULL OR wpm = 0
                           THEN COALESCE(?5, wpm) ELSE wpm END,
                album = COALESCE(album, ?6),
                external_id = COALESCE(external_id, ?7)
             WHERE rank = ?1",
        )?
        .execute(params![
            rank,
            fields.popularity,
            fields.word_count,
            duration_param(fields.duration),
            fields.wpm,
            fields.album,
            fields.external_id,
            UNKNOWN_DURATION,
        ])?;
    Ok(changed > 0)
}

// ============================================================================
// Store
// ============================================================================

/// Owns the single database connection for a run.
///
/// Dropping the store closes the connection; `close` does the same but
/// reports errors.
pub struct SongStore {
    conn: Connection,
}

impl SongStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection and bring its schema up to date.
    pub fn from_connection(mut conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        let version = migrate(&mut conn)?;
        debug!("Song store ready at schema version {}", version);
        Ok(Self { conn })
    }

    pub fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }

    pub fn schema_version(&self) -> StoreResult<u32> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?)
    }

    /// Insert or update one song keyed by (artist, title), in autocommit mode.
    /// Only fields set in `fields` are written on update.
    pub fn upsert(
        &self,
        rank: u32,
        artist: &str,
        title: &str,
        fields: &SongFields,
    ) -> StoreResult<UpsertOutcome> {
        upsert_on(
            &self.conn,
            &SongWrite {
                rank,
                artist: artist.to_string(),
                title: title.to_string(),
                fields: fields.clone(),
            },
        )
    }

    /// Apply every write in one transaction. On error nothing from the batch
    /// is visible.
    pub fn write_batch(&mut self, writes: &[SongWrite]) -> StoreResult<BatchSummary> {
        let tx = self.conn.transaction()?;
        let mut summary = BatchSummary::default();
        for write in writes {
            match upsert_on(&tx, write)? {
                UpsertOutcome::Inserted => summary.inserted += 1,
                UpsertOutcome::Updated => summary.updated += 1,
            }
        }
        tx.commit()?;
        Ok(summary)
    }

    /// Write values only into columns that are NULL or hold a sentinel.
    pub fn fill_missing(&self, rank: u32, fields: &SongFields) -> StoreResult<bool> {
        fill_missing_on(&self.conn, rank, fields)
    }

    /// `fill_missing` for many rows in one transaction. Returns rows touched.
    pub fn fill_missing_batch(&mut self, updates: &[(u32, SongFields)]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let mut touched = 0;
        for (rank, fields) in updates {
            if fill_missing_on(&tx, *rank, fields)? {
                touched += 1;
            }
        }
        tx.commit()?;
        Ok(touched)
    }

    /// Delete every row ranked below `max_rank`. Returns rows removed.
    pub fn truncate(&self, max_rank: u32) -> StoreResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM songs WHERE rank > ?1", [max_rank])?;
        info!("Truncated {} rows beyond rank {}", removed, max_rank);
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn row_count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Ranks whose entries were fully processed by a previous run.
    pub fn completed_ranks(&self) -> StoreResult<BTreeSet<u32>> {
        Ok(self.completed_songs()?.into_keys().collect())
    }

    /// Fully processed rows as rank -> (artist, title).
    pub fn completed_songs(&self) -> StoreResult<BTreeMap<u32, (String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT rank, artist, title FROM songs WHERE word_count IS NOT NULL AND wpm IS NOT NULL",
        )?;
        let songs = stmt
            .query_map([], |row| Ok((row.get(0)?, (row.get(1)?, row.get(2)?))))?
            .collect::<rusqlite::Result<BTreeMap<u32, (String, String)>>>()?;
        Ok(songs)
    }

    pub fn record(&self, rank: u32) -> StoreResult<Option<SongRecord>> {
        let raw = self
            .conn
            .query_row(&format!("{} WHERE rank = ?1", SELECT_SONG), [rank], read_row)
            .optional()?;
        raw.map(finish_row).transpose()
    }

    pub fn find(&self, artist: &str, title: &str) -> StoreResult<Option<SongRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("{} WHERE artist = ?1 AND title = ?2", SELECT_SONG),
                [artist, title],
                read_row,
            )
            .optional()?;
        raw.map(finish_row).transpose()
    }

    pub fn records(&self) -> StoreResult<Vec<SongRecord>> {
        self.query_records(&format!("{} ORDER BY rank", SELECT_SONG))
    }

    /// Rows with an unresolved track or missing lyric count.
    pub fn backfill_candidates(&self) -> StoreResult<Vec<SongRecord>> {
        self.query_records(&format!(
            "{} WHERE duration = '{}' OR duration IS NULL OR popularity IS NULL
                 OR word_count IS NULL OR word_count = 0
             ORDER BY rank",
            SELECT_SONG, UNKNOWN_DURATION
        ))
    }

    fn query_records(&self, sql: &str) -> StoreResult<Vec<SongRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt
            .query_map([], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(finish_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(popularity: Option<i32>, word_count: Option<u32>, duration: Option<&str>) -> SongFields {
        SongFields {
            popularity,
            word_count,
            duration: duration.map(|d| TrackDuration::parse(d).unwrap()),
            ..Default::default()
        }
    }

    fn write(rank: u32, artist: &str, title: &str, f: SongFields) -> SongWrite {
        SongWrite {
            rank,
            artist: artist.to_string(),
            title: title.to_string(),
            fields: f,
        }
    }

    #[test]
    fn test_fresh_schema() {
        let store = SongStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        let cols = column_names(&store.conn, "songs").unwrap();
        for expected in ["rank", "title", "artist", "popularity", "word_count", "duration", "wpm", "album", "external_id"] {
            assert!(cols.iter().any(|c| c == expected), "missing column {}", expected);
        }
    }

    #[test]
    fn test_upsert_idempotent() {
        let store = SongStore::open_in_memory().unwrap();
        let f = fields(Some(50), None, None);
        assert_eq!(store.upsert(1, "A", "T", &f).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(1, "A", "T", &f).unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.row_count().unwrap(), 1);

        let record = store.find("A", "T").unwrap().unwrap();
        assert_eq!(record.popularity, Some(50));
        assert_eq!(record.duration, TrackDuration::Unknown);
        assert_eq!(record.word_count, None);
    }

    #[test]
    fn test_upsert_updates_only_provided_fields() {
        let store = SongStore::open_in_memory().unwrap();
        store.upsert(1, "A", "T", &fields(Some(50), Some(300), Some("3:00"))).unwrap();
        store.upsert(1, "A", "T", &fields(Some(65), None, None)).unwrap();

        let record = store.record(1).unwrap().unwrap();
        assert_eq!(record.popularity, Some(65));
        assert_eq!(record.word_count, Some(300));
        assert_eq!(record.duration.to_string(), "3:00");
    }

    #[test]
    fn test_rank_conflict_is_error() {
        let store = SongStore::open_in_memory().unwrap();
        store.upsert(1, "A", "T", &SongFields::default()).unwrap();
        let err = store.upsert(1, "B", "U", &SongFields::default()).unwrap_err();
        assert!(matches!(err, StoreError::RankConflict { rank: 1, .. }));
    }

    #[test]
    fn test_existing_song_keeps_its_rank() {
        let store = SongStore::open_in_memory().unwrap();
        store.upsert(4, "A", "T", &SongFields::default()).unwrap();
        store.upsert(9, "A", "T", &fields(Some(10), None, None)).unwrap();
        assert_eq!(store.row_count().unwrap(), 1);
        assert_eq!(store.find("A", "T").unwrap().unwrap().rank, 4);
    }

    #[test]
    fn test_write_batch_is_atomic() {
        let mut store = SongStore::open_in_memory().unwrap();
        store.upsert(2, "Existing", "Song", &SongFields::default()).unwrap();

        let batch = vec![
            write(1, "A", "T", fields(Some(1), Some(10), None)),
            write(2, "Other", "Song", SongFields::default()),
        ];
        assert!(store.write_batch(&batch).is_err());
        assert!(store.find("A", "T").unwrap().is_none());
        assert_eq!(store.row_count().unwrap(), 1);

        let summary = store
            .write_batch(&[write(1, "A", "T", SongFields::default()), write(2, "Existing", "Song", SongFields::default())])
            .unwrap();
        assert_eq!(summary, BatchSummary { inserted: 1, updated: 1 });
    }

    #[test]
    fn test_completed_ranks() {
        let store = SongStore::open_in_memory().unwrap();
        store
            .upsert(1, "A", "T", &SongFields { word_count: Some(0), wpm: Some(0.0), ..Default::default() })
            .unwrap();
        store.upsert(2, "B", "U", &fields(Some(5), None, None)).unwrap();
        store
            .upsert(3, "C", "V", &SongFields { word_count: Some(200), wpm: Some(80.0), ..Default::default() })
            .unwrap();
        assert_eq!(store.completed_ranks().unwrap(), BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_fill_missing_leaves_populated_rows() {
        let store = SongStore::open_in_memory().unwrap();
        store
            .upsert(1, "A", "T", &SongFields {
                popularity: Some(70),
                word_count: Some(300),
                duration: Some(TrackDuration::parse("3:00").unwrap()),
                wpm: Some(100.0),
                ..Default::default()
            })
            .unwrap();
        store
            .upsert(2, "B", "U", &SongFields { word_count: Some(0), wpm: Some(0.0), ..Default::default() })
            .unwrap();

        let backfill = SongFields {
            popularity: Some(1),
            word_count: Some(240),
            duration: Some(TrackDuration::parse("4:00").unwrap()),
            wpm: Some(60.0),
            ..Default::default()
        };
        store.fill_missing(1, &backfill).unwrap();
        store.fill_missing(2, &backfill).unwrap();

        let populated = store.record(1).unwrap().unwrap();
        assert_eq!(populated.popularity, Some(70));
        assert_eq!(populated.word_count, Some(300));
        assert_eq!(populated.duration.to_string(), "3:00");
        assert_eq!(populated.wpm, Some(100.0));

        let filled = store.record(2).unwrap().unwrap();
        assert_eq!(filled.popularity, Some(1));
        assert_eq!(filled.word_count, Some(240));
        assert_eq!(filled.duration.to_string(), "4:00");
        assert_eq!(filled.wpm, Some(60.0));
    }

    #[test]
    fn test_backfill_candidates() {
        let store = SongStore::open_in_memory().unwrap();
        store.upsert(1, "A", "T", &fields(Some(70), Some(300), Some("3:00"))).unwrap();
        store.upsert(2, "B", "U", &fields(None, Some(100), Some("2:00"))).unwrap();
        store.upsert(3, "C", "V", &fields(Some(40), Some(0), Some("2:30"))).unwrap();
        store.upsert(4, "D", "W", &fields(Some(40), Some(90), None)).unwrap();

        let ranks: Vec<u32> = store.backfill_candidates().unwrap().iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![2, 3, 4]);
    }

    #[test]
    fn test_truncate() {
        let store = SongStore::open_in_memory().unwrap();
        for rank in 1..=5 {
            store.upsert(rank, &format!("A{}", rank), "T", &SongFields::default()).unwrap();
        }
        assert_eq!(store.truncate(3).unwrap(), 2);
        assert_eq!(store.row_count().unwrap(), 3);
        assert!(store.record(4).unwrap().is_none());
    }

    #[test]
    fn test_legacy_table_migrated_in_place() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE songs (
                rank INTEGER PRIMARY KEY,
                title TEXT,
                artist TEXT,
                popularity INTEGER,
                word_count INTEGER
            );
            INSERT INTO songs VALUES (1, 'Royals', 'Lorde', 77, 250);
            INSERT INTO songs VALUES (2, 'Hello', 'Adele', NULL, NULL);",
        )
        .unwrap();

        let store = SongStore::from_connection(conn).unwrap();
        assert_eq!(store.row_count().unwrap(), 2);
        let royals = store.record(1).unwrap().unwrap();
        assert_eq!(royals.popularity, Some(77));
        assert_eq!(royals.word_count, Some(250));
        assert_eq!(royals.duration, TrackDuration::Unknown);
        assert_eq!(royals.wpm, None);
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);

        // Unique index now guards the legacy table too
        store.upsert(1, "Lorde", "Royals", &fields(None, None, Some("3:10"))).unwrap();
        assert_eq!(store.row_count().unwrap(), 2);
    }

    #[test]
    fn test_legacy_null_duration_becomes_sentinel() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE songs (
                rank INTEGER PRIMARY KEY,
                title TEXT,
                artist TEXT,
                popularity INTEGER,
                word_count INTEGER,
                duration TEXT
            );
            INSERT INTO songs VALUES (1, 'Royals', 'Lorde', 77, 250, NULL);
            INSERT INTO songs VALUES (2, 'Hello', 'Adele', 85, 300, '4:55');",
        )
        .unwrap();

        let store = SongStore::from_connection(conn).unwrap();
        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].duration, TrackDuration::Unknown);
        assert_eq!(records[1].duration.to_string(), "4:55");

        let ranks: Vec<u32> = store.backfill_candidates().unwrap().iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1]);
    }

    #[test]
    fn test_null_duration_reads_as_unknown() {
        let store = SongStore::open_in_memory().unwrap();
        // songs.duration is NOT NULL, so feed the row mapper a NULL through a view
        store
            .conn
            .execute_batch(
                "INSERT INTO songs (rank, title, artist, popularity) VALUES (1, 'T', 'A', 5);
                 CREATE VIEW songs_loose AS SELECT rank, title, artist, popularity, word_count,
                     NULL AS duration, wpm, album, external_id FROM songs;",
            )
            .unwrap();
        let raw = store
            .conn
            .query_row(
                "SELECT rank, title, artist, popularity, word_count, duration, wpm, album, external_id FROM songs_loose",
                [],
                read_row,
            )
            .unwrap();
        assert_eq!(finish_row(raw).unwrap().duration, TrackDuration::Unknown);
    }

    #[test]
    fn test_completed_songs_carry_their_pair() {
        let store = SongStore::open_in_memory().unwrap();
        store
            .upsert(1, "A", "T", &SongFields { word_count: Some(0), wpm: Some(0.0), ..Default::default() })
            .unwrap();
        store.upsert(2, "B", "U", &SongFields::default()).unwrap();
        let done = store.completed_songs().unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[&1], ("A".to_string(), "T".to_string()));
    }

    #[test]
    fn test_legacy_duplicates_fail_migration() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE songs (rank INTEGER PRIMARY KEY, title TEXT, artist TEXT, popularity INTEGER, word_count INTEGER);
             INSERT INTO songs VALUES (1, 'Royals', 'Lorde', NULL, NULL);
             INSERT INTO songs VALUES (2, 'Royals', 'Lorde', NULL, NULL);",
        )
        .unwrap();
        let err = SongStore::from_connection(conn).err().unwrap();
        assert!(matches!(err, StoreError::Migration { version: 1, .. }));
    }

    #[test]
    fn test_reopen_applies_nothing_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("songs.sqlite3");

        let store = SongStore::open(&path).unwrap();
        store.upsert(1, "A", "T", &fields(Some(3), None, None)).unwrap();
        store.close().unwrap();

        let store = SongStore::open(&path).unwrap();
        assert_eq!(store.row_count().unwrap(), 1);
        let applied: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_malformed_duration_is_reported() {
        let store = SongStore::open_in_memory().unwrap();
        store.upsert(1, "A", "T", &SongFields::default()).unwrap();
        store
            .conn
            .execute("UPDATE songs SET duration = 'soon' WHERE rank = 1", [])
            .unwrap();
        assert!(matches!(store.record(1), Err(StoreError::Malformed { rank: 1, .. })));
    }
}
