//! Safety checks for destructive store operations.
//!
//! The database file is written in place and `truncate` deletes rows, so both
//! are validated before anything is opened or removed.

use anyhow::{bail, Result};
use std::path::Path;

/// Refuses a database path that points at one of the rank source files.
///
/// Paths are compared as given and, when both exist, after canonicalization.
pub fn validate_db_path(db: &Path, source_paths: &[&Path]) -> Result<()> {
    if db.as_os_str().is_empty() {
        bail!("Safety check failed: database path is empty");
    }

    let db_canonical = db.canonicalize().ok();
    for source in source_paths {
        let same = db == *source
            || matches!((&db_canonical, source.canonicalize().ok()), (Some(a), Some(b)) if *a == b);
        if same {
            bail!(
                "Safety check failed: database '{}' cannot be the same as source '{}'",
                db.display(),
                source.display()
            );
        }
    }

    let is_text = db
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("csv"));
    if is_text {
        bail!(
            "Safety check failed: database '{}' looks like a rank source file",
            db.display()
        );
    }

    Ok(())
}

/// Validates a truncate request against the current row count.
///
/// Refuses `max_rank == 0` and, unless forced, any truncate that would
/// remove more rows than it keeps.
pub fn validate_truncate(max_rank: u32, row_count: usize, force: bool) -> Result<()> {
    if max_rank == 0 {
        bail!("Safety check failed: refusing to truncate to rank 0 (would empty the table)");
    }

    let kept = row_count.min(max_rank as usize);
    let removed = row_count - kept;
    if removed > kept && !force {
        bail!(
            "Safety check failed: truncating to rank {} would remove {} of {} rows (use --force)",
            max_rank,
            removed,
            row_count
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_db_path() {
        let db = PathBuf::from("/tmp/songs.sqlite3");
        let recent = PathBuf::from("/data/recent.txt");
        assert!(validate_db_path(&db, &[&recent]).is_ok());
    }

    #[test]
    fn test_db_equals_source() {
        let path = PathBuf::from("/data/chart.sqlite3");
        let result = validate_db_path(&path, &[&path]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }

    #[test]
    fn test_db_equals_source_via_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("recent.list");
        std::fs::write(&source, "Adele, Hello\n").unwrap();
        let indirect = dir.path().join(".").join("recent.list");
        assert!(validate_db_path(&indirect, &[&source]).is_err());
    }

    #[test]
    fn test_text_extension_blocked() {
        let db = PathBuf::from("/tmp/older.txt");
        assert!(validate_db_path(&db, &[]).is_err());
    }

    #[test]
    fn test_truncate_zero_refused() {
        assert!(validate_truncate(0, 10, true).is_err());
    }

    #[test]
    fn test_truncate_bulk_delete_needs_force() {
        // 300 rows, keep 100: removes 200
        assert!(validate_truncate(100, 300, false).is_err());
        assert!(validate_truncate(100, 300, true).is_ok());
        // 150 rows, keep 100: removes 50
        assert!(validate_truncate(100, 150, false).is_ok());
        // Nothing to remove
        assert!(validate_truncate(100, 40, false).is_ok());
    }
}
