//! Rank source providers.
//!
//! Page retrieval and HTML parsing happen upstream; a source here only hands
//! back raw `Artist, Title` strings in ascending rank order.

use std::path::PathBuf;

use tracing::{info, warn};

pub trait RankSource {
    fn name(&self) -> &str;

    /// Raw lines in ascending rank order. A failure yields an empty list.
    fn fetch(&self) -> Vec<String>;
}

/// Plain-text export with one `Artist, Title` per line.
///
/// Chart pages usually count down (50..1), so a band can be marked
/// `descending` and is reversed after reading.
#[derive(Debug, Clone)]
pub struct LinesFile {
    name: String,
    path: PathBuf,
    descending: bool,
}

impl LinesFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, descending: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            descending,
        }
    }
}

impl RankSource for LinesFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Vec<String> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                warn!(source = %self.name, path = %self.path.display(), error = %e, "Rank source unavailable");
                return Vec::new();
            }
        };

        let mut lines: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        if self.descending {
            lines.reverse();
        }

        info!(source = %self.name, "Read {} lines from {}", lines.len(), self.path.display());
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_lines_file_ascending() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Adele, Rolling in the Deep").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  Lorde, Royals  ").unwrap();

        let source = LinesFile::new("recent", file.path(), false);
        assert_eq!(
            source.fetch(),
            vec!["Adele, Rolling in the Deep".to_string(), "Lorde, Royals".to_string()]
        );
    }

    #[test]
    fn test_lines_file_descending_is_reversed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Third, C").unwrap();
        writeln!(file, "Second, B").unwrap();
        writeln!(file, "First, A").unwrap();

        let source = LinesFile::new("older", file.path(), true);
        let lines = source.fetch();
        assert_eq!(lines[0], "First, A");
        assert_eq!(lines[2], "Third, C");
    }

    #[test]
    fn test_missing_file_yields_empty() {
        let source = LinesFile::new("gone", "/nonexistent/chart.txt", false);
        assert!(source.fetch().is_empty());
    }
}
