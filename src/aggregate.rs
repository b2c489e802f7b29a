//! Merge two ranked bands into one contiguous chart.
//!
//! Raw source lines look like `Artist, Title`. Lines without the comma
//! separator are dropped (counted, not fatal). The first band holds the top
//! ranks; the second continues directly after it.

use tracing::{info, warn};

use crate::models::{RankedEntry, MAX_RANK};

/// Quote pairs that may wrap a title on the source page.
const WRAPPING_QUOTES: &[(char, char)] = &[
    ('\'', '\''),
    ('"', '"'),
    ('\u{2018}', '\u{2019}'),
    ('\u{201C}', '\u{201D}'),
];

/// (artist, title) pairs of one band, in ascending rank order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Band {
    pub pairs: Vec<(String, String)>,
    pub dropped: usize,
}

fn strip_wrapping_quotes(s: &str) -> &str {
    for &(open, close) in WRAPPING_QUOTES {
        if let Some(inner) = s.strip_prefix(open).and_then(|rest| rest.strip_suffix(close)) {
            return inner.trim();
        }
    }
    s
}

/// Split `Artist, Title` on the first comma.
/// Returns None when there is no separator or either side is empty.
pub fn parse_line(raw: &str) -> Option<(String, String)> {
    let (artist, title) = raw.split_once(',')?;
    let artist = artist.trim();
    let title = strip_wrapping_quotes(title.trim());
    if artist.is_empty() || title.is_empty() {
        return None;
    }
    Some((artist.to_string(), title.to_string()))
}

/// Parse raw lines of one band, dropping unparseable ones.
pub fn parse_band(name: &str, lines: &[String]) -> Band {
    let mut band = Band::default();
    for line in lines {
        match parse_line(line) {
            Some(pair) => band.pairs.push(pair),
            None => {
                warn!(band = name, line = %line, "Dropping line without artist/title separator");
                band.dropped += 1;
            }
        }
    }
    band
}

/// Concatenate bands in order and assign ranks 1..N, N capped at `MAX_RANK`.
pub fn aggregate(recent: Band, older: Band) -> Vec<RankedEntry> {
    let (recent_len, older_len) = (recent.pairs.len(), older.pairs.len());

    let entries: Vec<RankedEntry> = recent
        .pairs
        .into_iter()
        .chain(older.pairs)
        .take(MAX_RANK as usize)
        .enumerate()
        .map(|(i, (artist, title))| RankedEntry::new(i as u32 + 1, artist, title))
        .collect();

    if recent_len == 0 || older_len == 0 {
        warn!(
            recent = recent_len,
            older = older_len,
            "A rank band is empty, chart will be short"
        );
    }
    info!(
        "Aggregated {} entries ({} + {}, {} lines dropped)",
        entries.len(),
        recent_len,
        older_len,
        recent.dropped + older.dropped
    );

    entries
}
