//! Lyric lookup and word counting.
//!
//! Only the entry's own (title, artist) pair is ever queried; transient
//! errors repeat that query within the entry's retry budget.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::metrics::count_words;
use crate::models::{LyricStats, Lookup};
use crate::retry::{RetryPolicy, Throttle};

pub trait LyricsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Lyric text for the song, `Ok(None)` when the provider has none.
    fn lyrics(&self, title: &str, artist: &str) -> Result<Option<String>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct LyricReport {
    pub lookup: Lookup<LyricStats>,
    pub calls: u32,
    pub retries: u32,
}

impl LyricReport {
    /// Word count to persist: 0 when lyrics are unavailable.
    pub fn word_count(&self) -> u32 {
        self.lookup.found().map_or(0, |s| s.word_count)
    }
}

pub struct LyricFetcher<P> {
    provider: P,
    policy: RetryPolicy,
    throttle: Arc<Throttle>,
}

impl<P: LyricsProvider> LyricFetcher<P> {
    pub fn new(provider: P, policy: RetryPolicy, throttle: Arc<Throttle>) -> Self {
        Self {
            provider,
            policy,
            throttle,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn fetch(&self, title: &str, artist: &str) -> LyricReport {
        let mut budget = self.policy.budget();
        let label = format!("{} - {}", artist, title);

        let attempt = self.policy.run(&mut budget, &label, || {
            self.throttle.wait();
            self.provider.lyrics(title, artist)
        });

        let lookup = match attempt.outcome {
            Ok(Some(text)) => {
                let word_count = count_words(&text);
                debug!(song = %label, word_count, "Lyrics found");
                Lookup::Found(LyricStats { word_count })
            }
            Ok(None) => {
                debug!(song = %label, "No lyrics");
                Lookup::NotFound
            }
            Err(e) => {
                warn!(provider = self.provider.name(), song = %label, error = %e, "Lyrics lookup failed");
                Lookup::NotFound
            }
        };

        LyricReport {
            lookup,
            calls: attempt.calls,
            retries: budget.used(),
        }
    }
}
