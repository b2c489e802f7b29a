//! Metadata matching against an external track catalog.
//!
//! Strategy chain per entry:
//! 1. normalized title + artist
//! 2. normalized title only (issued only when step 1 produced no match)
//!
//! Transient errors repeat the same query, drawing from the entry's retry
//! budget, before moving to the next strategy. The provider's top-ranked
//! candidate is taken as the match.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::models::{ExternalTrack, Lookup, NormalizedKey, TrackCandidate};
use crate::normalize::normalize;
use crate::retry::{RetryPolicy, Throttle};

/// Below this title similarity a match is counted as low-confidence.
pub const LOW_CONFIDENCE_SIMILARITY: f64 = 0.5;

pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Ranked candidates for a free-text query, best first. Empty is valid.
    fn search(&self, query: &str) -> Result<Vec<TrackCandidate>, ProviderError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryStrategy {
    TitleAndArtist,
    TitleOnly,
}

impl QueryStrategy {
    pub const CHAIN: [QueryStrategy; 2] = [QueryStrategy::TitleAndArtist, QueryStrategy::TitleOnly];

    /// Query text for this strategy, None when the needed parts are empty.
    pub fn build_query(self, key: &NormalizedKey) -> Option<String> {
        match self {
            QueryStrategy::TitleAndArtist => {
                if key.title_norm.is_empty() || key.artist_norm.is_empty() {
                    None
                } else {
                    Some(format!("{} {}", key.title_norm, key.artist_norm))
                }
            }
            QueryStrategy::TitleOnly => {
                if key.title_norm.is_empty() {
                    None
                } else {
                    Some(key.title_norm.clone())
                }
            }
        }
    }
}

/// Outcome of matching one entry.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub lookup: Lookup<ExternalTrack>,
    /// Strategy that produced the match.
    pub strategy: Option<QueryStrategy>,
    /// Similarity between the normalized query title and the matched track name.
    pub title_similarity: Option<f64>,
    pub calls: u32,
    pub retries: u32,
}

impl MatchReport {
    pub fn is_low_confidence(&self) -> bool {
        self.title_similarity
            .is_some_and(|s| s < LOW_CONFIDENCE_SIMILARITY)
    }

    pub fn used_fallback(&self) -> bool {
        self.strategy == Some(QueryStrategy::TitleOnly)
    }
}

pub struct MetadataMatcher<P> {
    provider: P,
    policy: RetryPolicy,
    throttle: Arc<Throttle>,
}

impl<P: MetadataProvider> MetadataMatcher<P> {
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

    /// Resolve (title, artist) to an external track. Never fails: exhausting
    /// every strategy yields `Lookup::NotFound`.
    pub fn match_track(&self, title: &str, artist: &str) -> MatchReport {
        let key = NormalizedKey {
            artist_norm: normalize(artist),
            title_norm: normalize(title),
        };
        let mut budget = self.policy.budget();
        let mut calls = 0;

        for strategy in QueryStrategy::CHAIN {
            let Some(query) = strategy.build_query(&key) else {
                continue;
            };

            let attempt = self.policy.run(&mut budget, &query, || {
                self.throttle.wait();
                self.provider.search(&query)
            });
            calls += attempt.calls;

            match attempt.outcome {
                Ok(candidates) => match candidates.first() {
                    Some(top) => {
                        let similarity =
                            strsim::normalized_levenshtein(&key.title_norm, &normalize(&top.name));
                        if similarity < LOW_CONFIDENCE_SIMILARITY {
                            warn!(
                                title,
                                artist,
                                matched = %top.name,
                                similarity,
                                "Low-confidence metadata match"
                            );
                        }
                        debug!(query = %query, ?strategy, id = %top.external_id, "Metadata matched");
                        return MatchReport {
                            lookup: Lookup::Found(ExternalTrack::from(top)),
                            strategy: Some(strategy),
                            title_similarity: Some(similarity),
                            calls,
                            retries: budget.used(),
                        };
                    }
                    None => debug!(query = %query, ?strategy, "No candidates"),
                },
                Err(e) => warn!(
                    provider = self.provider.name(),
                    query = %query,
                    ?strategy,
                    error = %e,
                    "Metadata query failed, moving on"
                ),
            }
        }

        MatchReport {
            lookup: Lookup::NotFound,
            strategy: None,
            title_similarity: None,
            calls,
            retries: budget.used(),
        }
    }
}
