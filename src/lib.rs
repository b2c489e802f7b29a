//! Chart enrichment library - ranked song catalog with metadata and lyric stats.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod lyrics;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod providers;
pub mod retry;
pub mod safety;
pub mod sources;
pub mod store;
