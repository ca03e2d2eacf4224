#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report cache rebuild.
//!
//! A run stages a fresh report for every eligible (location, lookback
//! window) pair into the staging table, then publishes staging as the live
//! cache in one exclusive transaction. Readers see either the old cache or
//! the new one, never a mix. A run that fails or is cancelled before
//! publishing leaves the live cache untouched.

pub mod pipeline;
pub mod progress;

use std::time::Duration;

use accident_map_accident_models::{Language, ResolutionKind};
use accident_map_database::DbError;

pub use pipeline::{CacheRebuildPipeline, CancelHandle};

/// Errors surfaced by a rebuild run.
///
/// Failures of single entries are not among them: those are logged,
/// counted in [`RebuildSummary::failed`], and skipped.
#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    /// Another run holds the rebuild guard.
    #[error("A cache rebuild is already running")]
    AlreadyRunning,

    /// The run was cancelled before publishing; the live cache is unchanged.
    #[error("Cache rebuild cancelled before publish")]
    Cancelled,

    /// The swap transaction failed and was rolled back.
    #[error("Publishing the report cache failed: {0}")]
    Publish(#[source] DbError),

    /// Staging storage failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Listing eligible locations or anchoring the window failed.
    #[error("Statistics error: {0}")]
    Statistics(#[from] accident_map_statistics::StatisticsError),

    /// Building a report or its cache row failed.
    #[error("Report error: {0}")]
    Infographics(#[from] accident_map_infographics::InfographicsError),

    /// A (location, window) pair does not form a valid context.
    #[error("Invalid context: {0}")]
    Context(#[from] accident_map_report_models::ContextError),

    /// A blocking task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Settings of a rebuild run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildConfig {
    /// Lookback windows to stage for every location.
    pub lookback_windows: Vec<u32>,
    /// Resolution kinds whose locations are cached.
    pub cached_resolutions: Vec<ResolutionKind>,
    /// Entries assembled at once.
    pub rebuild_concurrency: usize,
    /// Rows per staging insert transaction.
    pub stage_chunk_size: usize,
    /// Language the cached location descriptions are rendered in.
    pub language: Language,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            lookback_windows: vec![1, 3, 5, 8],
            cached_resolutions: vec![ResolutionKind::SuburbanRoad, ResolutionKind::Street],
            rebuild_concurrency: 4,
            stage_chunk_size: 100,
            language: Language::default(),
        }
    }
}

/// Outcome of the staging phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Eligible locations across all cached resolution kinds.
    pub eligible_locations: u64,
    /// (location, window) entries attempted.
    pub entries: u64,
    /// Entries written to staging.
    pub staged: u64,
    /// Entries that failed and were skipped.
    pub failed: u64,
}

/// Outcome of a complete run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Eligible locations across all cached resolution kinds.
    pub eligible_locations: u64,
    /// Entries written to staging.
    pub staged: u64,
    /// Entries that failed and were skipped.
    pub failed: u64,
    /// Live rows before the swap.
    pub live_before: u64,
    /// Live rows after the swap.
    pub live_after: u64,
    /// How long the live table was locked for the swap.
    pub swap_duration: Duration,
    /// Wall time of the whole run.
    pub duration: Duration,
}

/// Current cache state and what a run would stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildInfo {
    /// Rows in the live table.
    pub live: u64,
    /// Rows in the staging table.
    pub staging: u64,
    /// Eligible locations per cached resolution kind.
    pub eligible: Vec<(ResolutionKind, u64)>,
    /// Configured lookback windows.
    pub lookback_windows: Vec<u32>,
}

impl RebuildInfo {
    /// Entries a run would stage.
    #[must_use]
    pub fn expected_entries(&self) -> u64 {
        let locations: u64 = self.eligible.iter().map(|(_, n)| n).sum();
        locations * self.lookback_windows.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_caches_segments_and_streets() {
        let config = RebuildConfig::default();
        assert_eq!(config.lookback_windows, vec![1, 3, 5, 8]);
        assert_eq!(
            config.cached_resolutions,
            vec![ResolutionKind::SuburbanRoad, ResolutionKind::Street]
        );
        assert_eq!(config.language, Language::He);
    }

    #[test]
    fn expected_entries_multiplies_windows() {
        let info = RebuildInfo {
            live: 0,
            staging: 0,
            eligible: vec![(ResolutionKind::SuburbanRoad, 3), (ResolutionKind::Street, 2)],
            lookback_windows: vec![1, 5],
        };
        assert_eq!(info.expected_entries(), 10);
    }
}
