//! Build-into-staging, then swap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use accident_map_accident_models::ResolutionKind;
use accident_map_database::DbError;
use accident_map_database::cache_store::{CacheRow, CacheStore, CacheTable, PublishStats};
use accident_map_infographics::DataSource;
use accident_map_infographics::cache::ReportCache;
use accident_map_infographics::location::LocationResolver;
use accident_map_infographics::orchestrator::WidgetOrchestrator;
use accident_map_infographics::registry::WidgetRegistry;
use accident_map_report_models::{LocationContext, LocationFields, LocationKey};
use accident_map_statistics::LocationLookup;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt as _};
use tokio::sync::{Mutex, MutexGuard};

use crate::progress::ProgressCallback;
use crate::{RebuildConfig, RebuildError, RebuildInfo, RebuildSummary, StageStats};

/// Requests cancellation of the current (or next) rebuild run.
///
/// Checked before each entry is assembled and once more before publishing.
/// A run cancelled in time never touches the live cache. The flag clears
/// when the run ends.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Rebuilds the report cache for every eligible location and window.
pub struct CacheRebuildPipeline {
    orchestrator: WidgetOrchestrator,
    resolver: LocationResolver,
    store: Arc<CacheStore>,
    config: RebuildConfig,
    running: Mutex<()>,
    cancel: CancelHandle,
}

impl CacheRebuildPipeline {
    /// Creates a pipeline computing reports from `source` with the widgets
    /// of `registry` and writing them to `store`.
    #[must_use]
    pub fn new<S: DataSource + 'static>(
        source: Arc<S>,
        registry: Arc<WidgetRegistry>,
        store: Arc<CacheStore>,
        config: RebuildConfig,
        widget_concurrency: usize,
    ) -> Self {
        let lookup: Arc<dyn LocationLookup> = source.clone();
        Self {
            resolver: LocationResolver::new(lookup),
            orchestrator: WidgetOrchestrator::new(registry, source, widget_concurrency),
            store,
            config,
            running: Mutex::new(()),
            cancel: CancelHandle::default(),
        }
    }

    /// Run settings.
    #[must_use]
    pub const fn config(&self) -> &RebuildConfig {
        &self.config
    }

    /// A handle that cancels runs of this pipeline.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, RebuildError> {
        self.running.try_lock().map_err(|_| RebuildError::AlreadyRunning)
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, RebuildError>
    where
        T: Send + 'static,
        F: FnOnce(&CacheStore) -> Result<T, DbError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || work(&store)).await??)
    }

    /// Stages every entry and publishes staging as the live cache.
    ///
    /// # Errors
    ///
    /// * [`RebuildError::AlreadyRunning`] if another run of this pipeline is
    ///   in progress
    /// * [`RebuildError::Cancelled`] if cancelled before publishing
    /// * [`RebuildError::Publish`] if the swap failed and was rolled back
    /// * any other [`RebuildError`] if staging failed outright; the live
    ///   cache is unchanged in every error case
    pub async fn run(
        &self,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<RebuildSummary, RebuildError> {
        let _running = self.lock()?;
        let result = self.run_locked(progress).await;
        self.cancel.reset();
        result
    }

    async fn run_locked(
        &self,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<RebuildSummary, RebuildError> {
        let started = Instant::now();
        let live_before = self.blocking(|store| store.count(CacheTable::Live)).await?;
        log::info!("Rebuilding report cache ({live_before} live rows)");

        let stage = self.stage_locked(progress).await?;
        if self.cancel.is_cancelled() {
            log::warn!("Cache rebuild cancelled after staging; live cache left as is");
            return Err(RebuildError::Cancelled);
        }

        progress.set_message("Publishing report cache".to_string());
        let published = self.publish_locked().await?;
        let live_after = self.blocking(|store| store.count(CacheTable::Live)).await?;

        let summary = RebuildSummary {
            eligible_locations: stage.eligible_locations,
            staged: stage.staged,
            failed: stage.failed,
            live_before,
            live_after,
            swap_duration: published.swap_duration,
            duration: started.elapsed(),
        };
        log::info!(
            "Rebuilt report cache in {:.1}s: {} staged, {} failed, live rows {} -> {} (swap {:?})",
            summary.duration.as_secs_f64(),
            summary.staged,
            summary.failed,
            summary.live_before,
            summary.live_after,
            summary.swap_duration,
        );
        progress.finish(format!(
            "Report cache rebuilt: {} entries ({} failed)",
            summary.staged, summary.failed
        ));

        Ok(summary)
    }

    /// Runs only the staging phase. Staging is truncated first, so staging
    /// twice leaves exactly the entries of the second pass.
    ///
    /// # Errors
    ///
    /// * [`RebuildError::AlreadyRunning`] if a run is in progress
    /// * [`RebuildError::Cancelled`] if cancelled during staging
    /// * any other [`RebuildError`] if staging failed outright
    pub async fn stage(
        &self,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<StageStats, RebuildError> {
        let _running = self.lock()?;
        let result = self.stage_locked(progress).await;
        let cancelled = self.cancel.is_cancelled();
        self.cancel.reset();
        if cancelled {
            return Err(RebuildError::Cancelled);
        }
        result
    }

    /// Runs only the publish phase, swapping whatever is staged into the
    /// live cache.
    ///
    /// # Errors
    ///
    /// * [`RebuildError::AlreadyRunning`] if a run is in progress
    /// * [`RebuildError::Publish`] if the swap failed and was rolled back
    pub async fn publish(&self) -> Result<PublishStats, RebuildError> {
        let _running = self.lock()?;
        self.publish_locked().await
    }

    /// Cache row counts and eligible locations.
    ///
    /// # Errors
    ///
    /// Returns [`RebuildError`] if a count or lookup fails.
    pub async fn info(&self) -> Result<RebuildInfo, RebuildError> {
        let counts = self.blocking(CacheStore::counts).await?;
        let source = self.orchestrator.source();

        let mut eligible = Vec::with_capacity(self.config.cached_resolutions.len());
        for kind in &self.config.cached_resolutions {
            let found = source.eligible_locations(*kind).await?;
            eligible.push((*kind, found.len() as u64));
        }

        Ok(RebuildInfo {
            live: counts.live,
            staging: counts.staging,
            eligible,
            lookback_windows: self.config.lookback_windows.clone(),
        })
    }

    async fn stage_locked(
        &self,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<StageStats, RebuildError> {
        let discarded = self.blocking(CacheStore::truncate_staging).await?;
        if discarded > 0 {
            log::info!("Discarded {discarded} staging rows left by an earlier run");
        }

        let latest = self.resolver.anchor_date().await?;
        let source = self.orchestrator.source();

        let mut locations: Vec<(ResolutionKind, LocationFields)> = Vec::new();
        for kind in &self.config.cached_resolutions {
            let found = source.eligible_locations(*kind).await?;
            log::info!("{} eligible {kind} locations", found.len());
            locations.extend(found.into_iter().map(|fields| (*kind, fields)));
        }

        let entries = locations
            .iter()
            .flat_map(|(kind, fields)| {
                self.config
                    .lookback_windows
                    .iter()
                    .map(move |years| (*kind, fields.clone(), *years))
            })
            .collect::<Vec<_>>();

        let mut stats = StageStats {
            eligible_locations: locations.len() as u64,
            entries: entries.len() as u64,
            ..StageStats::default()
        };
        progress.set_total(stats.entries);
        progress.set_message("Staging report cache".to_string());

        let chunk_size = self.config.stage_chunk_size.max(1);
        let mut pending = Vec::with_capacity(chunk_size);

        let mut outcomes = stream::iter(entries.into_iter().map(|(kind, fields, years)| {
            async move {
                let key = LocationKey::new(kind, &fields);
                let outcome = self.stage_entry(kind, fields, years, latest).await;
                (key, years, outcome)
            }
        }))
        .buffer_unordered(self.config.rebuild_concurrency.max(1));

        while let Some((key, years, outcome)) = outcomes.next().await {
            progress.inc(1);
            match outcome {
                Ok(Some(row)) => {
                    pending.push(row);
                    if pending.len() >= chunk_size {
                        let (staged, failed) = self.flush(std::mem::take(&mut pending)).await?;
                        stats.staged += staged;
                        stats.failed += failed;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    stats.failed += 1;
                    log::warn!("Failed to stage report for {key} ({years} years): {e}");
                }
            }
        }

        let (staged, failed) = self.flush(pending).await?;
        stats.staged += staged;
        stats.failed += failed;

        log::info!(
            "Staged {} of {} entries for {} locations ({} failed)",
            stats.staged,
            stats.entries,
            stats.eligible_locations,
            stats.failed
        );

        Ok(stats)
    }

    /// Assembles one entry. `None` when the run was cancelled.
    async fn stage_entry(
        &self,
        kind: ResolutionKind,
        fields: LocationFields,
        years: u32,
        latest: NaiveDate,
    ) -> Result<Option<CacheRow>, RebuildError> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let ctx = LocationContext::new(
            kind,
            fields,
            i64::from(years),
            latest,
            self.config.language,
        )?;
        let report = self.orchestrator.assemble(&ctx, true).await;
        Ok(Some(ReportCache::entry(&ctx, &report)?))
    }

    /// Inserts one chunk. A failed chunk is retried row by row so one bad
    /// row only costs itself. Returns `(staged, failed)`.
    async fn flush(&self, rows: Vec<CacheRow>) -> Result<(u64, u64), RebuildError> {
        if rows.is_empty() {
            return Ok((0, 0));
        }

        self.blocking(move |store| match store.insert_staging(&rows) {
            Ok(staged) => Ok((staged, 0)),
            Err(e) => {
                log::warn!(
                    "Staging batch of {} rows failed ({e}); retrying row by row",
                    rows.len()
                );
                let mut staged = 0;
                let mut failed = 0;
                for row in &rows {
                    match store.insert_staging(std::slice::from_ref(row)) {
                        Ok(n) => staged += n,
                        Err(e) => {
                            failed += 1;
                            log::warn!(
                                "Failed to stage report for {} ({} years): {e}",
                                row.location_key,
                                row.lookback_years
                            );
                        }
                    }
                }
                Ok((staged, failed))
            }
        })
        .await
    }

    async fn publish_locked(&self) -> Result<PublishStats, RebuildError> {
        let store = Arc::clone(&self.store);
        log::info!("Publishing staged report cache");

        tokio::task::spawn_blocking(move || store.publish())
            .await?
            .map_err(|e| {
                log::error!("Report cache publish failed; live cache unchanged: {e}");
                RebuildError::Publish(e)
            })
    }
}

impl std::fmt::Debug for CacheRebuildPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRebuildPipeline")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}
