//! Read side of the report cache.

use std::sync::Arc;

use accident_map_database::cache_store::{CacheRow, CacheStore, PublishStats};
use accident_map_report_models::{LocationContext, LocationKey, Report};

use crate::InfographicsError;

/// Assembled reports keyed by location and lookback window.
///
/// Payloads are unlocalized; one entry serves every language.
#[derive(Clone)]
pub struct ReportCache {
    store: Arc<CacheStore>,
}

impl ReportCache {
    /// Creates a cache over `store`.
    #[must_use]
    pub const fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// The underlying storage.
    #[must_use]
    pub const fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Reads the cached report for a location and window.
    ///
    /// A payload that no longer deserializes is logged and treated as
    /// absent so the caller recomputes.
    ///
    /// # Errors
    ///
    /// Returns [`InfographicsError::Cache`] if the storage query fails.
    pub async fn get(
        &self,
        key: &LocationKey,
        lookback_years: u32,
    ) -> Result<Option<Report>, InfographicsError> {
        let store = Arc::clone(&self.store);
        let cache_key = key.as_cache_key();

        let row =
            tokio::task::spawn_blocking(move || store.get(&cache_key, lookback_years)).await??;

        Ok(row.and_then(|row| match Report::from_payload(&row.payload) {
            Ok(report) => Some(report),
            Err(e) => {
                log::warn!(
                    "Discarding unreadable cache entry {} ({} years): {e}",
                    row.location_key,
                    row.lookback_years
                );
                None
            }
        }))
    }

    /// Builds the cache row for a report assembled for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`InfographicsError::Serialization`] if the report cannot be
    /// serialized.
    pub fn entry(ctx: &LocationContext, report: &Report) -> Result<CacheRow, InfographicsError> {
        Ok(CacheRow {
            location_key: ctx.location_key().as_cache_key(),
            lookback_years: ctx.lookback_years,
            resolution: ctx.resolution.to_string(),
            payload: report.to_payload()?,
            created_at: chrono::Utc::now().naive_utc(),
        })
    }

    /// Replaces the whole live cache with `rows` in one atomic swap.
    ///
    /// The rows go through the staging table, so a duplicate key or a
    /// failed swap leaves the live cache as it was.
    ///
    /// # Errors
    ///
    /// Returns [`InfographicsError::Cache`] if staging or the swap fails.
    pub async fn bulk_replace(
        &self,
        rows: Vec<CacheRow>,
    ) -> Result<PublishStats, InfographicsError> {
        let store = Arc::clone(&self.store);

        let stats = tokio::task::spawn_blocking(move || {
            store.truncate_staging()?;
            store.insert_staging(&rows)?;
            store.publish()
        })
        .await??;

        Ok(stats)
    }
}

impl std::fmt::Debug for ReportCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use accident_map_database::cache_store::CacheTable;
    use accident_map_database::fixtures;

    use super::*;
    use crate::orchestrator::WidgetOrchestrator;
    use crate::registry::builtin;
    use crate::widgets::test_support::{seeded_source, segment_ctx, street_ctx};

    fn cache() -> ReportCache {
        ReportCache::new(Arc::new(CacheStore::new(fixtures::empty_pool(2).unwrap())))
    }

    async fn assembled(ctx: &LocationContext) -> Report {
        WidgetOrchestrator::new(builtin(), Arc::new(seeded_source()), 2)
            .assemble(ctx, true)
            .await
    }

    #[tokio::test]
    async fn stored_report_reads_back_unchanged() {
        let cache = cache();
        let ctx = segment_ctx(5);
        let report = assembled(&ctx).await;
        assert!(!report.widgets.is_empty());

        let stats = cache
            .bulk_replace(vec![ReportCache::entry(&ctx, &report).unwrap()])
            .await
            .unwrap();
        assert_eq!(stats.published, 1);

        let cached = cache.get(&ctx.location_key(), 5).await.unwrap().unwrap();
        assert_eq!(cached, report);
        assert_eq!(cached.widget_names(), report.widget_names());
    }

    #[tokio::test]
    async fn miss_on_other_window_or_location() {
        let cache = cache();
        let ctx = segment_ctx(5);
        let report = assembled(&ctx).await;
        cache
            .bulk_replace(vec![ReportCache::entry(&ctx, &report).unwrap()])
            .await
            .unwrap();

        assert!(cache.get(&ctx.location_key(), 3).await.unwrap().is_none());
        assert!(
            cache
                .get(&street_ctx(5).location_key(), 5)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn unreadable_payload_is_a_miss() {
        let cache = cache();
        let ctx = segment_ctx(5);
        let mut row = ReportCache::entry(&ctx, &assembled(&ctx).await).unwrap();
        row.payload = "{not json".to_string();
        cache.bulk_replace(vec![row]).await.unwrap();

        assert_eq!(cache.store().count(CacheTable::Live).unwrap(), 1);
        assert!(cache.get(&ctx.location_key(), 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replace_drops_previous_entries() {
        let cache = cache();
        let segment = segment_ctx(5);
        let street = street_ctx(5);
        cache
            .bulk_replace(vec![
                ReportCache::entry(&segment, &assembled(&segment).await).unwrap(),
            ])
            .await
            .unwrap();
        cache
            .bulk_replace(vec![
                ReportCache::entry(&street, &assembled(&street).await).unwrap(),
            ])
            .await
            .unwrap();

        assert!(cache.get(&segment.location_key(), 5).await.unwrap().is_none());
        assert!(cache.get(&street.location_key(), 5).await.unwrap().is_some());
    }
}
