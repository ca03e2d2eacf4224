//! The report read path.

use std::sync::Arc;

use accident_map_report_models::{LocationContext, Report};
use accident_map_statistics::LocationLookup;

use crate::InfographicsError;
use crate::cache::ReportCache;
use crate::localize::{localize_report, location_text};
use crate::location::{LocationRequest, LocationResolver};
use crate::orchestrator::WidgetOrchestrator;
use crate::registry::WidgetRegistry;
use crate::widget::DataSource;

/// Serves localized reports: cached tier from the [`ReportCache`] (or
/// computed on a miss), live tier always computed.
#[derive(Clone)]
pub struct ReportService {
    resolver: LocationResolver,
    orchestrator: WidgetOrchestrator,
    cache: ReportCache,
}

impl ReportService {
    /// Creates a service reading from `source` and `cache`.
    #[must_use]
    pub fn new<S: DataSource + 'static>(
        source: Arc<S>,
        registry: Arc<WidgetRegistry>,
        cache: ReportCache,
        widget_concurrency: usize,
    ) -> Self {
        let lookup: Arc<dyn LocationLookup> = source.clone();
        Self {
            resolver: LocationResolver::new(lookup),
            orchestrator: WidgetOrchestrator::new(registry, source, widget_concurrency),
            cache,
        }
    }

    /// Request resolution.
    #[must_use]
    pub const fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    /// Widget orchestration.
    #[must_use]
    pub const fn orchestrator(&self) -> &WidgetOrchestrator {
        &self.orchestrator
    }

    /// Resolves `request` and serves its report.
    ///
    /// # Errors
    ///
    /// Returns the resolution errors of [`LocationResolver::resolve`]. Cache
    /// and widget failures never fail the request.
    pub async fn report(&self, request: &LocationRequest) -> Result<Report, InfographicsError> {
        let ctx = self.resolver.resolve(request).await?;
        Ok(self.report_for(&ctx).await)
    }

    /// Serves the report of an already-resolved context.
    pub async fn report_for(&self, ctx: &LocationContext) -> Report {
        let location_key = ctx.location_key();

        let cached = match self.cache.get(&location_key, ctx.lookback_years).await {
            Ok(Some(report)) => report,
            Ok(None) => {
                log::debug!(
                    "Report cache miss for {location_key} ({} years); computing",
                    ctx.lookback_years
                );
                self.orchestrator.assemble(ctx, true).await
            }
            Err(e) => {
                log::warn!("Report cache read failed for {location_key}: {e}; computing");
                self.orchestrator.assemble(ctx, true).await
            }
        };
        let live = self.orchestrator.assemble(ctx, false).await;

        let registry = self.orchestrator.registry();
        let mut widgets = cached.widgets;
        widgets.extend(live.widgets);
        widgets.sort_by_key(|w| {
            (
                w.meta.rank,
                registry.position(&w.name).unwrap_or(usize::MAX),
            )
        });

        localize_report(Report::new(ctx, location_text(ctx), widgets), ctx, registry)
    }
}

impl std::fmt::Debug for ReportService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportService")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use accident_map_accident_models::Language;
    use accident_map_database::cache_store::CacheStore;
    use accident_map_database::fixtures::{
        self, NEWS_ON_ROAD_90, ROAD_90, SEGMENT_EIN_GEDI_MASADA, TEL_AVIV,
    };
    use accident_map_report_models::{LocationField, LocationFields};
    use accident_map_statistics::duckdb_source::DuckDbStatistics;
    use serde_json::json;

    use super::*;
    use crate::registry::builtin;

    fn service(source: DuckDbStatistics) -> ReportService {
        let cache = ReportCache::new(Arc::new(CacheStore::new(fixtures::empty_pool(2).unwrap())));
        ReportService::new(Arc::new(source), builtin(), cache, 4)
    }

    fn seeded() -> DuckDbStatistics {
        DuckDbStatistics::new(Arc::new(fixtures::seeded_pool(2).unwrap()))
    }

    fn segment_request() -> LocationRequest {
        LocationRequest::new(
            LocationFields::new()
                .with(LocationField::Road1, ROAD_90)
                .with(LocationField::RoadSegmentId, SEGMENT_EIN_GEDI_MASADA),
            5,
        )
        .language(Language::En)
    }

    #[tokio::test]
    async fn cold_cache_serves_a_complete_report() {
        let report = service(seeded()).report(&segment_request()).await.unwrap();

        let names = report.widget_names();
        assert!(names.contains(&"accident_count_by_severity"));
        assert!(names.contains(&"street_view"));
        assert!(names.contains(&"vision_zero_2_plus_1"));

        let ranks = report.widgets.iter().map(|w| w.meta.rank).collect::<Vec<_>>();
        let mut sorted = ranks.clone();
        sorted.sort_unstable();
        assert_eq!(ranks, sorted);

        assert_eq!(report.meta.location_text, "Road 90, segment Ein Gedi - Masada");
        assert_eq!(report.meta.dates_comment.date_range, [2016, 2020]);
        let severity = report.widget("accident_count_by_severity").unwrap();
        assert_eq!(severity.data.text, json!({"title": "Accidents by severity"}));
        assert_eq!(severity.data.items[0]["severity_label"], json!("Fatal"));
    }

    #[tokio::test]
    async fn cached_tier_is_read_from_the_cache() {
        let service = service(seeded());
        let ctx = service.resolver().resolve(&segment_request()).await.unwrap();

        let mut report = service.orchestrator().assemble(&ctx, true).await;
        report.widgets.retain(|w| w.name == "accident_count_by_severity");
        report.widgets[0].data.items = json!([{"severity": "light", "count": 42}]);
        service
            .cache
            .bulk_replace(vec![ReportCache::entry(&ctx, &report).unwrap()])
            .await
            .unwrap();

        let served = service.report(&segment_request()).await.unwrap();
        assert_eq!(
            served.widget_names(),
            vec!["accident_count_by_severity", "street_view", "vision_zero_2_plus_1"]
        );
        assert_eq!(
            served.widgets[0].data.items,
            json!([{"severity": "light", "severity_label": "Light", "count": 42}])
        );
    }

    #[tokio::test]
    async fn one_payload_serves_every_language() {
        let service = service(seeded());
        let english = service.report(&segment_request()).await.unwrap();
        let hebrew = service
            .report(&segment_request().language(Language::He))
            .await
            .unwrap();

        assert_eq!(english.widget_names(), hebrew.widget_names());
        assert_ne!(english.meta.location_text, hebrew.meta.location_text);
        for (en, he) in english.widgets.iter().zip(&hebrew.widgets) {
            assert_eq!(en.meta.digest, he.meta.digest);
        }
    }

    #[tokio::test]
    async fn empty_dataset_keeps_static_widgets() {
        let empty = DuckDbStatistics::new(Arc::new(fixtures::empty_pool(2).unwrap()));
        let report = service(empty).report(&segment_request()).await.unwrap();

        assert!(report.widget("accident_count_by_severity").is_none());
        assert!(report.widget("street_view").is_some());
    }

    #[tokio::test]
    async fn news_item_requests() {
        let service = service(seeded());
        let report = service
            .report(&LocationRequest::for_news_flash(NEWS_ON_ROAD_90, 5))
            .await
            .unwrap();
        assert!(report.widget("head_on_collisions_comparison").is_some());

        assert!(matches!(
            service
                .report(&LocationRequest::for_news_flash(424_242, 5))
                .await,
            Err(InfographicsError::NotFound { id: 424_242 })
        ));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let service = service(seeded());
        assert!(matches!(
            service
                .report(&LocationRequest::new(LocationFields::new(), 5))
                .await,
            Err(InfographicsError::UnsupportedLocation { .. })
        ));

        let mut request = segment_request();
        request.lookback_years = 101;
        assert!(matches!(
            service.report(&request).await,
            Err(InfographicsError::InvalidLookback { years: 101 })
        ));
    }

    #[tokio::test]
    async fn unresolvable_names_are_not_found() {
        let service = service(seeded());

        let city = LocationRequest::new(
            LocationFields::new().with(LocationField::YishuvName, "Nowhere"),
            5,
        );
        let segment = LocationRequest::new(
            LocationFields::new()
                .with(LocationField::Road1, ROAD_90)
                .with(LocationField::RoadSegmentName, "Nowhere"),
            5,
        );
        for request in [city, segment] {
            assert!(matches!(
                service.report(&request).await,
                Err(InfographicsError::LocationNotFound { .. })
            ));
        }
    }

    #[tokio::test]
    async fn city_names_resolve_to_the_same_report_as_symbols() {
        let service = service(seeded());
        let by_name = service
            .report(&LocationRequest::new(
                LocationFields::new().with(LocationField::YishuvName, "Tel Aviv-Yafo"),
                5,
            ))
            .await
            .unwrap();
        let by_symbol = service
            .report(&LocationRequest::new(
                LocationFields::new().with(LocationField::YishuvSymbol, TEL_AVIV),
                5,
            ))
            .await
            .unwrap();

        assert_eq!(by_name.widget_names(), by_symbol.widget_names());
        let severity = |report: &Report| {
            report
                .widget("accident_count_by_severity")
                .map(|w| w.data.items.clone())
        };
        assert!(severity(&by_name).is_some());
        assert_eq!(severity(&by_name), severity(&by_symbol));
    }

    #[tokio::test]
    async fn junction_reports_ignore_road_order() {
        let service = service(seeded());
        let junction = |road1: i64, road2: i64| {
            LocationRequest::new(
                LocationFields::new()
                    .with(LocationField::Road1, road1)
                    .with(LocationField::Road2, road2),
                8,
            )
        };

        let stored = service.report(&junction(ROAD_90, 3199)).await.unwrap();
        let reversed = service.report(&junction(3199, ROAD_90)).await.unwrap();

        let severity = reversed.widget("accident_count_by_severity").unwrap();
        let total: i64 = severity
            .data
            .items
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["count"].as_i64().unwrap())
            .sum();
        assert_eq!(total, 1);

        assert_eq!(reversed.widget_names(), stored.widget_names());
        assert_eq!(reversed.meta.location_text, stored.meta.location_text);
        for (a, b) in reversed.widgets.iter().zip(&stored.widgets) {
            assert_eq!(a.data.items, b.data.items, "{}", a.name);
        }
    }
}
