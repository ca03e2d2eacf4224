//! Request resolution.
//!
//! Turns raw request identifiers into a validated [`LocationContext`]:
//! validate the lookback window, seed fields from a news item if one is
//! given, pick the resolution kind, backfill ids and names from the
//! reference tables, and anchor the date window to the latest record in
//! the whole dataset.

use std::sync::Arc;

use accident_map_accident_models::{Language, ResolutionKind};
use accident_map_report_models::{
    FieldValue, LocationContext, LocationField, LocationFields, validate_lookback,
};
use accident_map_statistics::{LocationLookup, StatisticsError};
use chrono::{NaiveDate, Utc};

use crate::InfographicsError;

/// A report request before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRequest {
    /// News item whose location seeds the request.
    pub news_flash_id: Option<i64>,
    /// Explicit location fields. Take precedence over news item fields.
    pub fields: LocationFields,
    /// Lookback window in years.
    pub lookback_years: i64,
    /// Output language.
    pub language: Language,
}

impl LocationRequest {
    /// A request for explicit location fields.
    #[must_use]
    pub const fn new(fields: LocationFields, lookback_years: i64) -> Self {
        Self {
            news_flash_id: None,
            fields,
            lookback_years,
            language: Language::He,
        }
    }

    /// A request for the location of a news item.
    #[must_use]
    pub const fn for_news_flash(id: i64, lookback_years: i64) -> Self {
        Self {
            news_flash_id: Some(id),
            fields: LocationFields::new(),
            lookback_years,
            language: Language::He,
        }
    }

    /// Sets the output language.
    #[must_use]
    pub const fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

/// Picks the resolution kind from the fields present, in priority order:
/// road segment, urban junction, street, suburban junction, city, district,
/// region.
#[must_use]
pub fn classify(fields: &LocationFields) -> Option<ResolutionKind> {
    let has = |field| fields.contains(field);
    let city = has(LocationField::YishuvSymbol) || has(LocationField::YishuvName);
    let street1 = has(LocationField::Street1) || has(LocationField::Street1Hebrew);
    let street2 = has(LocationField::Street2) || has(LocationField::Street2Hebrew);

    if has(LocationField::RoadSegmentId)
        || (has(LocationField::Road1) && has(LocationField::RoadSegmentName))
    {
        Some(ResolutionKind::SuburbanRoad)
    } else if city && street1 && street2 {
        Some(ResolutionKind::UrbanJunction)
    } else if city && street1 {
        Some(ResolutionKind::Street)
    } else if has(LocationField::NonUrbanIntersection)
        || has(LocationField::NonUrbanIntersectionHebrew)
        || (has(LocationField::Road1) && has(LocationField::Road2))
    {
        Some(ResolutionKind::SuburbanJunction)
    } else if city {
        Some(ResolutionKind::City)
    } else if has(LocationField::District) {
        Some(ResolutionKind::District)
    } else if has(LocationField::Region) {
        Some(ResolutionKind::Region)
    } else {
        None
    }
}

/// Resolves requests against the reference tables.
#[derive(Clone)]
pub struct LocationResolver {
    lookup: Arc<dyn LocationLookup>,
}

impl LocationResolver {
    /// Creates a resolver over `lookup`.
    #[must_use]
    pub fn new(lookup: Arc<dyn LocationLookup>) -> Self {
        Self { lookup }
    }

    /// Resolves `request` into a context.
    ///
    /// # Errors
    ///
    /// * [`InfographicsError::InvalidLookback`] if the window is outside
    ///   `[0, 100]`; checked before any query runs
    /// * [`InfographicsError::NotFound`] if the news item does not exist
    /// * [`InfographicsError::UnsupportedLocation`] if no resolution kind
    ///   matches the fields
    /// * [`InfographicsError::LocationNotFound`] if a name does not resolve
    ///   to the identifier the resolution kind filters on
    /// * [`InfographicsError::Statistics`] if a required query fails
    pub async fn resolve(
        &self,
        request: &LocationRequest,
    ) -> Result<LocationContext, InfographicsError> {
        let years = validate_lookback(request.lookback_years)?;

        let mut fields = request.fields.clone();
        let mut seeded_kind = None;
        if let Some(id) = request.news_flash_id {
            let news = self
                .lookup
                .news_flash(id)
                .await?
                .ok_or(InfographicsError::NotFound { id })?;
            for (field, value) in news.fields.iter() {
                if !fields.contains(field) {
                    fields.insert(field, value.clone());
                }
            }
            seeded_kind = news.resolution;
        }

        let kind = seeded_kind
            .filter(|kind| !fields.restricted_to(*kind).is_empty())
            .or_else(|| classify(&fields))
            .ok_or_else(|| InfographicsError::UnsupportedLocation {
                message: format!("no resolution kind matches {fields:?}"),
            })?;

        let fields = self.backfill(kind, fields.restricted_to(kind)).await?;
        if let Some(missing) = required_identifiers(kind)
            .iter()
            .find(|field| fields.int(**field).is_none())
        {
            return Err(InfographicsError::LocationNotFound {
                message: format!("no {missing} for {kind} {fields:?}"),
            });
        }
        let latest = self.anchor_date().await?;

        Ok(LocationContext::new(
            kind,
            fields,
            i64::from(years),
            latest,
            request.language,
        )?)
    }

    /// The date the window ends on: the latest record in the dataset, or
    /// today if the dataset is empty.
    ///
    /// # Errors
    ///
    /// Returns [`InfographicsError::Statistics`] if the query fails.
    pub async fn anchor_date(&self) -> Result<NaiveDate, InfographicsError> {
        Ok(self.lookup.latest_record_date().await?.unwrap_or_else(|| {
            let today = Utc::now().date_naive();
            log::warn!("Accident dataset is empty; anchoring report windows to {today}");
            today
        }))
    }

    /// Fills missing ids from names and names from ids, and takes road
    /// numbers from the reference row so they come out in stored order.
    /// A display name that cannot be looked up is left out.
    async fn backfill(
        &self,
        kind: ResolutionKind,
        mut fields: LocationFields,
    ) -> Result<LocationFields, InfographicsError> {
        let lookup = self.lookup.as_ref();

        match kind {
            ResolutionKind::SuburbanRoad => {
                let segment = if let Some(id) = fields.int(LocationField::RoadSegmentId) {
                    soft(lookup.road_segment(id).await, "road segment")
                } else if let (Some(road), Some(name)) = (
                    fields.int(LocationField::Road1),
                    fields.text(LocationField::RoadSegmentName),
                ) {
                    lookup.road_segment_by_name(road, name).await?
                } else {
                    None
                };

                if let Some(segment) = segment {
                    fields.insert(LocationField::Road1, segment.road);
                    fields.insert(LocationField::RoadSegmentId, segment.segment_id);
                    fill(&mut fields, LocationField::RoadSegmentName, segment.name);
                }
            }
            ResolutionKind::UrbanJunction | ResolutionKind::Street | ResolutionKind::City => {
                self.backfill_city(&mut fields).await?;
                if kind != ResolutionKind::City {
                    self.backfill_street(
                        &mut fields,
                        LocationField::Street1,
                        LocationField::Street1Hebrew,
                    )
                    .await?;
                }
                if kind == ResolutionKind::UrbanJunction {
                    self.backfill_street(
                        &mut fields,
                        LocationField::Street2,
                        LocationField::Street2Hebrew,
                    )
                    .await?;
                }
            }
            ResolutionKind::SuburbanJunction => {
                let junction = if let Some(id) = fields.int(LocationField::NonUrbanIntersection) {
                    soft(lookup.junction(id).await, "junction")
                } else if let (Some(road1), Some(road2)) = (
                    fields.int(LocationField::Road1),
                    fields.int(LocationField::Road2),
                ) {
                    lookup.junction_by_roads(road1, road2).await?
                } else {
                    None
                };

                if let Some(junction) = junction {
                    fields.insert(LocationField::NonUrbanIntersection, junction.id);
                    fields.insert(LocationField::Road1, junction.road1);
                    fields.insert(LocationField::Road2, junction.road2);
                    fill(&mut fields, LocationField::NonUrbanIntersectionHebrew, junction.name);
                }
            }
            ResolutionKind::District | ResolutionKind::Region => {}
        }

        Ok(fields)
    }

    async fn backfill_city(&self, fields: &mut LocationFields) -> Result<(), InfographicsError> {
        if let Some(symbol) = fields.int(LocationField::YishuvSymbol) {
            if !fields.contains(LocationField::YishuvName)
                && let Some(name) = soft(self.lookup.city_name(symbol).await, "city name")
            {
                fields.insert(LocationField::YishuvName, name);
            }
        } else if let Some(name) = fields.text(LocationField::YishuvName)
            && let Some(symbol) = self.lookup.city_symbol(name).await?
        {
            fields.insert(LocationField::YishuvSymbol, symbol);
        }
        Ok(())
    }

    async fn backfill_street(
        &self,
        fields: &mut LocationFields,
        code_field: LocationField,
        name_field: LocationField,
    ) -> Result<(), InfographicsError> {
        let Some(city) = fields.int(LocationField::YishuvSymbol) else {
            return Ok(());
        };

        if let Some(code) = fields.int(code_field) {
            if !fields.contains(name_field)
                && let Some(name) = soft(self.lookup.street_name(city, code).await, "street name")
            {
                fields.insert(name_field, name);
            }
        } else if let Some(name) = fields.text(name_field)
            && let Some(code) = self.lookup.street_code(city, name).await?
        {
            fields.insert(code_field, code);
        }
        Ok(())
    }
}

/// Identifiers a context of `kind` must carry after backfill. Statistics
/// filter on identifiers only, so a missing one would widen the report.
const fn required_identifiers(kind: ResolutionKind) -> &'static [LocationField] {
    match kind {
        ResolutionKind::SuburbanRoad => &[LocationField::RoadSegmentId],
        ResolutionKind::UrbanJunction => &[
            LocationField::YishuvSymbol,
            LocationField::Street1,
            LocationField::Street2,
        ],
        ResolutionKind::Street => &[LocationField::YishuvSymbol, LocationField::Street1],
        ResolutionKind::SuburbanJunction => &[LocationField::NonUrbanIntersection],
        ResolutionKind::City => &[LocationField::YishuvSymbol],
        ResolutionKind::District => &[LocationField::District],
        ResolutionKind::Region => &[LocationField::Region],
    }
}

fn fill(fields: &mut LocationFields, field: LocationField, value: impl Into<FieldValue>) {
    if !fields.contains(field) {
        fields.insert(field, value);
    }
}

fn soft<T>(result: Result<Option<T>, StatisticsError>, what: &str) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Failed to look up {what}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use accident_map_database::fixtures::{
        self, DIZENGOFF, EIN_GEDI_JUNCTION, HERZL, NEWS_ON_DIZENGOFF, NEWS_ON_ROAD_90,
        NEWS_WITHOUT_LOCATION, ROAD_90, SEGMENT_EIN_GEDI_MASADA, SEGMENT_EIN_GEDI_MASADA_NAME,
        TEL_AVIV,
    };
    use accident_map_report_models::LocationKey;
    use accident_map_statistics::duckdb_source::DuckDbStatistics;

    use super::*;

    fn resolver() -> LocationResolver {
        LocationResolver::new(Arc::new(DuckDbStatistics::new(Arc::new(
            fixtures::seeded_pool(2).unwrap(),
        ))))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn classifies_in_priority_order() {
        let segment = LocationFields::new()
            .with(LocationField::Road1, 90)
            .with(LocationField::RoadSegmentName, "X")
            .with(LocationField::YishuvSymbol, 5000);
        assert_eq!(classify(&segment), Some(ResolutionKind::SuburbanRoad));

        let junction = LocationFields::new()
            .with(LocationField::YishuvName, "Tel Aviv-Yafo")
            .with(LocationField::Street1, 418)
            .with(LocationField::Street2Hebrew, "Herzl");
        assert_eq!(classify(&junction), Some(ResolutionKind::UrbanJunction));

        let street = LocationFields::new()
            .with(LocationField::YishuvSymbol, 5000)
            .with(LocationField::Street1, 418);
        assert_eq!(classify(&street), Some(ResolutionKind::Street));

        let roads = LocationFields::new()
            .with(LocationField::Road1, 90)
            .with(LocationField::Road2, 3199);
        assert_eq!(classify(&roads), Some(ResolutionKind::SuburbanJunction));

        let city = LocationFields::new().with(LocationField::YishuvSymbol, 5000);
        assert_eq!(classify(&city), Some(ResolutionKind::City));

        let district = LocationFields::new().with(LocationField::District, 15);
        assert_eq!(classify(&district), Some(ResolutionKind::District));

        let region = LocationFields::new().with(LocationField::Region, 6);
        assert_eq!(classify(&region), Some(ResolutionKind::Region));

        let road_only = LocationFields::new().with(LocationField::Road1, 90);
        assert_eq!(classify(&road_only), None);
    }

    #[tokio::test]
    async fn resolves_segment_by_name_and_anchors_to_latest_record() {
        let request = LocationRequest::new(
            LocationFields::new()
                .with(LocationField::Road1, ROAD_90)
                .with(LocationField::RoadSegmentName, SEGMENT_EIN_GEDI_MASADA_NAME),
            5,
        );

        let ctx = resolver().resolve(&request).await.unwrap();
        assert_eq!(ctx.resolution, ResolutionKind::SuburbanRoad);
        assert_eq!(
            ctx.fields.int(LocationField::RoadSegmentId),
            Some(SEGMENT_EIN_GEDI_MASADA)
        );
        assert_eq!(ctx.start_date, date(2016, 1, 1));
        assert_eq!(ctx.end_date, date(2020, 6, 15));
    }

    #[tokio::test]
    async fn unknown_names_are_not_found() {
        let resolver = resolver();

        let segment = LocationRequest::new(
            LocationFields::new()
                .with(LocationField::Road1, ROAD_90)
                .with(LocationField::RoadSegmentName, "X"),
            5,
        );
        let city = LocationRequest::new(
            LocationFields::new().with(LocationField::YishuvName, "Nowhere"),
            5,
        );
        let street = LocationRequest::new(
            LocationFields::new()
                .with(LocationField::YishuvSymbol, TEL_AVIV)
                .with(LocationField::Street1Hebrew, "Nowhere"),
            5,
        );
        let junction = LocationRequest::new(
            LocationFields::new()
                .with(LocationField::Road1, ROAD_90)
                .with(LocationField::Road2, 1),
            5,
        );

        for request in [segment, city, street, junction] {
            assert!(
                matches!(
                    resolver.resolve(&request).await,
                    Err(InfographicsError::LocationNotFound { .. })
                ),
                "{:?} should not resolve",
                request.fields
            );
        }
    }

    #[tokio::test]
    async fn unknown_display_name_is_not_fatal() {
        let ctx = resolver()
            .resolve(&LocationRequest::new(
                LocationFields::new().with(LocationField::YishuvSymbol, 4242),
                5,
            ))
            .await
            .unwrap();
        assert_eq!(ctx.resolution, ResolutionKind::City);
        assert_eq!(ctx.fields.int(LocationField::YishuvSymbol), Some(4242));
        assert!(!ctx.fields.contains(LocationField::YishuvName));
    }

    #[tokio::test]
    async fn backfills_city_and_street_names() {
        let request = LocationRequest::new(
            LocationFields::new()
                .with(LocationField::YishuvName, "Tel Aviv-Yafo")
                .with(LocationField::Street1Hebrew, "Dizengoff")
                .with(LocationField::Street2, HERZL),
            3,
        );

        let ctx = resolver().resolve(&request).await.unwrap();
        assert_eq!(ctx.resolution, ResolutionKind::UrbanJunction);
        assert_eq!(ctx.fields.int(LocationField::YishuvSymbol), Some(TEL_AVIV));
        assert_eq!(ctx.fields.int(LocationField::Street1), Some(DIZENGOFF));
        assert_eq!(ctx.fields.text(LocationField::Street2Hebrew), Some("Herzl"));
    }

    #[tokio::test]
    async fn resolves_junction_from_road_pair() {
        let resolver = resolver();
        let request = |road1: i64, road2: i64| {
            LocationRequest::new(
                LocationFields::new()
                    .with(LocationField::Road1, road1)
                    .with(LocationField::Road2, road2),
                8,
            )
        };

        let reversed = resolver.resolve(&request(3199, ROAD_90)).await.unwrap();
        assert_eq!(reversed.resolution, ResolutionKind::SuburbanJunction);
        assert_eq!(
            reversed.fields.int(LocationField::NonUrbanIntersection),
            Some(EIN_GEDI_JUNCTION)
        );
        assert_eq!(reversed.fields.int(LocationField::Road1), Some(ROAD_90));
        assert_eq!(reversed.fields.int(LocationField::Road2), Some(3199));

        let stored = resolver.resolve(&request(ROAD_90, 3199)).await.unwrap();
        assert_eq!(reversed.location_key(), stored.location_key());

        let eligible = resolver
            .lookup
            .eligible_locations(ResolutionKind::SuburbanJunction)
            .await
            .unwrap();
        assert_eq!(
            reversed.location_key(),
            LocationKey::new(ResolutionKind::SuburbanJunction, &eligible[0])
        );
    }

    #[tokio::test]
    async fn seeds_from_news_items() {
        let resolver = resolver();

        let road = resolver
            .resolve(&LocationRequest::for_news_flash(NEWS_ON_ROAD_90, 5))
            .await
            .unwrap();
        assert_eq!(road.resolution, ResolutionKind::SuburbanRoad);

        let street = resolver
            .resolve(&LocationRequest::for_news_flash(NEWS_ON_DIZENGOFF, 5))
            .await
            .unwrap();
        assert_eq!(street.resolution, ResolutionKind::Street);

        assert!(matches!(
            resolver
                .resolve(&LocationRequest::for_news_flash(NEWS_WITHOUT_LOCATION, 5))
                .await,
            Err(InfographicsError::UnsupportedLocation { .. })
        ));
        assert!(matches!(
            resolver
                .resolve(&LocationRequest::for_news_flash(424_242, 5))
                .await,
            Err(InfographicsError::NotFound { id: 424_242 })
        ));
    }

    #[tokio::test]
    async fn lookback_bounds() {
        let resolver = resolver();
        let fields =
            LocationFields::new().with(LocationField::RoadSegmentId, SEGMENT_EIN_GEDI_MASADA);

        for years in [0, 100] {
            let ctx = resolver
                .resolve(&LocationRequest::new(fields.clone(), years))
                .await
                .unwrap();
            assert_eq!(i64::from(ctx.lookback_years), years);
        }

        for years in [-1, 101] {
            assert!(matches!(
                resolver
                    .resolve(&LocationRequest::new(fields.clone(), years))
                    .await,
                Err(InfographicsError::InvalidLookback { .. })
            ));
        }
    }

    #[tokio::test]
    async fn rejects_requests_without_location() {
        assert!(matches!(
            resolver()
                .resolve(&LocationRequest::new(LocationFields::new(), 5))
                .await,
            Err(InfographicsError::UnsupportedLocation { .. })
        ));
    }

    #[tokio::test]
    async fn empty_dataset_anchors_to_today() {
        let resolver = LocationResolver::new(Arc::new(DuckDbStatistics::new(Arc::new(
            fixtures::empty_pool(1).unwrap(),
        ))));
        let ctx = resolver
            .resolve(&LocationRequest::new(
                LocationFields::new().with(LocationField::RoadSegmentId, 1),
                1,
            ))
            .await
            .unwrap();
        assert_eq!(ctx.end_date, Utc::now().date_naive());
    }
}
