//! Built-in widgets.

pub mod accidents;
pub mod counts;
pub mod road;
pub mod yearly;

use std::sync::Arc;

use accident_map_accident_models::ResolutionKind;
use accident_map_report_models::{LocationContext, LocationField};

use crate::registry::WidgetRegistry;

/// Registers every built-in widget, in display order.
pub fn register_builtin(registry: &mut WidgetRegistry) {
    registry.register(Arc::new(counts::accident_count_by_severity()));
    registry.register(Arc::new(accidents::MostSevereAccidentsTable));
    registry.register(Arc::new(accidents::MostSevereAccidents));
    registry.register(Arc::new(road::StreetView));
    registry.register(Arc::new(road::HeadOnCollisionsComparison));
    registry.register(Arc::new(counts::accident_count_by_accident_type()));
    registry.register(Arc::new(accidents::AccidentsHeatMap));
    registry.register(Arc::new(yearly::accident_count_by_accident_year()));
    registry.register(Arc::new(yearly::injured_count_by_accident_year()));
    registry.register(Arc::new(counts::accident_count_by_day_night()));
    registry.register(Arc::new(counts::accident_count_by_hour()));
    registry.register(Arc::new(counts::accident_count_by_road_light()));
    registry.register(Arc::new(road::TopRoadSegmentsAccidentsPerKm));
    registry.register(Arc::new(counts::injured_count_per_age_group()));
    registry.register(Arc::new(counts::accident_count_by_car_type()));
    registry.register(Arc::new(road::VisionZeroTwoPlusOne));
}

/// Every location with at least one identifier to filter on.
pub fn any_location(ctx: &LocationContext) -> bool {
    ctx.fields
        .iter()
        .any(|(field, value)| field.is_identifier() && value.as_int().is_some())
}

/// A road segment with a known segment id.
pub fn is_road_segment(ctx: &LocationContext) -> bool {
    ctx.resolution == ResolutionKind::SuburbanRoad
        && ctx.fields.contains(LocationField::RoadSegmentId)
}

/// A street or urban junction with a known city and street.
pub fn is_street(ctx: &LocationContext) -> bool {
    matches!(
        ctx.resolution,
        ResolutionKind::Street | ResolutionKind::UrbanJunction
    ) && ctx.fields.contains(LocationField::YishuvSymbol)
        && ctx.fields.contains(LocationField::Street1)
}

/// An inter-city road or junction.
pub const fn is_suburban(ctx: &LocationContext) -> bool {
    matches!(
        ctx.resolution,
        ResolutionKind::SuburbanRoad | ResolutionKind::SuburbanJunction
    )
}

/// A road segment or a street: places with few enough accidents to list.
pub fn is_segment_or_street(ctx: &LocationContext) -> bool {
    is_road_segment(ctx) || is_street(ctx)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use accident_map_accident_models::{Language, ResolutionKind};
    use accident_map_database::fixtures::{
        self, DIZENGOFF, ROAD_90, SEGMENT_EIN_GEDI_MASADA, SEGMENT_EIN_GEDI_MASADA_NAME, TEL_AVIV,
    };
    use accident_map_report_models::{LocationContext, LocationField, LocationFields};
    use accident_map_statistics::duckdb_source::DuckDbStatistics;
    use chrono::NaiveDate;

    pub fn seeded_source() -> DuckDbStatistics {
        DuckDbStatistics::new(Arc::new(fixtures::seeded_pool(2).unwrap()))
    }

    pub fn empty_source() -> DuckDbStatistics {
        DuckDbStatistics::new(Arc::new(fixtures::empty_pool(1).unwrap()))
    }

    pub fn segment_ctx(years: i64) -> LocationContext {
        LocationContext::new(
            ResolutionKind::SuburbanRoad,
            LocationFields::new()
                .with(LocationField::Road1, ROAD_90)
                .with(LocationField::RoadSegmentId, SEGMENT_EIN_GEDI_MASADA)
                .with(LocationField::RoadSegmentName, SEGMENT_EIN_GEDI_MASADA_NAME),
            years,
            NaiveDate::from_ymd_opt(2020, 6, 15).unwrap(),
            Language::En,
        )
        .unwrap()
    }

    pub fn street_ctx(years: i64) -> LocationContext {
        LocationContext::new(
            ResolutionKind::Street,
            LocationFields::new()
                .with(LocationField::YishuvSymbol, TEL_AVIV)
                .with(LocationField::YishuvName, "Tel Aviv-Yafo")
                .with(LocationField::Street1, DIZENGOFF)
                .with(LocationField::Street1Hebrew, "Dizengoff"),
            years,
            NaiveDate::from_ymd_opt(2020, 6, 15).unwrap(),
            Language::En,
        )
        .unwrap()
    }

    pub fn city_ctx() -> LocationContext {
        LocationContext::new(
            ResolutionKind::City,
            LocationFields::new().with(LocationField::YishuvSymbol, TEL_AVIV),
            5,
            NaiveDate::from_ymd_opt(2020, 6, 15).unwrap(),
            Language::En,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use accident_map_accident_models::Language;
    use accident_map_report_models::LocationFields;
    use chrono::NaiveDate;

    use super::test_support::{city_ctx, segment_ctx, street_ctx};
    use super::*;

    #[test]
    fn relevance_predicates() {
        assert!(is_road_segment(&segment_ctx(5)));
        assert!(!is_road_segment(&street_ctx(5)));
        assert!(is_street(&street_ctx(5)));
        assert!(!is_street(&city_ctx()));
        assert!(is_suburban(&segment_ctx(5)));
        assert!(!is_suburban(&city_ctx()));
        assert!(is_segment_or_street(&street_ctx(5)));
        assert!(any_location(&city_ctx()));
    }

    #[test]
    fn names_alone_are_not_a_location() {
        let ctx = LocationContext::new(
            ResolutionKind::City,
            LocationFields::new().with(LocationField::YishuvName, "Nowhere"),
            5,
            NaiveDate::from_ymd_opt(2020, 6, 15).unwrap(),
            Language::En,
        )
        .unwrap();
        assert!(!any_location(&ctx));
        assert!(!is_segment_or_street(&ctx));
    }
}
