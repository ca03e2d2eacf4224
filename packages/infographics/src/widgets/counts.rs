//! Single-column distribution widgets.
//!
//! Each one counts records at the location within the window, grouped by one
//! coded column, and reports `[{"<field>": key, "count": n}, ...]` in the
//! code's display order. Codes that collapse into the same bucket (age
//! groups, vehicle types) are summed.

use std::collections::BTreeMap;

use accident_map_accident_models::{
    AccidentSeverity, AccidentType, AgeBucket, DayNight, InjurySeverity, RoadLight,
    VehicleCategory,
};
use accident_map_report_models::LocationContext;
use accident_map_statistics::StatisticsSource as _;
use accident_map_statistics::query::{Column, CountOf, Entity, StatsQuery};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::localize::label_items;
use crate::widget::{DataSource, Widget, WidgetError};
use crate::widgets::{any_location, is_suburban};

/// How group codes map onto reported keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucketing {
    /// Accident severity code.
    Severity,
    /// Accident type code.
    AccidentType,
    /// Day/night code.
    DayNight,
    /// Road lighting code.
    RoadLight,
    /// Hour of day, reported as a number.
    Hour,
    /// Five-year age group collapsed into coarse buckets.
    AgeGroup,
    /// Vehicle type collapsed into categories.
    VehicleCategory,
}

impl Bucketing {
    /// Display position and key of `code`, or `None` for unknown codes.
    #[must_use]
    pub fn bucket(self, code: i64) -> Option<(i64, Value)> {
        let named = |order: i64, key: &str| Some((order, Value::String(key.to_string())));

        match self {
            Self::Severity => {
                AccidentSeverity::from_code(code).and_then(|s| named(code, s.as_ref()))
            }
            Self::AccidentType => {
                AccidentType::from_code(code).and_then(|t| named(code, t.as_ref()))
            }
            Self::DayNight => DayNight::from_code(code).and_then(|d| named(code, d.as_ref())),
            Self::RoadLight => RoadLight::from_code(code).and_then(|l| named(code, l.as_ref())),
            Self::Hour => (0..24).contains(&code).then(|| (code, Value::from(code))),
            Self::AgeGroup => {
                let bucket = AgeBucket::from_age_group(code);
                let order = AgeBucket::all().iter().position(|b| *b == bucket)?;
                named(i64::try_from(order).ok()?, bucket.as_ref())
            }
            Self::VehicleCategory => {
                let category = VehicleCategory::from_vehicle_type(code);
                let order = VehicleCategory::all().iter().position(|c| *c == category)?;
                named(i64::try_from(order).ok()?, category.as_ref())
            }
        }
    }

    /// Label namespace of the keys; `None` for keys shown as is.
    #[must_use]
    pub const fn label_prefix(self) -> Option<&'static str> {
        match self {
            Self::Severity => Some("severity"),
            Self::AccidentType => Some("accident_type"),
            Self::DayNight => Some("day_night"),
            Self::RoadLight => Some("road_light"),
            Self::Hour => None,
            Self::AgeGroup => Some("age_group"),
            Self::VehicleCategory => Some("vehicle"),
        }
    }
}

/// A distribution of one coded column.
pub struct CountBy {
    name: &'static str,
    rank: i32,
    entity: Entity,
    column: Column,
    count: CountOf,
    filters: &'static [(Column, &'static [i64])],
    bucketing: Bucketing,
    field: &'static str,
    relevant: fn(&LocationContext) -> bool,
}

#[async_trait]
impl Widget for CountBy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn rank(&self) -> i32 {
        self.rank
    }

    fn is_relevant(&self, ctx: &LocationContext) -> bool {
        (self.relevant)(ctx)
    }

    async fn compute(
        &self,
        ctx: &LocationContext,
        source: &dyn DataSource,
    ) -> Result<Value, WidgetError> {
        let query = self.filters.iter().fold(
            StatsQuery::for_context(self.entity, ctx)
                .group_by(self.column)
                .count(self.count),
            |query, (column, values)| query.filter_any(*column, values.iter().copied()),
        );
        let result = source.query(&query).await?;

        let mut buckets: BTreeMap<i64, (Value, i64)> = BTreeMap::new();
        for group in result.groups() {
            match self.bucketing.bucket(group.key) {
                Some((order, key)) => buckets.entry(order).or_insert((key, 0)).1 += group.count,
                None => log::debug!(
                    "{}: skipping unknown {} code {}",
                    self.name,
                    self.column,
                    group.key
                ),
            }
        }

        Ok(Value::Array(
            buckets
                .into_values()
                .filter(|(_, count)| *count > 0)
                .map(|(key, count)| {
                    let mut item = Map::new();
                    item.insert(self.field.to_string(), key);
                    item.insert("count".to_string(), Value::from(count));
                    Value::Object(item)
                })
                .collect(),
        ))
    }

    fn localize(&self, ctx: &LocationContext, items: Value) -> Result<Value, WidgetError> {
        match self.bucketing.label_prefix() {
            Some(prefix) => label_items(items, self.field, prefix, ctx.language),
            None => Ok(items),
        }
    }
}

const ALL_INJURIES: &[i64] = &[
    InjurySeverity::Killed as i64,
    InjurySeverity::SeverelyInjured as i64,
    InjurySeverity::LightlyInjured as i64,
];

/// Accidents by severity.
#[must_use]
pub fn accident_count_by_severity() -> CountBy {
    CountBy {
        name: "accident_count_by_severity",
        rank: 1,
        entity: Entity::Accidents,
        column: Column::AccidentSeverity,
        count: CountOf::Rows,
        filters: &[],
        bucketing: Bucketing::Severity,
        field: "severity",
        relevant: any_location,
    }
}

/// Accidents by accident type.
#[must_use]
pub fn accident_count_by_accident_type() -> CountBy {
    CountBy {
        name: "accident_count_by_accident_type",
        rank: 6,
        entity: Entity::Accidents,
        column: Column::AccidentType,
        count: CountOf::Rows,
        filters: &[],
        bucketing: Bucketing::AccidentType,
        field: "accident_type",
        relevant: any_location,
    }
}

/// Accidents by day or night.
#[must_use]
pub fn accident_count_by_day_night() -> CountBy {
    CountBy {
        name: "accident_count_by_day_night",
        rank: 10,
        entity: Entity::Accidents,
        column: Column::DayNight,
        count: CountOf::Rows,
        filters: &[],
        bucketing: Bucketing::DayNight,
        field: "day_night",
        relevant: any_location,
    }
}

/// Accidents by hour of day.
#[must_use]
pub fn accident_count_by_hour() -> CountBy {
    CountBy {
        name: "accident_count_by_hour",
        rank: 11,
        entity: Entity::Accidents,
        column: Column::AccidentHour,
        count: CountOf::Rows,
        filters: &[],
        bucketing: Bucketing::Hour,
        field: "hour",
        relevant: any_location,
    }
}

/// Accidents on inter-city roads by lighting conditions.
#[must_use]
pub fn accident_count_by_road_light() -> CountBy {
    CountBy {
        name: "accident_count_by_road_light",
        rank: 12,
        entity: Entity::Accidents,
        column: Column::RoadLight,
        count: CountOf::Rows,
        filters: &[],
        bucketing: Bucketing::RoadLight,
        field: "road_light",
        relevant: is_suburban,
    }
}

/// Injured people by age bucket.
#[must_use]
pub fn injured_count_per_age_group() -> CountBy {
    CountBy {
        name: "injured_count_per_age_group",
        rank: 14,
        entity: Entity::Involved,
        column: Column::AgeGroup,
        count: CountOf::Rows,
        filters: &[(Column::InjurySeverity, ALL_INJURIES)],
        bucketing: Bucketing::AgeGroup,
        field: "age_group",
        relevant: any_location,
    }
}

/// Accidents by category of involved vehicle. An accident involving two
/// categories counts once for each.
#[must_use]
pub fn accident_count_by_car_type() -> CountBy {
    CountBy {
        name: "accident_count_by_car_type",
        rank: 15,
        entity: Entity::Vehicles,
        column: Column::VehicleType,
        count: CountOf::Distinct(Column::AccidentId),
        filters: &[],
        bucketing: Bucketing::VehicleCategory,
        field: "vehicle_type",
        relevant: any_location,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::widgets::test_support::{empty_source, segment_ctx, street_ctx};

    #[tokio::test]
    async fn counts_severities_in_window() {
        let items = accident_count_by_severity()
            .compute(&segment_ctx(5), &seeded())
            .await
            .unwrap();
        assert_eq!(
            items,
            json!([
                {"severity": "fatal", "count": 1},
                {"severity": "severe", "count": 1},
                {"severity": "light", "count": 1},
            ])
        );
    }

    #[tokio::test]
    async fn empty_source_yields_empty_items() {
        let widget = accident_count_by_severity();
        let items = widget.compute(&segment_ctx(5), &empty_source()).await.unwrap();
        assert_eq!(items, json!([]));
        assert!(!widget.is_included(&items));
    }

    #[tokio::test]
    async fn collapses_age_groups_into_buckets() {
        // Involved on the segment since 2016: age groups 7 and 8 (accident
        // 1), 5 (accident 2), 10 (accident 3).
        let items = injured_count_per_age_group()
            .compute(&segment_ctx(5), &seeded())
            .await
            .unwrap();
        assert_eq!(
            items,
            json!([
                {"age_group": "age_15_24", "count": 1},
                {"age_group": "age_25_64", "count": 3},
            ])
        );
    }

    #[tokio::test]
    async fn counts_distinct_accidents_per_vehicle_category() {
        // Dizengoff: accident 10 (car), 11 (car, bus), 12 (bicycle).
        let items = accident_count_by_car_type()
            .compute(&street_ctx(8), &seeded())
            .await
            .unwrap();
        assert_eq!(
            items,
            json!([
                {"vehicle_type": "car", "count": 2},
                {"vehicle_type": "bicycle", "count": 1},
                {"vehicle_type": "bus", "count": 1},
            ])
        );
    }

    #[tokio::test]
    async fn hours_are_numeric() {
        let items = accident_count_by_hour()
            .compute(&segment_ctx(5), &seeded())
            .await
            .unwrap();
        assert_eq!(
            items,
            json!([
                {"hour": 8, "count": 1},
                {"hour": 14, "count": 1},
                {"hour": 22, "count": 1},
            ])
        );

        let widget = accident_count_by_hour();
        assert_eq!(widget.localize(&segment_ctx(5), items.clone()).unwrap(), items);
    }

    #[test]
    fn localizes_labels_only() {
        let widget = accident_count_by_severity();
        let items = json!([{"severity": "severe", "count": 4}]);
        let localized = widget.localize(&segment_ctx(5), items).unwrap();
        assert_eq!(
            localized,
            json!([{"severity": "severe", "severity_label": "Severe", "count": 4}])
        );
    }

    #[test]
    fn road_light_is_only_for_inter_city_roads() {
        let widget = accident_count_by_road_light();
        assert!(widget.is_relevant(&segment_ctx(5)));
        assert!(!widget.is_relevant(&street_ctx(5)));
    }

    fn seeded() -> accident_map_statistics::duckdb_source::DuckDbStatistics {
        crate::widgets::test_support::seeded_source()
    }
}
