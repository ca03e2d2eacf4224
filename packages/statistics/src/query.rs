//! Typed query model and its SQL rendering.
//!
//! Columns are a closed set, and each entity declares which of them it
//! carries, so an unsupported column is rejected before any SQL is built.
//! Values always travel as bound parameters.

use std::collections::BTreeMap;

use accident_map_report_models::{LocationContext, LocationField, LocationFields};
use chrono::{Days, NaiveDate, NaiveDateTime};
use duckdb::types::Value;
use strum_macros::{AsRefStr, Display};

use crate::StatisticsError;

/// A countable record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Entity {
    /// One row per accident.
    Accidents,
    /// One row per involved person.
    Involved,
    /// One row per vehicle.
    Vehicles,
}

impl Entity {
    /// Backing table.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Accidents => "accidents",
            Self::Involved => "involved",
            Self::Vehicles => "vehicles",
        }
    }

    /// Whether records of this entity carry `column`.
    #[must_use]
    pub const fn supports(self, column: Column) -> bool {
        match column {
            Column::Id
            | Column::RoadType
            | Column::Road1
            | Column::Road2
            | Column::RoadSegmentId
            | Column::NonUrbanIntersection
            | Column::YishuvSymbol
            | Column::Street1
            | Column::Street2
            | Column::District
            | Column::Region
            | Column::AccidentYear
            | Column::AccidentHour => true,
            Column::AccidentId | Column::VehicleType => {
                matches!(self, Self::Involved | Self::Vehicles)
            }
            Column::AccidentSeverity => matches!(self, Self::Accidents | Self::Vehicles),
            Column::AccidentType | Column::DayNight | Column::RoadLight => {
                matches!(self, Self::Accidents)
            }
            Column::InjurySeverity | Column::InjuredType | Column::AgeGroup => {
                matches!(self, Self::Involved)
            }
        }
    }
}

/// A filterable, groupable, or countable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Column {
    /// Record id.
    Id,
    /// Parent accident id.
    AccidentId,
    /// Accident severity code.
    AccidentSeverity,
    /// Accident type code.
    AccidentType,
    /// Road type code.
    RoadType,
    /// Road number.
    Road1,
    /// Second road number.
    Road2,
    /// Road segment id.
    RoadSegmentId,
    /// Non-urban junction id.
    NonUrbanIntersection,
    /// City symbol.
    YishuvSymbol,
    /// Street code.
    Street1,
    /// Second street code.
    Street2,
    /// District code.
    District,
    /// Region code.
    Region,
    /// Day or night code.
    DayNight,
    /// Lighting condition code.
    RoadLight,
    /// Injury severity code of an involved person.
    InjurySeverity,
    /// Role of an involved person (driver, passenger, pedestrian).
    InjuredType,
    /// Age group code of an involved person.
    AgeGroup,
    /// Vehicle type code.
    VehicleType,
    /// Calendar year of the accident.
    AccidentYear,
    /// Hour of day of the accident.
    AccidentHour,
}

impl Column {
    /// SQL expression selecting this column.
    #[must_use]
    pub const fn expression(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::AccidentId => "accident_id",
            Self::AccidentSeverity => "accident_severity",
            Self::AccidentType => "accident_type",
            Self::RoadType => "road_type",
            Self::Road1 => "road1",
            Self::Road2 => "road2",
            Self::RoadSegmentId => "road_segment_id",
            Self::NonUrbanIntersection => "non_urban_intersection",
            Self::YishuvSymbol => "yishuv_symbol",
            Self::Street1 => "street1",
            Self::Street2 => "street2",
            Self::District => "district",
            Self::Region => "region",
            Self::DayNight => "day_night",
            Self::RoadLight => "road_light",
            Self::InjurySeverity => "injury_severity",
            Self::InjuredType => "injured_type",
            Self::AgeGroup => "age_group",
            Self::VehicleType => "vehicle_type",
            Self::AccidentYear => "year(accident_timestamp)",
            Self::AccidentHour => "hour(accident_timestamp)",
        }
    }

    /// Column holding a location identifier field. Name fields have no
    /// column.
    #[must_use]
    pub const fn for_location_field(field: LocationField) -> Option<Self> {
        match field {
            LocationField::Road1 => Some(Self::Road1),
            LocationField::Road2 => Some(Self::Road2),
            LocationField::RoadSegmentId => Some(Self::RoadSegmentId),
            LocationField::NonUrbanIntersection => Some(Self::NonUrbanIntersection),
            LocationField::YishuvSymbol => Some(Self::YishuvSymbol),
            LocationField::Street1 => Some(Self::Street1),
            LocationField::Street2 => Some(Self::Street2),
            LocationField::District => Some(Self::District),
            LocationField::Region => Some(Self::Region),
            LocationField::RoadSegmentName
            | LocationField::YishuvName
            | LocationField::Street1Hebrew
            | LocationField::Street2Hebrew
            | LocationField::NonUrbanIntersectionHebrew => None,
        }
    }
}

/// Value constraint on a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Equal to one value.
    Eq(i64),
    /// Equal to any of the values.
    AnyOf(Vec<i64>),
}

/// Conjunction of column constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(BTreeMap<Column, FilterValue>);

impl Filters {
    /// No constraints.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Constraints selecting the records at a location: one equality per
    /// numeric identifier field.
    #[must_use]
    pub fn for_location(fields: &LocationFields) -> Self {
        fields
            .iter()
            .filter_map(|(field, value)| {
                Some((Column::for_location_field(field)?, FilterValue::Eq(value.as_int()?)))
            })
            .fold(Self::new(), |mut filters, (column, value)| {
                filters.0.insert(column, value);
                filters
            })
    }

    /// Adds (or replaces) an equality constraint.
    #[must_use]
    pub fn equals(mut self, column: Column, value: i64) -> Self {
        self.0.insert(column, FilterValue::Eq(value));
        self
    }

    /// Adds (or replaces) a membership constraint.
    #[must_use]
    pub fn any_of(mut self, column: Column, values: impl IntoIterator<Item = i64>) -> Self {
        self.0
            .insert(column, FilterValue::AnyOf(values.into_iter().collect()));
        self
    }

    /// Drops the constraint on `column`.
    #[must_use]
    pub fn without(mut self, column: Column) -> Self {
        self.0.remove(&column);
        self
    }

    /// Constraint on `column`, if any.
    #[must_use]
    pub fn get(&self, column: Column) -> Option<&FilterValue> {
        self.0.get(&column)
    }

    /// Iterates constraints in column order.
    pub fn iter(&self) -> impl Iterator<Item = (Column, &FilterValue)> {
        self.0.iter().map(|(c, v)| (*c, v))
    }

    /// Whether there are no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Inclusive date window on the accident timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// First day included.
    pub start: NaiveDate,
    /// Last day included, whole day.
    pub end: NaiveDate,
}

impl DateWindow {
    /// Window of a location context.
    #[must_use]
    pub const fn of(ctx: &LocationContext) -> Self {
        Self {
            start: ctx.start_date,
            end: ctx.end_date,
        }
    }
}

/// Grouping of counted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// One level: `key -> count`.
    Single(Column),
    /// Two levels: `outer -> inner -> count`.
    Pair(Column, Column),
}

/// What is counted per group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountOf {
    /// Every matching record.
    #[default]
    Rows,
    /// Records where the column is not null.
    NonNull(Column),
    /// Distinct non-null values of the column.
    Distinct(Column),
}

/// A filter/group/count request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQuery {
    /// Record set counted.
    pub entity: Entity,
    /// Column constraints.
    pub filters: Filters,
    /// Date window, if any.
    pub window: Option<DateWindow>,
    /// Grouping, if any.
    pub group_by: Option<GroupBy>,
    /// What is counted.
    pub count: CountOf,
}

impl StatsQuery {
    /// Counts every record of `entity`.
    #[must_use]
    pub const fn new(entity: Entity) -> Self {
        Self {
            entity,
            filters: Filters::new(),
            window: None,
            group_by: None,
            count: CountOf::Rows,
        }
    }

    /// Counts records of `entity` at the context's location and within its
    /// window.
    #[must_use]
    pub fn for_context(entity: Entity, ctx: &LocationContext) -> Self {
        Self {
            filters: Filters::for_location(&ctx.fields),
            window: Some(DateWindow::of(ctx)),
            ..Self::new(entity)
        }
    }

    /// Replaces the filters.
    #[must_use]
    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Adds an equality constraint.
    #[must_use]
    pub fn filter(mut self, column: Column, value: i64) -> Self {
        self.filters = self.filters.equals(column, value);
        self
    }

    /// Adds a membership constraint.
    #[must_use]
    pub fn filter_any(mut self, column: Column, values: impl IntoIterator<Item = i64>) -> Self {
        self.filters = self.filters.any_of(column, values);
        self
    }

    /// Sets the window.
    #[must_use]
    pub const fn window(mut self, window: DateWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Groups by one column.
    #[must_use]
    pub const fn group_by(mut self, column: Column) -> Self {
        self.group_by = Some(GroupBy::Single(column));
        self
    }

    /// Groups by two columns.
    #[must_use]
    pub const fn group_by_pair(mut self, outer: Column, inner: Column) -> Self {
        self.group_by = Some(GroupBy::Pair(outer, inner));
        self
    }

    /// Sets what is counted.
    #[must_use]
    pub const fn count(mut self, count: CountOf) -> Self {
        self.count = count;
        self
    }
}

/// One group of a single-column grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCount {
    /// Group key. Groups with a null key are excluded.
    pub key: i64,
    /// Count in the group.
    pub count: i64,
}

/// Result of a [`StatsQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// Ungrouped count.
    Total(i64),
    /// Single grouping, ordered by key.
    Flat(Vec<GroupCount>),
    /// Pair grouping.
    Nested(BTreeMap<i64, BTreeMap<i64, i64>>),
}

impl QueryResult {
    /// Sum over all groups.
    #[must_use]
    pub fn total(&self) -> i64 {
        match self {
            Self::Total(n) => *n,
            Self::Flat(groups) => groups.iter().map(|g| g.count).sum(),
            Self::Nested(outer) => outer.values().flat_map(BTreeMap::values).sum(),
        }
    }

    /// Groups of a single grouping; empty for other shapes.
    #[must_use]
    pub fn groups(&self) -> &[GroupCount] {
        match self {
            Self::Flat(groups) => groups,
            Self::Total(_) | Self::Nested(_) => &[],
        }
    }

    /// Count of one key of a single grouping.
    #[must_use]
    pub fn count_for(&self, key: i64) -> i64 {
        self.groups()
            .iter()
            .find(|g| g.key == key)
            .map_or(0, |g| g.count)
    }

    /// Levels of a pair grouping.
    #[must_use]
    pub const fn nested(&self) -> Option<&BTreeMap<i64, BTreeMap<i64, i64>>> {
        match self {
            Self::Nested(outer) => Some(outer),
            Self::Total(_) | Self::Flat(_) => None,
        }
    }
}

/// Ordering of fetched accident records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordOrder {
    /// Most severe first, then newest first.
    #[default]
    MostSevere,
    /// Newest first.
    Newest,
}

/// A request for individual accident records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Column constraints; must all be accident columns.
    pub filters: Filters,
    /// Date window, if any.
    pub window: Option<DateWindow>,
    /// Result order.
    pub order: RecordOrder,
    /// Maximum number of records.
    pub limit: Option<u32>,
}

impl RecordQuery {
    /// Accidents at the context's location and within its window.
    #[must_use]
    pub fn for_context(ctx: &LocationContext) -> Self {
        Self {
            filters: Filters::for_location(&ctx.fields),
            window: Some(DateWindow::of(ctx)),
            order: RecordOrder::default(),
            limit: None,
        }
    }

    /// Adds an equality constraint.
    #[must_use]
    pub fn filter(mut self, column: Column, value: i64) -> Self {
        self.filters = self.filters.equals(column, value);
        self
    }

    /// Adds a membership constraint.
    #[must_use]
    pub fn filter_any(mut self, column: Column, values: impl IntoIterator<Item = i64>) -> Self {
        self.filters = self.filters.any_of(column, values);
        self
    }

    /// Sets the order.
    #[must_use]
    pub const fn order(mut self, order: RecordOrder) -> Self {
        self.order = order;
        self
    }

    /// Caps the number of records.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One accident.
#[derive(Debug, Clone, PartialEq)]
pub struct AccidentRecord {
    /// Accident id.
    pub id: i64,
    /// When it happened.
    pub timestamp: NaiveDateTime,
    /// Severity code.
    pub severity: i64,
    /// Accident type code.
    pub accident_type: Option<i64>,
    /// Latitude.
    pub latitude: Option<f64>,
    /// Longitude.
    pub longitude: Option<f64>,
    /// Road segment id, for inter-city accidents.
    pub road_segment_id: Option<i64>,
}

/// Renders a [`StatsQuery`] as SQL plus bound parameters.
///
/// # Errors
///
/// * [`StatisticsError::UnsupportedColumn`] if any filter, grouping, or
///   count column is not carried by the entity
/// * [`StatisticsError::EmptyFilter`] if a membership constraint is empty
pub fn render_stats(query: &StatsQuery) -> Result<(String, Vec<Value>), StatisticsError> {
    let entity = query.entity;
    let mut params = Vec::new();
    let mut frags = render_filters(entity, &query.filters, query.window, &mut params)?;

    let count = match query.count {
        CountOf::Rows => "COUNT(*)".to_string(),
        CountOf::NonNull(column) => {
            check_column(entity, column)?;
            format!("COUNT({})", column.expression())
        }
        CountOf::Distinct(column) => {
            check_column(entity, column)?;
            format!("COUNT(DISTINCT {})", column.expression())
        }
    };
    let table = entity.table();

    let sql = match query.group_by {
        None => format!("SELECT {count} FROM {table}{}", where_clause(&frags)),
        Some(GroupBy::Single(key)) => {
            check_column(entity, key)?;
            let key = key.expression();
            frags.push(format!("{key} IS NOT NULL"));
            format!(
                "SELECT CAST({key} AS BIGINT) AS k1, {count} AS cnt
                 FROM {table}{}
                 GROUP BY k1
                 ORDER BY k1",
                where_clause(&frags)
            )
        }
        Some(GroupBy::Pair(outer, inner)) => {
            check_column(entity, outer)?;
            check_column(entity, inner)?;
            let outer = outer.expression();
            let inner = inner.expression();
            frags.push(format!("{outer} IS NOT NULL"));
            frags.push(format!("{inner} IS NOT NULL"));
            format!(
                "SELECT CAST({outer} AS BIGINT) AS k1, CAST({inner} AS BIGINT) AS k2, {count} AS cnt
                 FROM {table}{}
                 GROUP BY k1, k2
                 ORDER BY k1, k2",
                where_clause(&frags)
            )
        }
    };

    Ok((sql, params))
}

/// Renders a [`RecordQuery`] as SQL plus bound parameters. Selected
/// columns, in order: id, timestamp text, severity, type, latitude,
/// longitude, road segment id.
///
/// # Errors
///
/// Same as [`render_stats`], against the accidents entity.
pub fn render_records(query: &RecordQuery) -> Result<(String, Vec<Value>), StatisticsError> {
    let mut params = Vec::new();
    let frags = render_filters(Entity::Accidents, &query.filters, query.window, &mut params)?;

    let order = match query.order {
        RecordOrder::MostSevere => "accident_severity ASC, accident_timestamp DESC, id ASC",
        RecordOrder::Newest => "accident_timestamp DESC, id ASC",
    };
    let limit = query
        .limit
        .map(|n| format!(" LIMIT {n}"))
        .unwrap_or_default();

    let sql = format!(
        "SELECT id, accident_timestamp::TEXT,
                CAST(accident_severity AS BIGINT), CAST(accident_type AS BIGINT),
                latitude, longitude, CAST(road_segment_id AS BIGINT)
         FROM accidents{}
         ORDER BY {order}{limit}",
        where_clause(&frags)
    );

    Ok((sql, params))
}

fn check_column(entity: Entity, column: Column) -> Result<(), StatisticsError> {
    if entity.supports(column) {
        Ok(())
    } else {
        Err(StatisticsError::UnsupportedColumn { entity, column })
    }
}

fn render_filters(
    entity: Entity,
    filters: &Filters,
    window: Option<DateWindow>,
    params: &mut Vec<Value>,
) -> Result<Vec<String>, StatisticsError> {
    let mut frags = Vec::new();

    for (column, value) in filters.iter() {
        check_column(entity, column)?;
        let expr = column.expression();
        match value {
            FilterValue::Eq(v) => {
                frags.push(format!("{expr} = ?"));
                params.push(Value::BigInt(*v));
            }
            FilterValue::AnyOf(values) => {
                if values.is_empty() {
                    return Err(StatisticsError::EmptyFilter { column });
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                frags.push(format!("{expr} IN ({placeholders})"));
                params.extend(values.iter().map(|v| Value::BigInt(*v)));
            }
        }
    }

    if let Some(window) = window {
        frags.push("accident_timestamp >= CAST(? AS TIMESTAMP)".to_string());
        params.push(Value::Text(format!("{} 00:00:00", window.start)));

        // The end day is included whole.
        if let Some(after_end) = window.end.checked_add_days(Days::new(1)) {
            frags.push("accident_timestamp < CAST(? AS TIMESTAMP)".to_string());
            params.push(Value::Text(format!("{after_end} 00:00:00")));
        }
    }

    Ok(frags)
}

fn where_clause(frags: &[String]) -> String {
    if frags.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", frags.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn location_filters_use_identifiers_only() {
        let fields = LocationFields::new()
            .with(LocationField::Road1, 90)
            .with(LocationField::RoadSegmentId, 900_010)
            .with(LocationField::RoadSegmentName, "Ein Gedi - Masada");

        let filters = Filters::for_location(&fields);
        assert_eq!(filters.get(Column::Road1), Some(&FilterValue::Eq(90)));
        assert_eq!(
            filters.get(Column::RoadSegmentId),
            Some(&FilterValue::Eq(900_010))
        );
        assert_eq!(filters.iter().count(), 2);
    }

    #[test]
    fn rejects_column_missing_from_entity() {
        let query = StatsQuery::new(Entity::Vehicles).group_by(Column::AgeGroup);
        let err = render_stats(&query).unwrap_err();
        assert!(matches!(
            err,
            StatisticsError::UnsupportedColumn {
                entity: Entity::Vehicles,
                column: Column::AgeGroup,
            }
        ));

        let query = StatsQuery::new(Entity::Involved).filter(Column::DayNight, 1);
        assert!(render_stats(&query).is_err());
    }

    #[test]
    fn rejects_empty_membership_filter() {
        let query =
            StatsQuery::new(Entity::Accidents).filter_any(Column::AccidentSeverity, Vec::new());
        assert!(matches!(
            render_stats(&query),
            Err(StatisticsError::EmptyFilter {
                column: Column::AccidentSeverity
            })
        ));
    }

    #[test]
    fn window_includes_the_whole_last_day() {
        let window = DateWindow {
            start: date(2016, 1, 1),
            end: date(2020, 6, 15),
        };
        let query = StatsQuery::new(Entity::Accidents)
            .filter(Column::Road1, 90)
            .window(window);
        let (sql, params) = render_stats(&query).unwrap();

        assert!(sql.contains("road1 = ?"));
        assert!(sql.contains("accident_timestamp < CAST(? AS TIMESTAMP)"));
        assert_eq!(
            params,
            vec![
                Value::BigInt(90),
                Value::Text("2016-01-01 00:00:00".to_string()),
                Value::Text("2020-06-16 00:00:00".to_string()),
            ]
        );
    }

    #[test]
    fn grouping_excludes_null_keys() {
        let query = StatsQuery::new(Entity::Involved).group_by(Column::AgeGroup);
        let (sql, params) = render_stats(&query).unwrap();
        assert!(sql.contains("age_group IS NOT NULL"));
        assert!(sql.contains("GROUP BY k1"));
        assert!(params.is_empty());
    }

    #[test]
    fn totals_sum_every_shape() {
        assert_eq!(QueryResult::Total(4).total(), 4);

        let flat = QueryResult::Flat(vec![
            GroupCount { key: 1, count: 2 },
            GroupCount { key: 3, count: 5 },
        ]);
        assert_eq!(flat.total(), 7);
        assert_eq!(flat.count_for(3), 5);
        assert_eq!(flat.count_for(2), 0);

        let nested = QueryResult::Nested(BTreeMap::from([
            (2019, BTreeMap::from([(1, 1), (2, 2)])),
            (2020, BTreeMap::from([(1, 3)])),
        ]));
        assert_eq!(nested.total(), 6);
        assert!(nested.groups().is_empty());
    }
}
