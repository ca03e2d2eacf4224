//! `DuckDB`-backed [`StatisticsSource`] and [`LocationLookup`].
//!
//! Every call borrows one pooled connection on a blocking thread, so at most
//! `pool.size()` queries run at once.

use std::str::FromStr as _;
use std::sync::Arc;

use accident_map_accident_models::ResolutionKind;
use accident_map_database::pool::DuckDbPool;
use accident_map_report_models::{LocationField, LocationFields};
use async_trait::async_trait;
use chrono::NaiveDate;
use duckdb::{Connection, Row};

use crate::query::{
    AccidentRecord, GroupBy, GroupCount, QueryResult, RecordQuery, StatsQuery, render_records,
    render_stats,
};
use crate::reference::{Junction, NewsFlashLocation, RoadSegment};
use crate::{LocationLookup, StatisticsError, StatisticsSource};

/// Statistics and lookups over the accident tables of one database.
#[derive(Clone)]
pub struct DuckDbStatistics {
    pool: Arc<DuckDbPool>,
}

impl DuckDbStatistics {
    /// Wraps a connection pool.
    #[must_use]
    pub const fn new(pool: Arc<DuckDbPool>) -> Self {
        Self { pool }
    }

    /// Runs `work` against a pooled connection on a blocking thread.
    async fn blocking<T, F>(&self, work: F) -> Result<T, StatisticsError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StatisticsError> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let conn = pool.acquire();
            work(&conn)
        })
        .await?
    }
}

#[async_trait]
impl StatisticsSource for DuckDbStatistics {
    async fn query(&self, query: &StatsQuery) -> Result<QueryResult, StatisticsError> {
        // Reject bad columns before borrowing a connection.
        render_stats(query)?;
        let query = query.clone();
        self.blocking(move |conn| run_stats(conn, &query)).await
    }

    async fn fetch_accidents(
        &self,
        query: &RecordQuery,
    ) -> Result<Vec<AccidentRecord>, StatisticsError> {
        render_records(query)?;
        let query = query.clone();
        self.blocking(move |conn| run_records(conn, &query)).await
    }
}

#[async_trait]
impl LocationLookup for DuckDbStatistics {
    async fn latest_record_date(&self) -> Result<Option<NaiveDate>, StatisticsError> {
        self.blocking(|conn| {
            let latest: Option<String> = conn.query_row(
                "SELECT CAST(MAX(accident_timestamp) AS DATE)::TEXT FROM accidents",
                [],
                |row| row.get(0),
            )?;
            latest
                .map(|s| {
                    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| {
                        StatisticsError::Conversion {
                            message: format!("Invalid latest record date {s:?}: {e}"),
                        }
                    })
                })
                .transpose()
        })
        .await
    }

    async fn city_name(&self, yishuv_symbol: i64) -> Result<Option<String>, StatisticsError> {
        self.blocking(move |conn| {
            optional(conn.query_row(
                "SELECT yishuv_name FROM cities WHERE yishuv_symbol = ?",
                duckdb::params![yishuv_symbol],
                |row| row.get(0),
            ))
        })
        .await
    }

    async fn city_symbol(&self, yishuv_name: &str) -> Result<Option<i64>, StatisticsError> {
        let yishuv_name = yishuv_name.to_string();
        self.blocking(move |conn| {
            optional(conn.query_row(
                "SELECT CAST(yishuv_symbol AS BIGINT) FROM cities
                 WHERE lower(trim(yishuv_name)) = lower(trim(?))
                 ORDER BY yishuv_symbol
                 LIMIT 1",
                duckdb::params![yishuv_name],
                |row| row.get(0),
            ))
        })
        .await
    }

    async fn street_name(
        &self,
        yishuv_symbol: i64,
        street: i64,
    ) -> Result<Option<String>, StatisticsError> {
        self.blocking(move |conn| {
            optional(conn.query_row(
                "SELECT street_hebrew FROM streets WHERE yishuv_symbol = ? AND street = ?",
                duckdb::params![yishuv_symbol, street],
                |row| row.get(0),
            ))
        })
        .await
    }

    async fn street_code(
        &self,
        yishuv_symbol: i64,
        street_name: &str,
    ) -> Result<Option<i64>, StatisticsError> {
        let street_name = street_name.to_string();
        self.blocking(move |conn| {
            optional(conn.query_row(
                "SELECT CAST(street AS BIGINT) FROM streets
                 WHERE yishuv_symbol = ? AND lower(trim(street_hebrew)) = lower(trim(?))
                 ORDER BY street
                 LIMIT 1",
                duckdb::params![yishuv_symbol, street_name],
                |row| row.get(0),
            ))
        })
        .await
    }

    async fn road_segment(&self, segment_id: i64) -> Result<Option<RoadSegment>, StatisticsError> {
        self.blocking(move |conn| {
            optional(conn.query_row(
                &format!("{SEGMENT_SELECT} WHERE segment_id = ?"),
                duckdb::params![segment_id],
                segment_from_row,
            ))
        })
        .await
    }

    async fn road_segment_by_name(
        &self,
        road: i64,
        segment_name: &str,
    ) -> Result<Option<RoadSegment>, StatisticsError> {
        let segment_name = segment_name.to_string();
        self.blocking(move |conn| {
            optional(conn.query_row(
                &format!(
                    "{SEGMENT_SELECT}
                     WHERE road = ? AND lower(trim(segment_name)) = lower(trim(?))
                     ORDER BY segment
                     LIMIT 1"
                ),
                duckdb::params![road, segment_name],
                segment_from_row,
            ))
        })
        .await
    }

    async fn road_segments(&self, road: i64) -> Result<Vec<RoadSegment>, StatisticsError> {
        self.blocking(move |conn| {
            let mut stmt =
                conn.prepare(&format!("{SEGMENT_SELECT} WHERE road = ? ORDER BY segment"))?;
            let rows = stmt.query_map(duckdb::params![road], segment_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn junction(&self, junction_id: i64) -> Result<Option<Junction>, StatisticsError> {
        self.blocking(move |conn| {
            optional(conn.query_row(
                &format!("{JUNCTION_SELECT} WHERE non_urban_intersection = ?"),
                duckdb::params![junction_id],
                junction_from_row,
            ))
        })
        .await
    }

    async fn junction_by_roads(
        &self,
        road1: i64,
        road2: i64,
    ) -> Result<Option<Junction>, StatisticsError> {
        self.blocking(move |conn| {
            optional(conn.query_row(
                &format!(
                    "{JUNCTION_SELECT}
                     WHERE (road1 = ? AND road2 = ?) OR (road1 = ? AND road2 = ?)
                     ORDER BY non_urban_intersection
                     LIMIT 1"
                ),
                duckdb::params![road1, road2, road2, road1],
                junction_from_row,
            ))
        })
        .await
    }

    async fn news_flash(&self, id: i64) -> Result<Option<NewsFlashLocation>, StatisticsError> {
        self.blocking(move |conn| run_news_flash(conn, id)).await
    }

    async fn eligible_locations(
        &self,
        kind: ResolutionKind,
    ) -> Result<Vec<LocationFields>, StatisticsError> {
        self.blocking(move |conn| run_eligible(conn, kind)).await
    }
}

const SEGMENT_SELECT: &str = "SELECT CAST(segment_id AS BIGINT), CAST(road AS BIGINT),
        CAST(segment AS BIGINT), from_km, to_km, segment_name
    FROM road_segments";

const JUNCTION_SELECT: &str = "SELECT CAST(non_urban_intersection AS BIGINT), junction_name,
        CAST(road1 AS BIGINT), CAST(road2 AS BIGINT)
    FROM junctions";

/// Location columns of `news_flash`, in select order after `resolution`.
const NEWS_FLASH_FIELDS: &[LocationField] = &[
    LocationField::Road1,
    LocationField::Road2,
    LocationField::RoadSegmentId,
    LocationField::RoadSegmentName,
    LocationField::YishuvSymbol,
    LocationField::YishuvName,
    LocationField::Street1,
    LocationField::Street1Hebrew,
    LocationField::Street2,
    LocationField::Street2Hebrew,
    LocationField::NonUrbanIntersection,
    LocationField::NonUrbanIntersectionHebrew,
    LocationField::District,
    LocationField::Region,
];

fn optional<T>(result: duckdb::Result<T>) -> Result<Option<T>, StatisticsError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn run_stats(conn: &Connection, query: &StatsQuery) -> Result<QueryResult, StatisticsError> {
    let (sql, params) = render_stats(query)?;
    log::trace!("Statistics query on {}: {sql}", query.entity);

    let mut stmt = conn.prepare(&sql)?;
    let params = duckdb::params_from_iter(params);

    match query.group_by {
        None => {
            let total: i64 = stmt.query_row(params, |row| row.get(0))?;
            Ok(QueryResult::Total(total))
        }
        Some(GroupBy::Single(_)) => {
            let rows = stmt.query_map(params, |row| {
                Ok(GroupCount {
                    key: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            Ok(QueryResult::Flat(rows.collect::<Result<Vec<_>, _>>()?))
        }
        Some(GroupBy::Pair(_, _)) => {
            let rows = stmt.query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;

            let mut nested = std::collections::BTreeMap::new();
            for row in rows {
                let (outer, inner, count) = row?;
                nested
                    .entry(outer)
                    .or_insert_with(std::collections::BTreeMap::new)
                    .insert(inner, count);
            }
            Ok(QueryResult::Nested(nested))
        }
    }
}

fn run_records(
    conn: &Connection,
    query: &RecordQuery,
) -> Result<Vec<AccidentRecord>, StatisticsError> {
    let (sql, params) = render_records(query)?;
    log::trace!("Record query: {sql}");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(duckdb::params_from_iter(params), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Option<i64>>(3)?,
            row.get::<_, Option<f64>>(4)?,
            row.get::<_, Option<f64>>(5)?,
            row.get::<_, Option<i64>>(6)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, timestamp, severity, accident_type, latitude, longitude, road_segment_id) = row?;
        let timestamp = accident_map_database::parse_timestamp(&timestamp).ok_or_else(|| {
            StatisticsError::Conversion {
                message: format!("Accident {id} has an unreadable timestamp {timestamp:?}"),
            }
        })?;
        records.push(AccidentRecord {
            id,
            timestamp,
            severity,
            accident_type,
            latitude,
            longitude,
            road_segment_id,
        });
    }

    Ok(records)
}

fn segment_from_row(row: &Row<'_>) -> duckdb::Result<RoadSegment> {
    Ok(RoadSegment {
        segment_id: row.get(0)?,
        road: row.get(1)?,
        segment: row.get(2)?,
        from_km: row.get(3)?,
        to_km: row.get(4)?,
        name: row.get(5)?,
    })
}

fn junction_from_row(row: &Row<'_>) -> duckdb::Result<Junction> {
    Ok(Junction {
        id: row.get(0)?,
        name: row.get(1)?,
        road1: row.get(2)?,
        road2: row.get(3)?,
    })
}

fn run_news_flash(
    conn: &Connection,
    id: i64,
) -> Result<Option<NewsFlashLocation>, StatisticsError> {
    let columns = NEWS_FLASH_FIELDS
        .iter()
        .map(|field| {
            if field.is_identifier() {
                format!("CAST({field} AS BIGINT)")
            } else {
                field.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let row = optional(conn.query_row(
        &format!("SELECT resolution, {columns} FROM news_flash WHERE id = ?"),
        duckdb::params![id],
        |row| {
            let resolution: Option<String> = row.get(0)?;
            let mut fields = LocationFields::new();
            for (i, field) in NEWS_FLASH_FIELDS.iter().enumerate() {
                let idx = i + 1;
                if field.is_identifier() {
                    if let Some(value) = row.get::<_, Option<i64>>(idx)? {
                        fields.insert(*field, value);
                    }
                } else if let Some(value) = row.get::<_, Option<String>>(idx)? {
                    fields.insert(*field, value);
                }
            }
            Ok((resolution, fields))
        },
    ))?;

    Ok(row.map(|(resolution, fields)| {
        let resolution = resolution.and_then(|r| {
            ResolutionKind::from_str(&r)
                .map_err(|_| log::warn!("News item {id} has unknown resolution {r:?}"))
                .ok()
        });
        NewsFlashLocation {
            id,
            resolution,
            fields,
        }
    }))
}

fn run_eligible(
    conn: &Connection,
    kind: ResolutionKind,
) -> Result<Vec<LocationFields>, StatisticsError> {
    let (sql, shape): (&str, &[LocationField]) = match kind {
        ResolutionKind::SuburbanRoad => (
            "SELECT CAST(road AS BIGINT), CAST(segment_id AS BIGINT), segment_name
             FROM road_segments
             ORDER BY road, segment",
            &[
                LocationField::Road1,
                LocationField::RoadSegmentId,
                LocationField::RoadSegmentName,
            ],
        ),
        ResolutionKind::Street => (
            "SELECT CAST(s.yishuv_symbol AS BIGINT), c.yishuv_name,
                    CAST(s.street AS BIGINT), s.street_hebrew
             FROM streets s
             LEFT JOIN cities c ON c.yishuv_symbol = s.yishuv_symbol
             ORDER BY s.yishuv_symbol, s.street",
            &[
                LocationField::YishuvSymbol,
                LocationField::YishuvName,
                LocationField::Street1,
                LocationField::Street1Hebrew,
            ],
        ),
        ResolutionKind::UrbanJunction => (
            "SELECT DISTINCT CAST(yishuv_symbol AS BIGINT) AS y, CAST(street1 AS BIGINT) AS s1,
                    CAST(street2 AS BIGINT) AS s2
             FROM accidents
             WHERE yishuv_symbol IS NOT NULL AND street1 IS NOT NULL AND street2 IS NOT NULL
             ORDER BY y, s1, s2",
            &[
                LocationField::YishuvSymbol,
                LocationField::Street1,
                LocationField::Street2,
            ],
        ),
        ResolutionKind::SuburbanJunction => (
            "SELECT CAST(non_urban_intersection AS BIGINT), junction_name,
                    CAST(road1 AS BIGINT), CAST(road2 AS BIGINT)
             FROM junctions
             ORDER BY non_urban_intersection",
            &[
                LocationField::NonUrbanIntersection,
                LocationField::NonUrbanIntersectionHebrew,
                LocationField::Road1,
                LocationField::Road2,
            ],
        ),
        ResolutionKind::City => (
            "SELECT CAST(yishuv_symbol AS BIGINT), yishuv_name FROM cities ORDER BY yishuv_symbol",
            &[LocationField::YishuvSymbol, LocationField::YishuvName],
        ),
        ResolutionKind::District => (
            "SELECT DISTINCT CAST(district AS BIGINT) AS d FROM accidents
             WHERE district IS NOT NULL
             ORDER BY d",
            &[LocationField::District],
        ),
        ResolutionKind::Region => (
            "SELECT DISTINCT CAST(region AS BIGINT) AS r FROM accidents
             WHERE region IS NOT NULL
             ORDER BY r",
            &[LocationField::Region],
        ),
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        let mut fields = LocationFields::new();
        for (idx, field) in shape.iter().enumerate() {
            if field.is_identifier() {
                if let Some(value) = row.get::<_, Option<i64>>(idx)? {
                    fields.insert(*field, value);
                }
            } else if let Some(value) = row.get::<_, Option<String>>(idx)? {
                fields.insert(*field, value);
            }
        }
        Ok(fields)
    })?;

    let locations = rows.collect::<Result<Vec<_>, _>>()?;
    log::debug!("{} eligible {kind} locations", locations.len());
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use accident_map_database::fixtures::{
        self, DIZENGOFF, EIN_GEDI_JUNCTION, HERZL, NEWS_ON_ROAD_90, NEWS_WITHOUT_LOCATION, ROAD_90,
        SEGMENT_EIN_GEDI_MASADA, SEGMENT_EIN_GEDI_MASADA_NAME, TEL_AVIV,
    };

    use super::*;
    use crate::query::{Column, CountOf, DateWindow, Entity, RecordOrder};

    fn seeded() -> DuckDbStatistics {
        DuckDbStatistics::new(Arc::new(fixtures::seeded_pool(2).unwrap()))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn five_years() -> DateWindow {
        DateWindow {
            start: date(2016, 1, 1),
            end: date(2020, 6, 15),
        }
    }

    #[tokio::test]
    async fn counts_accidents_within_window() {
        let stats = seeded();
        let query = StatsQuery::new(Entity::Accidents)
            .filter(Column::RoadSegmentId, SEGMENT_EIN_GEDI_MASADA)
            .window(five_years());

        assert_eq!(stats.query(&query).await.unwrap(), QueryResult::Total(3));

        let all_time = StatsQuery::new(Entity::Accidents)
            .filter(Column::RoadSegmentId, SEGMENT_EIN_GEDI_MASADA);
        assert_eq!(stats.query(&all_time).await.unwrap().total(), 4);
    }

    #[tokio::test]
    async fn groups_by_one_column() {
        let stats = seeded();
        let query = StatsQuery::new(Entity::Accidents)
            .filter(Column::RoadSegmentId, SEGMENT_EIN_GEDI_MASADA)
            .window(five_years())
            .group_by(Column::AccidentSeverity);

        let result = stats.query(&query).await.unwrap();
        assert_eq!(
            result.groups(),
            &[
                GroupCount { key: 1, count: 1 },
                GroupCount { key: 2, count: 1 },
                GroupCount { key: 3, count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn groups_by_derived_year_and_severity() {
        let stats = seeded();
        let query = StatsQuery::new(Entity::Accidents)
            .filter(Column::Road1, ROAD_90)
            .group_by_pair(Column::AccidentYear, Column::AccidentSeverity);

        let result = stats.query(&query).await.unwrap();
        let nested = result.nested().unwrap();
        assert_eq!(nested[&2020][&1], 2);
        assert_eq!(nested[&2015][&1], 1);
        assert!(!nested.contains_key(&2016));
        assert_eq!(result.total(), 6);
    }

    #[tokio::test]
    async fn counts_distinct_accidents_from_involved() {
        let stats = seeded();
        let persons = StatsQuery::new(Entity::Involved)
            .filter(Column::RoadSegmentId, SEGMENT_EIN_GEDI_MASADA)
            .window(five_years());
        let accidents = persons.clone().count(CountOf::Distinct(Column::AccidentId));

        assert_eq!(stats.query(&persons).await.unwrap().total(), 4);
        assert_eq!(stats.query(&accidents).await.unwrap().total(), 3);
    }

    #[tokio::test]
    async fn unsupported_column_fails_without_querying() {
        let stats = seeded();
        let query = StatsQuery::new(Entity::Accidents).group_by(Column::AgeGroup);
        assert!(matches!(
            stats.query(&query).await,
            Err(StatisticsError::UnsupportedColumn { .. })
        ));
    }

    #[tokio::test]
    async fn fetches_most_severe_first() {
        let stats = seeded();
        let query = RecordQuery {
            filters: crate::query::Filters::new().equals(Column::Road1, ROAD_90),
            window: None,
            order: RecordOrder::MostSevere,
            limit: Some(2),
        };

        let records = stats.fetch_accidents(&query).await.unwrap();
        let ids = records.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 7]);
        assert_eq!(records[0].road_segment_id, Some(SEGMENT_EIN_GEDI_MASADA));
        assert_eq!(records[0].timestamp.to_string(), "2020-06-15 08:30:00");
    }

    #[tokio::test]
    async fn latest_record_date_follows_the_dataset() {
        assert_eq!(
            seeded().latest_record_date().await.unwrap(),
            Some(date(2020, 6, 15))
        );

        let empty = DuckDbStatistics::new(Arc::new(fixtures::empty_pool(1).unwrap()));
        assert_eq!(empty.latest_record_date().await.unwrap(), None);
    }

    #[tokio::test]
    async fn looks_up_names_both_ways() {
        let stats = seeded();
        assert_eq!(
            stats.city_name(TEL_AVIV).await.unwrap().as_deref(),
            Some("Tel Aviv-Yafo")
        );
        assert_eq!(stats.city_symbol("  tel aviv-yafo ").await.unwrap(), Some(TEL_AVIV));
        assert_eq!(stats.city_symbol("Haifa").await.unwrap(), None);

        assert_eq!(
            stats.street_name(TEL_AVIV, DIZENGOFF).await.unwrap().as_deref(),
            Some("Dizengoff")
        );
        assert_eq!(stats.street_code(TEL_AVIV, "herzl").await.unwrap(), Some(HERZL));
    }

    #[tokio::test]
    async fn looks_up_roads_and_junctions() {
        let stats = seeded();

        let segment = stats
            .road_segment_by_name(ROAD_90, SEGMENT_EIN_GEDI_MASADA_NAME)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(segment.segment_id, SEGMENT_EIN_GEDI_MASADA);
        assert_eq!(
            stats.road_segment(SEGMENT_EIN_GEDI_MASADA).await.unwrap(),
            Some(segment)
        );

        let segments = stats.road_segments(ROAD_90).await.unwrap();
        assert_eq!(segments.len(), 2);
        assert!((segments[1].length_km() - 15.0).abs() < 1e-9);

        let junction = stats.junction_by_roads(3199, ROAD_90).await.unwrap().unwrap();
        assert_eq!(junction.id, EIN_GEDI_JUNCTION);
        assert_eq!(stats.junction(EIN_GEDI_JUNCTION).await.unwrap(), Some(junction));
    }

    #[tokio::test]
    async fn reads_news_flash_locations() {
        let stats = seeded();

        let located = stats.news_flash(NEWS_ON_ROAD_90).await.unwrap().unwrap();
        assert_eq!(located.resolution, Some(ResolutionKind::SuburbanRoad));
        assert_eq!(
            located.fields.int(LocationField::RoadSegmentId),
            Some(SEGMENT_EIN_GEDI_MASADA)
        );

        let unlocated = stats.news_flash(NEWS_WITHOUT_LOCATION).await.unwrap().unwrap();
        assert_eq!(unlocated.resolution, None);
        assert!(unlocated.fields.is_empty());

        assert_eq!(stats.news_flash(999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn enumerates_eligible_locations() {
        let stats = seeded();
        for (kind, expected) in [
            (ResolutionKind::SuburbanRoad, 3),
            (ResolutionKind::Street, 3),
            (ResolutionKind::UrbanJunction, 1),
            (ResolutionKind::SuburbanJunction, 1),
            (ResolutionKind::City, 2),
            (ResolutionKind::District, 4),
            (ResolutionKind::Region, 4),
        ] {
            let locations = stats.eligible_locations(kind).await.unwrap();
            assert_eq!(locations.len(), expected, "{kind}");
        }

        let streets = stats.eligible_locations(ResolutionKind::Street).await.unwrap();
        assert_eq!(streets[0].text(LocationField::YishuvName), Some("Jerusalem"));
    }
}
