#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Statistics query capability over the accident dataset.
//!
//! Widgets never write SQL. They describe what they need as a
//! [`query::StatsQuery`] (entity, filters, grouping, count, date window) or
//! a [`query::RecordQuery`] and hand it to a [`StatisticsSource`]. Request
//! resolution and the cache rebuild use the [`LocationLookup`] capability
//! for reference-table lookups.
//!
//! [`duckdb_source::DuckDbStatistics`] implements both capabilities over a
//! [`accident_map_database::pool::DuckDbPool`]; the pool size bounds how
//! many queries run at once.

pub mod duckdb_source;
pub mod query;
pub mod reference;

use accident_map_accident_models::ResolutionKind;
use accident_map_report_models::LocationFields;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::query::{AccidentRecord, QueryResult, RecordQuery, StatsQuery};
use crate::reference::{Junction, NewsFlashLocation, RoadSegment};

/// Errors that can occur during statistics queries.
#[derive(Debug, thiserror::Error)]
pub enum StatisticsError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] accident_map_database::DbError),

    /// `DuckDB` query failed.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// A column was used with an entity that does not have it.
    #[error("Column {column} is not available on {entity}")]
    UnsupportedColumn {
        /// The entity queried.
        entity: query::Entity,
        /// The offending column.
        column: query::Column,
    },

    /// An `IN` filter had no values.
    #[error("Filter on {column} has an empty value list")]
    EmptyFilter {
        /// The offending column.
        column: query::Column,
    },

    /// The blocking query task panicked or was cancelled.
    #[error("Query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Filter, group, and count operations over accident records.
#[async_trait]
pub trait StatisticsSource: Send + Sync {
    /// Counts records matching `query`, optionally grouped.
    ///
    /// # Errors
    ///
    /// Returns [`StatisticsError`] if the query is invalid for its entity
    /// or the store fails.
    async fn query(&self, query: &StatsQuery) -> Result<QueryResult, StatisticsError>;

    /// Fetches individual accident records.
    ///
    /// # Errors
    ///
    /// Returns [`StatisticsError`] if the query is invalid or the store
    /// fails.
    async fn fetch_accidents(
        &self,
        query: &RecordQuery,
    ) -> Result<Vec<AccidentRecord>, StatisticsError>;
}

/// Reference-table lookups used to resolve and enumerate locations.
#[async_trait]
pub trait LocationLookup: Send + Sync {
    /// Date of the most recent accident in the whole dataset.
    async fn latest_record_date(&self) -> Result<Option<NaiveDate>, StatisticsError>;

    /// City name for a city symbol.
    async fn city_name(&self, yishuv_symbol: i64) -> Result<Option<String>, StatisticsError>;

    /// City symbol for a city name.
    async fn city_symbol(&self, yishuv_name: &str) -> Result<Option<i64>, StatisticsError>;

    /// Street name for a street code within a city.
    async fn street_name(
        &self,
        yishuv_symbol: i64,
        street: i64,
    ) -> Result<Option<String>, StatisticsError>;

    /// Street code for a street name within a city.
    async fn street_code(
        &self,
        yishuv_symbol: i64,
        street_name: &str,
    ) -> Result<Option<i64>, StatisticsError>;

    /// Road segment by id.
    async fn road_segment(&self, segment_id: i64) -> Result<Option<RoadSegment>, StatisticsError>;

    /// Road segment by road number and segment name.
    async fn road_segment_by_name(
        &self,
        road: i64,
        segment_name: &str,
    ) -> Result<Option<RoadSegment>, StatisticsError>;

    /// All segments of a road, ordered by position along the road.
    async fn road_segments(&self, road: i64) -> Result<Vec<RoadSegment>, StatisticsError>;

    /// Non-urban junction by id.
    async fn junction(&self, junction_id: i64) -> Result<Option<Junction>, StatisticsError>;

    /// Non-urban junction by the pair of roads meeting there (either order).
    async fn junction_by_roads(
        &self,
        road1: i64,
        road2: i64,
    ) -> Result<Option<Junction>, StatisticsError>;

    /// Location of a news item, or `None` if no such item exists.
    async fn news_flash(&self, id: i64) -> Result<Option<NewsFlashLocation>, StatisticsError>;

    /// Every location of `kind` that can be cached, as identifying fields.
    async fn eligible_locations(
        &self,
        kind: ResolutionKind,
    ) -> Result<Vec<LocationFields>, StatisticsError>;
}
