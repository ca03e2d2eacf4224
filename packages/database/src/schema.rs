//! Table definitions.
//!
//! The accident tables mirror the national dataset: `accidents` holds one
//! row per accident, `involved` one row per involved person and `vehicles`
//! one row per vehicle. The person and vehicle tables carry a denormalized
//! copy of the accident's timestamp and location columns so every entity
//! can be filtered by location and window without a join.

use duckdb::Connection;

use crate::DbError;

/// Name of the live report cache table.
pub const LIVE_CACHE_TABLE: &str = "report_cache";

/// Name of the staging report cache table.
pub const STAGING_CACHE_TABLE: &str = "report_cache_staging";

/// Creates every table if it does not exist yet.
///
/// `report_cache` has no primary key: it is only ever written by copying
/// the whole of `report_cache_staging` (which does) inside the publish
/// transaction, and `DuckDB` rejects deleting and re-inserting the same key
/// within one transaction when the key is indexed.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accidents (
            id BIGINT NOT NULL PRIMARY KEY,
            accident_timestamp TIMESTAMP NOT NULL,
            accident_severity INTEGER NOT NULL,
            accident_type INTEGER,
            road_type INTEGER,
            road1 INTEGER,
            road2 INTEGER,
            road_segment_id INTEGER,
            non_urban_intersection INTEGER,
            yishuv_symbol INTEGER,
            street1 INTEGER,
            street2 INTEGER,
            district INTEGER,
            region INTEGER,
            day_night INTEGER,
            road_light INTEGER,
            latitude DOUBLE,
            longitude DOUBLE
        );

        CREATE TABLE IF NOT EXISTS involved (
            id BIGINT NOT NULL PRIMARY KEY,
            accident_id BIGINT NOT NULL,
            accident_timestamp TIMESTAMP NOT NULL,
            injury_severity INTEGER,
            injured_type INTEGER,
            age_group INTEGER,
            vehicle_type INTEGER,
            road_type INTEGER,
            road1 INTEGER,
            road2 INTEGER,
            road_segment_id INTEGER,
            non_urban_intersection INTEGER,
            yishuv_symbol INTEGER,
            street1 INTEGER,
            street2 INTEGER,
            district INTEGER,
            region INTEGER
        );

        CREATE TABLE IF NOT EXISTS vehicles (
            id BIGINT NOT NULL PRIMARY KEY,
            accident_id BIGINT NOT NULL,
            accident_timestamp TIMESTAMP NOT NULL,
            accident_severity INTEGER,
            vehicle_type INTEGER,
            road_type INTEGER,
            road1 INTEGER,
            road2 INTEGER,
            road_segment_id INTEGER,
            non_urban_intersection INTEGER,
            yishuv_symbol INTEGER,
            street1 INTEGER,
            street2 INTEGER,
            district INTEGER,
            region INTEGER
        );

        CREATE TABLE IF NOT EXISTS cities (
            yishuv_symbol INTEGER NOT NULL PRIMARY KEY,
            yishuv_name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS streets (
            yishuv_symbol INTEGER NOT NULL,
            street INTEGER NOT NULL,
            street_hebrew TEXT NOT NULL,
            PRIMARY KEY (yishuv_symbol, street)
        );

        CREATE TABLE IF NOT EXISTS road_segments (
            segment_id INTEGER NOT NULL PRIMARY KEY,
            road INTEGER NOT NULL,
            segment INTEGER NOT NULL,
            from_km DOUBLE NOT NULL,
            to_km DOUBLE NOT NULL,
            segment_name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS junctions (
            non_urban_intersection INTEGER NOT NULL PRIMARY KEY,
            junction_name TEXT NOT NULL,
            road1 INTEGER NOT NULL,
            road2 INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS news_flash (
            id BIGINT NOT NULL PRIMARY KEY,
            resolution TEXT,
            road1 INTEGER,
            road2 INTEGER,
            road_segment_id INTEGER,
            road_segment_name TEXT,
            yishuv_symbol INTEGER,
            yishuv_name TEXT,
            street1 INTEGER,
            street1_hebrew TEXT,
            street2 INTEGER,
            street2_hebrew TEXT,
            non_urban_intersection INTEGER,
            non_urban_intersection_hebrew TEXT,
            district INTEGER,
            region INTEGER
        );

        CREATE TABLE IF NOT EXISTS report_cache (
            location_key TEXT NOT NULL,
            lookback_years INTEGER NOT NULL,
            resolution TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS report_cache_staging (
            location_key TEXT NOT NULL,
            lookback_years INTEGER NOT NULL,
            resolution TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            PRIMARY KEY (location_key, lookback_years)
        );",
    )?;

    Ok(())
}
