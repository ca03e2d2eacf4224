//! A small, realistic dataset for tests.
//!
//! Covers two segments of road 90 and one of road 1, two streets in Tel
//! Aviv (one pair forming an urban junction), one street in Jerusalem, a
//! non-urban junction, and a few news items. The latest accident in the
//! dataset is on 2020-06-15.

use duckdb::Connection;

use crate::DbError;
use crate::pool::DuckDbPool;

/// Road number of the main fixture road.
pub const ROAD_90: i64 = 90;
/// Segment of road 90 with the most accidents.
pub const SEGMENT_EIN_GEDI_MASADA: i64 = 900_010;
/// Name of [`SEGMENT_EIN_GEDI_MASADA`].
pub const SEGMENT_EIN_GEDI_MASADA_NAME: &str = "Ein Gedi - Masada";
/// Second segment of road 90.
pub const SEGMENT_MASADA_EIN_BOKEK: i64 = 900_020;
/// Segment of road 1.
pub const SEGMENT_LATRUN_SHAAR_HAGAI: i64 = 10_010;
/// City symbol of Tel Aviv.
pub const TEL_AVIV: i64 = 5000;
/// City symbol of Jerusalem.
pub const JERUSALEM: i64 = 3000;
/// Dizengoff street code in Tel Aviv.
pub const DIZENGOFF: i64 = 418;
/// Herzl street code in Tel Aviv.
pub const HERZL: i64 = 1;
/// Non-urban junction on road 90.
pub const EIN_GEDI_JUNCTION: i64 = 1277;
/// News item located on [`SEGMENT_EIN_GEDI_MASADA`].
pub const NEWS_ON_ROAD_90: i64 = 1;
/// News item located on Dizengoff street.
pub const NEWS_ON_DIZENGOFF: i64 = 2;
/// News item without any location.
pub const NEWS_WITHOUT_LOCATION: i64 = 3;

const REFERENCE_SQL: &str = "
INSERT INTO cities VALUES
    (5000, 'Tel Aviv-Yafo'),
    (3000, 'Jerusalem');

INSERT INTO streets VALUES
    (5000, 418, 'Dizengoff'),
    (5000, 1, 'Herzl'),
    (3000, 2, 'Jaffa Road');

INSERT INTO road_segments VALUES
    (900010, 90, 1, 0.0, 20.5, 'Ein Gedi - Masada'),
    (900020, 90, 2, 20.5, 35.5, 'Masada - Ein Bokek'),
    (10010, 1, 1, 0.0, 12.0, 'Latrun - Shaar HaGai');

INSERT INTO junctions VALUES
    (1277, 'Ein Gedi Junction', 90, 3199);

INSERT INTO news_flash (id, resolution, road1, road_segment_id, road_segment_name) VALUES
    (1, 'suburban_road', 90, 900010, 'Ein Gedi - Masada');
INSERT INTO news_flash (id, resolution, yishuv_symbol, yishuv_name, street1, street1_hebrew) VALUES
    (2, 'street', 5000, 'Tel Aviv-Yafo', 418, 'Dizengoff');
INSERT INTO news_flash (id, resolution) VALUES
    (3, NULL);
";

const ACCIDENTS_SQL: &str = "
INSERT INTO accidents
    (id, accident_timestamp, accident_severity, accident_type, road_type,
     road1, road2, road_segment_id, non_urban_intersection,
     yishuv_symbol, street1, street2, district, region,
     day_night, road_light, latitude, longitude)
VALUES
    (1,  '2020-06-15 08:30:00', 1, 5,  3, 90, NULL, 900010, NULL, NULL, NULL, NULL, 15, 6, 1, 1, 31.4601, 35.3889),
    (2,  '2019-03-02 22:10:00', 2, 9,  3, 90, NULL, 900010, NULL, NULL, NULL, NULL, 15, 6, 5, 6, 31.4102, 35.3851),
    (3,  '2017-11-20 14:00:00', 3, 3,  3, 90, NULL, 900010, NULL, NULL, NULL, NULL, 15, 6, 1, 1, 31.3755, 35.3902),
    (4,  '2015-05-05 10:00:00', 1, 5,  3, 90, NULL, 900010, NULL, NULL, NULL, NULL, 15, 6, 1, 1, 31.4300, 35.3870),
    (5,  '2018-07-01 06:45:00', 3, 10, 3, 90, NULL, 900020, NULL, NULL, NULL, NULL, 15, 6, 1, 1, 31.2501, 35.3733),
    (6,  '2019-01-01 17:20:00', 1, 5,  3, 1,  NULL, 10010,  NULL, NULL, NULL, NULL, 11, 2, 5, 3, 31.8387, 34.9862),
    (7,  '2020-02-02 12:00:00', 1, 2,  4, 90, 3199, NULL,   1277, NULL, NULL, NULL, 15, 6, 1, 1, 31.4650, 35.3880),
    (10, '2020-01-10 19:05:00', 2, 1,  1, NULL, NULL, NULL, NULL, 5000, 418, NULL, 1, 5, 5, 3, 32.0800, 34.7740),
    (11, '2018-05-05 09:15:00', 3, 3,  1, NULL, NULL, NULL, NULL, 5000, 418, NULL, 1, 5, 1, 1, 32.0780, 34.7745),
    (12, '2016-02-02 16:40:00', 3, 4,  2, NULL, NULL, NULL, NULL, 5000, 418, 1,    1, 5, 1, 1, 32.0860, 34.7750),
    (13, '2019-09-09 11:30:00', 3, 7,  1, NULL, NULL, NULL, NULL, 3000, 2,   NULL, 10, 1, 1, 1, 31.7830, 35.2170);
";

const INVOLVED_SQL: &str = "
INSERT INTO involved
    (id, accident_id, accident_timestamp, injury_severity, injured_type, age_group,
     vehicle_type, road_type, road1, road2, road_segment_id, non_urban_intersection,
     yishuv_symbol, street1, street2, district, region)
SELECT
    a.id * 10 + p.n,
    a.id,
    a.accident_timestamp,
    p.injury_severity,
    p.injured_type,
    p.age_group,
    p.vehicle_type,
    a.road_type, a.road1, a.road2, a.road_segment_id, a.non_urban_intersection,
    a.yishuv_symbol, a.street1, a.street2, a.district, a.region
FROM accidents a
JOIN (VALUES
    (1, 1, 1, 2, 7,  1),
    (1, 2, 3, 2, 8,  1),
    (2, 1, 2, 2, 5,  9),
    (3, 1, 3, 2, 10, 1),
    (4, 1, 1, 2, 12, 1),
    (5, 1, 3, 3, 15, 1),
    (6, 1, 1, 2, 6,  2),
    (6, 2, 2, 3, 3,  1),
    (7, 1, 1, 2, 9,  1),
    (10, 1, 2, 1, 14, 1),
    (11, 1, 3, 2, 4,  1),
    (12, 1, 3, 2, 7,  15),
    (13, 1, 3, 2, 11, 1)
) AS p(accident_id, n, injury_severity, injured_type, age_group, vehicle_type)
ON p.accident_id = a.id;
";

const VEHICLES_SQL: &str = "
INSERT INTO vehicles
    (id, accident_id, accident_timestamp, accident_severity, vehicle_type,
     road_type, road1, road2, road_segment_id, non_urban_intersection,
     yishuv_symbol, street1, street2, district, region)
SELECT
    a.id * 10 + v.n,
    a.id,
    a.accident_timestamp,
    a.accident_severity,
    v.vehicle_type,
    a.road_type, a.road1, a.road2, a.road_segment_id, a.non_urban_intersection,
    a.yishuv_symbol, a.street1, a.street2, a.district, a.region
FROM accidents a
JOIN (VALUES
    (1, 1, 1),
    (1, 2, 2),
    (2, 1, 9),
    (3, 1, 1),
    (3, 2, 1),
    (4, 1, 1),
    (5, 1, 15),
    (6, 1, 2),
    (6, 2, 1),
    (7, 1, 1),
    (10, 1, 1),
    (11, 1, 1),
    (11, 2, 11),
    (12, 1, 15),
    (13, 1, 1)
) AS v(accident_id, n, vehicle_type)
ON v.accident_id = a.id;
";

/// Inserts the fixture dataset into a database that already has the
/// schema.
///
/// # Errors
///
/// Returns [`DbError`] if an insert fails.
pub fn seed(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(REFERENCE_SQL)?;
    conn.execute_batch(ACCIDENTS_SQL)?;
    conn.execute_batch(INVOLVED_SQL)?;
    conn.execute_batch(VEHICLES_SQL)?;
    Ok(())
}

/// Opens an in-memory database with the schema and the fixture dataset.
///
/// # Errors
///
/// Returns [`DbError`] if opening or seeding fails.
pub fn seeded_connection() -> Result<Connection, DbError> {
    let conn = crate::open_in_memory()?;
    seed(&conn)?;
    Ok(conn)
}

/// A pool of `size` connections onto a freshly seeded in-memory database.
///
/// # Errors
///
/// Returns [`DbError`] if opening or seeding fails.
pub fn seeded_pool(size: usize) -> Result<DuckDbPool, DbError> {
    DuckDbPool::from_connection(seeded_connection()?, size)
}

/// A pool of `size` connections onto an in-memory database with the schema
/// but no rows.
///
/// # Errors
///
/// Returns [`DbError`] if opening fails.
pub fn empty_pool(size: usize) -> Result<DuckDbPool, DbError> {
    DuckDbPool::from_connection(crate::open_in_memory()?, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_every_table() {
        let conn = seeded_connection().unwrap();
        for (table, expected) in [
            ("accidents", 11),
            ("involved", 13),
            ("vehicles", 15),
            ("cities", 2),
            ("streets", 3),
            ("road_segments", 3),
            ("junctions", 1),
            ("news_flash", 3),
        ] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, expected, "{table}");
        }
    }
}
