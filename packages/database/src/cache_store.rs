//! Double-buffered report cache storage.
//!
//! Readers only ever touch `report_cache`. The rebuild job fills
//! `report_cache_staging` and then publishes it with [`CacheStore::publish`],
//! which deletes the live rows and copies the staging rows in one
//! transaction while holding the store's exclusive swap lock. Readers either
//! see the complete pre-publish table or the complete post-publish table.

use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use duckdb::Transaction;

use crate::pool::DuckDbPool;
use crate::schema::{LIVE_CACHE_TABLE, STAGING_CACHE_TABLE};
use crate::{DbError, format_timestamp, parse_timestamp};

/// Which of the two cache tables to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTable {
    /// The table read by the serving path.
    Live,
    /// The table written by the rebuild job.
    Staging,
}

impl CacheTable {
    /// Returns the SQL table name.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Live => LIVE_CACHE_TABLE,
            Self::Staging => STAGING_CACHE_TABLE,
        }
    }
}

/// One cached report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRow {
    /// Canonical location key.
    pub location_key: String,
    /// Lookback window in years.
    pub lookback_years: u32,
    /// Resolution kind of the location (snake case).
    pub resolution: String,
    /// Serialized report.
    pub payload: String,
    /// When the report was assembled.
    pub created_at: NaiveDateTime,
}

/// Row counts of both cache tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounts {
    /// Rows in the live table.
    pub live: u64,
    /// Rows in the staging table.
    pub staging: u64,
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Live rows removed.
    pub removed: u64,
    /// Staging rows copied into the live table.
    pub published: u64,
    /// How long the live table was locked for the swap.
    pub swap_duration: Duration,
}

/// Report cache storage over a pool of `DuckDB` connections.
pub struct CacheStore {
    pool: DuckDbPool,
    /// Readers hold this shared; the swap holds it exclusively.
    swap_lock: RwLock<()>,
}

impl CacheStore {
    /// Creates a store over `pool`.
    #[must_use]
    pub const fn new(pool: DuckDbPool) -> Self {
        Self {
            pool,
            swap_lock: RwLock::new(()),
        }
    }

    /// Reads the live entry for a location and window.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn get(
        &self,
        location_key: &str,
        lookback_years: u32,
    ) -> Result<Option<CacheRow>, DbError> {
        let _shared = self.swap_lock.read().unwrap_or_else(PoisonError::into_inner);
        let conn = self.pool.acquire();

        let result = conn.query_row(
            "SELECT location_key, lookback_years, resolution, payload, created_at::TEXT
             FROM report_cache
             WHERE location_key = ? AND lookback_years = ?
             LIMIT 1",
            duckdb::params![location_key, i64::from(lookback_years)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        );
        let row = match result {
            Ok(row) => Some(row),
            Err(duckdb::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(DbError::DuckDb(e)),
        };

        row.map(|(location_key, years, resolution, payload, created_at)| {
            Ok(CacheRow {
                location_key,
                lookback_years: u32::try_from(years).map_err(|e| DbError::Conversion {
                    message: format!("lookback_years {years}: {e}"),
                })?,
                resolution,
                payload,
                created_at: parse_timestamp(&created_at).ok_or_else(|| DbError::Conversion {
                    message: format!("created_at {created_at:?}"),
                })?,
            })
        })
        .transpose()
    }

    /// Counts rows in one cache table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn count(&self, table: CacheTable) -> Result<u64, DbError> {
        let conn = self.pool.acquire();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Counts rows in both cache tables.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a query fails.
    pub fn counts(&self) -> Result<CacheCounts, DbError> {
        Ok(CacheCounts {
            live: self.count(CacheTable::Live)?,
            staging: self.count(CacheTable::Staging)?,
        })
    }

    /// Removes every staging row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    pub fn truncate_staging(&self) -> Result<u64, DbError> {
        let conn = self.pool.acquire();
        let removed = conn.execute("DELETE FROM report_cache_staging", [])?;
        Ok(removed as u64)
    }

    /// Inserts a batch of rows into the staging table in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if an insert fails; the whole batch is rolled
    /// back in that case.
    pub fn insert_staging(&self, rows: &[CacheRow]) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.acquire();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO report_cache_staging
                    (location_key, lookback_years, resolution, payload, created_at)
                 VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            )?;
            for row in rows {
                stmt.execute(duckdb::params![
                    row.location_key,
                    i64::from(row.lookback_years),
                    row.resolution,
                    row.payload,
                    format_timestamp(&row.created_at),
                ])?;
            }
        }
        tx.commit()?;

        Ok(rows.len() as u64)
    }

    /// Keys currently present in the staging table, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn staging_keys(&self) -> Result<Vec<(String, u32)>, DbError> {
        let conn = self.pool.acquire();
        let mut stmt = conn.prepare(
            "SELECT location_key, lookback_years FROM report_cache_staging
             ORDER BY location_key, lookback_years",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut keys = Vec::new();
        for row in rows {
            let (key, years) = row?;
            keys.push((key, u32::try_from(years).unwrap_or_default()));
        }
        Ok(keys)
    }

    /// Runs `work` inside one transaction while holding the exclusive swap
    /// lock. New readers block until the transaction has committed or
    /// rolled back; in-flight readers finish first.
    ///
    /// The transaction commits only if `work` returns `Ok`. Any error
    /// (from `work` or from the commit itself) rolls everything back.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `work`, or [`DbError`] if the
    /// transaction cannot be started or committed.
    pub fn exclusive<T, F>(&self, work: F) -> Result<T, DbError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DbError>,
    {
        let _exclusive = self.swap_lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut conn = self.pool.acquire();
        let tx = conn.transaction()?;

        match work(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::error!(
                        "Rollback after failed cache transaction also failed: {rollback_err}"
                    );
                }
                Err(e)
            }
        }
    }

    /// Atomically replaces the live table with the staging table and
    /// clears staging.
    ///
    /// Delete, copy and staging cleanup run as a single transaction (one
    /// bulk `INSERT ... SELECT`, never a per-row copy), so a failure at any
    /// point leaves both tables exactly as they were and an error always
    /// means nothing was published.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the swap transaction fails. Neither table is
    /// changed.
    pub fn publish(&self) -> Result<PublishStats, DbError> {
        let started = Instant::now();
        let (removed, published) = self.exclusive(|tx| {
            let removed = delete_all(tx, CacheTable::Live)?;
            let published = copy_staging_into_live(tx)?;
            delete_all(tx, CacheTable::Staging)?;
            Ok((removed, published))
        })?;
        let swap_duration = started.elapsed();

        log::info!(
            "Published report cache: {removed} rows replaced by {published} in {swap_duration:?}"
        );

        Ok(PublishStats {
            removed,
            published,
            swap_duration,
        })
    }
}

/// Deletes every row of a cache table inside `tx`.
///
/// # Errors
///
/// Returns [`DbError`] if the delete fails.
pub fn delete_all(tx: &Transaction<'_>, table: CacheTable) -> Result<u64, DbError> {
    let removed = tx.execute(&format!("DELETE FROM {}", table.table_name()), [])?;
    Ok(removed as u64)
}

/// Copies every staging row into the live table inside `tx`.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn copy_staging_into_live(tx: &Transaction<'_>) -> Result<u64, DbError> {
    let copied = tx.execute(
        "INSERT INTO report_cache
            (location_key, lookback_years, resolution, payload, created_at)
         SELECT location_key, lookback_years, resolution, payload, created_at
         FROM report_cache_staging",
        [],
    )?;
    Ok(copied as u64)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn store() -> CacheStore {
        let root = crate::open_in_memory().unwrap();
        CacheStore::new(DuckDbPool::from_connection(root, 2).unwrap())
    }

    fn row(key: &str, years: u32, payload: &str) -> CacheRow {
        CacheRow {
            location_key: key.to_string(),
            lookback_years: years,
            resolution: "street".to_string(),
            payload: payload.to_string(),
            created_at: NaiveDate::from_ymd_opt(2020, 6, 16)
                .unwrap()
                .and_hms_opt(3, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn publish_swaps_staging_into_live() {
        let store = store();
        store.insert_staging(&[row("a", 1, "old-a")]).unwrap();
        store.publish().unwrap();

        store
            .insert_staging(&[row("b", 1, "new-b"), row("b", 3, "new-b3")])
            .unwrap();
        let stats = store.publish().unwrap();

        assert_eq!(stats.removed, 1);
        assert_eq!(stats.published, 2);
        assert_eq!(store.counts().unwrap(), CacheCounts { live: 2, staging: 0 });
        assert!(store.get("a", 1).unwrap().is_none());
        assert_eq!(store.get("b", 3).unwrap().unwrap().payload, "new-b3");
        assert_eq!(store.get("b", 1).unwrap().unwrap(), row("b", 1, "new-b"));
    }

    #[test]
    fn failed_swap_leaves_live_untouched() {
        let store = store();
        store
            .insert_staging(&[row("a", 1, "old-a"), row("a", 3, "old-a3")])
            .unwrap();
        store.publish().unwrap();
        store.insert_staging(&[row("b", 1, "new-b")]).unwrap();

        let result: Result<(), DbError> = store.exclusive(|tx| {
            delete_all(tx, CacheTable::Live)?;
            Err(DbError::Conversion {
                message: "injected fault after delete".to_string(),
            })
        });
        assert!(result.is_err());

        assert_eq!(store.count(CacheTable::Live).unwrap(), 2);
        assert_eq!(store.get("a", 1).unwrap().unwrap().payload, "old-a");
        assert_eq!(store.get("a", 3).unwrap().unwrap().payload, "old-a3");
        assert!(store.get("b", 1).unwrap().is_none());
        assert_eq!(store.count(CacheTable::Staging).unwrap(), 1);
    }

    #[test]
    fn staging_cleanup_is_part_of_the_swap() {
        let store = store();
        store.insert_staging(&[row("a", 1, "old-a")]).unwrap();
        store.publish().unwrap();
        store.insert_staging(&[row("b", 1, "new-b")]).unwrap();

        let result: Result<(), DbError> = store.exclusive(|tx| {
            delete_all(tx, CacheTable::Live)?;
            copy_staging_into_live(tx)?;
            delete_all(tx, CacheTable::Staging)?;
            Err(DbError::Conversion {
                message: "injected fault after staging cleanup".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(store.counts().unwrap(), CacheCounts { live: 1, staging: 1 });
        assert_eq!(store.get("a", 1).unwrap().unwrap().payload, "old-a");

        let stats = store.publish().unwrap();
        assert_eq!((stats.removed, stats.published), (1, 1));
        assert_eq!(store.counts().unwrap(), CacheCounts { live: 1, staging: 0 });
        assert_eq!(store.get("b", 1).unwrap().unwrap().payload, "new-b");
    }

    #[test]
    fn staging_is_truncated_and_keys_listed() {
        let store = store();
        store
            .insert_staging(&[row("b", 3, "x"), row("a", 1, "y")])
            .unwrap();
        assert_eq!(
            store.staging_keys().unwrap(),
            vec![("a".to_string(), 1), ("b".to_string(), 3)]
        );

        assert_eq!(store.truncate_staging().unwrap(), 2);
        assert!(store.staging_keys().unwrap().is_empty());
        assert_eq!(store.insert_staging(&[]).unwrap(), 0);
    }

    #[test]
    fn duplicate_staging_key_rolls_back_batch() {
        let store = store();
        let result = store.insert_staging(&[row("a", 1, "x"), row("a", 1, "y")]);
        assert!(result.is_err());
        assert_eq!(store.count(CacheTable::Staging).unwrap(), 0);
    }
}
