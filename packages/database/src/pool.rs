//! Round-robin pool of `DuckDB` connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use duckdb::Connection;

use crate::DbError;

/// Simple round-robin pool of `DuckDB` connections onto one database.
///
/// `duckdb::Connection` is `Send` but not `Sync`, so each connection is
/// wrapped in a `Mutex`. The pool hands out connections round-robin via
/// an atomic counter, allowing concurrent queries on different
/// connections. The pool size is the number of queries that can run at
/// once.
pub struct DuckDbPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl DuckDbPool {
    /// Builds a pool of `size` clones of `root`. The root connection is kept
    /// as the first pool member. A `size` of zero is treated as one.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a connection cannot be cloned.
    pub fn from_connection(root: Connection, size: usize) -> Result<Self, DbError> {
        let size = size.max(1);
        let mut connections = Vec::with_capacity(size);
        for _ in 1..size {
            connections.push(Mutex::new(root.try_clone()?));
        }
        connections.insert(0, Mutex::new(root));

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Builds another pool of `size` connections onto the same database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a connection cannot be cloned.
    pub fn share(&self, size: usize) -> Result<Self, DbError> {
        let root = self.acquire().try_clone()?;
        Self::from_connection(root, size)
    }

    /// Number of connections in the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Acquires the next connection from the pool (round-robin).
    ///
    /// A poisoned mutex only means another query panicked mid-flight; the
    /// connection itself is still usable, so the guard is recovered.
    pub fn acquire(&self) -> MutexGuard<'_, Connection> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_connections_share_one_database() {
        let root = crate::open_in_memory().unwrap();
        let pool = DuckDbPool::from_connection(root, 3).unwrap();
        assert_eq!(pool.size(), 3);

        pool.acquire()
            .execute_batch("INSERT INTO cities VALUES (5000, 'Tel Aviv')")
            .unwrap();

        for _ in 0..pool.size() {
            let count: i64 = pool
                .acquire()
                .query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 1);
        }

        let shared = pool.share(2).unwrap();
        let count: i64 = shared
            .acquire()
            .query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn zero_size_pool_has_one_connection() {
        let pool = DuckDbPool::from_connection(crate::open_in_memory().unwrap(), 0).unwrap();
        assert_eq!(pool.size(), 1);
    }
}
