// crates/opx-store-sqlite/src/rate_limit_store.rs
// ============================================================================
// Module: SQLite Rate Limit Store
// Description: Durable, TTL'd RateLimitStore backed by SQLite.
// Purpose: Expired entries are swept lazily on the next write, matching the
// in-memory store's discipline.
// Dependencies: opx_core::time, opx_stores::rate_limit_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::time::Timestamp;
use opx_stores::RateLimitKey;
use opx_stores::RateLimitStore;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::params;

use crate::error::SqliteStoreError;

/// `SQLite`-backed [`RateLimitStore`].
#[derive(Clone)]
pub struct SqliteRateLimitStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRateLimitStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("rate limit store connection mutex poisoned".to_string()))
    }
}

impl RateLimitStore for SqliteRateLimitStore {
    fn record(&self, key: &RateLimitKey, now: Timestamp, expires_at: Timestamp) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection.execute("DELETE FROM rate_limit_entries WHERE expires_at_rfc3339 <= ?1", params![now.to_rfc3339()]).map_err(SqliteStoreError::from)?;
        connection
            .execute(
                "INSERT INTO rate_limit_entries (principal, operation_type, recorded_at_rfc3339, expires_at_rfc3339) VALUES (?1, ?2, ?3, ?4)",
                params![key.principal, key.operation_type.as_str(), now.to_rfc3339(), expires_at.to_rfc3339()],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn count_since(&self, key: &RateLimitKey, since: Timestamp) -> Result<u32, StoreError> {
        let connection = self.lock()?;
        let count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM rate_limit_entries WHERE principal = ?1 AND operation_type = ?2 AND recorded_at_rfc3339 > ?3",
                params![key.principal, key.operation_type.as_str(), since.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(SqliteStoreError::from)?;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, reason = "COUNT(*) never exceeds u32 range for a rate-limit bucket")]
        Ok(count as u32)
    }

    fn oldest_since(&self, key: &RateLimitKey, since: Timestamp) -> Result<Option<Timestamp>, StoreError> {
        let connection = self.lock()?;
        let oldest: Option<String> = connection
            .query_row(
                "SELECT MIN(recorded_at_rfc3339) FROM rate_limit_entries WHERE principal = ?1 AND operation_type = ?2 AND recorded_at_rfc3339 > ?3",
                params![key.principal, key.operation_type.as_str(), since.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(SqliteStoreError::from)?;
        oldest.map(|value| Timestamp::parse(&value).map_err(|err| StoreError::Io(err.to_string()))).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
    use opx_core::audit::OperationType;

    fn key() -> RateLimitKey {
        RateLimitKey { principal: "oncall@example.com".to_string(), operation_type: OperationType::Calibration }
    }

    fn far_future() -> Timestamp {
        Timestamp::parse("2026-03-06T00:00:00.000Z").expect("ts")
    }

    fn store() -> (tempfile::TempDir, SqliteRateLimitStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqliteRateLimitStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn isolated_keys_do_not_share_counts() {
        let (_dir, store) = store();
        let before = Timestamp::parse("2026-03-04T23:59:59.000Z").expect("ts");
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        store.record(&key(), now, far_future()).expect("record");
        let other_principal = RateLimitKey { principal: "other@example.com".to_string(), operation_type: OperationType::Calibration };
        assert_eq!(store.count_since(&other_principal, before).expect("count"), 0);
        assert_eq!(store.count_since(&key(), before).expect("count"), 1);
    }

    #[test]
    fn oldest_since_reports_earliest_unexpired_entry() {
        let (_dir, store) = store();
        let before = Timestamp::parse("2026-03-04T23:59:59.000Z").expect("ts");
        let first = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        let second = Timestamp::parse("2026-03-05T00:10:00.000Z").expect("ts");
        store.record(&key(), first, far_future()).expect("record");
        store.record(&key(), second, far_future()).expect("record");
        assert_eq!(store.oldest_since(&key(), before).expect("oldest"), Some(first));
    }

    #[test]
    fn count_excludes_entries_at_or_before_the_cutoff() {
        let (_dir, store) = store();
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        store.record(&key(), now, far_future()).expect("record");
        assert_eq!(store.count_since(&key(), now).expect("count"), 0);
    }
}
