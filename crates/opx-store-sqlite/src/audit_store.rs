// crates/opx-store-sqlite/src/audit_store.rs
// ============================================================================
// Module: SQLite Audit Store
// Description: Durable AuditStore backed by SQLite. `replace` is gated on
// the stored status still being RUNNING, via a conditional UPDATE.
// Dependencies: opx_core::audit, opx_stores::audit_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::audit::AuditStatus;
use opx_core::audit::AutomationAudit;
use opx_stores::AuditStore;
use opx_stores::AuditStoreError;
use opx_stores::AuditStoreOrState;
use opx_stores::PutOutcome;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::digest::hex_digest;
use crate::error::SqliteStoreError;

/// Renders an [`AuditStatus`] as its storage string.
fn status_string(status: AuditStatus) -> &'static str {
    match status {
        AuditStatus::Running => "RUNNING",
        AuditStatus::Success => "SUCCESS",
        AuditStatus::Failed => "FAILED",
        AuditStatus::Skipped => "SKIPPED",
    }
}

/// `SQLite`-backed [`AuditStore`].
#[derive(Clone)]
pub struct SqliteAuditStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("audit store connection mutex poisoned".to_string()))
    }
}

impl AuditStore for SqliteAuditStore {
    fn create(&self, audit: AutomationAudit) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&audit).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let next_sequence: i64 = connection.query_row("SELECT COALESCE(MAX(sequence), 0) + 1 FROM automation_audits", [], |row| row.get(0)).map_err(SqliteStoreError::from)?;
        let rows = connection
            .execute(
                "INSERT OR IGNORE INTO automation_audits (audit_id, status, sequence, body_json, body_hash) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![audit.audit_id, status_string(audit.status), next_sequence, body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get(&self, audit_id: &str) -> Result<Option<AutomationAudit>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM automation_audits WHERE audit_id = ?1", params![audit_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((body, hash)) = row else {
            return Ok(None);
        };
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "automation_audit", id: audit_id.to_string() }.into());
        }
        Ok(Some(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?))
    }

    fn replace(&self, audit: AutomationAudit) -> Result<AutomationAudit, AuditStoreOrState> {
        let connection = self.lock()?;
        let found_status: Option<String> =
            connection.query_row("SELECT status FROM automation_audits WHERE audit_id = ?1", params![audit.audit_id], |row| row.get(0)).optional().map_err(SqliteStoreError::from)?;
        let Some(found_status) = found_status else {
            return Err(AuditStoreError::NotFound(audit.audit_id).into());
        };
        if found_status != status_string(AuditStatus::Running) {
            return Err(AuditStoreError::AlreadyTerminal(audit.audit_id).into());
        }
        let next_sequence: i64 = connection.query_row("SELECT COALESCE(MAX(sequence), 0) + 1 FROM automation_audits", [], |row| row.get(0)).map_err(SqliteStoreError::from)?;
        let body = serde_json::to_vec(&audit).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute(
                "UPDATE automation_audits SET status = ?2, sequence = ?3, body_json = ?4, body_hash = ?5 \
                 WHERE audit_id = ?1 AND status = 'RUNNING'",
                params![audit.audit_id, status_string(audit.status), next_sequence, body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        if rows == 0 {
            return Err(AuditStoreError::AlreadyTerminal(audit.audit_id).into());
        }
        Ok(audit)
    }

    fn list_recent(&self, status: Option<AuditStatus>, limit: usize) -> Result<Vec<AutomationAudit>, StoreError> {
        let connection = self.lock()?;
        let status = status.map(status_string);
        let mut statement = connection
            .prepare("SELECT body_json FROM automation_audits WHERE (?1 IS NULL OR status = ?1) ORDER BY sequence DESC LIMIT ?2")
            .map_err(SqliteStoreError::from)?;
        let rows = statement.query_map(params![status, limit as i64], |row| row.get::<_, Vec<u8>>(0)).map_err(SqliteStoreError::from)?;
        let mut audits = Vec::new();
        for row in rows {
            let body = row.map_err(SqliteStoreError::from)?;
            audits.push(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?);
        }
        Ok(audits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
    use opx_core::audit::OperationType;
    use opx_core::audit::TriggerType;
    use opx_core::authority::Authority;
    use opx_core::time::Timestamp;
    use serde_json::json;

    fn running(id: &str) -> AutomationAudit {
        AutomationAudit {
            audit_id: id.to_string(),
            operation_type: OperationType::Calibration,
            trigger_type: TriggerType::Scheduled,
            start_time: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
            end_time: None,
            status: AuditStatus::Running,
            parameters: json!({}),
            results: json!({}),
            triggered_by: Authority::system(),
            version: 1,
            error_message: None,
            error_stack: None,
        }
    }

    fn store() -> (tempfile::TempDir, SqliteAuditStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqliteAuditStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn create_twice_is_idempotent() {
        let (_dir, store) = store();
        assert_eq!(store.create(running("a1")).expect("create"), PutOutcome::Created);
        assert_eq!(store.create(running("a1")).expect("create"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn replace_twice_is_refused_once_terminal() {
        let (_dir, store) = store();
        store.create(running("a1")).expect("create");
        let mut succeeded = running("a1");
        succeeded.status = AuditStatus::Success;
        succeeded.end_time = Some(Timestamp::parse("2026-03-05T00:01:00.000Z").expect("ts"));
        store.replace(succeeded.clone()).expect("replace");
        let err = store.replace(succeeded).unwrap_err();
        assert!(matches!(err, AuditStoreOrState::State(AuditStoreError::AlreadyTerminal(_))));
    }

    #[test]
    fn replace_against_missing_audit_is_not_found() {
        let (_dir, store) = store();
        let err = store.replace(running("missing")).unwrap_err();
        assert!(matches!(err, AuditStoreOrState::State(AuditStoreError::NotFound(_))));
    }
}
