//! Session repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{format_timestamp, optional_json_column, optional_timestamp_column, Database};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub tenant_id: String,
    pub session_id: String,
    pub channel: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: u32,
    pub metadata: Option<serde_json::Value>,
}

/// Fields a syncer wants applied to a session row.
///
/// `started_at` only fills an empty column; `last_message_at` only moves
/// forward. `channel` and `metadata` overwrite when present.
#[derive(Debug, Clone, Default)]
pub struct SessionUpsert {
    pub tenant_id: String,
    pub session_id: String,
    pub channel: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

impl SessionUpsert {
    pub fn new(tenant_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

pub struct SessionRepository {
    db: Database,
}

impl SessionRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn exists(&self, tenant_id: &str, session_id: &str) -> Result<bool> {
        let conn = self.db.lock().await;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE tenant_id = ?1 AND session_id = ?2",
                params![tenant_id, session_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check session existence")?;
        Ok(found.is_some())
    }

    /// Insert or merge a session row keyed by (tenant_id, session_id)
    pub async fn upsert(&self, upsert: &SessionUpsert) -> Result<()> {
        let metadata = upsert
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO sessions (id, tenant_id, session_id, channel, started_at, last_message_at, message_count, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
             ON CONFLICT (tenant_id, session_id) DO UPDATE SET
                channel = COALESCE(excluded.channel, sessions.channel),
                started_at = COALESCE(sessions.started_at, excluded.started_at),
                last_message_at = CASE
                    WHEN excluded.last_message_at IS NOT NULL
                         AND (sessions.last_message_at IS NULL OR excluded.last_message_at > sessions.last_message_at)
                    THEN excluded.last_message_at
                    ELSE sessions.last_message_at
                END,
                metadata = COALESCE(excluded.metadata, sessions.metadata)",
            params![
                Uuid::new_v4().to_string(),
                upsert.tenant_id,
                upsert.session_id,
                upsert.channel,
                upsert.started_at.as_ref().map(format_timestamp),
                upsert.last_message_at.as_ref().map(format_timestamp),
                metadata,
            ],
        )
        .with_context(|| {
            format!(
                "Failed to upsert session {}/{}",
                upsert.tenant_id, upsert.session_id
            )
        })?;

        tracing::debug!("Upserted session {}/{}", upsert.tenant_id, upsert.session_id);
        Ok(())
    }

    /// Record the outcome of a full log pass over a session
    pub async fn record_pass(
        &self,
        tenant_id: &str,
        session_id: &str,
        message_count: u32,
        first_message_at: Option<DateTime<Utc>>,
        last_message_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "UPDATE sessions SET
                message_count = ?3,
                started_at = COALESCE(started_at, ?4),
                last_message_at = CASE
                    WHEN ?5 IS NOT NULL AND (last_message_at IS NULL OR ?5 > last_message_at)
                    THEN ?5
                    ELSE last_message_at
                END
             WHERE tenant_id = ?1 AND session_id = ?2",
            params![
                tenant_id,
                session_id,
                message_count,
                first_message_at.as_ref().map(format_timestamp),
                last_message_at.as_ref().map(format_timestamp),
            ],
        )
        .with_context(|| {
            format!(
                "Failed to record pass for session {}/{}",
                tenant_id, session_id
            )
        })?;

        Ok(())
    }

    /// Get a session by its tenant-scoped key
    pub async fn get(&self, tenant_id: &str, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT tenant_id, session_id, channel, started_at, last_message_at, message_count, metadata
             FROM sessions WHERE tenant_id = ?1 AND session_id = ?2",
        )?;

        stmt.query_row(params![tenant_id, session_id], Self::map_row)
            .optional()
            .context("Failed to get session")
    }

    /// List every session belonging to a tenant
    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<SessionRecord>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT tenant_id, session_id, channel, started_at, last_message_at, message_count, metadata
             FROM sessions WHERE tenant_id = ?1 ORDER BY session_id",
        )?;

        let sessions = stmt
            .query_map(params![tenant_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to collect sessions")?;

        Ok(sessions)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
        Ok(SessionRecord {
            tenant_id: row.get(0)?,
            session_id: row.get(1)?,
            channel: row.get(2)?,
            started_at: optional_timestamp_column(row, 3)?,
            last_message_at: optional_timestamp_column(row, 4)?,
            message_count: row.get(5)?,
            metadata: optional_json_column(row, 6)?,
        })
    }
}
