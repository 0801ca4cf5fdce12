//! Message repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{enum_column, format_timestamp, optional_json_column, timestamp_column, Database};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => anyhow::bail!("Unknown message role: {}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub tenant_id: String,
    pub session_id: String,
    /// Zero-based physical line in the session log; part of the dedup key
    pub line_index: u32,
    /// sha256 of the raw log line
    pub line_hash: String,
    pub role: Role,
    pub content: Option<String>,
    pub token_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

pub struct MessageRepository {
    db: Database,
}

impl MessageRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert a message keyed by (tenant_id, session_id, line_index).
    ///
    /// A line that is byte-identical to the stored one is left alone, so a
    /// full re-scan of an unchanged log writes nothing.
    pub async fn upsert(&self, message: &MessageRecord) -> Result<UpsertOutcome> {
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.db.lock().await;

        let existing: Option<String> = conn
            .query_row(
                "SELECT line_hash FROM messages
                 WHERE tenant_id = ?1 AND session_id = ?2 AND line_index = ?3",
                params![message.tenant_id, message.session_id, message.line_index],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(hash) if hash == message.line_hash => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };

        conn.execute(
            "INSERT INTO messages (id, tenant_id, session_id, line_index, line_hash, role, content, token_count, created_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (tenant_id, session_id, line_index) DO UPDATE SET
                line_hash = excluded.line_hash,
                role = excluded.role,
                content = excluded.content,
                token_count = excluded.token_count,
                created_at = excluded.created_at,
                metadata = excluded.metadata",
            params![
                Uuid::new_v4().to_string(),
                message.tenant_id,
                message.session_id,
                message.line_index,
                message.line_hash,
                message.role.as_str(),
                message.content,
                message.token_count,
                format_timestamp(&message.created_at),
                metadata,
            ],
        )
        .with_context(|| {
            format!(
                "Failed to upsert message {}/{}#{}",
                message.tenant_id, message.session_id, message.line_index
            )
        })?;

        Ok(outcome)
    }

    /// List a session's messages in log order
    pub async fn list_for_session(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT tenant_id, session_id, line_index, line_hash, role, content, token_count, created_at, metadata
             FROM messages WHERE tenant_id = ?1 AND session_id = ?2
             ORDER BY line_index",
        )?;

        let messages = stmt
            .query_map(params![tenant_id, session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to collect messages")?;

        Ok(messages)
    }

    pub async fn count_for_session(&self, tenant_id: &str, session_id: &str) -> Result<u32> {
        let conn = self.db.lock().await;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE tenant_id = ?1 AND session_id = ?2",
            params![tenant_id, session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRecord> {
        Ok(MessageRecord {
            tenant_id: row.get(0)?,
            session_id: row.get(1)?,
            line_index: row.get(2)?,
            line_hash: row.get(3)?,
            role: enum_column(row, 4, Role::from_str)?,
            content: row.get(5)?,
            token_count: row.get(6)?,
            created_at: timestamp_column(row, 7)?,
            metadata: optional_json_column(row, 8)?,
        })
    }
}
