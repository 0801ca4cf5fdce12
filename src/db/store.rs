//! Store contract consumed by the syncers

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::repositories::config::{ConfigRepository, ConfigUpsert};
use super::repositories::message::{MessageRecord, MessageRepository, UpsertOutcome};
use super::repositories::session::{SessionRepository, SessionUpsert};
use super::Database;

/// Idempotent upserts keyed by tenant-scoped identifiers.
///
/// Every key the engine writes carries a tenant id, so concurrent calls for
/// different keys never conflict and calls for the same key are
/// last-write-wins.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Whether a session row already exists
    async fn session_exists(&self, tenant_id: &str, session_id: &str) -> Result<bool>;

    /// Create or merge a session row
    async fn upsert_session(&self, upsert: &SessionUpsert) -> Result<()>;

    /// Apply the totals of a full log pass to an existing session
    async fn record_session_pass(
        &self,
        tenant_id: &str,
        session_id: &str,
        message_count: u32,
        first_message_at: Option<DateTime<Utc>>,
        last_message_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Upsert one message by its dedup key
    async fn upsert_message(&self, message: &MessageRecord) -> Result<UpsertOutcome>;

    /// Upsert one config entry found on disk
    async fn upsert_config(&self, upsert: &ConfigUpsert, synced_at: DateTime<Utc>) -> Result<()>;
}

/// SQLite-backed store built from the repositories
pub struct SqliteStore {
    sessions: SessionRepository,
    messages: MessageRepository,
    configs: ConfigRepository,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            sessions: SessionRepository::new(db.clone()),
            messages: MessageRepository::new(db.clone()),
            configs: ConfigRepository::new(db),
        }
    }

    pub fn sessions(&self) -> &SessionRepository {
        &self.sessions
    }

    pub fn messages(&self) -> &MessageRepository {
        &self.messages
    }

    pub fn configs(&self) -> &ConfigRepository {
        &self.configs
    }
}

#[async_trait]
impl SyncStore for SqliteStore {
    async fn session_exists(&self, tenant_id: &str, session_id: &str) -> Result<bool> {
        self.sessions.exists(tenant_id, session_id).await
    }

    async fn upsert_session(&self, upsert: &SessionUpsert) -> Result<()> {
        self.sessions.upsert(upsert).await
    }

    async fn record_session_pass(
        &self,
        tenant_id: &str,
        session_id: &str,
        message_count: u32,
        first_message_at: Option<DateTime<Utc>>,
        last_message_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.sessions
            .record_pass(
                tenant_id,
                session_id,
                message_count,
                first_message_at,
                last_message_at,
            )
            .await
    }

    async fn upsert_message(&self, message: &MessageRecord) -> Result<UpsertOutcome> {
        self.messages.upsert(message).await
    }

    async fn upsert_config(&self, upsert: &ConfigUpsert, synced_at: DateTime<Utc>) -> Result<()> {
        self.configs.upsert_synced(upsert, synced_at).await
    }
}
