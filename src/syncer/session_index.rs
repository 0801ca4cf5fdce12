//! Session index syncer
//!
//! `sessions.json` maps session id to metadata. The whole document is parsed
//! before any write; a corrupt index is rejected as a unit.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::session_log::parse_entry_timestamp;
use super::{read_file, SyncContext};
use crate::db::repositories::session::SessionUpsert;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub upserted: u32,
    pub skipped: u32,
}

/// Turn one index entry into a session upsert
pub fn entry_to_upsert(
    tenant_id: &str,
    session_id: &str,
    meta: &Map<String, Value>,
) -> SessionUpsert {
    let timestamp = |key: &str| meta.get(key).and_then(|v| parse_entry_timestamp(v).ok());

    SessionUpsert {
        tenant_id: tenant_id.to_string(),
        session_id: session_id.to_string(),
        channel: meta
            .get("channel")
            .and_then(Value::as_str)
            .map(str::to_string),
        started_at: timestamp("startedAt"),
        last_message_at: timestamp("updatedAt"),
        metadata: Some(Value::Object(meta.clone())),
    }
}

#[derive(Clone)]
pub struct SessionIndexSyncer {
    ctx: SyncContext,
}

impl SessionIndexSyncer {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    pub async fn sync_file(&self, tenant_id: &str, path: &Path) -> SyncResult<IndexReport> {
        let contents = read_file(path).await?;
        self.sync_contents(tenant_id, path, &contents).await
    }

    pub async fn sync_contents(
        &self,
        tenant_id: &str,
        path: &Path,
        contents: &[u8],
    ) -> SyncResult<IndexReport> {
        let document: Value =
            serde_json::from_slice(contents).map_err(|e| SyncError::json(path, e))?;
        let Value::Object(entries) = document else {
            return Err(SyncError::Malformed {
                path: path.to_path_buf(),
                reason: "session index is not a JSON object".to_string(),
            });
        };

        let mut report = IndexReport::default();

        for (session_id, meta) in &entries {
            let Value::Object(meta) = meta else {
                warn!(
                    "Skipping index entry {} in {:?}: not an object",
                    session_id, path
                );
                report.skipped += 1;
                continue;
            };

            let upsert = entry_to_upsert(tenant_id, session_id, meta);
            match self.ctx.bounded(self.ctx.store.upsert_session(&upsert)).await {
                Ok(()) => report.upserted += 1,
                Err(e @ SyncError::Timeout(_)) => return Err(e),
                Err(e) => {
                    warn!("Failed to upsert session {}/{}: {}", tenant_id, session_id, e);
                    report.skipped += 1;
                }
            }
        }

        debug!(
            "Session index for {}: {} upserted, {} skipped",
            tenant_id, report.upserted, report.skipped
        );
        Ok(report)
    }
}
