//! Config syncer
//!
//! Projects the sections of an agent's `openclaw.json` into config rows.

use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use super::{read_file, SyncContext};
use crate::db::repositories::config::{ConfigType, ConfigUpsert};
use crate::error::{SyncError, SyncResult};

/// Top-level sections holding one entry per key
const KEYED_SECTIONS: [(&str, ConfigType); 3] = [
    ("channels", ConfigType::Channel),
    ("models", ConfigType::Model),
    ("tools", ConfigType::Tool),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigReport {
    pub upserted: u32,
    pub failed: u32,
}

/// Extract every (type, key, value) entry from a parsed config document.
/// Absent or non-object sections are skipped.
pub fn collect_entries(tenant_id: &str, document: &Value) -> Vec<ConfigUpsert> {
    let mut entries = Vec::new();

    for (section, config_type) in KEYED_SECTIONS {
        let Some(items) = document.get(section).and_then(Value::as_object) else {
            continue;
        };
        entries.extend(items.iter().map(|(key, value)| ConfigUpsert {
            tenant_id: tenant_id.to_string(),
            config_type,
            config_key: key.clone(),
            config_value: value.clone(),
        }));
    }

    if let Some(default) = document.get("agents").and_then(|a| a.get("default")) {
        entries.push(ConfigUpsert {
            tenant_id: tenant_id.to_string(),
            config_type: ConfigType::Agent,
            config_key: "default".to_string(),
            config_value: default.clone(),
        });
    }

    entries
}

#[derive(Clone)]
pub struct ConfigSyncer {
    ctx: SyncContext,
}

impl ConfigSyncer {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    pub async fn sync_file(&self, tenant_id: &str, path: &Path) -> SyncResult<ConfigReport> {
        let contents = read_file(path).await?;
        self.sync_contents(tenant_id, path, &contents).await
    }

    pub async fn sync_contents(
        &self,
        tenant_id: &str,
        path: &Path,
        contents: &[u8],
    ) -> SyncResult<ConfigReport> {
        let document: Value =
            serde_json::from_slice(contents).map_err(|e| SyncError::json(path, e))?;
        if !document.is_object() {
            return Err(SyncError::Malformed {
                path: path.to_path_buf(),
                reason: "config is not a JSON object".to_string(),
            });
        }

        let synced_at = Utc::now();
        let mut report = ConfigReport::default();

        for entry in collect_entries(tenant_id, &document) {
            match self
                .ctx
                .bounded(self.ctx.store.upsert_config(&entry, synced_at))
                .await
            {
                Ok(()) => report.upserted += 1,
                Err(e @ SyncError::Timeout(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "Failed to upsert config {}/{}/{}: {}",
                        tenant_id,
                        entry.config_type.as_str(),
                        entry.config_key,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        debug!("Config for {}: {} entries synced", tenant_id, report.upserted);
        Ok(report)
    }
}
