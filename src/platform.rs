//! Writes made on the agent's behalf by the platform itself

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::classifier::tenant_config_path;
use crate::error::{SyncError, SyncResult};
use crate::suppressor::{content_hash, SuppressionRegistry};

/// Rewrites tenant config files so the engine's own watch ignores them.
///
/// The hash is registered before the bytes hit the disk, and the file is
/// replaced atomically so the watcher never settles on a partial write.
pub struct PlatformConfigWriter {
    root: PathBuf,
    suppressor: Arc<dyn SuppressionRegistry>,
}

impl PlatformConfigWriter {
    pub fn new(root: impl Into<PathBuf>, suppressor: Arc<dyn SuppressionRegistry>) -> Self {
        Self {
            root: root.into(),
            suppressor,
        }
    }

    /// Replace a tenant's `openclaw.json`, returning the registered hash
    pub async fn write_config(&self, tenant_id: &str, document: &Value) -> SyncResult<String> {
        let path = tenant_config_path(&self.root, tenant_id);
        let mut bytes =
            serde_json::to_vec_pretty(document).map_err(|e| SyncError::json(&path, e))?;
        bytes.push(b'\n');

        let hash = content_hash(&bytes);
        self.suppressor.register(hash.clone());
        write_atomic(&path, &bytes).await?;

        info!("Platform wrote config for tenant {}", tenant_id);
        Ok(hash)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> SyncResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| SyncError::io(parent, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("config");
    let tmp = parent.join(format!(".{file_name}.tmp"));

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| SyncError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| SyncError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suppressor::LoopSuppressor;
    use serde_json::json;

    #[tokio::test]
    async fn written_bytes_match_registered_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let suppressor = Arc::new(LoopSuppressor::default());
        let writer = PlatformConfigWriter::new(dir.path(), suppressor.clone());

        let hash = writer
            .write_config("t1", &json!({ "tools": { "browser": { "enabled": true } } }))
            .await
            .unwrap();

        let on_disk = std::fs::read(tenant_config_path(dir.path(), "t1")).unwrap();
        assert_eq!(content_hash(&on_disk), hash);
        assert!(suppressor.take(&hash));
    }
}
