//! Syncers project one settled file into store records

pub mod config;
pub mod session_index;
pub mod session_log;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::RecordKind;
use crate::db::SyncStore;
use crate::error::{SyncError, SyncResult};

pub use config::{ConfigReport, ConfigSyncer};
pub use session_index::{IndexReport, SessionIndexSyncer};
pub use session_log::{LogReport, SessionLogSyncer};

/// Default bound on a single store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handles every syncer needs
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn SyncStore>,
    pub store_timeout: Duration,
}

impl SyncContext {
    pub fn new(store: Arc<dyn SyncStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Run a store call under the configured timeout
    pub(crate) async fn bounded<T>(
        &self,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> SyncResult<T> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(SyncError::Store),
            Err(_) => Err(SyncError::Timeout(self.store_timeout)),
        }
    }
}

/// What a single sync pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    SessionLog(LogReport),
    SessionIndex(IndexReport),
    Config(ConfigReport),
}

/// The three syncers behind one dispatch point
#[derive(Clone)]
pub struct Syncers {
    session_log: SessionLogSyncer,
    session_index: SessionIndexSyncer,
    config: ConfigSyncer,
}

impl Syncers {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            session_log: SessionLogSyncer::new(ctx.clone()),
            session_index: SessionIndexSyncer::new(ctx.clone()),
            config: ConfigSyncer::new(ctx),
        }
    }

    /// Sync `contents` (the settled bytes of `path`) for `tenant_id`.
    ///
    /// Returns `Ok(None)` for kinds no syncer handles.
    pub async fn sync(
        &self,
        tenant_id: &str,
        kind: RecordKind,
        path: &Path,
        contents: &[u8],
    ) -> SyncResult<Option<SyncReport>> {
        let report = match kind {
            RecordKind::SessionLog => SyncReport::SessionLog(
                self.session_log
                    .sync_contents(tenant_id, path, contents)
                    .await?,
            ),
            RecordKind::SessionIndex => SyncReport::SessionIndex(
                self.session_index
                    .sync_contents(tenant_id, path, contents)
                    .await?,
            ),
            RecordKind::Config => {
                SyncReport::Config(self.config.sync_contents(tenant_id, path, contents).await?)
            }
            RecordKind::Unrecognized => return Ok(None),
        };
        Ok(Some(report))
    }
}

pub(crate) async fn read_file(path: &Path) -> SyncResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| SyncError::io(path, e))
}
