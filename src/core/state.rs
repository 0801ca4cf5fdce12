//! Application state

use std::sync::Arc;

use anyhow::Result;

use crate::classifier::default_patterns;
use crate::config::Settings;
use crate::core::engine::SyncEngine;
use crate::db::{Database, SqliteStore};
use crate::suppressor::LoopSuppressor;
use crate::syncer::SyncContext;
use crate::watcher::{PathWatcher, WatchOptions};

pub struct AppState {
    pub settings: Settings,
    pub store: Arc<SqliteStore>,
    pub suppressor: Arc<LoopSuppressor>,
}

impl AppState {
    /// Open the database and build the shared components from settings
    pub fn open(settings: Settings) -> Result<Self> {
        let db = Database::new(settings.resolve_db_path()?)?;
        let store = Arc::new(SqliteStore::new(db));
        let suppressor = Arc::new(LoopSuppressor::new(settings.suppression_window()));

        Ok(Self {
            settings,
            store,
            suppressor,
        })
    }

    pub fn engine(&self) -> Result<SyncEngine> {
        let ctx = SyncContext::new(self.store.clone(), self.settings.store_timeout());
        Ok(SyncEngine::new(
            self.settings.resolve_state_dir()?,
            ctx,
            self.suppressor.clone(),
        ))
    }

    pub fn watcher(&self) -> Result<PathWatcher> {
        let mut options = WatchOptions::new(self.settings.resolve_state_dir()?, default_patterns());
        options.stability = self.settings.watcher.stability();
        options.poll_interval = self.settings.watcher.poll_interval();
        options.retry_interval = self.settings.watcher.retry_interval();
        Ok(PathWatcher::new(options)?)
    }
}
