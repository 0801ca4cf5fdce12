//! Database connection management
//!
//! NOTE: This implementation uses synchronous rusqlite with tokio::Mutex.
//! Every store call made by the syncers is wrapped in a timeout, so a slow
//! statement holding the lock surfaces as a dropped event rather than a stall.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::schema::SCHEMA;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl Database {
    /// Open (or create) the database and apply the schema
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        // WAL lets the dashboard read while we write
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;

        info!("Database initialized at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Get a locked connection
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Get the database path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if database is accessible
    pub async fn health_check(&self) -> Result<bool> {
        let conn = self.lock().await;
        match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Database health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            path: self.path.clone(),
        }
    }
}
