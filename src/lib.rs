//! Clawsync - keeps a multi-tenant store in step with on-disk agent state

pub mod classifier;
pub mod cli;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod platform;
pub mod suppressor;
pub mod syncer;
pub mod watcher;

pub use error::{SyncError, SyncResult};
