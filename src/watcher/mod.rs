//! Path watching: OS notifications, debounced into settled file changes

pub mod debounce;
pub mod path_watcher;

use std::path::PathBuf;
use std::time::Duration;

pub use debounce::Debouncer;
pub use path_watcher::PathWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
}

/// A file that stopped changing, with the bytes it settled on
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub contents: Vec<u8>,
}

/// What to watch and how patiently
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub root: PathBuf,
    /// Globs relative to `root`
    pub patterns: Vec<String>,
    /// Quiet time required before a change is released
    pub stability: Duration,
    pub poll_interval: Duration,
    /// Delay before re-establishing a failed watch
    pub retry_interval: Duration,
}

impl WatchOptions {
    pub fn new(root: impl Into<PathBuf>, patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            patterns,
            stability: Duration::from_millis(300),
            poll_interval: Duration::from_millis(100),
            retry_interval: Duration::from_secs(2),
        }
    }
}
