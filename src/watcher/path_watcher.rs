//! Recursive filesystem watch over the agent state directory

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use notify::event::ModifyKind;
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::debounce::{Debouncer, FileStamp};
use super::{ChangeKind, FileChange, WatchOptions};
use crate::error::SyncResult;

/// Deepest pattern is `agents/<tenant>/sessions/<file>`
const SCAN_DEPTH: usize = 4;

pub struct PathWatcher {
    options: WatchOptions,
    patterns: GlobSet,
}

impl PathWatcher {
    pub fn new(options: WatchOptions) -> SyncResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &options.patterns {
            // `*` must not cross directory boundaries
            builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
        }

        Ok(Self {
            patterns: builder.build()?,
            options,
        })
    }

    pub fn root(&self) -> &Path {
        &self.options.root
    }

    /// Whether `path` falls under one of the watch patterns
    pub fn matches(&self, path: &Path) -> bool {
        self.relative(path)
            .map(|rel| self.patterns.is_match(rel))
            .unwrap_or(false)
    }

    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        if let Ok(rel) = path.strip_prefix(&self.options.root) {
            return Some(rel);
        }
        // Some backends report canonical paths
        let canonical = self.options.root.canonicalize().ok()?;
        path.strip_prefix(canonical).ok()
    }

    /// Every existing file that matches the patterns, in path order
    pub fn scan(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.options.root)
            .max_depth(SCAN_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.matches(path))
            .collect()
    }

    /// Read every matching file once, as `Created` changes
    pub async fn snapshot(&self) -> Vec<FileChange> {
        let mut changes = Vec::new();
        for path in self.scan() {
            match tokio::fs::read(&path).await {
                Ok(contents) => changes.push(FileChange {
                    path,
                    kind: ChangeKind::Created,
                    contents,
                }),
                Err(e) => warn!("Failed to read {:?}: {}", path, e),
            }
        }
        changes
    }

    /// Start watching on a background task until `token` is cancelled
    pub fn spawn(self, tx: mpsc::Sender<FileChange>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(tx, token).await })
    }

    async fn run(self, tx: mpsc::Sender<FileChange>, token: CancellationToken) {
        info!("Watching {:?} for {:?}", self.options.root, self.options.patterns);

        while !token.is_cancelled() {
            match self.observe(&tx, &token).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        "Watcher on {:?} unavailable: {:#}; retrying in {:?}",
                        self.options.root, e, self.options.retry_interval
                    );
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(self.options.retry_interval) => {}
                    }
                }
            }
        }

        info!("Path watcher stopped");
    }

    /// One watch session. Returns `Ok` on shutdown, `Err` when the watch
    /// must be re-established.
    async fn observe(
        &self,
        tx: &mpsc::Sender<FileChange>,
        token: &CancellationToken,
    ) -> Result<()> {
        let root = &self.options.root;
        if !root.is_dir() {
            anyhow::bail!("{:?} is not a directory", root);
        }

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = raw_tx.send(res);
        })
        .context("Failed to create filesystem watcher")?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {:?}", root))?;

        let mut debouncer = Debouncer::new(self.options.stability);

        // Pick up whatever was written while we were not watching
        let now = Instant::now();
        for path in self.scan() {
            debouncer.observe(path, ChangeKind::Created, now);
        }
        debug!("Initial scan queued {} files", debouncer.len());

        let mut ticker = interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                event = raw_rx.recv() => match event {
                    Some(Ok(event)) => {
                        if let Some(kind) = change_kind(&event.kind) {
                            let now = Instant::now();
                            for path in event.paths {
                                if self.matches(&path) {
                                    debouncer.observe(path, kind, now);
                                }
                            }
                        }
                    }
                    Some(Err(e)) => warn!("Watch error on {:?}: {}", root, e),
                    None => anyhow::bail!("watch channel closed"),
                },
                _ = ticker.tick() => {
                    for (path, kind) in debouncer.poll(Instant::now(), FileStamp::of) {
                        match tokio::fs::read(&path).await {
                            Ok(contents) => {
                                debug!("Settled {:?} ({:?})", path, kind);
                                if tx.send(FileChange { path, kind, contents }).await.is_err() {
                                    // Pipeline is gone, nothing left to feed
                                    return Ok(());
                                }
                            }
                            Err(e) => debug!("{:?} vanished before it could be read: {}", path, e),
                        }
                    }

                    if !root.is_dir() {
                        anyhow::bail!("{:?} disappeared", root);
                    }
                }
            }
        }
    }
}

/// Deletions, access and metadata-only events carry no new content
fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        _ => None,
    }
}
