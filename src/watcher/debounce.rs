//! Quiescence tracking for paths the OS reported as changed

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use super::ChangeKind;

/// Cheap fingerprint used to detect a file still being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        meta.is_file().then(|| FileStamp {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Debug)]
struct Pending {
    kind: ChangeKind,
    last_activity: Instant,
    last_stamp: Option<FileStamp>,
}

/// Collapses bursts of events per path into one, released after the file
/// has been quiet for `stability`.
#[derive(Debug)]
pub struct Debouncer {
    stability: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl Debouncer {
    pub fn new(stability: Duration) -> Self {
        Self {
            stability,
            pending: HashMap::new(),
        }
    }

    /// Note activity on `path`. A `Created` kind sticks until released.
    pub fn observe(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        self.pending
            .entry(path)
            .and_modify(|p| {
                p.last_activity = now;
                if kind == ChangeKind::Created {
                    p.kind = ChangeKind::Created;
                }
            })
            .or_insert(Pending {
                kind,
                last_activity: now,
                last_stamp: None,
            });
    }

    /// Release every path that has been stable for the window.
    ///
    /// `stat` is consulted on each poll; a fingerprint change counts as
    /// activity, and a path that no longer exists is forgotten.
    pub fn poll(
        &mut self,
        now: Instant,
        stat: impl Fn(&Path) -> Option<FileStamp>,
    ) -> Vec<(PathBuf, ChangeKind)> {
        let mut ready = Vec::new();

        self.pending.retain(|path, pending| {
            let Some(stamp) = stat(path) else {
                return false;
            };

            match pending.last_stamp {
                Some(previous) if previous != stamp => {
                    pending.last_stamp = Some(stamp);
                    pending.last_activity = now;
                    true
                }
                None => {
                    pending.last_stamp = Some(stamp);
                    true
                }
                Some(_) if now.duration_since(pending.last_activity) >= self.stability => {
                    ready.push((path.clone(), pending.kind));
                    false
                }
                Some(_) => true,
            }
        });

        ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(len: u64) -> FileStamp {
        FileStamp {
            len,
            modified: None,
        }
    }

    #[test]
    fn releases_after_stability_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();
        let path = PathBuf::from("/s/agents/t/sessions/a.jsonl");
        debouncer.observe(path.clone(), ChangeKind::Modified, start);

        // First poll only records the fingerprint
        assert!(debouncer.poll(start + Duration::from_millis(100), |_| Some(stamp(10))).is_empty());
        assert!(debouncer.poll(start + Duration::from_millis(200), |_| Some(stamp(10))).is_empty());

        let ready = debouncer.poll(start + Duration::from_millis(300), |_| Some(stamp(10)));
        assert_eq!(ready, vec![(path, ChangeKind::Modified)]);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn burst_of_events_collapses_into_one() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();
        let path = PathBuf::from("/s/a.jsonl");

        debouncer.observe(path.clone(), ChangeKind::Created, start);
        for i in 1..5 {
            debouncer.observe(
                path.clone(),
                ChangeKind::Modified,
                start + Duration::from_millis(i * 100),
            );
        }
        assert_eq!(debouncer.len(), 1);

        // Still within 300ms of the last event
        let t = start + Duration::from_millis(600);
        assert!(debouncer.poll(t, |_| Some(stamp(1))).is_empty());

        let ready = debouncer.poll(start + Duration::from_millis(700), |_| Some(stamp(1)));
        assert_eq!(ready, vec![(path, ChangeKind::Created)]);
    }

    #[test]
    fn growing_file_is_held_back() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();
        let path = PathBuf::from("/s/a.jsonl");
        debouncer.observe(path.clone(), ChangeKind::Modified, start);

        debouncer.poll(start + Duration::from_millis(100), |_| Some(stamp(1)));
        // Size changes without an OS event
        assert!(debouncer.poll(start + Duration::from_millis(400), |_| Some(stamp(2))).is_empty());
        assert!(debouncer.poll(start + Duration::from_millis(600), |_| Some(stamp(2))).is_empty());
        assert_eq!(
            debouncer.poll(start + Duration::from_millis(700), |_| Some(stamp(2))).len(),
            1
        );
    }

    #[test]
    fn vanished_file_is_dropped() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();
        debouncer.observe(PathBuf::from("/s/gone.json"), ChangeKind::Modified, start);

        assert!(debouncer.poll(start + Duration::from_secs(1), |_| None).is_empty());
        assert!(debouncer.is_empty());
    }
}
