//! Maps a changed path to the tenant and record kind it feeds

use std::path::{Component, Path, PathBuf};

/// Directory under the state root that holds one subdirectory per tenant
pub const AGENTS_DIR: &str = "agents";
pub const SESSIONS_DIR: &str = "sessions";
pub const SESSION_INDEX_FILE: &str = "sessions.json";
pub const CONFIG_FILE: &str = "openclaw.json";
pub const SESSION_LOG_EXTENSION: &str = "jsonl";

/// Which syncer a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    SessionLog,
    SessionIndex,
    Config,
    Unrecognized,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::SessionLog => "session_log",
            RecordKind::SessionIndex => "session_index",
            RecordKind::Config => "config",
            RecordKind::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// `None` when the path does not follow `agents/<tenant>/...`
    pub tenant_id: Option<String>,
    pub kind: RecordKind,
}

/// Classify `path`, interpreting it relative to `root` when it lies beneath it.
///
/// The tenant is the segment right after the first `agents` segment, and
/// something must follow it. The kind is decided by the file name alone.
pub fn classify(root: &Path, path: &Path) -> Classification {
    let relative = path.strip_prefix(root).unwrap_or(path);

    Classification {
        tenant_id: tenant_of(relative),
        kind: kind_of(relative),
    }
}

fn tenant_of(path: &Path) -> Option<String> {
    let segments: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    segments
        .windows(3)
        .find(|w| w[0] == AGENTS_DIR)
        .map(|w| w[1].to_string())
}

fn kind_of(path: &Path) -> RecordKind {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return RecordKind::Unrecognized;
    };

    if path.extension().and_then(|e| e.to_str()) == Some(SESSION_LOG_EXTENSION) {
        RecordKind::SessionLog
    } else if name == SESSION_INDEX_FILE {
        RecordKind::SessionIndex
    } else if name == CONFIG_FILE {
        RecordKind::Config
    } else {
        RecordKind::Unrecognized
    }
}

/// Session id of a session log: the file stem
pub fn session_id_of(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `<root>/agents/<tenant>`
pub fn tenant_dir(root: &Path, tenant_id: &str) -> PathBuf {
    root.join(AGENTS_DIR).join(tenant_id)
}

/// `<root>/agents/<tenant>/openclaw.json`
pub fn tenant_config_path(root: &Path, tenant_id: &str) -> PathBuf {
    tenant_dir(root, tenant_id).join(CONFIG_FILE)
}

/// Glob patterns, relative to the state root, of every file the engine ingests
pub fn default_patterns() -> Vec<String> {
    vec![
        format!("{AGENTS_DIR}/*/{SESSIONS_DIR}/*.{SESSION_LOG_EXTENSION}"),
        format!("{AGENTS_DIR}/*/{SESSIONS_DIR}/{SESSION_INDEX_FILE}"),
        format!("{AGENTS_DIR}/*/{CONFIG_FILE}"),
    ]
}
