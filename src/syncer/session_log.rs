//! Session log syncer
//!
//! A session log is `agents/<tenant>/sessions/<session>.jsonl`, one message
//! object per line. Every change triggers a full re-scan; messages are keyed
//! by their line index so re-scanning an unchanged file writes nothing.

use std::path::Path;

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{read_file, SyncContext};
use crate::classifier::session_id_of;
use crate::db::repositories::message::{MessageRecord, Role, UpsertOutcome};
use crate::db::repositories::session::SessionUpsert;
use crate::error::{SyncError, SyncResult};
use crate::suppressor::content_hash;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogReport {
    pub session_id: String,
    /// Whether this pass created the session row
    pub created: bool,
    /// Lines ingested successfully in this pass
    pub processed: u32,
    /// Malformed lines and lines the store rejected
    pub skipped: u32,
    pub inserted: u32,
    pub updated: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogLine {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    token_count: Option<i64>,
    #[serde(default)]
    metadata: Option<Value>,
}

/// Result of parsing a whole log, before touching the store
#[derive(Debug, Default)]
pub struct ParsedLog {
    pub messages: Vec<MessageRecord>,
    /// (line index, reason) for every malformed line
    pub rejected: Vec<(u32, String)>,
}

/// Parse every non-blank line of a session log
pub fn parse_log(tenant_id: &str, session_id: &str, contents: &[u8]) -> ParsedLog {
    let mut parsed = ParsedLog::default();

    for (index, raw) in contents.split(|b| *b == b'\n').enumerate() {
        let index = index as u32;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match parse_line(raw) {
            Ok(line) => parsed.messages.push(MessageRecord {
                tenant_id: tenant_id.to_string(),
                session_id: session_id.to_string(),
                line_index: index,
                line_hash: content_hash(raw),
                role: line.role,
                content: line.content,
                token_count: line.token_count,
                created_at: line.created_at,
                metadata: line.metadata,
            }),
            Err(reason) => parsed.rejected.push((index, reason)),
        }
    }

    parsed
}

struct ParsedLine {
    role: Role,
    content: Option<String>,
    token_count: Option<i64>,
    created_at: DateTime<Utc>,
    metadata: Option<Value>,
}

fn parse_line(raw: &[u8]) -> Result<ParsedLine, String> {
    let line: LogLine = serde_json::from_slice(raw).map_err(|e| e.to_string())?;

    // The agent omits the role on plain user turns
    let role = match line.role.as_deref() {
        None => Role::User,
        Some(r) => Role::from_str(r).map_err(|e| e.to_string())?,
    };

    let created_at = line
        .timestamp
        .as_ref()
        .ok_or_else(|| "missing timestamp".to_string())
        .and_then(parse_entry_timestamp)?;

    let content = match line.content {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };

    Ok(ParsedLine {
        role,
        content,
        token_count: line.token_count,
        created_at,
        metadata: line.metadata.filter(|m| !m.is_null()),
    })
}

/// RFC 3339 strings or epoch milliseconds, limited to years 0000 through 9999
pub(crate) fn parse_entry_timestamp(value: &Value) -> Result<DateTime<Utc>, String> {
    let ts = match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("invalid timestamp {s:?}: {e}"))?,
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| format!("invalid timestamp {n}"))?,
        other => return Err(format!("invalid timestamp {other}")),
    };

    if !(0..=9999).contains(&ts.year()) {
        return Err(format!("timestamp {value} is out of range"));
    }
    Ok(ts)
}

#[derive(Clone)]
pub struct SessionLogSyncer {
    ctx: SyncContext,
}

impl SessionLogSyncer {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Read `path` and sync it
    pub async fn sync_file(&self, tenant_id: &str, path: &Path) -> SyncResult<LogReport> {
        let contents = read_file(path).await?;
        self.sync_contents(tenant_id, path, &contents).await
    }

    /// Sync an already-read session log
    pub async fn sync_contents(
        &self,
        tenant_id: &str,
        path: &Path,
        contents: &[u8],
    ) -> SyncResult<LogReport> {
        let session_id = session_id_of(path).ok_or_else(|| SyncError::Malformed {
            path: path.to_path_buf(),
            reason: "session log has no file stem".to_string(),
        })?;

        let parsed = parse_log(tenant_id, &session_id, contents);
        for (index, reason) in &parsed.rejected {
            warn!(
                "Skipping malformed line {} in {:?}: {}",
                index + 1,
                path,
                reason
            );
        }

        let mut report = LogReport {
            session_id: session_id.clone(),
            skipped: parsed.rejected.len() as u32,
            ..Default::default()
        };

        let store = &self.ctx.store;
        let exists = self
            .ctx
            .bounded(store.session_exists(tenant_id, &session_id))
            .await?;

        if !exists {
            let mut upsert = SessionUpsert::new(tenant_id, &session_id);
            upsert.started_at = parsed.messages.iter().map(|m| m.created_at).min();
            self.ctx.bounded(store.upsert_session(&upsert)).await?;
            report.created = true;
            info!("Created session {}/{} from log", tenant_id, session_id);
        }

        let mut first_at: Option<DateTime<Utc>> = None;
        let mut last_at: Option<DateTime<Utc>> = None;

        for message in &parsed.messages {
            match self.ctx.bounded(store.upsert_message(message)).await {
                Ok(outcome) => {
                    report.processed += 1;
                    match outcome {
                        UpsertOutcome::Inserted => report.inserted += 1,
                        UpsertOutcome::Updated => report.updated += 1,
                        UpsertOutcome::Unchanged => {}
                    }
                    let ts = message.created_at;
                    first_at = Some(first_at.map_or(ts, |f| f.min(ts)));
                    last_at = Some(last_at.map_or(ts, |l| l.max(ts)));
                }
                Err(e @ SyncError::Timeout(_)) => return Err(e),
                Err(e) => {
                    report.skipped += 1;
                    warn!(
                        "Failed to ingest line {} of {:?}: {}",
                        message.line_index + 1,
                        path,
                        e
                    );
                }
            }
        }

        self.ctx
            .bounded(store.record_session_pass(
                tenant_id,
                &session_id,
                report.processed,
                first_at,
                last_at,
            ))
            .await?;

        debug!(
            "Session {}/{}: {} processed, {} new, {} skipped",
            tenant_id, session_id, report.processed, report.inserted, report.skipped
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_well_formed_lines() {
        let log = concat!(
            r#"{"role":"user","content":"hi","timestamp":"2024-01-01T00:00:00Z"}"#,
            "\n",
            r#"{"role":"assistant","content":"hello","timestamp":"2024-01-01T00:00:05Z","tokenCount":12}"#,
            "\n"
        );
        let parsed = parse_log("t1", "s1", log.as_bytes());

        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[1].role, Role::Assistant);
        assert_eq!(parsed.messages[1].token_count, Some(12));
        assert_eq!(parsed.messages[1].line_index, 1);
    }

    #[test]
    fn truncated_line_is_rejected_not_fatal() {
        let log = concat!(
            r#"{"role":"user","content":"a","timestamp":"2024-01-01T00:00:00Z"}"#,
            "\n",
            r#"{"role":"assistant","content":"b","timest"#,
            "\n",
            r#"{"role":"user","content":"c","timestamp":"2024-01-01T00:01:00Z"}"#,
        );
        let parsed = parse_log("t1", "s1", log.as_bytes());

        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.rejected.len(), 1);
        assert_eq!(parsed.rejected[0].0, 1);
        assert_eq!(parsed.messages[1].line_index, 2);
    }

    #[test]
    fn blank_lines_keep_line_indices_stable() {
        let log = "\n\r\n{\"content\":\"x\",\"timestamp\":1704067200000}\r\n";
        let parsed = parse_log("t1", "s1", log.as_bytes());

        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].line_index, 2);
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(
            parsed.messages[0].created_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_timestamp_and_unknown_role_are_malformed() {
        let log = concat!(
            r#"{"role":"user","content":"no time"}"#,
            "\n",
            r#"{"role":"tool","content":"x","timestamp":"2024-01-01T00:00:00Z"}"#,
        );
        let parsed = parse_log("t1", "s1", log.as_bytes());

        assert!(parsed.messages.is_empty());
        assert_eq!(parsed.rejected.len(), 2);
    }

    #[test]
    fn timestamps_past_year_9999_are_malformed() {
        let log = concat!(
            r#"{"role":"user","content":"ok","timestamp":"2024-01-01T00:00:00Z"}"#,
            "\n",
            r#"{"role":"user","content":"far","timestamp":253402300800000}"#,
            "\n",
            r#"{"role":"user","content":"last","timestamp":253402300799999}"#,
        );
        let parsed = parse_log("t1", "s1", log.as_bytes());

        assert_eq!(parsed.rejected.len(), 1);
        assert_eq!(parsed.rejected[0].0, 1);
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[1].created_at.year(), 9999);
        assert!(parse_entry_timestamp(&serde_json::json!(-62167219200001i64)).is_err());
    }

    #[test]
    fn structured_content_is_kept_as_json_text() {
        let log = r#"{"role":"assistant","content":[{"type":"text","text":"hi"}],"timestamp":"2024-01-01T00:00:00Z"}"#;
        let parsed = parse_log("t1", "s1", log.as_bytes());

        assert_eq!(
            parsed.messages[0].content.as_deref(),
            Some(r#"[{"type":"text","text":"hi"}]"#)
        );
    }

    #[test]
    fn identical_lines_hash_identically() {
        let line = r#"{"role":"user","content":"same","timestamp":"2024-01-01T00:00:00Z"}"#;
        let log = format!("{line}\n{line}\n");
        let parsed = parse_log("t1", "s1", log.as_bytes());

        assert_eq!(parsed.messages[0].line_hash, parsed.messages[1].line_hash);
        assert_ne!(parsed.messages[0].line_index, parsed.messages[1].line_index);
    }
}
