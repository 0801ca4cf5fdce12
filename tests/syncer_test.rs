// Tests for the session log, session index and config syncers

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use clawsync::db::repositories::config::ConfigType;
use clawsync::db::{Database, SqliteStore};
use clawsync::syncer::{ConfigSyncer, SessionIndexSyncer, SessionLogSyncer, SyncContext};
use clawsync::SyncError;
use serde_json::json;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    store: Arc<SqliteStore>,
    ctx: SyncContext,
}

fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let db = Database::new(dir.path().join("store.db")).unwrap();
    let store = Arc::new(SqliteStore::new(db));
    let ctx = SyncContext::new(store.clone(), Duration::from_secs(5));
    Fixture { dir, store, ctx }
}

fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

const LOG: &str = concat!(
    r#"{"role":"user","content":"hi","timestamp":"2024-01-01T10:00:00Z"}"#,
    "\n",
    r#"{"role":"assistant","content":"hello","timestamp":"2024-01-01T10:00:03Z","tokenCount":5}"#,
    "\n",
    r#"{"role":"user","content":"bye","timestamp":"2024-01-01T10:01:00Z"}"#,
    "\n",
);

#[tokio::test]
async fn test_log_pass_counts_messages_and_tracks_last_timestamp() {
    let f = setup();
    let path = write(f.dir.path(), "agents/t1/sessions/s1.jsonl", LOG);

    let report = SessionLogSyncer::new(f.ctx.clone())
        .sync_file("t1", &path)
        .await
        .unwrap();
    assert!(report.created);
    assert_eq!(report.processed, 3);
    assert_eq!(report.inserted, 3);

    let session = f.store.sessions().get("t1", "s1").await.unwrap().unwrap();
    assert_eq!(session.message_count, 3);
    assert_eq!(
        session.last_message_at,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 1, 0).unwrap())
    );
    assert_eq!(
        session.started_at,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_rescan_of_unchanged_log_is_idempotent() {
    let f = setup();
    let path = write(f.dir.path(), "agents/t1/sessions/s1.jsonl", LOG);
    let syncer = SessionLogSyncer::new(f.ctx.clone());

    syncer.sync_file("t1", &path).await.unwrap();
    let second = syncer.sync_file("t1", &path).await.unwrap();

    assert!(!second.created);
    assert_eq!(second.processed, 3);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 0);

    let session = f.store.sessions().get("t1", "s1").await.unwrap().unwrap();
    assert_eq!(session.message_count, 3);
    assert_eq!(f.store.messages().count_for_session("t1", "s1").await.unwrap(), 3);
}

#[tokio::test]
async fn test_appended_lines_are_added_once() {
    let f = setup();
    let path = write(f.dir.path(), "agents/t1/sessions/s1.jsonl", LOG);
    let syncer = SessionLogSyncer::new(f.ctx.clone());
    syncer.sync_file("t1", &path).await.unwrap();

    let appended = format!(
        "{LOG}{}\n",
        r#"{"role":"assistant","content":"later","timestamp":"2024-01-01T11:00:00Z"}"#
    );
    fs::write(&path, appended).unwrap();
    let report = syncer.sync_file("t1", &path).await.unwrap();

    assert_eq!(report.inserted, 1);
    let session = f.store.sessions().get("t1", "s1").await.unwrap().unwrap();
    assert_eq!(session.message_count, 4);
    assert_eq!(
        session.last_message_at,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_malformed_line_is_skipped() {
    let f = setup();
    let contents = concat!(
        r#"{"role":"user","content":"one","timestamp":"2024-01-01T10:00:00Z"}"#,
        "\n",
        r#"{"role":"assistant","content":"tw"#,
        "\n",
        r#"{"role":"user","content":"three","timestamp":"2024-01-01T10:02:00Z"}"#,
        "\n",
    );
    let path = write(f.dir.path(), "agents/t1/sessions/s1.jsonl", contents);

    let report = SessionLogSyncer::new(f.ctx.clone())
        .sync_file("t1", &path)
        .await
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);

    let messages = f.store.messages().list_for_session("t1", "s1").await.unwrap();
    let contents: Vec<_> = messages.iter().filter_map(|m| m.content.as_deref()).collect();
    assert_eq!(contents, vec!["one", "three"]);
}

#[tokio::test]
async fn test_out_of_range_timestamp_is_skipped_not_stored() {
    let f = setup();
    let contents = concat!(
        r#"{"role":"user","content":"now","timestamp":"2024-01-01T00:00:00Z"}"#,
        "\n",
        r#"{"role":"user","content":"far","timestamp":253402300800000}"#,
        "\n",
    );
    let path = write(f.dir.path(), "agents/t1/sessions/s1.jsonl", contents);

    let report = SessionLogSyncer::new(f.ctx.clone())
        .sync_file("t1", &path)
        .await
        .unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 1);

    let messages = f.store.messages().list_for_session("t1", "s1").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].created_at,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );

    let session = f.store.sessions().get("t1", "s1").await.unwrap().unwrap();
    assert_eq!(
        session.last_message_at,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_empty_log_creates_session_without_messages() {
    let f = setup();
    let path = write(f.dir.path(), "agents/t1/sessions/empty.jsonl", "");

    let report = SessionLogSyncer::new(f.ctx.clone())
        .sync_file("t1", &path)
        .await
        .unwrap();
    assert!(report.created);

    let session = f.store.sessions().get("t1", "empty").await.unwrap().unwrap();
    assert_eq!(session.message_count, 0);
    assert_eq!(session.last_message_at, None);
}

#[tokio::test]
async fn test_session_index_creates_session() {
    let f = setup();
    let path = write(
        f.dir.path(),
        "agents/T/sessions/sessions.json",
        r#"{"s1": {"channel": "telegram", "updatedAt": "2024-01-01T00:00:00Z"}}"#,
    );

    let report = SessionIndexSyncer::new(f.ctx.clone())
        .sync_file("T", &path)
        .await
        .unwrap();
    assert_eq!(report.upserted, 1);

    let session = f.store.sessions().get("T", "s1").await.unwrap().unwrap();
    assert_eq!(session.tenant_id, "T");
    assert_eq!(session.session_id, "s1");
    assert_eq!(session.channel.as_deref(), Some("telegram"));
    assert_eq!(
        session.last_message_at,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_malformed_index_aborts_whole_sync() {
    let f = setup();
    let path = write(
        f.dir.path(),
        "agents/T/sessions/sessions.json",
        r#"{"s1": {"channel": "telegram"}, "s2": {"chan"#,
    );

    let err = SessionIndexSyncer::new(f.ctx.clone())
        .sync_file("T", &path)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Json { .. }));
    assert!(f.store.sessions().list_for_tenant("T").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_index_entry_that_is_not_an_object_is_skipped() {
    let f = setup();
    let path = write(
        f.dir.path(),
        "agents/T/sessions/sessions.json",
        r#"{"s1": "broken", "s2": {"channel": "whatsapp"}}"#,
    );

    let report = SessionIndexSyncer::new(f.ctx.clone())
        .sync_file("T", &path)
        .await
        .unwrap();
    assert_eq!(report.upserted, 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_started_at_first_writer_wins_across_syncers() {
    let f = setup();
    let index = write(
        f.dir.path(),
        "agents/T/sessions/sessions.json",
        r#"{"s1": {"startedAt": "2023-12-31T00:00:00Z"}}"#,
    );
    let log = write(f.dir.path(), "agents/T/sessions/s1.jsonl", LOG);

    SessionIndexSyncer::new(f.ctx.clone())
        .sync_file("T", &index)
        .await
        .unwrap();
    let report = SessionLogSyncer::new(f.ctx.clone())
        .sync_file("T", &log)
        .await
        .unwrap();
    assert!(!report.created);

    let session = f.store.sessions().get("T", "s1").await.unwrap().unwrap();
    assert_eq!(
        session.started_at,
        Some(Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap())
    );
    assert_eq!(session.message_count, 3);

    // The log created s2 first; a later index startedAt does not replace it
    let log2 = write(f.dir.path(), "agents/T/sessions/s2.jsonl", LOG);
    SessionLogSyncer::new(f.ctx.clone())
        .sync_file("T", &log2)
        .await
        .unwrap();
    fs::write(&index, r#"{"s2": {"startedAt": "2020-01-01T00:00:00Z"}}"#).unwrap();
    SessionIndexSyncer::new(f.ctx.clone())
        .sync_file("T", &index)
        .await
        .unwrap();

    let s2 = f.store.sessions().get("T", "s2").await.unwrap().unwrap();
    assert_eq!(
        s2.started_at,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_config_sync_upserts_channel() {
    let f = setup();
    let path = write(
        f.dir.path(),
        "agents/T/openclaw.json",
        r#"{"channels": {"telegram": {"enabled": true, "botToken": "abc"}}}"#,
    );

    let report = ConfigSyncer::new(f.ctx.clone())
        .sync_file("T", &path)
        .await
        .unwrap();
    assert_eq!(report.upserted, 1);

    let record = f
        .store
        .configs()
        .get("T", ConfigType::Channel, "telegram")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.config_value, json!({ "enabled": true, "botToken": "abc" }));
    assert!(record.enabled);
    assert!(record.synced_at.is_some());
}

#[tokio::test]
async fn test_config_resync_updates_in_place() {
    let f = setup();
    let syncer = ConfigSyncer::new(f.ctx.clone());
    let path = write(
        f.dir.path(),
        "agents/T/openclaw.json",
        r#"{"tools": {"browser": {"enabled": true}}, "agents": {"default": {"model": "main"}}}"#,
    );
    syncer.sync_file("T", &path).await.unwrap();

    fs::write(&path, r#"{"tools": {"browser": {"enabled": false}}}"#).unwrap();
    syncer.sync_file("T", &path).await.unwrap();

    let records = f.store.configs().list_for_tenant("T").await.unwrap();
    assert_eq!(records.len(), 2);
    let browser = records
        .iter()
        .find(|r| r.config_type == ConfigType::Tool)
        .unwrap();
    assert!(!browser.enabled);
}

#[tokio::test]
async fn test_malformed_config_is_rejected() {
    let f = setup();
    let path = write(f.dir.path(), "agents/T/openclaw.json", "[1, 2, 3]");

    let err = ConfigSyncer::new(f.ctx.clone())
        .sync_file("T", &path)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Malformed { .. }));
}

#[tokio::test]
async fn test_missing_file_is_transient() {
    let f = setup();
    let err = ConfigSyncer::new(f.ctx.clone())
        .sync_file("T", &f.dir.path().join("agents/T/openclaw.json"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
