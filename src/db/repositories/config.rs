//! Tenant config repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    enum_column, format_timestamp, json_column, optional_timestamp_column, timestamp_column,
    Database,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    Channel,
    Model,
    Tool,
    Agent,
}

impl ConfigType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Channel => "channel",
            ConfigType::Model => "model",
            ConfigType::Tool => "tool",
            ConfigType::Agent => "agent",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "channel" => Ok(ConfigType::Channel),
            "model" => Ok(ConfigType::Model),
            "tool" => Ok(ConfigType::Tool),
            "agent" => Ok(ConfigType::Agent),
            _ => anyhow::bail!("Unknown config type: {}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub tenant_id: String,
    pub config_type: ConfigType,
    pub config_key: String,
    pub config_value: serde_json::Value,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// A config entry as found in (or destined for) the agent's config file
#[derive(Debug, Clone)]
pub struct ConfigUpsert {
    pub tenant_id: String,
    pub config_type: ConfigType,
    pub config_key: String,
    pub config_value: serde_json::Value,
}

impl ConfigUpsert {
    /// `enabled` mirrors a boolean `enabled` field in the value, defaulting to true
    pub fn enabled(&self) -> bool {
        self.config_value
            .get("enabled")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true)
    }
}

pub struct ConfigRepository {
    db: Database,
}

impl ConfigRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert from filesystem state: stamps both `synced_at` and `updated_at`
    pub async fn upsert_synced(&self, upsert: &ConfigUpsert, now: DateTime<Utc>) -> Result<()> {
        let value = serde_json::to_string(&upsert.config_value)?;
        let now = format_timestamp(&now);

        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO tenant_configs (id, tenant_id, config_type, config_key, config_value, enabled, updated_at, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT (tenant_id, config_type, config_key) DO UPDATE SET
                config_value = excluded.config_value,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at,
                synced_at = excluded.synced_at",
            params![
                Uuid::new_v4().to_string(),
                upsert.tenant_id,
                upsert.config_type.as_str(),
                upsert.config_key,
                value,
                upsert.enabled(),
                now,
            ],
        )
        .with_context(|| {
            format!(
                "Failed to upsert config {}/{}/{}",
                upsert.tenant_id,
                upsert.config_type.as_str(),
                upsert.config_key
            )
        })?;

        Ok(())
    }

    /// Upsert issued by the platform's configuration API: `synced_at` is left alone
    pub async fn apply_platform_update(&self, upsert: &ConfigUpsert) -> Result<()> {
        let value = serde_json::to_string(&upsert.config_value)?;
        let now = format_timestamp(&Utc::now());

        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO tenant_configs (id, tenant_id, config_type, config_key, config_value, enabled, updated_at, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)
             ON CONFLICT (tenant_id, config_type, config_key) DO UPDATE SET
                config_value = excluded.config_value,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                upsert.tenant_id,
                upsert.config_type.as_str(),
                upsert.config_key,
                value,
                upsert.enabled(),
                now,
            ],
        )
        .context("Failed to apply platform config update")?;

        tracing::debug!(
            "Platform updated config {}/{}/{}",
            upsert.tenant_id,
            upsert.config_type.as_str(),
            upsert.config_key
        );
        Ok(())
    }

    pub async fn get(
        &self,
        tenant_id: &str,
        config_type: ConfigType,
        config_key: &str,
    ) -> Result<Option<ConfigRecord>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT tenant_id, config_type, config_key, config_value, enabled, updated_at, synced_at
             FROM tenant_configs WHERE tenant_id = ?1 AND config_type = ?2 AND config_key = ?3",
        )?;

        stmt.query_row(
            params![tenant_id, config_type.as_str(), config_key],
            Self::map_row,
        )
        .optional()
        .context("Failed to get config")
    }

    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<ConfigRecord>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(
            "SELECT tenant_id, config_type, config_key, config_value, enabled, updated_at, synced_at
             FROM tenant_configs WHERE tenant_id = ?1
             ORDER BY config_type, config_key",
        )?;

        let configs = stmt
            .query_map(params![tenant_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to collect configs")?;

        Ok(configs)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<ConfigRecord> {
        Ok(ConfigRecord {
            tenant_id: row.get(0)?,
            config_type: enum_column(row, 1, ConfigType::from_str)?,
            config_key: row.get(2)?,
            config_value: json_column(row, 3)?,
            enabled: row.get(4)?,
            updated_at: timestamp_column(row, 5)?,
            synced_at: optional_timestamp_column(row, 6)?,
        })
    }
}
