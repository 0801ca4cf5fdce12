//! SQL schema definitions

pub const SCHEMA: &str = r#"
-- Sessions table, one row per (tenant, session)
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    channel TEXT,
    started_at TEXT,
    last_message_at TEXT,
    message_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT,
    UNIQUE (tenant_id, session_id)
);

-- Messages table, deduplicated by physical line position in the session log
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    line_index INTEGER NOT NULL,
    line_hash TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
    content TEXT,
    token_count INTEGER,
    created_at TEXT NOT NULL,
    metadata TEXT,
    UNIQUE (tenant_id, session_id, line_index),
    FOREIGN KEY (tenant_id, session_id) REFERENCES sessions(tenant_id, session_id)
);

-- Tenant configs table, written by both the sync engine and the platform
CREATE TABLE IF NOT EXISTS tenant_configs (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    config_type TEXT NOT NULL CHECK (config_type IN ('channel', 'model', 'tool', 'agent')),
    config_key TEXT NOT NULL,
    config_value TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL,
    synced_at TEXT,
    UNIQUE (tenant_id, config_type, config_key)
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_sessions_tenant_id ON sessions(tenant_id);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(tenant_id, session_id);
CREATE INDEX IF NOT EXISTS idx_tenant_configs_tenant_id ON tenant_configs(tenant_id);
"#;
