//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Client groups (one per browser profile / device group)
CREATE TABLE IF NOT EXISTS replicache_client_group (
    id TEXT PRIMARY KEY,
    -- Actor bound at creation, JSON
    actor TEXT NOT NULL,
    cvr_version INTEGER NOT NULL DEFAULT 0,
    client_version INTEGER NOT NULL DEFAULT 0,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

-- Clients, written by the push path
CREATE TABLE IF NOT EXISTS replicache_client (
    id TEXT PRIMARY KEY,
    client_group_id TEXT NOT NULL,
    mutation_id INTEGER NOT NULL DEFAULT 0,
    client_version INTEGER NOT NULL DEFAULT 0,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_client_group_version
    ON replicache_client(client_group_id, client_version);

-- Client view records, one row per (group, version)
CREATE TABLE IF NOT EXISTS replicache_cvr (
    client_group_id TEXT NOT NULL,
    id INTEGER NOT NULL,
    -- JSON object: sync key -> row version (epoch ms)
    data TEXT NOT NULL,
    client_version INTEGER NOT NULL DEFAULT 0,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),

    PRIMARY KEY (client_group_id, id)
);

-- Synced tables

CREATE TABLE IF NOT EXISTS workspace (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_deleted TEXT
);

CREATE TABLE IF NOT EXISTS user (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    email TEXT NOT NULL,
    time_seen TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_deleted TEXT
);

CREATE INDEX IF NOT EXISTS idx_user_workspace ON user(workspace_id);
CREATE INDEX IF NOT EXISTS idx_user_email ON user(email);

CREATE TABLE IF NOT EXISTS aws_account (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    account_id TEXT NOT NULL,
    time_failed TEXT,
    time_discovered TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_aws_account_workspace ON aws_account(workspace_id);

CREATE TABLE IF NOT EXISTS app (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    name TEXT NOT NULL,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_app_workspace ON app(workspace_id);

CREATE TABLE IF NOT EXISTS stage (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    aws_account_id TEXT NOT NULL,
    region TEXT NOT NULL,
    name TEXT NOT NULL,
    unsupported INTEGER,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_stage_workspace ON stage(workspace_id);

CREATE TABLE IF NOT EXISTS resource (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    type TEXT NOT NULL,
    stack_id TEXT NOT NULL,
    cfn_id TEXT NOT NULL,
    construct_id TEXT,
    -- JSON blobs
    metadata TEXT,
    enrichment TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_resource_workspace ON resource(workspace_id);

CREATE TABLE IF NOT EXISTS issue (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    error TEXT NOT NULL,
    message TEXT NOT NULL,
    error_id TEXT,
    time_seen TEXT,
    time_resolved TEXT,
    time_ignored TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_deleted TEXT
);

CREATE INDEX IF NOT EXISTS idx_issue_workspace ON issue(workspace_id);

CREATE TABLE IF NOT EXISTS issue_count (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    group_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    log_group TEXT NOT NULL,
    hour TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_issue_count_workspace ON issue_count(workspace_id, hour);

CREATE TABLE IF NOT EXISTS warning (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    type TEXT NOT NULL,
    target TEXT NOT NULL,
    data TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_warning_workspace ON warning(workspace_id);

CREATE TABLE IF NOT EXISTS usage (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    day TEXT NOT NULL,
    invocations INTEGER NOT NULL DEFAULT 0,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_usage_workspace ON usage(workspace_id, day);

CREATE TABLE IF NOT EXISTS log_search (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    log_group TEXT NOT NULL,
    time_start TEXT,
    time_end TEXT,
    outcome TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_log_search_user ON log_search(workspace_id, user_id);

CREATE TABLE IF NOT EXISTS state_update (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    command TEXT NOT NULL,
    -- JSON: {"type": "cli" | "ci", "properties": {}}
    source TEXT NOT NULL,
    time_started TEXT,
    time_completed TEXT,
    resource_deleted INTEGER,
    resource_created INTEGER,
    resource_updated INTEGER,
    resource_same INTEGER,
    errors INTEGER,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_state_update_workspace ON state_update(workspace_id);

CREATE TABLE IF NOT EXISTS stripe (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL UNIQUE,
    customer_id TEXT,
    subscription_id TEXT,
    standing TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE TABLE IF NOT EXISTS app_repo (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    type TEXT NOT NULL,
    repo_id TEXT NOT NULL,
    path TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_app_repo_workspace ON app_repo(workspace_id);

CREATE TABLE IF NOT EXISTS env (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    app_id TEXT NOT NULL,
    stage_name TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_env_workspace ON env(workspace_id);

CREATE TABLE IF NOT EXISTS log_poller (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    log_group TEXT NOT NULL,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_log_poller_workspace ON log_poller(workspace_id);

CREATE TABLE IF NOT EXISTS lambda_payload (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    key TEXT NOT NULL,
    name TEXT NOT NULL,
    creator TEXT,
    -- JSON
    payload TEXT NOT NULL,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_lambda_payload_workspace ON lambda_payload(workspace_id);

CREATE TABLE IF NOT EXISTS issue_subscriber (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    function_id TEXT NOT NULL,
    log_group TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_issue_subscriber_workspace ON issue_subscriber(workspace_id);

CREATE TABLE IF NOT EXISTS issue_alert (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    -- JSON blobs
    source TEXT NOT NULL,
    destination TEXT NOT NULL,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_issue_alert_workspace ON issue_alert(workspace_id);

CREATE TABLE IF NOT EXISTS github_org (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    external_org_id INTEGER NOT NULL,
    login TEXT NOT NULL,
    installation_id INTEGER,
    time_disconnected TEXT,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_github_org_workspace ON github_org(workspace_id);

CREATE TABLE IF NOT EXISTS github_repo (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    github_org_id TEXT NOT NULL,
    external_repo_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_github_repo_workspace ON github_repo(workspace_id);

CREATE TABLE IF NOT EXISTS slack_team (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    team_id TEXT NOT NULL,
    team_name TEXT NOT NULL,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_slack_team_workspace ON slack_team(workspace_id);

CREATE TABLE IF NOT EXISTS state_resource (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    stage_id TEXT NOT NULL,
    update_id TEXT NOT NULL,
    type TEXT NOT NULL,
    urn TEXT NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('created', 'updated', 'deleted')),
    -- JSON blobs
    outputs TEXT NOT NULL,
    inputs TEXT NOT NULL,
    parent TEXT,
    custom INTEGER NOT NULL DEFAULT 0,
    time_created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_updated TEXT DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    time_deleted TEXT
);

CREATE INDEX IF NOT EXISTS idx_state_resource_workspace ON state_resource(workspace_id, update_id);
"#;
