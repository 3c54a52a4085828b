//! Shared test fixtures

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::db::initialize_schema;

/// In-memory database with the schema applied.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    initialize_schema(&pool).await.unwrap();
    pool
}

/// Workspace `ws-1` with one member (`usr-1`, dev@example.com), one app, one
/// stage and one open issue, plus an unrelated workspace `ws-2`.
pub async fn seed_workspace(pool: &SqlitePool) {
    sqlx::query(
        r#"
        INSERT INTO workspace (id, slug) VALUES ('ws-1', 'acme'), ('ws-2', 'globex');

        INSERT INTO user (id, workspace_id, email) VALUES
            ('usr-1', 'ws-1', 'dev@example.com'),
            ('usr-2', 'ws-2', 'other@example.com');

        INSERT INTO app (id, workspace_id, name) VALUES
            ('app-1', 'ws-1', 'web'),
            ('app-2', 'ws-2', 'api');

        INSERT INTO stage (id, workspace_id, app_id, aws_account_id, region, name) VALUES
            ('stg-1', 'ws-1', 'app-1', 'aws-1', 'us-east-1', 'production');

        INSERT INTO issue (id, workspace_id, stage_id, error, message, time_updated) VALUES
            ('iss-1', 'ws-1', 'stg-1', 'TypeError', 'x is undefined', '2024-01-01 00:00:00.000');
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
}
