//! Mutation tracker

use sqlx::SqliteConnection;

use super::types::MutationChanges;
use crate::error::SyncError;

/// Last mutation ID of every client in the group whose version moved past
/// `since_client_version`.
pub async fn last_mutation_id_changes(
    conn: &mut SqliteConnection,
    client_group_id: &str,
    since_client_version: i64,
) -> Result<MutationChanges, SyncError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT id, mutation_id
        FROM replicache_client
        WHERE client_group_id = ? AND client_version > ?
        "#,
    )
    .bind(client_group_id)
    .bind(since_client_version)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().collect())
}
