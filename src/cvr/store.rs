//! CVR and client group persistence
//!
//! Repositories borrow a connection so they can run either on a pooled
//! connection or inside the pull's transaction.

use sqlx::SqliteConnection;

use super::types::{ClientGroup, CvrData, CvrSnapshot};
use crate::error::SyncError;

/// Repository for client group rows
pub struct ClientGroupRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> ClientGroupRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Create the group bound to `actor` unless it already exists
    pub async fn ensure(&mut self, id: &str, actor: &serde_json::Value) -> Result<bool, SyncError> {
        let result = sqlx::query(
            r#"
            INSERT INTO replicache_client_group (id, actor, cvr_version, client_version)
            VALUES (?, ?, 0, 0)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(serde_json::to_string(actor)?)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Read the group while taking the write lock on it.
    ///
    /// This must be the first statement of the transaction so that waiting on
    /// a concurrent pull of the same group goes through the busy handler.
    pub async fn lock(&mut self, id: &str) -> Result<Option<ClientGroup>, SyncError> {
        let row: Option<ClientGroupRow> = sqlx::query_as(
            r#"
            UPDATE replicache_client_group
            SET cvr_version = cvr_version
            WHERE id = ?
            RETURNING id, actor, cvr_version, client_version
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(ClientGroupRow::into_group).transpose()
    }

    /// Record the CVR version handed to the group
    pub async fn set_cvr_version(&mut self, id: &str, version: i64) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            UPDATE replicache_client_group
            SET cvr_version = ?, time_updated = strftime('%Y-%m-%d %H:%M:%f', 'now')
            WHERE id = ?
            "#,
        )
        .bind(version)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }
}

/// Repository for CVR snapshots
pub struct CvrRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> CvrRepository<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Snapshot `version` of a group
    pub async fn get(
        &mut self,
        client_group_id: &str,
        version: i64,
    ) -> Result<Option<CvrSnapshot>, SyncError> {
        let row: Option<CvrRow> = sqlx::query_as(
            r#"
            SELECT id, data, client_version
            FROM replicache_cvr
            WHERE client_group_id = ? AND id = ?
            "#,
        )
        .bind(client_group_id)
        .bind(version)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(CvrRow::into_snapshot).transpose()
    }

    /// Write a snapshot, replacing the data of an existing one at that version
    pub async fn put(
        &mut self,
        client_group_id: &str,
        snapshot: &CvrSnapshot,
    ) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO replicache_cvr (client_group_id, id, data, client_version)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(client_group_id, id) DO UPDATE SET
                data = excluded.data
            "#,
        )
        .bind(client_group_id)
        .bind(snapshot.version)
        .bind(serde_json::to_string(&snapshot.data)?)
        .bind(snapshot.client_version)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Delete snapshots older than `oldest_kept`
    pub async fn prune(&mut self, client_group_id: &str, oldest_kept: i64) -> Result<u64, SyncError> {
        let result = sqlx::query("DELETE FROM replicache_cvr WHERE client_group_id = ? AND id < ?")
            .bind(client_group_id)
            .bind(oldest_kept)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct ClientGroupRow {
    id: String,
    actor: String,
    cvr_version: i64,
    client_version: i64,
}

impl ClientGroupRow {
    fn into_group(self) -> Result<ClientGroup, SyncError> {
        Ok(ClientGroup {
            id: self.id,
            actor: serde_json::from_str(&self.actor)?,
            cvr_version: self.cvr_version,
            client_version: self.client_version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CvrRow {
    id: i64,
    data: String,
    client_version: i64,
}

impl CvrRow {
    fn into_snapshot(self) -> Result<CvrSnapshot, SyncError> {
        let data: CvrData = serde_json::from_str(&self.data)?;
        Ok(CvrSnapshot {
            version: self.id,
            data,
            client_version: self.client_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::setup_test_db;
    use serde_json::json;

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut groups = ClientGroupRepository::new(&mut conn);

        assert!(groups.ensure("cg-1", &json!({"type": "a"})).await.unwrap());
        assert!(!groups.ensure("cg-1", &json!({"type": "b"})).await.unwrap());

        let group = groups.lock("cg-1").await.unwrap().unwrap();
        assert_eq!(group.actor, json!({"type": "a"}));
        assert_eq!(group.cvr_version, 0);
        assert_eq!(group.client_version, 0);
    }

    #[tokio::test]
    async fn test_lock_missing_group() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();
        assert!(ClientGroupRepository::new(&mut conn)
            .lock("nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_set_cvr_version() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut groups = ClientGroupRepository::new(&mut conn);

        groups.ensure("cg-1", &json!({})).await.unwrap();
        groups.set_cvr_version("cg-1", 4).await.unwrap();
        assert_eq!(groups.lock("cg-1").await.unwrap().unwrap().cvr_version, 4);
    }

    #[tokio::test]
    async fn test_snapshot_upsert_and_prune() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut cvrs = CvrRepository::new(&mut conn);

        for version in 1..=5 {
            let snapshot = CvrSnapshot {
                version,
                data: [("/user/u1".to_string(), version)].into_iter().collect(),
                client_version: 2,
            };
            cvrs.put("cg-1", &snapshot).await.unwrap();
        }

        let replaced = CvrSnapshot {
            version: 5,
            data: CvrData::new(),
            client_version: 9,
        };
        cvrs.put("cg-1", &replaced).await.unwrap();

        let loaded = cvrs.get("cg-1", 5).await.unwrap().unwrap();
        assert!(loaded.data.is_empty());
        // Only data is replaced on conflict
        assert_eq!(loaded.client_version, 2);

        assert_eq!(cvrs.prune("cg-1", 4).await.unwrap(), 3);
        assert!(cvrs.get("cg-1", 3).await.unwrap().is_none());
        assert_eq!(cvrs.get("cg-1", 4).await.unwrap().unwrap().data["/user/u1"], 4);
        assert!(cvrs.get("cg-2", 4).await.unwrap().is_none());
    }
}
