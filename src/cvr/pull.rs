//! Pull orchestrator
//!
//! Runs one pull end to end inside a single transaction:
//!
//! 1. Make sure the client group exists, bound to the requesting actor
//! 2. Lock the group row, rejecting a different actor
//! 3. Load the CVR named by the cookie (or start from an empty view)
//! 4. Diff every visible table against it
//! 5. Build the patch and collect mutation ID changes
//! 6. Commit a new CVR version if anything changed, otherwise roll back

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::diff;
use super::mutations::last_mutation_id_changes;
use super::patch::build_patch;
use super::registry::TableRegistry;
use super::source::load_visible_rows;
use super::store::{ClientGroupRepository, CvrRepository};
use super::types::{CvrSnapshot, MutationChanges, PatchOp, PullRequest, PullResponse, PULL_VERSION};
use crate::actor::Actor;
use crate::config::SyncConfig;
use crate::error::SyncError;

/// Tuning knobs for the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullOptions {
    /// Rows fetched per page while building puts
    pub page_size: i64,
    /// Snapshots kept per client group after a commit
    pub cvr_retention: i64,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            page_size: 10_000,
            cvr_retention: 10,
        }
    }
}

impl From<&SyncConfig> for PullOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            cvr_retention: config.cvr_retention.max(1),
        }
    }
}

/// What a pull did
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    /// A new CVR version was stored and is returned as the cookie
    Committed(PullResponse),
    /// Nothing changed; stored state is untouched and the cookie is echoed
    Unchanged(PullResponse),
    /// The group is bound to another actor. Nothing is read or written and
    /// the client receives an empty patch with its own cookie.
    ActorMismatch { cookie: Option<i64> },
}

impl PullOutcome {
    pub fn into_response(self) -> PullResponse {
        match self {
            PullOutcome::Committed(response) | PullOutcome::Unchanged(response) => response,
            PullOutcome::ActorMismatch { cookie } => PullResponse {
                patch: Vec::new(),
                cookie,
                last_mutation_id_changes: MutationChanges::new(),
            },
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, PullOutcome::Committed(_))
    }
}

/// Computes pulls against the authoritative store
pub struct PullOrchestrator {
    pool: SqlitePool,
    registry: Arc<TableRegistry>,
    options: PullOptions,
}

impl PullOrchestrator {
    pub fn new(pool: SqlitePool, registry: Arc<TableRegistry>, options: PullOptions) -> Self {
        Self {
            pool,
            registry,
            options,
        }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Serve a pull for `actor`
    pub async fn pull(&self, actor: &Actor, req: &PullRequest) -> Result<PullOutcome, SyncError> {
        self.pull_at(actor, req, Utc::now()).await
    }

    /// Serve a pull, evaluating time-windowed table predicates at `now`
    pub async fn pull_at(
        &self,
        actor: &Actor,
        req: &PullRequest,
        now: DateTime<Utc>,
    ) -> Result<PullOutcome, SyncError> {
        if req.pull_version != PULL_VERSION {
            return Err(SyncError::UnsupportedPullVersion(req.pull_version));
        }

        let group_id = req.client_group_id.as_str();
        let actor_value = serde_json::to_value(actor)?;

        {
            let mut conn = self.pool.acquire().await?;
            if ClientGroupRepository::new(&mut conn)
                .ensure(group_id, &actor_value)
                .await?
            {
                tracing::info!(client_group_id = group_id, "Created client group");
            }
        }

        let mut tx = self.pool.begin().await?;

        let group = ClientGroupRepository::new(&mut tx)
            .lock(group_id)
            .await?
            .ok_or_else(|| SyncError::GroupNotFound(group_id.to_string()))?;

        if group.actor != actor_value {
            tracing::warn!(
                client_group_id = group_id,
                bound = %group.actor,
                requested = %actor_value,
                "Actor does not match client group, ignoring pull"
            );
            tx.rollback().await?;
            return Ok(PullOutcome::ActorMismatch { cookie: req.cookie });
        }

        let old_cvr = match req.cookie {
            Some(cookie) => CvrRepository::new(&mut tx).get(group_id, cookie).await?,
            None => None,
        };

        let mut patch = Vec::new();
        if old_cvr.is_none() {
            tracing::debug!(client_group_id = group_id, cookie = ?req.cookie, "No CVR for cookie, resetting client");
            patch.push(PatchOp::Clear);
            patch.push(PatchOp::init());
        }
        let old_cvr = old_cvr.unwrap_or_default();

        let rows = load_visible_rows(&mut tx, &self.registry, actor, now).await?;
        let diff = diff::compute(&old_cvr.data, &rows);
        let next_version = req.cookie.unwrap_or(0).max(group.cvr_version) + 1;

        tracing::debug!(
            client_group_id = group_id,
            puts = diff.put_count(),
            deletes = diff.to_delete.len(),
            "Computed diff"
        );
        for puts in &diff.to_put {
            tracing::debug!(table = %puts.table, rows = puts.rows.len(), "To put");
        }

        patch.extend(build_patch(&mut tx, &self.registry, actor, &diff, self.options.page_size).await?);

        let changes = last_mutation_id_changes(&mut tx, group_id, old_cvr.client_version).await?;

        if patch.is_empty() && changes.is_empty() {
            tx.rollback().await?;
            return Ok(PullOutcome::Unchanged(PullResponse {
                patch: Vec::new(),
                cookie: req.cookie,
                last_mutation_id_changes: changes,
            }));
        }

        ClientGroupRepository::new(&mut tx)
            .set_cvr_version(group_id, next_version)
            .await?;

        let next_cvr = CvrSnapshot {
            version: next_version,
            data: diff.next_data,
            client_version: group.client_version,
        };
        let mut cvrs = CvrRepository::new(&mut tx);
        cvrs.put(group_id, &next_cvr).await?;
        let pruned = cvrs
            .prune(group_id, next_version - self.options.cvr_retention + 1)
            .await?;

        tx.commit().await?;

        tracing::info!(
            client_group_id = group_id,
            cookie = next_version,
            ops = patch.len(),
            mutations = changes.len(),
            pruned,
            "Committed CVR"
        );

        Ok(PullOutcome::Committed(PullResponse {
            patch,
            cookie: Some(next_version),
            last_mutation_id_changes: changes,
        }))
    }
}
