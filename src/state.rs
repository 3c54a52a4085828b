//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::actor::ActorResolver;
use crate::config::Config;
use crate::cvr::{PullOptions, PullOrchestrator, TableRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    orchestrator: PullOrchestrator,
    actors: Arc<dyn ActorResolver>,
}

impl AppState {
    /// Create a new application state serving `registry`
    pub fn new(
        config: Config,
        db: SqlitePool,
        registry: TableRegistry,
        actors: Arc<dyn ActorResolver>,
    ) -> Self {
        let orchestrator =
            PullOrchestrator::new(db.clone(), Arc::new(registry), PullOptions::from(&config.sync));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                orchestrator,
                actors,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    pub fn orchestrator(&self) -> &PullOrchestrator {
        &self.inner.orchestrator
    }

    pub fn actors(&self) -> &dyn ActorResolver {
        self.inner.actors.as_ref()
    }
}
