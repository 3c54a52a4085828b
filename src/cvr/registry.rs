//! Syncable table registry
//!
//! The registry is an explicit configuration object handed to the pull
//! orchestrator. Each [`SyncTable`] declares how its rows are keyed and
//! tenant-scoped, and carries a [`TableStrategy`] deciding visibility per
//! actor and projecting rows onto the wire.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite};

use crate::actor::Actor;
use crate::error::SyncError;

/// A bound value in a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

/// SQL fragment with `?` placeholders, appended to a table scan's WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    sql: String,
    binds: Vec<SqlValue>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.binds.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Append as `AND (<sql>)`, binding each placeholder in order
    pub(crate) fn push_to(&self, qb: &mut QueryBuilder<'_, Sqlite>) -> Result<(), SyncError> {
        let placeholders = self.sql.matches('?').count();
        if placeholders != self.binds.len() {
            return Err(SyncError::InvalidPredicate(format!(
                "{} ({} placeholders, {} binds)",
                self.sql,
                placeholders,
                self.binds.len()
            )));
        }

        qb.push(" AND (");
        let mut binds = self.binds.iter();
        for (i, part) in self.sql.split('?').enumerate() {
            if i > 0 {
                match binds.next() {
                    Some(SqlValue::Text(text)) => {
                        qb.push_bind(text.clone());
                    }
                    Some(SqlValue::Integer(n)) => {
                        qb.push_bind(*n);
                    }
                    None => {}
                }
            }
            qb.push(part);
        }
        qb.push(")");
        Ok(())
    }
}

/// What an actor may see of a table
#[derive(Debug, Clone, PartialEq)]
pub enum Visibility {
    /// The table is not synced to this actor at all
    Hidden,
    /// Every row in scope is synced
    Visible,
    /// Rows in scope matching the predicate are synced
    Filtered(Predicate),
}

/// Per-table behavior plugged into the registry
pub trait TableStrategy: Send + Sync {
    /// Which rows of the table the actor sees at `now`
    fn visibility(&self, actor: &Actor, now: DateTime<Utc>) -> Visibility;

    /// Wire value for a fetched row
    fn project(&self, row: Map<String, Value>) -> Value {
        Value::Object(row)
    }
}

/// Default strategy: every row of the tenant, hidden from account holders
#[derive(Debug, Default, Clone, Copy)]
pub struct TenantRows;

impl TableStrategy for TenantRows {
    fn visibility(&self, actor: &Actor, _now: DateTime<Utc>) -> Visibility {
        match actor {
            Actor::TenantMember(_) => Visibility::Visible,
            Actor::AccountHolder(_) => Visibility::Hidden,
        }
    }
}

/// How a table is tied to its tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// Rows carry the tenant ID in this column
    Column(String),
    /// The table is the tenant table itself; its primary key is the tenant ID
    PrimaryKey,
}

/// A table registered for pull diffing
#[derive(Clone)]
pub struct SyncTable {
    name: String,
    tenant: TenantScope,
    key_columns: Vec<String>,
    version_column: String,
    strategy: Arc<dyn TableStrategy>,
}

impl std::fmt::Debug for SyncTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTable")
            .field("name", &self.name)
            .field("tenant", &self.tenant)
            .field("key_columns", &self.key_columns)
            .field("version_column", &self.version_column)
            .finish_non_exhaustive()
    }
}

impl SyncTable {
    /// A table keyed by `id`, scoped by `workspace_id`, versioned by `time_updated`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tenant: TenantScope::Column("workspace_id".to_string()),
            key_columns: vec!["id".to_string()],
            version_column: "time_updated".to_string(),
            strategy: Arc::new(TenantRows),
        }
    }

    pub fn key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn tenant(mut self, tenant: TenantScope) -> Self {
        self.tenant = tenant;
        self
    }

    pub fn version_column(mut self, column: &str) -> Self {
        self.version_column = column.to_string();
        self
    }

    pub fn strategy(mut self, strategy: impl TableStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tenant_scope(&self) -> &TenantScope {
        &self.tenant
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn version_column_name(&self) -> &str {
        &self.version_column
    }

    pub fn visibility(&self, actor: &Actor, now: DateTime<Utc>) -> Visibility {
        self.strategy.visibility(actor, now)
    }

    pub fn project(&self, row: Map<String, Value>) -> Value {
        self.strategy.project(row)
    }

    /// Append the tenant predicate for a tenant-scoped actor
    pub(crate) fn push_tenant_scope(&self, qb: &mut QueryBuilder<'_, Sqlite>, tenant_id: &str) {
        let column = match &self.tenant {
            TenantScope::Column(column) => column.as_str(),
            TenantScope::PrimaryKey => "id",
        };
        qb.push(" AND ");
        qb.push(quote_ident(column));
        qb.push(" = ");
        qb.push_bind(tenant_id.to_string());
    }

    fn identifiers(&self) -> impl Iterator<Item = &str> {
        let tenant = match &self.tenant {
            TenantScope::Column(column) => Some(column.as_str()),
            TenantScope::PrimaryKey => None,
        };
        std::iter::once(self.name.as_str())
            .chain(std::iter::once(self.version_column.as_str()))
            .chain(self.key_columns.iter().map(String::as_str))
            .chain(tenant)
    }
}

/// The set of syncable tables, in patch order
#[derive(Debug, Clone)]
pub struct TableRegistry {
    tables: Vec<SyncTable>,
}

impl TableRegistry {
    pub fn new(tables: Vec<SyncTable>) -> Result<Self, SyncError> {
        let mut seen = HashSet::new();
        for table in &tables {
            if !seen.insert(table.name.as_str()) {
                return Err(SyncError::InvalidRegistration(format!(
                    "table {} registered twice",
                    table.name
                )));
            }
            if let Some(bad) = table.identifiers().find(|ident| !is_identifier(ident)) {
                return Err(SyncError::InvalidRegistration(format!(
                    "table {}: invalid identifier {:?}",
                    table.name, bad
                )));
            }
        }

        Ok(Self { tables })
    }

    pub fn get(&self, name: &str) -> Option<&SyncTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncTable> {
        self.tables.iter()
    }
}

fn is_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote a validated identifier for interpolation
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{AccountHolder, TenantMember};
    use sqlx::Execute;

    fn member() -> Actor {
        Actor::TenantMember(TenantMember {
            tenant_id: "ws-1".to_string(),
            user_id: "usr-1".to_string(),
            email: "dev@example.com".to_string(),
        })
    }

    #[test]
    fn test_table_defaults() {
        let table = SyncTable::new("app");
        assert_eq!(table.key_columns(), ["id".to_string()]);
        assert_eq!(
            table.tenant_scope(),
            &TenantScope::Column("workspace_id".to_string())
        );
        assert_eq!(table.version_column_name(), "time_updated");
        assert_eq!(table.visibility(&member(), Utc::now()), Visibility::Visible);

        let account = Actor::AccountHolder(AccountHolder {
            account_id: "acc-1".to_string(),
            email: "dev@example.com".to_string(),
        });
        assert_eq!(table.visibility(&account, Utc::now()), Visibility::Hidden);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = TableRegistry::new(vec![SyncTable::new("app"), SyncTable::new("app")]);
        assert!(matches!(result, Err(SyncError::InvalidRegistration(_))));
    }

    #[test]
    fn test_registry_rejects_bad_identifiers() {
        let result = TableRegistry::new(vec![SyncTable::new("app").key(["id; DROP TABLE app"])]);
        assert!(matches!(result, Err(SyncError::InvalidRegistration(_))));

        let result = TableRegistry::new(vec![SyncTable::new("1app")]);
        assert!(matches!(result, Err(SyncError::InvalidRegistration(_))));
    }

    #[test]
    fn test_registry_lookup_preserves_order() {
        let registry =
            TableRegistry::new(vec![SyncTable::new("workspace"), SyncTable::new("app")]).unwrap();
        let names: Vec<_> = registry.iter().map(|t| t.name()).collect();
        assert_eq!(names, ["workspace", "app"]);
        assert!(registry.get("app").is_some());
        assert!(registry.get("stage").is_none());
        assert_eq!(registry.iter().count(), 2);
    }

    #[test]
    fn test_predicate_binds_in_order() {
        let predicate = Predicate::new("a = ? AND b >= ?").bind("x").bind(3);
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM t WHERE 1 = 1");
        predicate.push_to(&mut qb).unwrap();
        assert_eq!(
            qb.build().sql(),
            "SELECT 1 FROM t WHERE 1 = 1 AND (a = ? AND b >= ?)"
        );
    }

    #[test]
    fn test_predicate_bind_mismatch() {
        let predicate = Predicate::new("a = ? AND b = ?").bind("x");
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1");
        assert!(matches!(
            predicate.push_to(&mut qb),
            Err(SyncError::InvalidPredicate(_))
        ));
    }
}
