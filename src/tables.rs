//! Tables synced to console clients
//!
//! Tenant members receive every table of their workspace, narrowed by the
//! time windows and ownership rules below. Account holders only receive the
//! users and workspaces they belong to, which is enough to pick a workspace.

use chrono::{DateTime, Datelike, Duration, DurationRound, Utc};
use serde_json::{json, Map, Value};

use crate::actor::Actor;
use crate::cvr::{Predicate, SyncTable, TableRegistry, TableStrategy, TenantScope, Visibility};
use crate::error::SyncError;

/// The registry served by this deployment
pub fn default_registry() -> Result<TableRegistry, SyncError> {
    let tables = vec![
        SyncTable::new("workspace")
            .tenant(TenantScope::PrimaryKey)
            .strategy(Workspaces),
        SyncTable::new("stripe").key(Vec::<String>::new()),
        SyncTable::new("user").strategy(Users),
        SyncTable::new("aws_account"),
        SyncTable::new("app"),
        SyncTable::new("app_repo"),
        SyncTable::new("env"),
        SyncTable::new("stage"),
        SyncTable::new("resource")
            .key(["stage_id", "id"])
            .strategy(JsonColumns(&["metadata", "enrichment"])),
        SyncTable::new("log_poller"),
        SyncTable::new("log_search").strategy(OwnLogSearches),
        SyncTable::new("lambda_payload").strategy(JsonColumns(&["payload"])),
        SyncTable::new("warning")
            .key(["stage_id", "type", "id"])
            .strategy(JsonColumns(&["data"])),
        SyncTable::new("issue").key(["stage_id", "id"]).strategy(OpenIssues),
        SyncTable::new("issue_subscriber"),
        SyncTable::new("issue_count")
            .key(["group_id", "id"])
            .strategy(RecentIssueCounts),
        SyncTable::new("issue_alert").strategy(JsonColumns(&["source", "destination"])),
        SyncTable::new("github_org"),
        SyncTable::new("github_repo"),
        SyncTable::new("slack_team"),
        SyncTable::new("usage").key(["stage_id", "id"]).strategy(CurrentUsage),
        SyncTable::new("state_update")
            .key(["stage_id", "id"])
            .strategy(StateUpdates),
        SyncTable::new("state_resource").strategy(JsonColumns(&["outputs", "inputs"])),
    ];

    TableRegistry::new(tables)
}

/// The tenant row itself, or the workspaces an account belongs to
struct Workspaces;

impl TableStrategy for Workspaces {
    fn visibility(&self, actor: &Actor, _now: DateTime<Utc>) -> Visibility {
        match actor {
            Actor::TenantMember(_) => Visibility::Visible,
            Actor::AccountHolder(account) => Visibility::Filtered(
                Predicate::new(
                    "time_deleted IS NULL AND id IN \
                     (SELECT workspace_id FROM user WHERE email = ? AND time_deleted IS NULL)",
                )
                .bind(account.email.as_str()),
            ),
        }
    }
}

/// Workspace members, or an account's own memberships
struct Users;

impl TableStrategy for Users {
    fn visibility(&self, actor: &Actor, _now: DateTime<Utc>) -> Visibility {
        match actor {
            Actor::TenantMember(_) => Visibility::Visible,
            Actor::AccountHolder(account) => Visibility::Filtered(
                Predicate::new(
                    "email = ? AND time_deleted IS NULL AND workspace_id IN \
                     (SELECT id FROM workspace WHERE time_deleted IS NULL)",
                )
                .bind(account.email.as_str()),
            ),
        }
    }
}

/// Log searches started by the requesting user
struct OwnLogSearches;

impl TableStrategy for OwnLogSearches {
    fn visibility(&self, actor: &Actor, _now: DateTime<Utc>) -> Visibility {
        match actor {
            Actor::TenantMember(member) => {
                Visibility::Filtered(Predicate::new("user_id = ?").bind(member.user_id.as_str()))
            }
            Actor::AccountHolder(_) => Visibility::Hidden,
        }
    }
}

struct OpenIssues;

impl TableStrategy for OpenIssues {
    fn visibility(&self, actor: &Actor, _now: DateTime<Utc>) -> Visibility {
        match actor {
            Actor::TenantMember(_) => Visibility::Filtered(Predicate::new("time_deleted IS NULL")),
            Actor::AccountHolder(_) => Visibility::Hidden,
        }
    }
}

/// Hourly issue counts for the last day
struct RecentIssueCounts;

impl TableStrategy for RecentIssueCounts {
    fn visibility(&self, actor: &Actor, now: DateTime<Utc>) -> Visibility {
        match actor {
            Actor::TenantMember(_) => {
                let hour = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
                let since = hour - Duration::days(1);
                Visibility::Filtered(
                    Predicate::new("hour >= ?").bind(since.format("%Y-%m-%d %H:%M:%S").to_string()),
                )
            }
            Actor::AccountHolder(_) => Visibility::Hidden,
        }
    }
}

/// Usage rows for the current billing month
struct CurrentUsage;

impl TableStrategy for CurrentUsage {
    fn visibility(&self, actor: &Actor, now: DateTime<Utc>) -> Visibility {
        match actor {
            Actor::TenantMember(_) => {
                let month_start = format!("{:04}-{:02}-01", now.year(), now.month());
                Visibility::Filtered(Predicate::new("day >= ?").bind(month_start))
            }
            Actor::AccountHolder(_) => Visibility::Hidden,
        }
    }
}

/// Tenant rows whose listed TEXT columns hold JSON documents
struct JsonColumns(&'static [&'static str]);

impl TableStrategy for JsonColumns {
    fn visibility(&self, actor: &Actor, _now: DateTime<Utc>) -> Visibility {
        match actor {
            Actor::TenantMember(_) => Visibility::Visible,
            Actor::AccountHolder(_) => Visibility::Hidden,
        }
    }

    fn project(&self, mut row: Map<String, Value>) -> Value {
        for column in self.0 {
            parse_json_column(&mut row, column);
        }
        Value::Object(row)
    }
}

/// Deploy/refresh/remove runs, with resource counters grouped
struct StateUpdates;

impl TableStrategy for StateUpdates {
    fn visibility(&self, actor: &Actor, _now: DateTime<Utc>) -> Visibility {
        match actor {
            Actor::TenantMember(_) => Visibility::Visible,
            Actor::AccountHolder(_) => Visibility::Hidden,
        }
    }

    fn project(&self, mut row: Map<String, Value>) -> Value {
        parse_json_column(&mut row, "source");
        let mut take = |column: &str| row.remove(column).unwrap_or(Value::Null);

        let resource = json!({
            "created": take("resource_created"),
            "updated": take("resource_updated"),
            "deleted": take("resource_deleted"),
            "same": take("resource_same"),
        });

        json!({
            "id": take("id"),
            "workspaceID": take("workspace_id"),
            "stageID": take("stage_id"),
            "command": take("command"),
            "source": take("source"),
            "errors": take("errors"),
            "resource": resource,
            "time": {
                "created": take("time_created"),
                "updated": take("time_updated"),
                "started": take("time_started"),
                "completed": take("time_completed"),
            },
        })
    }
}

/// Replace a JSON-encoded TEXT column with its parsed value, leaving
/// unparsable text as is
fn parse_json_column(row: &mut Map<String, Value>, column: &str) {
    if let Some(Value::String(text)) = row.get(column) {
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            row.insert(column.to_string(), parsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{AccountHolder, TenantMember};
    use chrono::TimeZone;

    fn member() -> Actor {
        Actor::TenantMember(TenantMember {
            tenant_id: "ws-1".to_string(),
            user_id: "usr-1".to_string(),
            email: "dev@example.com".to_string(),
        })
    }

    fn account() -> Actor {
        Actor::AccountHolder(AccountHolder {
            account_id: "acc-1".to_string(),
            email: "dev@example.com".to_string(),
        })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 42, 7).unwrap()
    }

    #[test]
    fn test_account_holders_see_identity_tables_only() {
        let registry = default_registry().unwrap();
        let visible: Vec<_> = registry
            .iter()
            .filter(|t| t.visibility(&account(), now()) != Visibility::Hidden)
            .map(|t| t.name())
            .collect();
        assert_eq!(visible, ["workspace", "user"]);

        for name in ["app_repo", "env", "log_poller", "github_org", "slack_team", "state_resource"] {
            let table = registry.get(name).unwrap();
            assert_eq!(table.visibility(&account(), now()), Visibility::Hidden);
            assert_eq!(table.key_columns(), ["id"]);
        }
    }

    #[test]
    fn test_tenant_members_see_every_table() {
        let registry = default_registry().unwrap();
        let names: Vec<_> = registry.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            [
                "workspace",
                "stripe",
                "user",
                "aws_account",
                "app",
                "app_repo",
                "env",
                "stage",
                "resource",
                "log_poller",
                "log_search",
                "lambda_payload",
                "warning",
                "issue",
                "issue_subscriber",
                "issue_count",
                "issue_alert",
                "github_org",
                "github_repo",
                "slack_team",
                "usage",
                "state_update",
                "state_resource",
            ]
        );
        assert!(registry
            .iter()
            .all(|t| t.visibility(&member(), now()) != Visibility::Hidden));
    }

    #[test]
    fn test_time_windows() {
        let Visibility::Filtered(counts) = RecentIssueCounts.visibility(&member(), now()) else {
            panic!("issue counts should be filtered");
        };
        assert_eq!(
            counts,
            Predicate::new("hour >= ?").bind("2024-03-14 10:00:00")
        );

        let Visibility::Filtered(usage) = CurrentUsage.visibility(&member(), now()) else {
            panic!("usage should be filtered");
        };
        assert_eq!(usage, Predicate::new("day >= ?").bind("2024-03-01"));
    }

    #[test]
    fn test_log_search_scoped_to_user() {
        let Visibility::Filtered(predicate) = OwnLogSearches.visibility(&member(), now()) else {
            panic!("log searches should be filtered");
        };
        assert_eq!(predicate.sql(), "user_id = ?");
        assert_eq!(predicate, Predicate::new("user_id = ?").bind("usr-1"));
    }

    #[test]
    fn test_singleton_and_composite_keys() {
        let registry = default_registry().unwrap();
        assert!(registry.get("stripe").unwrap().key_columns().is_empty());
        assert_eq!(
            registry.get("warning").unwrap().key_columns(),
            ["stage_id", "type", "id"]
        );
    }

    #[test]
    fn test_state_update_projection() {
        let row = json!({
            "id": "upd-1",
            "workspace_id": "ws-1",
            "stage_id": "stg-1",
            "command": "deploy",
            "source": "{\"type\":\"cli\",\"properties\":{}}",
            "errors": 0,
            "resource_created": 2,
            "resource_updated": 1,
            "resource_deleted": null,
            "resource_same": 7,
            "time_created": "2024-03-15 10:00:00.000",
            "time_updated": "2024-03-15 10:01:00.000",
            "time_started": "2024-03-15 10:00:01.000",
            "time_completed": null,
        });
        let Value::Object(row) = row else { unreachable!() };

        let projected = StateUpdates.project(row);
        assert_eq!(projected["source"], json!({"type": "cli", "properties": {}}));
        assert_eq!(
            projected["resource"],
            json!({"created": 2, "updated": 1, "deleted": null, "same": 7})
        );
        assert_eq!(projected["time"]["started"], json!("2024-03-15 10:00:01.000"));
        assert_eq!(projected["stageID"], json!("stg-1"));
    }

    #[test]
    fn test_json_columns_projection() {
        let Value::Object(row) = json!({"id": "r-1", "metadata": "{\"handler\":\"index.ts\"}", "enrichment": "oops{"})
        else {
            unreachable!()
        };
        let projected = JsonColumns(&["metadata", "enrichment"]).project(row);
        assert_eq!(projected["metadata"]["handler"], json!("index.ts"));
        assert_eq!(projected["enrichment"], json!("oops{"));
    }
}
