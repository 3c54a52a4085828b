//! Row version source
//!
//! Scans each syncable table the actor may see and yields the `(id, key,
//! version)` triple of every visible row. Runs on the pull's transaction.

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, TypeInfo, ValueRef};

use super::key::build_key;
use super::registry::{quote_ident, SyncTable, TableRegistry, Visibility};
use super::types::SyncRow;
use crate::actor::Actor;
use crate::error::SyncError;

/// Load versions of every visible row across the registry, in table order
pub async fn load_visible_rows(
    conn: &mut SqliteConnection,
    registry: &TableRegistry,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Vec<SyncRow>, SyncError> {
    let mut rows = Vec::new();
    for table in registry.iter() {
        let visibility = table.visibility(actor, now);
        if visibility == Visibility::Hidden {
            continue;
        }
        tracing::debug!(table = table.name(), "Loading row versions");
        load_table_rows(conn, table, actor, &visibility, &mut rows).await?;
    }
    Ok(rows)
}

async fn load_table_rows(
    conn: &mut SqliteConnection,
    table: &SyncTable,
    actor: &Actor,
    visibility: &Visibility,
    out: &mut Vec<SyncRow>,
) -> Result<(), SyncError> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT CAST(id AS TEXT) AS id, ");
    qb.push(quote_ident(table.version_column_name()));
    qb.push(" AS version");
    for (i, column) in table.key_columns().iter().enumerate() {
        qb.push(format!(", CAST({} AS TEXT) AS k{}", quote_ident(column), i));
    }
    qb.push(" FROM ");
    qb.push(quote_ident(table.name()));
    qb.push(" WHERE 1 = 1");

    if let Some(tenant_id) = actor.tenant_id() {
        table.push_tenant_scope(&mut qb, tenant_id);
    }
    if let Visibility::Filtered(predicate) = visibility {
        predicate.push_to(&mut qb)?;
    }
    qb.push(" ORDER BY id");

    let mut skipped = 0usize;
    let mut stream = qb.build().fetch(&mut *conn);
    while let Some(row) = stream.try_next().await? {
        match sync_row(table, &row)? {
            Some(sync_row) => out.push(sync_row),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(
            table = table.name(),
            skipped,
            "Excluded rows without a usable version or key"
        );
    }
    Ok(())
}

/// Convert a scanned row, or `None` when it cannot be synced
fn sync_row(table: &SyncTable, row: &SqliteRow) -> Result<Option<SyncRow>, SyncError> {
    let id: Option<String> = row.try_get("id")?;
    let Some(id) = id else {
        return Ok(None);
    };

    let Some(version) = row_version(row)? else {
        tracing::debug!(table = table.name(), id = %id, "Row has no parsable version");
        return Ok(None);
    };

    let mut scope = Vec::with_capacity(table.key_columns().len());
    for i in 0..table.key_columns().len() {
        let value: Option<String> = row.try_get(format!("k{}", i).as_str())?;
        match value {
            Some(value) => scope.push(value),
            None => {
                tracing::debug!(table = table.name(), id = %id, "Row has a null key column");
                return Ok(None);
            }
        }
    }

    Ok(Some(SyncRow {
        table: table.name().to_string(),
        key: build_key(table.name(), &scope),
        id,
        version,
    }))
}

fn row_version(row: &SqliteRow) -> Result<Option<i64>, SyncError> {
    let raw = row.try_get_raw("version")?;
    if raw.is_null() {
        return Ok(None);
    }

    let kind = raw.type_info().name().to_string();
    let version = match kind.as_str() {
        "INTEGER" => Some(row.try_get_unchecked::<i64, _>("version")?),
        "REAL" => Some(row.try_get_unchecked::<f64, _>("version")? as i64),
        "TEXT" => normalize_version(&row.try_get_unchecked::<String, _>("version")?),
        _ => None,
    };
    Ok(version)
}

/// Normalize a stored last-modified value to epoch milliseconds.
///
/// Accepts integer milliseconds, RFC 3339, and SQLite's
/// `YYYY-MM-DD HH:MM:SS[.fff]` UTC form.
pub fn normalize_version(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(millis) = value.parse::<i64>() {
        return Some(millis);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.timestamp_millis());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}
