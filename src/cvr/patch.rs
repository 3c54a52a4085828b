//! Patch builder
//!
//! Pages through changed rows table by table and turns them into put
//! operations, followed by a delete for every key that left the view.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, QueryBuilder, Row, Sqlite, SqliteConnection, TypeInfo, ValueRef};

use super::diff::{Diff, TablePuts};
use super::registry::{quote_ident, SyncTable, TableRegistry};
use super::types::PatchOp;
use crate::actor::Actor;
use crate::error::SyncError;

/// Build put and delete operations for `diff`
pub async fn build_patch(
    conn: &mut SqliteConnection,
    registry: &TableRegistry,
    actor: &Actor,
    diff: &Diff,
    page_size: i64,
) -> Result<Vec<PatchOp>, SyncError> {
    let mut patch = Vec::with_capacity(diff.put_count() + diff.to_delete.len());

    for puts in &diff.to_put {
        if puts.rows.is_empty() {
            continue;
        }
        let Some(table) = registry.get(&puts.table) else {
            return Err(SyncError::InvalidRegistration(format!(
                "rows diffed for unregistered table {}",
                puts.table
            )));
        };
        put_table_rows(conn, table, actor, puts, page_size, &mut patch).await?;
    }

    patch.extend(
        diff.to_delete
            .iter()
            .map(|key| PatchOp::Del { key: key.clone() }),
    );

    Ok(patch)
}

async fn put_table_rows(
    conn: &mut SqliteConnection,
    table: &SyncTable,
    actor: &Actor,
    puts: &TablePuts,
    page_size: i64,
    patch: &mut Vec<PatchOp>,
) -> Result<(), SyncError> {
    let ids: Vec<&str> = puts.rows.iter().map(|row| row.id.as_str()).collect();
    let ids = serde_json::to_string(&ids)?;
    let keys = puts.keys_by_id();

    let mut offset = 0i64;
    loop {
        tracing::debug!(table = table.name(), offset, "Fetching changed rows");

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
        qb.push(quote_ident(table.name()));
        qb.push(" WHERE CAST(id AS TEXT) IN (SELECT value FROM json_each(");
        qb.push_bind(ids.clone());
        qb.push("))");
        if let Some(tenant_id) = actor.tenant_id() {
            table.push_tenant_scope(&mut qb, tenant_id);
        }
        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(page_size);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb.build().fetch_all(&mut *conn).await?;
        let fetched = rows.len() as i64;

        for row in &rows {
            let object = row_to_json(row)?;
            let Some(key) = diffed_key(table.name(), &object, &keys) else {
                continue;
            };
            patch.push(PatchOp::Put {
                key: key.to_string(),
                value: table.project(object),
            });
        }

        if fetched < page_size {
            break;
        }
        offset += fetched;
    }

    Ok(())
}

/// Key the diff assigned to a refetched row. A miss means the row would be
/// recorded in the next CVR without being sent, so it is logged.
fn diffed_key<'k>(
    table: &str,
    object: &Map<String, Value>,
    keys: &HashMap<&str, &'k str>,
) -> Option<&'k str> {
    let id = match object.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        other => {
            tracing::warn!(table, id = ?other, "Refetched row has no usable id");
            return None;
        }
    };
    match keys.get(id.as_str()) {
        Some(key) => Some(*key),
        None => {
            tracing::warn!(table, id = %id, "Refetched row was not in the diff");
            None
        }
    }
}

/// Pass-through wire form of a row: column name -> value
pub(crate) fn row_to_json(row: &SqliteRow) -> Result<Map<String, Value>, SyncError> {
    let mut object = Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let kind = raw.type_info().name().to_string();
            match kind.as_str() {
                "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Number::from_f64(row.try_get_unchecked::<f64, _>(i)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => Value::String(
                    String::from_utf8_lossy(&row.try_get_unchecked::<Vec<u8>, _>(i)?)
                        .into_owned(),
                ),
                _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}
