//! Diff engine
//!
//! Compares the client's previous view against fresh row versions.

use std::collections::HashMap;

use super::types::{CvrData, SyncRow};

/// A row that must be (re)sent to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRow {
    pub id: String,
    pub key: String,
}

/// Rows to put for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePuts {
    pub table: String,
    pub rows: Vec<PutRow>,
}

impl TablePuts {
    /// Sync key by row ID, for keying fetched rows
    pub fn keys_by_id(&self) -> HashMap<&str, &str> {
        self.rows
            .iter()
            .map(|row| (row.id.as_str(), row.key.as_str()))
            .collect()
    }
}

/// Outcome of comparing a CVR with the current rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Changed or new rows grouped by table, in first-seen table order
    pub to_put: Vec<TablePuts>,
    /// Keys the client holds that are no longer visible
    pub to_delete: Vec<String>,
    /// The view the client will hold after applying the patch
    pub next_data: CvrData,
}

impl Diff {
    pub fn put_count(&self) -> usize {
        self.to_put.iter().map(|t| t.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.put_count() == 0 && self.to_delete.is_empty()
    }
}

/// Diff `rows` against the previous view `old`
pub fn compute(old: &CvrData, rows: &[SyncRow]) -> Diff {
    let mut remaining = old.clone();
    let mut to_put: Vec<TablePuts> = Vec::new();
    let mut next_data = CvrData::new();

    for row in rows {
        if old.get(&row.key) != Some(&row.version) {
            let idx = match to_put.iter().position(|t| t.table == row.table) {
                Some(idx) => idx,
                None => {
                    to_put.push(TablePuts {
                        table: row.table.clone(),
                        rows: Vec::new(),
                    });
                    to_put.len() - 1
                }
            };
            to_put[idx].rows.push(PutRow {
                id: row.id.clone(),
                key: row.key.clone(),
            });
        }
        remaining.remove(&row.key);
        next_data.insert(row.key.clone(), row.version);
    }

    Diff {
        to_put,
        to_delete: remaining.into_keys().collect(),
        next_data,
    }
}
