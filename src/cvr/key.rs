//! Sync key construction

/// Build the sync key for a row: `/<table>/<scope...>`.
///
/// Scope values come from the table's key columns, which must be immutable
/// for the row's lifetime. A table with no key columns maps to `/<table>`.
pub fn build_key<S: AsRef<str>>(table: &str, scope: &[S]) -> String {
    let len = 1 + table.len() + scope.iter().map(|s| s.as_ref().len() + 1).sum::<usize>();
    let mut key = String::with_capacity(len);
    key.push('/');
    key.push_str(table);
    for value in scope {
        key.push('/');
        key.push_str(value.as_ref());
    }
    key
}
