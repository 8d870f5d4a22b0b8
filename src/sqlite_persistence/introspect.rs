//! Read-only helpers over SQLite's schema pragmas.
//!
//! Shared by schema validation at open time and by the post-build structural
//! check, which both need to look at the live shape of a table rather than at
//! the statements that created it.

use rusqlite::{params, Connection, OptionalExtension};

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub non_null: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

/// Columns of `table` in declaration order. Empty when the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                declared_type: row.get::<_, String>(2)?.to_uppercase(),
                non_null: row.get::<_, i32>(3)? == 1,
                default_value: row.get(4)?,
                is_primary_key: row.get::<_, i32>(5)? >= 1,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

pub fn find_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> rusqlite::Result<Option<ColumnInfo>> {
    Ok(table_columns(conn, table)?
        .into_iter()
        .find(|c| c.name == column))
}

/// Column sets (each sorted) of every unique index on `table`, including the
/// automatic indices SQLite builds for UNIQUE constraints.
pub fn unique_index_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<Vec<String>>> {
    let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", table))?;
    let unique_indices: Vec<String> = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let is_unique: i32 = row.get(2)?;
            Ok((name, is_unique))
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|(_, is_unique)| *is_unique == 1)
        .map(|(name, _)| name)
        .collect();

    let mut sets = Vec::with_capacity(unique_indices.len());
    for index_name in &unique_indices {
        let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
        let mut cols: Vec<String> = idx_stmt
            .query_map([], |row| row.get::<_, String>(2))?
            .collect::<Result<Vec<_>, _>>()?;
        cols.sort();
        sets.push(cols);
    }
    Ok(sets)
}

/// Whether `table` carries a unique index over exactly `columns`, in any order.
pub fn has_unique_index(conn: &Connection, table: &str, columns: &[&str]) -> rusqlite::Result<bool> {
    let mut expected: Vec<&str> = columns.to_vec();
    expected.sort();
    Ok(unique_index_columns(conn, table)?
        .iter()
        .any(|actual| actual.iter().map(|s| s.as_str()).eq(expected.iter().copied())))
}

pub fn index_exists(conn: &Connection, table: &str, index_name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
        params![index_name, table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}
