//! Post-build structural check of a song master store.
//!
//! Checks run in a fixed order and the first violation is returned; there is
//! no aggregate report.

use crate::error::IntegrityError;
use crate::master_store::{META_SCHEMA_VERSION_KEY, MUSIC_TITLE_SEARCH_INDEX};
use crate::sqlite_persistence::{find_column, has_unique_index, index_exists, table_columns};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use tracing::info;

const REQUIRED_NOT_NULL: &[(&str, &str)] = &[
    ("music", "source_id"),
    ("music", "music_key"),
    ("music", "title_search_key"),
    ("chart", "music_id"),
    ("chart", "level"),
];

const REQUIRED_UNIQUE: &[(&str, &[&str])] = &[
    ("music", &["source_id"]),
    ("music", &["music_key"]),
    ("chart", &["music_id", "play_style", "difficulty"]),
];

fn check_not_null(conn: &Connection, table: &str, column: &str) -> Result<(), IntegrityError> {
    match find_column(conn, table, column)? {
        None => Err(IntegrityError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }),
        Some(info) if !info.non_null => Err(IntegrityError::NullableColumn {
            table: table.to_string(),
            column: column.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

fn persisted_schema_version(conn: &Connection) -> Result<Option<String>, IntegrityError> {
    if table_columns(conn, "meta")?.is_empty() {
        return Ok(None);
    }
    Ok(conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![META_SCHEMA_VERSION_KEY],
            |r| r.get(0),
        )
        .optional()?)
}

/// Run every structural check against `conn`. When `expected_schema_version`
/// is given, the persisted marker must equal it exactly.
pub fn validate_structure(
    conn: &Connection,
    expected_schema_version: Option<&str>,
) -> Result<(), IntegrityError> {
    for (table, column) in REQUIRED_NOT_NULL {
        check_not_null(conn, table, column)?;
    }

    for (table, columns) in REQUIRED_UNIQUE {
        if !has_unique_index(conn, table, columns)? {
            return Err(IntegrityError::MissingUniqueConstraint {
                table: table.to_string(),
                columns: columns.join(", "),
            });
        }
    }

    if !index_exists(conn, "music", MUSIC_TITLE_SEARCH_INDEX)? {
        return Err(IntegrityError::MissingIndex {
            table: "music".to_string(),
            index: MUSIC_TITLE_SEARCH_INDEX.to_string(),
        });
    }

    let null_search_keys: i64 = conn.query_row(
        "SELECT COUNT(*) FROM music WHERE title_search_key IS NULL",
        [],
        |r| r.get(0),
    )?;
    if null_search_keys > 0 {
        return Err(IntegrityError::NullValues {
            table: "music".to_string(),
            column: "title_search_key".to_string(),
            count: null_search_keys,
        });
    }

    if let Some(expected) = expected_schema_version {
        let found = persisted_schema_version(conn)?;
        if found.as_deref() != Some(expected) {
            return Err(IntegrityError::SchemaVersionMismatch {
                expected: expected.to_string(),
                found,
            });
        }
    }

    info!("Structural check passed");
    Ok(())
}

/// [`validate_structure`] on the store file at `path`, opened read-only.
pub fn validate_structure_at(
    path: &Path,
    expected_schema_version: Option<&str>,
) -> Result<(), IntegrityError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    validate_structure(&conn, expected_schema_version)
}
