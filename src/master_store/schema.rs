//! SQLite schema of the song master store.
//!
//! `music_id` and `chart_id` are the identifiers handed to external consumers.
//! Both use AUTOINCREMENT so an id is never handed out twice, and rows are
//! never deleted, only flagged inactive.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

/// Value of the `schema_version` row in `meta`.
pub const SCHEMA_VERSION: &str = "1";

pub const META_SCHEMA_VERSION_KEY: &str = "schema_version";

pub const MUSIC_TITLE_SEARCH_INDEX: &str = "idx_music_title_search_key";

const MUSIC_TABLE: Table = Table {
    name: "music",
    columns: &[
        sqlite_column!(
            "music_id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!("source_id", &SqlType::Text, non_null = true),
        sqlite_column!("music_key", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("normalized_title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("normalized_artist", &SqlType::Text, non_null = true),
        sqlite_column!("genre", &SqlType::Text),
        sqlite_column!("title_search_key", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("last_seen_at", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[(MUSIC_TITLE_SEARCH_INDEX, "title_search_key")],
    unique_constraints: &[&["source_id"], &["music_key"]],
};

const MUSIC_FK: ForeignKey = ForeignKey {
    foreign_table: "music",
    foreign_column: "music_id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const CHART_TABLE: Table = Table {
    name: "chart",
    columns: &[
        sqlite_column!(
            "chart_id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!(
            "music_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&MUSIC_FK)
        ),
        sqlite_column!("play_style", &SqlType::Text, non_null = true), // 'SP', 'DP'
        sqlite_column!("difficulty", &SqlType::Text, non_null = true),
        sqlite_column!("level", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "is_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("last_seen_at", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_chart_music_id", "music_id")],
    unique_constraints: &[&["music_id", "play_style", "difficulty"]],
};

const META_TABLE: Table = Table {
    name: "meta",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const SONG_MASTER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[MUSIC_TABLE, CHART_TABLE, META_TABLE],
    migration: None,
}];
