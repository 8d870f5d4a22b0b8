//! SQLite-backed song master store.
//!
//! The store owns its single connection; [`SongMasterStore::reconcile`] takes
//! `&mut self`, so a batch always has exclusive access for its whole
//! deactivate/reactivate sequence.

use super::models::{ChartEntity, ChartSlot, Difficulty, MusicEntity, PlayStyle, SongRecord};
use super::reconcile::{count_active, reconcile_batch, ReconcileStats};
use super::schema::{META_SCHEMA_VERSION_KEY, SCHEMA_VERSION, SONG_MASTER_VERSIONED_SCHEMAS};
use crate::error::ReconciliationError;
use crate::sqlite_persistence::{VersionedSchema, BASE_DB_VERSION};
use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct SongMasterStore {
    conn: Connection,
    path: Option<PathBuf>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    migrate_schemas(conn, SONG_MASTER_VERSIONED_SCHEMAS)
}

/// Bring `conn` to the last schema of `schemas`, creating it from scratch on
/// an empty database. `schemas[i].version` must equal `i`.
fn migrate_schemas(conn: &mut Connection, schemas: &[VersionedSchema]) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = schemas.len() - 1;
    let latest_schema = &schemas[latest_version];

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;

    if table_count == 0 {
        info!("Creating song master schema at version {}", latest_version);
        let tx = conn.transaction()?;
        latest_schema.create(&tx)?;
        tx.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)",
            params![META_SCHEMA_VERSION_KEY, SCHEMA_VERSION],
        )?;
        tx.commit()?;
        return Ok(());
    }

    if db_version < BASE_DB_VERSION as i64 {
        bail!(
            "Database has {} tables but user_version {}, not a song master store",
            table_count,
            db_version
        );
    }
    let mut current_version = (db_version - BASE_DB_VERSION as i64) as usize;
    if current_version > latest_version {
        bail!(
            "Database schema version {} is newer than the latest known version {}",
            current_version,
            latest_version
        );
    }

    if current_version < latest_version {
        let tx = conn.transaction()?;
        for schema in schemas.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating song master db from version {} to {}",
                    current_version, schema.version
                );
                migration_fn(&tx)?;
                current_version = schema.version;
            }
        }
        tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
        tx.commit()?;
    }

    latest_schema
        .validate(conn)
        .context("Song master store does not match the declared schema")
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn music_from_row(row: &Row) -> rusqlite::Result<MusicEntity> {
    Ok(MusicEntity {
        music_id: row.get(0)?,
        source_id: row.get(1)?,
        music_key: row.get(2)?,
        title: row.get(3)?,
        normalized_title: row.get(4)?,
        artist: row.get(5)?,
        normalized_artist: row.get(6)?,
        genre: row.get(7)?,
        title_search_key: row.get(8)?,
        is_active: row.get::<_, i64>(9)? != 0,
        last_seen_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

const MUSIC_COLUMNS: &str = "music_id, source_id, music_key, title, normalized_title, artist,
    normalized_artist, genre, title_search_key, is_active, last_seen_at, created_at, updated_at";

fn chart_from_row(row: &Row) -> rusqlite::Result<ChartEntity> {
    let play_style: String = row.get(2)?;
    let difficulty: String = row.get(3)?;
    let invalid = |column: usize, value: &str| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("unknown value '{}'", value).into(),
        )
    };
    let slot = ChartSlot {
        play_style: PlayStyle::from_db_str(&play_style)
            .ok_or_else(|| invalid(2, &play_style))?,
        difficulty: Difficulty::from_db_str(&difficulty)
            .ok_or_else(|| invalid(3, &difficulty))?,
    };
    Ok(ChartEntity {
        chart_id: row.get(0)?,
        music_id: row.get(1)?,
        slot,
        level: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        last_seen_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl SongMasterStore {
    /// Open the store at `path`, creating the schema for a new file and
    /// validating the shape of an existing one.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open song master store {:?}", path))?;
        let mut store = Self::from_connection(conn)?;
        store.path = Some(path.to_path_buf());

        info!(
            "Opened song master store {:?}: {} active music, {} active charts",
            path,
            store.active_music_count()?,
            store.active_chart_count()?
        );
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate_if_needed(&mut conn)?;
        Ok(SongMasterStore { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Apply `batch` as one unit of work: all rows are deactivated, then every
    /// song and chart in the batch is reactivated or inserted. Nothing is
    /// committed unless the whole batch succeeds.
    pub fn reconcile(
        &mut self,
        batch: &[SongRecord],
    ) -> Result<ReconcileStats, ReconciliationError> {
        let now = now_timestamp();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stats = reconcile_batch(&tx, batch, &now)?;
        tx.commit()?;
        Ok(stats)
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![META_SCHEMA_VERSION_KEY],
                |r| r.get(0),
            )
            .optional()?)
    }

    pub fn active_music_count(&self) -> Result<i64> {
        Ok(count_active(&self.conn, "music")?)
    }

    pub fn active_chart_count(&self) -> Result<i64> {
        Ok(count_active(&self.conn, "chart")?)
    }

    pub fn music_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM music", [], |r| r.get(0))?)
    }

    pub fn chart_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM chart", [], |r| r.get(0))?)
    }

    pub fn find_music_by_key(&self, music_key: &str) -> Result<Option<MusicEntity>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM music WHERE music_key = ?1", MUSIC_COLUMNS),
                params![music_key],
                music_from_row,
            )
            .optional()?)
    }

    pub fn find_music_by_source_id(&self, source_id: &str) -> Result<Option<MusicEntity>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM music WHERE source_id = ?1", MUSIC_COLUMNS),
                params![source_id],
                music_from_row,
            )
            .optional()?)
    }

    /// Charts of a song, active or not, in insertion order.
    pub fn charts_for_music(&self, music_id: i64) -> Result<Vec<ChartEntity>> {
        let mut stmt = self.conn.prepare(
            "SELECT chart_id, music_id, play_style, difficulty, level, is_active,
                last_seen_at, created_at, updated_at
             FROM chart WHERE music_id = ?1 ORDER BY chart_id",
        )?;
        let charts = stmt
            .query_map(params![music_id], chart_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(charts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master_store::keys::music_key;
    use crate::master_store::models::ChartLevels;
    use tempfile::TempDir;

    fn record(source_id: &str, title: &str, levels: [Option<u32>; 9]) -> SongRecord {
        SongRecord {
            source_id: Some(source_id.to_string()),
            title: title.to_string(),
            artist: "Artist".to_string(),
            genre: Some("GENRE".to_string()),
            levels: ChartLevels::new(levels),
        }
    }

    fn sp_hyper(level: u32) -> [Option<u32>; 9] {
        [None, None, Some(level), None, None, None, None, None, None]
    }

    fn chart_ids(store: &SongMasterStore) -> Vec<(i64, i64)> {
        let mut stmt = store
            .connection()
            .prepare("SELECT chart_id, music_id FROM chart ORDER BY chart_id")
            .unwrap();
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_new_store_has_schema_version() {
        let store = SongMasterStore::open_in_memory().unwrap();
        assert_eq!(
            store.schema_version().unwrap().as_deref(),
            Some(SCHEMA_VERSION)
        );
        let user_version: i64 = store
            .connection()
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(user_version as usize, BASE_DB_VERSION);
    }

    fn record_migration(conn: &Connection) -> Result<()> {
        conn.execute("INSERT INTO meta (key, value) VALUES ('migrated', 'yes')", [])?;
        Ok(())
    }

    fn two_version_schemas() -> Vec<VersionedSchema> {
        let tables = SONG_MASTER_VERSIONED_SCHEMAS[0].tables;
        vec![
            VersionedSchema {
                version: 0,
                tables,
                migration: None,
            },
            VersionedSchema {
                version: 1,
                tables,
                migration: Some(record_migration),
            },
        ]
    }

    fn user_version(conn: &Connection) -> usize {
        conn.query_row("PRAGMA user_version", [], |r| r.get::<_, i64>(0))
            .unwrap() as usize
    }

    #[test]
    fn test_older_store_is_migrated_to_latest_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.sqlite");
        let schemas = two_version_schemas();
        {
            let mut conn = Connection::open(&path).unwrap();
            migrate_schemas(&mut conn, &schemas[..1]).unwrap();
            assert_eq!(user_version(&conn), BASE_DB_VERSION);
        }

        let mut conn = Connection::open(&path).unwrap();
        migrate_schemas(&mut conn, &schemas).unwrap();
        assert_eq!(user_version(&conn), BASE_DB_VERSION + 1);
        let migrated: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'migrated'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(migrated, "yes");

        // Already at the latest version, nothing runs twice.
        migrate_schemas(&mut conn, &schemas).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM meta WHERE key = 'migrated'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_newer_store_is_rejected() {
        let schemas = two_version_schemas();
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_schemas(&mut conn, &schemas).unwrap();
        assert_eq!(user_version(&conn), BASE_DB_VERSION + 1);

        let err = migrate_schemas(&mut conn, &schemas[..1]).unwrap_err();
        assert!(err.to_string().contains("newer than the latest known version"));
    }

    #[test]
    fn test_reopen_existing_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.sqlite");
        {
            let mut store = SongMasterStore::open(&path).unwrap();
            store
                .reconcile(&[record("T001", "One", sp_hyper(5))])
                .unwrap();
        }
        let store = SongMasterStore::open(&path).unwrap();
        assert_eq!(store.active_music_count().unwrap(), 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_open_rejects_foreign_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.sqlite");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE unrelated (id INTEGER)", [])
                .unwrap();
        }
        let err = SongMasterStore::open(&path).err().unwrap();
        assert!(err.to_string().contains("not a song master store"));
    }

    #[test]
    fn test_reconcile_twice_keeps_ids_and_active_set() {
        let mut store = SongMasterStore::open_in_memory().unwrap();
        let batch = vec![
            record("T001", "One", sp_hyper(5)),
            record(
                "T002",
                "Two",
                [Some(1), Some(3), Some(6), Some(9), None, Some(4), Some(7), Some(10), None],
            ),
        ];

        let first = store.reconcile(&batch).unwrap();
        assert_eq!(first.music_inserted, 2);
        assert_eq!(first.chart_inserted, 7);
        let ids_before = chart_ids(&store);
        let music_before = store.find_music_by_source_id("T002").unwrap().unwrap();

        let second = store.reconcile(&batch).unwrap();
        assert_eq!(second.previous_active_music, 2);
        assert_eq!(second.music_inserted, 0);
        assert_eq!(second.chart_inserted, 0);
        assert_eq!(second.chart_processed, 7);
        assert_eq!(second.active_music, 2);
        assert_eq!(second.active_charts, 7);
        assert_eq!(chart_ids(&store), ids_before);

        let music_after = store.find_music_by_source_id("T002").unwrap().unwrap();
        assert_eq!(music_after.music_id, music_before.music_id);
        assert!(music_after.is_active);
        assert_eq!(music_after.created_at, music_before.created_at);
    }

    #[test]
    fn test_missing_song_is_deactivated_not_deleted() {
        let mut store = SongMasterStore::open_in_memory().unwrap();
        store
            .reconcile(&[
                record("T001", "One", sp_hyper(5)),
                record("T002", "Two", sp_hyper(8)),
            ])
            .unwrap();
        let gone = store.find_music_by_source_id("T002").unwrap().unwrap();

        let stats = store
            .reconcile(&[record("T001", "One", sp_hyper(5))])
            .unwrap();
        assert_eq!(stats.active_music, 1);
        assert_eq!(stats.active_charts, 1);
        assert_eq!(store.music_count().unwrap(), 2);
        assert_eq!(store.chart_count().unwrap(), 2);

        let after = store.find_music_by_source_id("T002").unwrap().unwrap();
        assert_eq!(after.music_id, gone.music_id);
        assert!(!after.is_active);
        let charts = store.charts_for_music(after.music_id).unwrap();
        assert_eq!(charts.len(), 1);
        assert!(!charts[0].is_active);

        // Coming back reuses the same ids.
        store
            .reconcile(&[
                record("T001", "One", sp_hyper(5)),
                record("T002", "Two", sp_hyper(9)),
            ])
            .unwrap();
        let back = store.find_music_by_source_id("T002").unwrap().unwrap();
        assert_eq!(back.music_id, gone.music_id);
        let charts_back = store.charts_for_music(back.music_id).unwrap();
        assert_eq!(charts_back[0].chart_id, charts[0].chart_id);
        assert_eq!(charts_back[0].level, 9);
        assert!(charts_back[0].is_active);
    }

    #[test]
    fn test_absent_level_is_skipped_and_chart_stays_inactive() {
        let mut store = SongMasterStore::open_in_memory().unwrap();
        let mut levels = sp_hyper(5);
        levels[3] = Some(10);
        store.reconcile(&[record("T001", "One", levels)]).unwrap();

        store
            .reconcile(&[record("T001", "One", sp_hyper(5))])
            .unwrap();
        let music = store.find_music_by_source_id("T001").unwrap().unwrap();
        let charts = store.charts_for_music(music.music_id).unwrap();
        assert_eq!(charts.len(), 2);
        let another = charts
            .iter()
            .find(|c| c.slot.difficulty == Difficulty::Another)
            .unwrap();
        assert!(!another.is_active);
        assert_eq!(another.level, 10);
    }

    #[test]
    fn test_matching_is_by_normalized_title_and_artist() {
        let mut store = SongMasterStore::open_in_memory().unwrap();
        let mut plain = record("T001", "Title", sp_hyper(5));
        plain.source_id = None;
        store.reconcile(&[plain.clone()]).unwrap();
        let first = store
            .find_music_by_key(&music_key("Title", "Artist"))
            .unwrap()
            .unwrap();
        assert_eq!(first.source_id, first.music_key);

        let mut variant = plain;
        variant.title = "  ＴＩＴＬＥ ".to_string();
        variant.genre = None;
        let stats = store.reconcile(&[variant]).unwrap();
        assert_eq!(stats.music_inserted, 0);

        let second = store.find_music_by_key(&first.music_key).unwrap().unwrap();
        assert_eq!(second.music_id, first.music_id);
        assert_eq!(second.genre, None);
        assert_eq!(second.title, "Title");
    }

    #[test]
    fn test_retitled_song_keeps_its_id_through_source_id() {
        let mut store = SongMasterStore::open_in_memory().unwrap();
        store
            .reconcile(&[record("T001", "Old Title", sp_hyper(5))])
            .unwrap();
        let before = store.find_music_by_source_id("T001").unwrap().unwrap();

        let stats = store
            .reconcile(&[record("T001", "New Title", sp_hyper(5))])
            .unwrap();
        assert_eq!(stats.music_inserted, 0);
        assert_eq!(stats.chart_inserted, 0);

        let after = store.find_music_by_source_id("T001").unwrap().unwrap();
        assert_eq!(after.music_id, before.music_id);
        assert_eq!(after.title, "New Title");
        assert_eq!(after.music_key, music_key("New Title", "Artist"));
        assert_eq!(after.title_search_key, "new title");
    }

    fn music_rows(store: &SongMasterStore) -> Vec<(i64, String, String, bool)> {
        let mut stmt = store
            .connection()
            .prepare("SELECT music_id, source_id, title, is_active FROM music ORDER BY music_id")
            .unwrap();
        stmt.query_map([], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get::<_, i64>(3)? != 0))
        })
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
    }

    #[test]
    fn test_reassigned_source_id_moves_in_either_record_order() {
        let reassigned = [
            record("T005", "One", sp_hyper(5)),
            record("T001", "Brand New", sp_hyper(7)),
        ];
        let mut results = Vec::new();
        for batch in [reassigned.to_vec(), reassigned.iter().rev().cloned().collect()] {
            let mut store = SongMasterStore::open_in_memory().unwrap();
            store
                .reconcile(&[record("T001", "One", sp_hyper(5))])
                .unwrap();
            let original = store.find_music_by_source_id("T001").unwrap().unwrap();

            let stats = store.reconcile(&batch).unwrap();
            assert_eq!(stats.music_inserted, 1);
            assert_eq!(stats.active_music, 2);

            let one = store.find_music_by_source_id("T005").unwrap().unwrap();
            assert_eq!(one.music_id, original.music_id);
            assert_eq!(one.title, "One");
            let brand_new = store.find_music_by_source_id("T001").unwrap().unwrap();
            assert_ne!(brand_new.music_id, original.music_id);
            assert_eq!(brand_new.title, "Brand New");

            results.push((music_rows(&store), chart_ids(&store)));
        }
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn test_swapped_source_ids_follow_their_songs() {
        let swapped = [
            record("T002", "One", sp_hyper(5)),
            record("T001", "Two", sp_hyper(8)),
        ];
        for batch in [swapped.to_vec(), swapped.iter().rev().cloned().collect()] {
            let mut store = SongMasterStore::open_in_memory().unwrap();
            store
                .reconcile(&[
                    record("T001", "One", sp_hyper(5)),
                    record("T002", "Two", sp_hyper(8)),
                ])
                .unwrap();
            let ids_before = chart_ids(&store);

            let stats = store.reconcile(&batch).unwrap();
            assert_eq!(stats.music_inserted, 0);
            assert_eq!(stats.chart_inserted, 0);
            assert_eq!(chart_ids(&store), ids_before);

            let rows = music_rows(&store);
            assert_eq!(
                rows.iter()
                    .map(|(_, source, title, active)| (source.as_str(), title.as_str(), *active))
                    .collect::<Vec<_>>(),
                vec![("T002", "One", true), ("T001", "Two", true)]
            );
        }
    }

    #[test]
    fn test_dropped_row_gives_up_reused_source_id() {
        let mut store = SongMasterStore::open_in_memory().unwrap();
        store
            .reconcile(&[
                record("T001", "One", sp_hyper(5)),
                record("T002", "Two", sp_hyper(8)),
            ])
            .unwrap();
        let two = store.find_music_by_source_id("T002").unwrap().unwrap();

        // "Two" disappears and its upstream id is handed to a song that
        // already has a row under another id.
        store
            .reconcile(&[record("T002", "One", sp_hyper(5))])
            .unwrap();

        let one = store.find_music_by_source_id("T002").unwrap().unwrap();
        assert_eq!(one.title, "One");
        assert!(one.is_active);
        assert!(store.find_music_by_source_id("T001").unwrap().is_none());

        let retired = store.find_music_by_key(&two.music_key).unwrap().unwrap();
        assert_eq!(retired.music_id, two.music_id);
        assert!(!retired.is_active);
        assert_eq!(retired.source_id, format!("T002#released-{}", two.music_id));
    }

    #[test]
    fn test_failed_batch_leaves_store_untouched() {
        let mut store = SongMasterStore::open_in_memory().unwrap();
        store
            .reconcile(&[record("T001", "One", sp_hyper(5))])
            .unwrap();

        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_level BEFORE INSERT ON chart WHEN NEW.level > 20
                 BEGIN SELECT RAISE(ABORT, 'level out of range'); END;",
            )
            .unwrap();

        // The third record fails after the first two were written.
        let err = store
            .reconcile(&[
                record("T001", "One", sp_hyper(6)),
                record("T002", "Two", sp_hyper(6)),
                record("T003", "Three", sp_hyper(99)),
            ])
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::Store(_)));

        assert_eq!(store.music_count().unwrap(), 1);
        assert_eq!(store.active_music_count().unwrap(), 1);
        let music = store.find_music_by_source_id("T001").unwrap().unwrap();
        assert_eq!(store.charts_for_music(music.music_id).unwrap()[0].level, 5);
    }

    #[test]
    fn test_invalid_record_aborts_before_any_write() {
        let mut store = SongMasterStore::open_in_memory().unwrap();
        store
            .reconcile(&[record("T001", "One", sp_hyper(5))])
            .unwrap();

        let err = store
            .reconcile(&[
                record("T002", "Two", sp_hyper(5)),
                record("T003", "", sp_hyper(5)),
            ])
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::InvalidRecord(_)));
        assert_eq!(store.music_count().unwrap(), 1);
        assert_eq!(store.active_music_count().unwrap(), 1);
    }
}
