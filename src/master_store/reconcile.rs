//! Soft-delete reconciliation of a record batch against the store.
//!
//! Every run deactivates all rows, then reactivates or inserts the rows the
//! batch still describes. A row is found by music key first and by upstream
//! source id second; a matched row takes over the record's source id, and any
//! other row holding that id gives it up in the same run. The caller runs this inside one transaction, so the
//! committed active set is always a function of a complete batch.

use super::keys::DerivedKeys;
use super::models::{ChartSlot, SongRecord};
use crate::error::{ReconciliationError, ValidationError};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Counters reported by one reconciliation run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub previous_active_music: i64,
    pub music_processed: usize,
    pub music_inserted: usize,
    pub chart_processed: usize,
    pub chart_inserted: usize,
    pub active_music: i64,
    pub active_charts: i64,
}

/// Reject the batch before any write if a record is malformed or an explicit
/// source id repeats.
pub fn check_batch(batch: &[SongRecord]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for record in batch {
        record.validate()?;
        if let Some(source_id) = &record.source_id {
            if !seen.insert(source_id.as_str()) {
                return Err(ValidationError::DuplicateSourceId(source_id.clone()));
            }
        }
    }
    Ok(())
}

pub(super) fn count_active(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE is_active = 1", table),
        [],
        |r| r.get(0),
    )
}

fn deactivate_all(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("UPDATE music SET is_active = 0", [])?;
    conn.execute("UPDATE chart SET is_active = 0", [])?;
    Ok(())
}

/// Records of one batch that share a music key, and so a music row.
struct MusicTarget<'a> {
    /// Record whose fields and source id the row takes.
    record: &'a SongRecord,
    keys: DerivedKeys,
    records: Vec<&'a SongRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resolution {
    /// Existing row with the same music key.
    Matched(i64),
    /// Existing row found through the upstream id, re-keyed to the new fields.
    Rekeyed(i64),
    New,
}

impl Resolution {
    fn music_id(self) -> Option<i64> {
        match self {
            Resolution::Matched(id) | Resolution::Rekeyed(id) => Some(id),
            Resolution::New => None,
        }
    }
}

/// Group the batch by music key, in order of first appearance. When records
/// of one group carry different upstream ids, the smallest one wins so the
/// outcome does not depend on record order.
fn group_by_music_key(batch: &[SongRecord]) -> Vec<MusicTarget<'_>> {
    let mut targets: Vec<MusicTarget> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();
    for record in batch {
        let keys = DerivedKeys::for_record(record);
        let existing = index_by_key.get(&keys.music_key).copied();
        match existing {
            Some(index) => {
                let target = &mut targets[index];
                if record.source_id.is_some() {
                    let takes_over = match &target.record.source_id {
                        None => true,
                        Some(current) => {
                            warn!(
                                "Source ids '{}' and '{}' share music key {}",
                                current, keys.source_id, keys.music_key
                            );
                            keys.source_id < target.keys.source_id
                        }
                    };
                    if takes_over {
                        target.record = record;
                        target.keys = keys;
                    }
                }
                target.records.push(record);
            }
            None => {
                index_by_key.insert(keys.music_key.clone(), targets.len());
                targets.push(MusicTarget {
                    record,
                    keys,
                    records: vec![record],
                });
            }
        }
    }
    targets
}

struct MusicIndex {
    by_key: HashMap<String, i64>,
    by_source: HashMap<String, i64>,
}

fn load_music_index(conn: &Connection) -> rusqlite::Result<MusicIndex> {
    let mut index = MusicIndex {
        by_key: HashMap::new(),
        by_source: HashMap::new(),
    };
    let mut stmt = conn.prepare("SELECT music_id, source_id, music_key FROM music")?;
    let rows = stmt.query_map([], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
    })?;
    for row in rows {
        let (music_id, source_id, music_key) = row?;
        index.by_key.insert(music_key, music_id);
        index.by_source.insert(source_id, music_id);
    }
    Ok(index)
}

/// Music key matches are claimed first, upstream id matches second, so a row
/// is never taken over through its old id by a record that merely reuses it.
fn resolve_targets(targets: &[MusicTarget], index: &MusicIndex) -> Vec<Resolution> {
    let mut claimed = HashSet::new();
    let mut resolutions: Vec<Resolution> = targets
        .iter()
        .map(|target| match index.by_key.get(&target.keys.music_key) {
            Some(&music_id) => {
                claimed.insert(music_id);
                Resolution::Matched(music_id)
            }
            None => Resolution::New,
        })
        .collect();
    for (target, resolution) in targets.iter().zip(resolutions.iter_mut()) {
        if *resolution != Resolution::New || target.record.source_id.is_none() {
            continue;
        }
        if let Some(&music_id) = index.by_source.get(&target.keys.source_id) {
            if claimed.insert(music_id) {
                *resolution = Resolution::Rekeyed(music_id);
            }
        }
    }
    resolutions
}

/// Rows whose source id is about to move to another row, or that take a new
/// source id themselves. Their ids are parked on a unique placeholder first so
/// swaps and reassignments never collide on `UNIQUE(source_id)`.
fn release_source_ids(
    conn: &Connection,
    targets: &[MusicTarget],
    resolutions: &[Resolution],
    index: &MusicIndex,
) -> rusqlite::Result<()> {
    let mut released = BTreeSet::new();
    for (target, resolution) in targets.iter().zip(resolutions) {
        let holder = index.by_source.get(&target.keys.source_id).copied();
        match resolution.music_id() {
            Some(music_id) if holder == Some(music_id) => {}
            Some(music_id) => {
                released.insert(music_id);
                released.extend(holder);
            }
            None => released.extend(holder),
        }
    }
    for music_id in released {
        debug!("Releasing source id of music {}", music_id);
        conn.execute(
            "UPDATE music SET source_id = source_id || '#released-' || music_id
             WHERE music_id = ?1",
            params![music_id],
        )?;
    }
    Ok(())
}

/// Returns the row's music id.
fn apply_music(
    conn: &Connection,
    target: &MusicTarget,
    resolution: Resolution,
    now: &str,
) -> rusqlite::Result<i64> {
    let record = target.record;
    let keys = &target.keys;
    match resolution {
        Resolution::Matched(music_id) => {
            conn.execute(
                "UPDATE music SET source_id = ?1, genre = ?2, is_active = 1,
                    last_seen_at = ?3, updated_at = ?3
                 WHERE music_id = ?4",
                params![keys.source_id, record.genre, now, music_id],
            )?;
            Ok(music_id)
        }
        Resolution::Rekeyed(music_id) => {
            debug!(
                "Re-keying music {} ({}) to '{}' / '{}'",
                music_id, keys.source_id, record.title, record.artist
            );
            conn.execute(
                "UPDATE music SET source_id = ?1, music_key = ?2, title = ?3,
                    normalized_title = ?4, artist = ?5, normalized_artist = ?6, genre = ?7,
                    title_search_key = ?8, is_active = 1, last_seen_at = ?9, updated_at = ?9
                 WHERE music_id = ?10",
                params![
                    keys.source_id,
                    keys.music_key,
                    record.title,
                    keys.normalized_title,
                    record.artist,
                    keys.normalized_artist,
                    record.genre,
                    keys.title_search_key,
                    now,
                    music_id
                ],
            )?;
            Ok(music_id)
        }
        Resolution::New => {
            conn.execute(
                "INSERT INTO music (source_id, music_key, title, normalized_title, artist,
                    normalized_artist, genre, title_search_key, is_active,
                    last_seen_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9, ?9)",
                params![
                    keys.source_id,
                    keys.music_key,
                    record.title,
                    keys.normalized_title,
                    record.artist,
                    keys.normalized_artist,
                    record.genre,
                    keys.title_search_key,
                    now
                ],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

/// Returns whether the chart was inserted.
fn upsert_chart(
    conn: &Connection,
    music_id: i64,
    slot: ChartSlot,
    level: u32,
    now: &str,
) -> rusqlite::Result<bool> {
    let play_style = slot.play_style.as_db_str();
    let difficulty = slot.difficulty.as_db_str();
    let existing: Option<i64> = conn
        .query_row(
            "SELECT chart_id FROM chart
             WHERE music_id = ?1 AND play_style = ?2 AND difficulty = ?3",
            params![music_id, play_style, difficulty],
            |r| r.get(0),
        )
        .optional()?;
    match existing {
        Some(chart_id) => {
            conn.execute(
                "UPDATE chart SET level = ?1, is_active = 1, last_seen_at = ?2, updated_at = ?2
                 WHERE chart_id = ?3",
                params![level, now, chart_id],
            )?;
            Ok(false)
        }
        None => {
            conn.execute(
                "INSERT INTO chart (music_id, play_style, difficulty, level, is_active,
                    last_seen_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5, ?5)",
                params![music_id, play_style, difficulty, level, now],
            )?;
            Ok(true)
        }
    }
}

/// Apply `batch` on `conn`. Must run inside a transaction the caller commits
/// only on success.
pub(super) fn reconcile_batch(
    conn: &Connection,
    batch: &[SongRecord],
    now: &str,
) -> Result<ReconcileStats, ReconciliationError> {
    check_batch(batch)?;

    let mut stats = ReconcileStats {
        previous_active_music: count_active(conn, "music")?,
        ..Default::default()
    };
    info!(
        "Reconciling {} records, {} music rows active before",
        batch.len(),
        stats.previous_active_music
    );

    deactivate_all(conn)?;

    let targets = group_by_music_key(batch);
    let index = load_music_index(conn)?;
    let resolutions = resolve_targets(&targets, &index);
    release_source_ids(conn, &targets, &resolutions, &index)?;

    for (target, &resolution) in targets.iter().zip(&resolutions) {
        let music_id = apply_music(conn, target, resolution, now)?;
        stats.music_processed += target.records.len();
        if resolution == Resolution::New {
            stats.music_inserted += 1;
        }
        for record in &target.records {
            for (slot, level) in record.levels.present() {
                if upsert_chart(conn, music_id, slot, level, now)? {
                    stats.chart_inserted += 1;
                }
                stats.chart_processed += 1;
            }
        }
    }

    stats.active_music = count_active(conn, "music")?;
    stats.active_charts = count_active(conn, "chart")?;
    info!(
        "Reconciled: {} music ({} new), {} charts ({} new); active {} music / {} charts",
        stats.music_processed,
        stats.music_inserted,
        stats.chart_processed,
        stats.chart_inserted,
        stats.active_music,
        stats.active_charts
    );
    Ok(stats)
}
