//! Song records from the catalog's three script tables.
//!
//! `titletbl` maps a song key to `[version, source_id, option, genre, artist,
//! title, ...]`. `actbl` maps the same key to `[flags, level, attribute, ...]`
//! with ten (level, attribute) pairs: SP beginner..leggendaria, then DP
//! beginner..leggendaria. `datatbl` is extracted so a broken file fails the
//! build, but nothing in it feeds the records.

use crate::error::{ExtractionError, ValidationError};
use crate::literal::{extract_table, LiteralTable};
use crate::master_store::{ChartLevels, ChartSlot, Difficulty, PlayStyle, SongRecord};
use serde_json::Value;
use tracing::{debug, info};

pub const TITLE_TABLE: &str = "titletbl";
pub const DATA_TABLE: &str = "datatbl";
pub const LEVEL_TABLE: &str = "actbl";

/// Script file names, as fetched next to each other.
pub const SOURCE_FILES: [&str; 3] = ["titletbl.js", "datatbl.js", "actbl.js"];

const TITLE_MIN_ELEMENTS: usize = 6;

/// Level-table slot order. `None` marks DP beginner, which has no chart.
const LEVEL_TABLE_SLOTS: [Option<(PlayStyle, Difficulty)>; 10] = [
    Some((PlayStyle::Sp, Difficulty::Beginner)),
    Some((PlayStyle::Sp, Difficulty::Normal)),
    Some((PlayStyle::Sp, Difficulty::Hyper)),
    Some((PlayStyle::Sp, Difficulty::Another)),
    Some((PlayStyle::Sp, Difficulty::Leggendaria)),
    None,
    Some((PlayStyle::Dp, Difficulty::Normal)),
    Some((PlayStyle::Dp, Difficulty::Hyper)),
    Some((PlayStyle::Dp, Difficulty::Another)),
    Some((PlayStyle::Dp, Difficulty::Leggendaria)),
];

pub struct TextageTables {
    pub titles: LiteralTable,
    pub data: LiteralTable,
    pub levels: LiteralTable,
}

impl TextageTables {
    /// Extract all three tables from the script sources.
    pub fn extract(title_js: &str, data_js: &str, act_js: &str) -> Result<Self, ExtractionError> {
        let tables = TextageTables {
            titles: extract_table(title_js, TITLE_TABLE)?,
            data: extract_table(data_js, DATA_TABLE)?,
            levels: extract_table(act_js, LEVEL_TABLE)?,
        };
        info!(
            "Extracted {} titles, {} data rows, {} level rows",
            tables.titles.len(),
            tables.data.len(),
            tables.levels.len()
        );
        Ok(tables)
    }
}

#[derive(Debug, Default)]
pub struct TextageBatch {
    pub records: Vec<SongRecord>,
    /// Title entries without any playable chart.
    pub ignored: usize,
}

fn malformed(key: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::MalformedEntry {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn text_at(entry: &[Value], index: usize) -> String {
    match entry.get(index) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// A level is a positive integer or one hex letter `A`..`F` for 10..15.
/// Zero and negative values mean the chart does not exist.
fn parse_level_value(key: &str, value: &Value) -> Result<Option<u32>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => match n.as_i64() {
            Some(level) if level > 0 => u32::try_from(level)
                .map(Some)
                .map_err(|_| malformed(key, format!("level {} out of range", level))),
            Some(_) => Ok(None),
            None => Err(malformed(key, format!("level {} is not an integer", n))),
        },
        Value::String(s) => match s.as_str() {
            "A" | "B" | "C" | "D" | "E" | "F" => u32::from_str_radix(s, 16)
                .map(Some)
                .map_err(|_| malformed(key, format!("bad level '{}'", s))),
            _ => match s.trim().parse::<i64>() {
                Ok(level) if level > 0 => u32::try_from(level)
                    .map(Some)
                    .map_err(|_| malformed(key, format!("level {} out of range", level))),
                Ok(_) => Ok(None),
                Err(_) => Err(malformed(key, format!("bad level '{}'", s))),
            },
        },
        other => Err(malformed(key, format!("bad level {}", other))),
    }
}

fn levels_from_entry(key: &str, entry: &[Value]) -> Result<ChartLevels, ValidationError> {
    let mut levels = ChartLevels::default();
    for (index, slot) in LEVEL_TABLE_SLOTS.iter().enumerate() {
        let Some((play_style, difficulty)) = slot else {
            continue;
        };
        let Some(value) = entry.get(1 + index * 2) else {
            break;
        };
        let slot = ChartSlot {
            play_style: *play_style,
            difficulty: *difficulty,
        };
        levels.set(slot, parse_level_value(key, value)?);
    }
    Ok(levels)
}

/// Join the title and level tables into records, in ascending key order.
pub fn songs_from_textage(tables: &TextageTables) -> Result<TextageBatch, ValidationError> {
    let mut keys: Vec<&String> = tables.titles.keys().collect();
    keys.sort();

    let mut batch = TextageBatch::default();
    for key in keys {
        let entry = tables.titles[key.as_str()]
            .as_array()
            .ok_or_else(|| malformed(key, "title entry is not an array"))?;
        if entry.len() < TITLE_MIN_ELEMENTS {
            return Err(ValidationError::InsufficientCells {
                found: entry.len(),
                expected: TITLE_MIN_ELEMENTS,
            });
        }
        let source_id = text_at(entry, 1);
        if source_id.is_empty() {
            return Err(malformed(key, "empty source id"));
        }
        let genre = text_at(entry, 3);
        let artist = text_at(entry, 4);
        let title = text_at(entry, 5);
        if title.is_empty() {
            return Err(ValidationError::EmptyField("title"));
        }
        if artist.is_empty() {
            return Err(ValidationError::EmptyField("artist"));
        }

        let levels = match tables.levels.get(key.as_str()) {
            Some(Value::Array(level_entry)) => levels_from_entry(key, level_entry)?,
            Some(_) => return Err(malformed(key, "level entry is not an array")),
            None => ChartLevels::default(),
        };
        if levels.is_empty() {
            debug!("Ignoring {} ({}): no playable chart", key, title);
            batch.ignored += 1;
            continue;
        }

        batch.records.push(SongRecord {
            source_id: Some(source_id),
            title,
            artist,
            genre: (!genre.is_empty()).then_some(genre),
            levels,
        });
    }
    info!(
        "Built {} records from script tables, ignored {}",
        batch.records.len(),
        batch.ignored
    );
    Ok(batch)
}
