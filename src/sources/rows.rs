//! Song records from positional table rows.
//!
//! A row carries at least 13 text cells: nine levels (SP beginner, normal,
//! hyper, another, leggendaria, then DP normal, hyper, another, leggendaria),
//! the tempo (unused), genre, title and artist. Rows arrive as tab-separated
//! lines, one row per line.

use crate::error::ValidationError;
use crate::master_store::{ChartLevels, SongRecord};
use lazy_static::lazy_static;
use regex::Regex;

pub const ROW_CELLS: usize = 13;

const GENRE_CELL: usize = 10;
const TITLE_CELL: usize = 11;
const ARTIST_CELL: usize = 12;

/// Level shown when a chart does not exist.
const ABSENT_SENTINEL: &str = "-";

lazy_static! {
    static ref BRACKETED_SUFFIX: Regex = Regex::new(r"\[[^\]]+\]").unwrap();
}

/// Parse one level cell. `-` or empty is an absent chart; annotations such as
/// `[CN]` are dropped before the digits are read.
pub fn parse_level_cell(text: &str) -> Result<Option<u32>, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == ABSENT_SENTINEL {
        return Ok(None);
    }
    let stripped = BRACKETED_SUFFIX.replace_all(trimmed, "");
    let stripped = stripped.trim();
    if stripped.is_empty() || stripped == ABSENT_SENTINEL {
        return Ok(None);
    }
    if !stripped.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidLevel(text.to_string()));
    }
    match stripped.parse::<u32>() {
        Ok(level) if level > 0 => Ok(Some(level)),
        _ => Err(ValidationError::InvalidLevel(text.to_string())),
    }
}

fn cell_text<S: AsRef<str>>(cells: &[S], index: usize) -> &str {
    cells[index].as_ref().trim()
}

pub fn parse_song_row<S: AsRef<str>>(cells: &[S]) -> Result<SongRecord, ValidationError> {
    if cells.len() < ROW_CELLS {
        return Err(ValidationError::InsufficientCells {
            found: cells.len(),
            expected: ROW_CELLS,
        });
    }
    let cell = |index: usize| cell_text(cells, index);

    let mut levels = [None; 9];
    for (index, level) in levels.iter_mut().enumerate() {
        *level = parse_level_cell(cell(index))?;
    }

    let title = cell(TITLE_CELL);
    if title.is_empty() {
        return Err(ValidationError::EmptyField("title"));
    }
    let artist = cell(ARTIST_CELL);
    if artist.is_empty() {
        return Err(ValidationError::EmptyField("artist"));
    }
    let levels = ChartLevels::new(levels);
    if levels.is_empty() {
        return Err(ValidationError::NoCharts {
            title: title.to_string(),
            artist: artist.to_string(),
        });
    }
    let genre = cell(GENRE_CELL);

    Ok(SongRecord {
        source_id: None,
        title: title.to_string(),
        artist: artist.to_string(),
        genre: (!genre.is_empty()).then(|| genre.to_string()),
        levels,
    })
}

/// Parse tab-separated rows. Blank lines and lines starting with `#` are skipped.
pub fn parse_rows(text: &str) -> Result<Vec<SongRecord>, ValidationError> {
    text.lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| {
            let cells: Vec<&str> = line.split('\t').collect();
            parse_song_row(&cells)
        })
        .collect()
}
