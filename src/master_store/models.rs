//! Records entering the store and the entities it persists.

use crate::error::ValidationError;
use std::fmt;

// =============================================================================
// Enumerations
// =============================================================================

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum PlayStyle {
    Sp,
    Dp,
}

impl PlayStyle {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            PlayStyle::Sp => "SP",
            PlayStyle::Dp => "DP",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "SP" => Some(PlayStyle::Sp),
            "DP" => Some(PlayStyle::Dp),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Difficulty {
    Beginner,
    Normal,
    Hyper,
    Another,
    Leggendaria,
}

impl Difficulty {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "BEGINNER",
            Difficulty::Normal => "NORMAL",
            Difficulty::Hyper => "HYPER",
            Difficulty::Another => "ANOTHER",
            Difficulty::Leggendaria => "LEGGENDARIA",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "BEGINNER" => Some(Difficulty::Beginner),
            "NORMAL" => Some(Difficulty::Normal),
            "HYPER" => Some(Difficulty::Hyper),
            "ANOTHER" => Some(Difficulty::Another),
            "LEGGENDARIA" => Some(Difficulty::Leggendaria),
            _ => None,
        }
    }
}

/// A (play style, difficulty) pair that can carry a chart.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ChartSlot {
    pub play_style: PlayStyle,
    pub difficulty: Difficulty,
}

impl fmt::Display for ChartSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.play_style.as_db_str(),
            self.difficulty.as_db_str()
        )
    }
}

const fn slot(play_style: PlayStyle, difficulty: Difficulty) -> ChartSlot {
    ChartSlot {
        play_style,
        difficulty,
    }
}

/// Every slot a song can have. There is no DP beginner chart.
pub const CHART_SLOTS: [ChartSlot; 9] = [
    slot(PlayStyle::Sp, Difficulty::Beginner),
    slot(PlayStyle::Sp, Difficulty::Normal),
    slot(PlayStyle::Sp, Difficulty::Hyper),
    slot(PlayStyle::Sp, Difficulty::Another),
    slot(PlayStyle::Sp, Difficulty::Leggendaria),
    slot(PlayStyle::Dp, Difficulty::Normal),
    slot(PlayStyle::Dp, Difficulty::Hyper),
    slot(PlayStyle::Dp, Difficulty::Another),
    slot(PlayStyle::Dp, Difficulty::Leggendaria),
];

// =============================================================================
// Input records
// =============================================================================

/// Levels for the nine slots of [`CHART_SLOTS`], in the same order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChartLevels([Option<u32>; 9]);

impl ChartLevels {
    pub fn new(levels: [Option<u32>; 9]) -> Self {
        ChartLevels(levels)
    }

    pub fn get(&self, slot: ChartSlot) -> Option<u32> {
        CHART_SLOTS
            .iter()
            .position(|s| *s == slot)
            .and_then(|index| self.0[index])
    }

    /// Returns false when the slot does not exist (DP beginner).
    pub fn set(&mut self, slot: ChartSlot, level: Option<u32>) -> bool {
        match CHART_SLOTS.iter().position(|s| *s == slot) {
            Some(index) => {
                self.0[index] = level;
                true
            }
            None => false,
        }
    }

    /// Present levels with their slot, in slot order.
    pub fn present(&self) -> impl Iterator<Item = (ChartSlot, u32)> + '_ {
        CHART_SLOTS
            .iter()
            .zip(self.0.iter())
            .filter_map(|(slot, level)| level.map(|level| (*slot, level)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// One song as read from a source, before reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongRecord {
    /// Upstream identifier, when the source carries one.
    pub source_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub genre: Option<String>,
    pub levels: ChartLevels,
}

impl SongRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyField("title"));
        }
        if self.artist.trim().is_empty() {
            return Err(ValidationError::EmptyField("artist"));
        }
        if matches!(&self.source_id, Some(id) if id.trim().is_empty()) {
            return Err(ValidationError::EmptyField("source_id"));
        }
        if let Some((_, level)) = self.levels.present().find(|(_, level)| *level == 0) {
            return Err(ValidationError::InvalidLevel(level.to_string()));
        }
        if self.levels.is_empty() {
            return Err(ValidationError::NoCharts {
                title: self.title.clone(),
                artist: self.artist.clone(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Persisted entities
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MusicEntity {
    pub music_id: i64,
    pub source_id: String,
    pub music_key: String,
    pub title: String,
    pub normalized_title: String,
    pub artist: String,
    pub normalized_artist: String,
    pub genre: Option<String>,
    pub title_search_key: String,
    pub is_active: bool,
    pub last_seen_at: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartEntity {
    pub chart_id: i64,
    pub music_id: i64,
    pub slot: ChartSlot,
    pub level: u32,
    pub is_active: bool,
    pub last_seen_at: String,
    pub created_at: String,
    pub updated_at: String,
}
