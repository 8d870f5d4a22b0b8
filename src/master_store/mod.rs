//! Persistent song master: natural keys, schema and soft-delete reconciliation.

mod keys;
mod models;
mod reconcile;
mod schema;
mod store;

pub use keys::{music_key, title_search_key, DerivedKeys};
pub use models::{
    ChartEntity, ChartLevels, ChartSlot, Difficulty, MusicEntity, PlayStyle, SongRecord,
    CHART_SLOTS,
};
pub use reconcile::{check_batch, ReconcileStats};
pub use schema::{
    META_SCHEMA_VERSION_KEY, MUSIC_TITLE_SEARCH_INDEX, SCHEMA_VERSION,
    SONG_MASTER_VERSIONED_SCHEMAS,
};
pub use store::SongMasterStore;
