//! Shared constants for end-to-end tests
//!
//! When the fixture catalog changes, update only this file.

// ============================================================================
// Fixture catalog
// ============================================================================

/// Source id of "Alpha Song"; three SP charts and two DP charts.
pub const SONG_ALPHA_ID: &str = "T0001";

/// Source id of "Beta Song"; two SP charts.
pub const SONG_BETA_ID: &str = "T0002";

/// Source id of "Gamma Song"; dropped upstream in the second build.
pub const SONG_GAMMA_ID: &str = "T0003";

/// Title entry with no playable chart, ignored by every build.
pub const SONG_UNPLAYABLE_ID: &str = "T0004";

/// Charts in the first fixture build.
pub const FIRST_BUILD_CHARTS: i64 = 8;

/// Songs in the first fixture build.
pub const FIRST_BUILD_SONGS: i64 = 3;
