//! Record producers for the two catalog representations.

pub mod rows;
pub mod textage;

pub use rows::{parse_level_cell, parse_rows, parse_song_row};
pub use textage::{songs_from_textage, TextageBatch, TextageTables};
