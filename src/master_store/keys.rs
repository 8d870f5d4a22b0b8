//! Natural keys derived from normalized song fields.

use super::models::SongRecord;
use crate::normalize::{normalize_search_key, normalize_text};
use sha1::{Digest, Sha1};

/// Upsert-matching key: SHA-1 hex of `normalize(title)|normalize(artist)`.
/// Never exposed as an external identifier.
pub fn music_key(title: &str, artist: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(normalize_text(title).as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_text(artist).as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn title_search_key(title: &str) -> String {
    normalize_search_key(title)
}

/// Every derived column of a music row, computed once per record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedKeys {
    pub music_key: String,
    pub source_id: String,
    pub normalized_title: String,
    pub normalized_artist: String,
    pub title_search_key: String,
}

impl DerivedKeys {
    pub fn for_record(record: &SongRecord) -> Self {
        let music_key = music_key(&record.title, &record.artist);
        // Sources without upstream ids fall back to the content key.
        let source_id = record
            .source_id
            .clone()
            .unwrap_or_else(|| music_key.clone());
        DerivedKeys {
            source_id,
            normalized_title: normalize_text(&record.title),
            normalized_artist: normalize_text(&record.artist),
            title_search_key: title_search_key(&record.title),
            music_key,
        }
    }
}
