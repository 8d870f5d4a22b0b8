//! Tolerant extraction of object literals embedded in script source.
//!
//! Only the narrow grammar the catalog's table scripts actually use is
//! supported: an `identifier = { ... };` assignment whose body is almost JSON.
//! The body is isolated with [`scanner::object_bounds`], rewritten into strict
//! JSON by the passes in [`rewrite`], then parsed with `serde_json`.

pub mod rewrite;
pub mod scanner;

use crate::error::ExtractionError;
use lazy_static::lazy_static;
use regex::Regex;
use rewrite::ConstantTable;
use scanner::BoundaryError;
use serde_json::{Map, Value};
use tracing::debug;

/// Extracted table: string keys to nested mappings or sequences.
pub type LiteralTable = Map<String, Value>;

/// The table whose literal is irregular enough to be parsed entry by entry.
pub const PER_ENTRY_TABLE: &str = "titletbl";
/// The table that uses bare `A`..`F` letters as enumerated level values.
pub const BARE_CATEGORY_TABLE: &str = "actbl";

lazy_static! {
    static ref ARRAY_ENTRY: Regex =
        Regex::new(r#"(?s)['"]([^'"]+)['"]\s*:\s*(\[[^\]]*\])"#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Parse the whole rewritten body as one document; any syntax error fails.
    WholeDocument,
    /// Parse every `"key": [ ... ]` entry on its own, skipping the ones that
    /// fail, and coerce each array's first element to text.
    PerEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub mode: ExtractMode,
    pub quote_bare_categories: bool,
}

impl ExtractOptions {
    /// Options the catalog's scripts need for the table named `identifier`.
    pub fn for_table(identifier: &str) -> Self {
        ExtractOptions {
            mode: if identifier == PER_ENTRY_TABLE {
                ExtractMode::PerEntry
            } else {
                ExtractMode::WholeDocument
            },
            quote_bare_categories: identifier == BARE_CATEGORY_TABLE,
        }
    }
}

/// Extract the table assigned to `identifier` with the options its name implies.
pub fn extract_table(source: &str, identifier: &str) -> Result<LiteralTable, ExtractionError> {
    extract_with(source, identifier, ExtractOptions::for_table(identifier))
}

pub fn extract_with(
    source: &str,
    identifier: &str,
    options: ExtractOptions,
) -> Result<LiteralTable, ExtractionError> {
    let assignment = Regex::new(&format!(r"\b{}\s*=\s*\{{", regex::escape(identifier)))
        .map_err(|_| ExtractionError::IdentifierNotFound(identifier.to_string()))?;
    let found = assignment
        .find(source)
        .ok_or_else(|| ExtractionError::IdentifierNotFound(identifier.to_string()))?;
    // The match ends right after the opening brace.
    let open_index = found.end() - 1;

    let bounds = scanner::object_bounds(source, open_index).map_err(|e| match e {
        BoundaryError::UnterminatedString => {
            ExtractionError::UnterminatedString(identifier.to_string())
        }
        BoundaryError::Unbalanced => ExtractionError::UnbalancedObject(identifier.to_string()),
    })?;

    let constants = ConstantTable::collect(&source[..found.start()]);
    let body = rewrite_body(&source[bounds], &constants, options.quote_bare_categories);

    match options.mode {
        ExtractMode::WholeDocument => serde_json::from_str::<LiteralTable>(&body).map_err(
            |source| ExtractionError::Parse {
                identifier: identifier.to_string(),
                source,
            },
        ),
        ExtractMode::PerEntry => Ok(parse_entries(&body, identifier)),
    }
}

/// Run the rewrite passes in their fixed order.
pub fn rewrite_body(body: &str, constants: &ConstantTable, quote_categories: bool) -> String {
    let body = rewrite::substitute_constants(body, constants);
    let body = rewrite::strip_line_comments(&body);
    let body = rewrite::strip_decorations(&body);
    let body = rewrite::quote_single_keys(&body);
    let body = if quote_categories {
        rewrite::quote_bare_categories(&body)
    } else {
        body
    };
    rewrite::escape_control_chars(&body)
}

fn parse_entries(body: &str, identifier: &str) -> LiteralTable {
    let mut table = LiteralTable::new();
    let mut skipped = 0usize;
    for caps in ARRAY_ENTRY.captures_iter(body) {
        let key = &caps[1];
        let mut items = match serde_json::from_str::<Vec<Value>>(&caps[2]) {
            Ok(items) => items,
            Err(e) => {
                debug!("Skipping {} entry '{}': {}", identifier, key, e);
                skipped += 1;
                continue;
            }
        };
        if let Some(first) = items.first_mut() {
            let text = match &mut *first {
                Value::String(s) => std::mem::take(s),
                other => other.to_string(),
            };
            *first = Value::String(text);
        }
        table.insert(key.to_string(), Value::Array(items));
    }
    if skipped > 0 {
        debug!(
            "Extracted {} entries from {}, skipped {} malformed",
            table.len(),
            identifier,
            skipped
        );
    }
    table
}
