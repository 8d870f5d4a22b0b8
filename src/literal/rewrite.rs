//! Text-to-text passes that turn a loosely formatted script object literal into
//! a strict JSON document.
//!
//! Each pass is a pure function and they run in the order listed in
//! [`super::extract_with`]; later passes assume earlier ones already ran
//! (single-quoted keys are only rewritten once comments can no longer hide a
//! stray quote, control characters are only escaped once keys are in their
//! final quote style).

use super::scanner::{classify, Quote, ScanState};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref CONSTANT_DECLARATION: Regex =
        Regex::new(r"\b([A-Z_][A-Z0-9_]*)\s*=\s*([0-9]+)\s*;").unwrap();
    static ref DECORATION_CALL: Regex = Regex::new(r"\.fontcolor\([^)]*\)").unwrap();
}

/// Module-level `NAME = <int>;` declarations, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantTable {
    values: BTreeMap<String, u64>,
}

impl ConstantTable {
    /// Collect every constant declared in `source`. A later declaration of the
    /// same name wins.
    pub fn collect(source: &str) -> Self {
        let values = CONSTANT_DECLARATION
            .captures_iter(source)
            .filter_map(|caps| {
                let value = caps[2].parse::<u64>().ok()?;
                Some((caps[1].to_string(), value))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

/// Replace every unquoted, whole-word occurrence of a known constant with its
/// negated value. Named constants mark sentinel levels in the source.
pub fn substitute_constants(body: &str, constants: &ConstantTable) -> String {
    if constants.is_empty() {
        return body.to_string();
    }
    let mut out = String::with_capacity(body.len());
    let mut previous: Option<char> = None;
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        match constants.get(word) {
            Some(value) => out.push_str(&format!("-{}", value)),
            None => out.push_str(word),
        }
        word.clear();
    };

    for (_, ch, state) in classify(body) {
        let in_code = state == ScanState::Normal;
        let continues_word = !word.is_empty() && in_code && is_identifier_char(ch);
        let starts_word = word.is_empty()
            && in_code
            && (ch.is_ascii_alphabetic() || ch == '_' || ch == '$')
            && !previous.is_some_and(is_identifier_char);
        if continues_word || starts_word {
            word.push(ch);
        } else {
            flush(&mut word, &mut out);
            out.push(ch);
        }
        previous = Some(ch);
    }
    flush(&mut word, &mut out);
    out
}

/// Drop `//` comments up to the line break, which is kept. A comment running to
/// end of input needs no trailing line break.
pub fn strip_line_comments(body: &str) -> String {
    classify(body)
        .filter(|(_, _, state)| *state != ScanState::LineComment)
        .map(|(_, ch, _)| ch)
        .collect()
}

/// Remove cosmetic `.fontcolor(<arg>)` calls chained onto string literals.
pub fn strip_decorations(body: &str) -> String {
    DECORATION_CALL.replace_all(body, "").into_owned()
}

/// Rewrite `'key':` to `"key":`. Quotes inside double-quoted strings are text
/// and never start a key.
pub fn quote_single_keys(body: &str) -> String {
    let chars: Vec<(char, ScanState)> = classify(body).map(|(_, ch, s)| (ch, s)).collect();
    let mut out = String::with_capacity(body.len());
    let mut index = 0;
    while index < chars.len() {
        let (ch, state) = chars[index];
        if ch == '\'' && state == ScanState::Normal {
            if let Some(close) = single_quoted_key_end(&chars, index) {
                out.push('"');
                out.extend(chars[index + 1..close].iter().map(|(c, _)| *c));
                out.push('"');
                index = close + 1;
                continue;
            }
        }
        out.push(ch);
        index += 1;
    }
    out
}

/// Index of the quote closing the single-quoted string opened at `open`, if a
/// colon follows it.
fn single_quoted_key_end(chars: &[(char, ScanState)], open: usize) -> Option<usize> {
    let close = (open + 1..chars.len())
        .find(|&i| chars[i] == ('\'', ScanState::InQuote(Quote::Single)))?;
    let next = chars[close + 1..]
        .iter()
        .map(|(c, _)| *c)
        .find(|c| !c.is_whitespace())?;
    (next == ':').then_some(close)
}

/// Quote bare single-letter `A`..`F` array elements, which denote enumerated
/// categories rather than identifiers: `[A,0,B]` becomes `["A",0,"B"]`.
pub fn quote_bare_categories(body: &str) -> String {
    let chars: Vec<(char, ScanState)> = classify(body).map(|(_, ch, s)| (ch, s)).collect();
    let code_at = |index: usize| -> Option<char> {
        chars
            .get(index)
            .filter(|(_, state)| *state == ScanState::Normal)
            .map(|(ch, _)| *ch)
    };
    let neighbour = |mut index: usize, forward: bool| -> Option<char> {
        loop {
            index = if forward {
                index.checked_add(1)?
            } else {
                index.checked_sub(1)?
            };
            let ch = code_at(index)?;
            if !ch.is_whitespace() {
                return Some(ch);
            }
        }
    };

    let mut out = String::with_capacity(body.len() + 16);
    for (index, (ch, state)) in chars.iter().enumerate() {
        let is_category = *state == ScanState::Normal
            && ('A'..='F').contains(ch)
            && matches!(neighbour(index, false), Some('[') | Some(','))
            && matches!(neighbour(index, true), Some(']') | Some(','));
        if is_category {
            out.push('"');
            out.push(*ch);
            out.push('"');
        } else {
            out.push(*ch);
        }
    }
    out
}

/// Escape raw control characters (below U+0020) inside double-quoted literals
/// as `\u00XX`. Characters already behind a backslash are left alone.
pub fn escape_control_chars(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    for (_, ch, state) in classify(body) {
        let inside_double = matches!(state, ScanState::InQuote(Quote::Double));
        if inside_double && (ch as u32) < 0x20 {
            out.push_str(&format!("\\u{:04x}", ch as u32));
        } else {
            out.push(ch);
        }
    }
    out
}
