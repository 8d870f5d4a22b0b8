//! Text canonicalization for song titles and artist names.
//!
//! Two strictness levels live here as separate functions:
//! [`normalize_text`] feeds the identity key and [`normalize_search_key`]
//! feeds the search column. They share a prefix today but are allowed to
//! drift apart; changing `normalize_text` changes every `music_key`.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

const HYPHEN_CHARS: &[char] = &[
    '\u{2010}', // hyphen
    '\u{FF0D}', // fullwidth hyphen-minus
    '\u{2012}', // figure dash
    '\u{2013}', // en dash
    '\u{2014}', // em dash
    '\u{2015}', // horizontal bar
    '\u{2212}', // minus sign
    '\u{30FC}', // katakana prolonged sound mark
    '\u{FF70}', // halfwidth prolonged sound mark
    '\u{301C}', // wave dash
    '\u{FF5E}', // fullwidth tilde
];

const QUOTE_MAP: &[(char, char)] = &[
    ('\u{201C}', '"'),
    ('\u{201D}', '"'),
    ('\u{201E}', '"'),
    ('\u{201F}', '"'),
    ('\u{2019}', '\''),
    ('\u{2018}', '\''),
    ('\u{201A}', '\''),
    ('\u{201B}', '\''),
    ('\u{300C}', '"'),
    ('\u{300D}', '"'),
    ('\u{300E}', '"'),
    ('\u{300F}', '"'),
];

/// Letters that carry no decomposition but still have a plain-ASCII spelling.
const LIGATURE_FOLDS: &[(char, &str)] = &[
    ('ß', "ss"),
    ('æ', "ae"),
    ('œ', "oe"),
    ('ø', "o"),
    ('đ', "d"),
    ('ð', "d"),
    ('þ', "th"),
    ('ł', "l"),
];

fn map_char(ch: char) -> char {
    match ch {
        '\n' | '\r' | '\t' => ' ',
        '\u{3000}' => ' ',
        c if HYPHEN_CHARS.contains(&c) => '-',
        c => QUOTE_MAP
            .iter()
            .find(|(from, _)| *from == c)
            .map(|(_, to)| *to)
            .unwrap_or(c),
    }
}

/// Identity-key normalization: NFKC, quote/hyphen/space unification, trimmed,
/// whitespace collapsed, lowercased.
pub fn normalize_text(input: &str) -> String {
    let mapped: String = input.nfkc().map(map_char).collect();
    let collapsed = WHITESPACE_RUN.replace_all(mapped.trim(), " ");
    collapsed.to_lowercase()
}

/// [`normalize_text`] for values that may be absent; absent becomes empty.
pub fn normalize_opt_text(input: Option<&str>) -> String {
    input.map(normalize_text).unwrap_or_default()
}

/// Search-key normalization: everything [`normalize_text`] does, plus
/// diacritics stripped and ligature letters folded to ASCII digraphs.
pub fn normalize_search_key(input: &str) -> String {
    let base = normalize_text(input);
    let mut folded = String::with_capacity(base.len());
    for ch in base.chars() {
        match LIGATURE_FOLDS.iter().find(|(from, _)| *from == ch) {
            Some((_, to)) => folded.push_str(to),
            None => folded.push(ch),
        }
    }
    folded
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_basic() {
        assert_eq!(normalize_text("  Hello\tWORLD \n again "), "hello world again");
        assert_eq!(normalize_text("ＡＢＣ　ｄｅｆ"), "abc def");
        assert_eq!(normalize_text("“quoted” ‘single’"), "\"quoted\" 'single'");
        assert_eq!(normalize_text("a–b—c−d"), "a-b-c-d");
        assert_eq!(normalize_text("「title」"), "\"title\"");
    }

    #[test]
    fn test_normalize_text_absent_is_empty() {
        assert_eq!(normalize_opt_text(None), "");
        assert_eq!(normalize_opt_text(Some(" X ")), "x");
    }

    #[test]
    fn test_normalize_text_is_idempotent() {
        let samples = [
            "  MiXeD   CaSe  ",
            "ＦＵＬＬ－ＷＩＤＴＨ　Ｔｅｘｔ",
            "灼熱Beach Side Bunny",
            "Ｖ～ｖ〜v",
            "Straße Œuvre",
            "ｶﾀｶﾅ ｰ",
            "tab\tand\r\nnewline",
            "“smart” ‘quotes’ 『brackets』",
            "",
        ];
        for sample in samples {
            let once = normalize_text(sample);
            assert_eq!(normalize_text(&once), once, "not idempotent for {:?}", sample);
            let key = normalize_search_key(sample);
            assert_eq!(normalize_search_key(&key), key, "search key drifted for {:?}", sample);
        }
    }

    #[test]
    fn test_search_key_golden_cases() {
        let cases = [
            ("\u{00f6}", "o"),
            ("Stra\u{00df}e", "strasse"),
            ("\u{00e6}", "ae"),
            ("\u{0153}", "oe"),
            ("\u{00f8}", "o"),
            ("\u{00e5}", "a"),
            ("\u{00e7}", "c"),
            ("\u{00f1}", "n"),
            ("\u{00e1}\u{00e0}\u{00e2}\u{00e3}", "aaaa"),
            ("\u{00e9}\u{00e8}\u{00ea}\u{00eb}", "eeee"),
            ("\u{00ed}\u{00ec}\u{00ee}\u{00ef}", "iiii"),
            ("\u{00f3}\u{00f2}\u{00f4}\u{00f5}", "oooo"),
            ("\u{00fa}\u{00f9}\u{00fb}", "uuu"),
            ("\u{00fd}\u{00ff}", "yy"),
            ("o\u{0308}", "o"),
            ("  MiXeD   CaSe  ", "mixed case"),
        ];
        for (source, expected) in cases {
            assert_eq!(normalize_search_key(source), expected, "for {:?}", source);
        }
    }

    #[test]
    fn test_search_key_keeps_identity_key_accents() {
        assert_eq!(normalize_text("Café"), "café");
        assert_eq!(normalize_search_key("Café"), "cafe");
    }
}
