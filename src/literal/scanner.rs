//! Character-level state machine over script literal text.
//!
//! Every rewrite pass and the boundary search walk the text through the same
//! [`LiteralScanner`], so they agree on what is code, what is inside a string
//! literal and what is commented out.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Double,
    Single,
}

impl Quote {
    fn from_char(ch: char) -> Option<Quote> {
        match ch {
            '"' => Some(Quote::Double),
            '\'' => Some(Quote::Single),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Quote::Double => '"',
            Quote::Single => '\'',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Normal,
    InQuote(Quote),
    /// The previous character was a backslash inside a string of this quote style.
    Escaped(Quote),
    /// Inside a `//` comment, up to (not including) the next line break.
    LineComment,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralScanner {
    state: ScanState,
}

impl LiteralScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn in_string(&self) -> bool {
        matches!(self.state(), ScanState::InQuote(_) | ScanState::Escaped(_))
    }

    /// Feed one character. Returns the state the character was read in, which is
    /// what callers use to classify it: an opening quote reads as `Normal`, a
    /// closing quote as `InQuote`, the `//` that opens a comment as `LineComment`.
    pub fn step(&mut self, ch: char, next: Option<char>) -> ScanState {
        let read_in = match self.state() {
            ScanState::Normal if ch == '/' && next == Some('/') => ScanState::LineComment,
            state => state,
        };
        let after = match read_in {
            ScanState::Normal => match Quote::from_char(ch) {
                Some(quote) => ScanState::InQuote(quote),
                None => ScanState::Normal,
            },
            ScanState::InQuote(quote) => {
                if ch == '\\' {
                    ScanState::Escaped(quote)
                } else if ch == quote.as_char() {
                    ScanState::Normal
                } else {
                    ScanState::InQuote(quote)
                }
            }
            ScanState::Escaped(quote) => ScanState::InQuote(quote),
            ScanState::LineComment => {
                if ch == '\n' {
                    ScanState::Normal
                } else {
                    ScanState::LineComment
                }
            }
        };
        self.state = after;
        // The line break that closes a comment belongs to the code around it.
        if read_in == ScanState::LineComment && ch == '\n' {
            ScanState::Normal
        } else {
            read_in
        }
    }
}

/// Walk `text` and yield `(byte_index, char, state_read_in)` for every character.
pub fn classify(text: &str) -> impl Iterator<Item = (usize, char, ScanState)> + '_ {
    let mut scanner = LiteralScanner::new();
    let mut chars = text.char_indices().peekable();
    std::iter::from_fn(move || {
        let (index, ch) = chars.next()?;
        let next = chars.peek().map(|(_, c)| *c);
        Some((index, ch, scanner.step(ch, next)))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryError {
    UnterminatedString,
    Unbalanced,
}

/// Find the byte range of the object whose opening brace sits at `open_index`,
/// closing brace included.
pub fn object_bounds(text: &str, open_index: usize) -> Result<Range<usize>, BoundaryError> {
    let tail = &text[open_index..];
    let mut scanner = LiteralScanner::new();
    let mut depth: usize = 0;
    let mut chars = tail.char_indices().peekable();
    while let Some((offset, ch)) = chars.next() {
        let next = chars.peek().map(|(_, c)| *c);
        if scanner.step(ch, next) != ScanState::Normal {
            continue;
        }
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(open_index..open_index + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    if scanner.in_string() {
        Err(BoundaryError::UnterminatedString)
    } else {
        Err(BoundaryError::Unbalanced)
    }
}
