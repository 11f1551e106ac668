//! Cell reference resolution
//!
//! Finds `A1`, `A1:B10`, `Sheet1!A1` and `'Sheet Name'!A1:B2` references in
//! formula text, converts column letters to numbers and back, and expands
//! ranges into the cells they cover.
//!
//! A reference is only recognised when it does not continue an identifier:
//! it must not be preceded by an ASCII letter or digit, and the row digits
//! must be followed by a non-word character or the end of the text. This
//! keeps the tail of a name such as `XA1` or `A1B` from being read as a cell.

use std::collections::HashSet;

use crate::types::{qualify, Coordinate};

/// Convert column letters to a 1-based number (A=1, Z=26, AA=27).
/// Returns `None` for empty input, non-letters, or overflow.
pub fn column_to_number(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut n: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
    }
    Some(n)
}

/// Convert a 1-based column number to letters (1=A, 27=AA).
pub fn number_to_column(mut n: u32) -> String {
    if n == 0 {
        return "A".to_string();
    }
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Largest rectangle, in cells, that is ever enumerated.
pub const MAX_RANGE_CELLS: u64 = 1 << 20;

/// An inclusive rectangle of cells. Corner order does not matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: Coordinate,
    pub end: Coordinate,
}

impl Range {
    pub fn new(start: Coordinate, end: Coordinate) -> Self {
        Self { start, end }
    }

    /// Number of cells covered.
    pub fn cell_count(&self) -> u64 {
        let rows = u64::from(self.start.row.abs_diff(self.end.row)) + 1;
        let columns = u64::from(self.start.column.abs_diff(self.end.column)) + 1;
        rows.saturating_mul(columns)
    }

    /// Every cell in the rectangle, rows outer and columns inner.
    /// `None` when it covers more than [`MAX_RANGE_CELLS`].
    pub fn cells(&self) -> Option<Vec<Coordinate>> {
        expand_range(self.start, self.end)
    }
}

/// Enumerate the cells between two corners, row-major. `None` when the
/// rectangle covers more than [`MAX_RANGE_CELLS`].
pub fn expand_range(a: Coordinate, b: Coordinate) -> Option<Vec<Coordinate>> {
    let count = Range::new(a, b).cell_count();
    if count > MAX_RANGE_CELLS {
        return None;
    }
    let (row_lo, row_hi) = (a.row.min(b.row), a.row.max(b.row));
    let (col_lo, col_hi) = (a.column.min(b.column), a.column.max(b.column));
    let mut out = Vec::with_capacity(count as usize);
    for row in row_lo..=row_hi {
        for column in col_lo..=col_hi {
            out.push(Coordinate::new(column, row));
        }
    }
    Some(out)
}

/// What a reference points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Cell(Coordinate),
    Range(Range),
}

/// A reference with its optional sheet qualifier (quotes already stripped).
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub sheet: Option<String>,
    pub target: Target,
}

impl Reference {
    /// The sheet this reference reads from, falling back to `current_sheet`.
    pub fn sheet_or<'a>(&'a self, current_sheet: &'a str) -> &'a str {
        self.sheet.as_deref().unwrap_or(current_sheet)
    }

    /// Covered cells; `None` for a range too large to enumerate.
    pub fn coordinates(&self) -> Option<Vec<Coordinate>> {
        match &self.target {
            Target::Cell(c) => Some(vec![*c]),
            Target::Range(r) => r.cells(),
        }
    }

    /// CellKeys for every covered cell, qualified with the effective sheet.
    pub fn cell_keys(&self, current_sheet: &str) -> Option<Vec<String>> {
        let sheet = self.sheet_or(current_sheet);
        let coordinates = self.coordinates()?;
        Some(coordinates.iter().map(|c| qualify(sheet, c)).collect())
    }
}

/// A reference found in text, with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceToken {
    pub start: usize,
    pub end: usize,
    pub reference: Reference,
}

/// Find every reference in `text`, left to right.
pub fn scan_references(text: &str) -> Vec<ReferenceToken> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match read_reference(&chars, i) {
            Some((reference, next)) => {
                tokens.push(ReferenceToken {
                    start: chars[i].0,
                    end: chars.get(next).map_or(text.len(), |(pos, _)| *pos),
                    reference,
                });
                i = next;
            }
            None => i += 1,
        }
    }

    tokens
}

/// Resolve an aggregate argument such as `A1:A10` or `'Data'!B2`.
///
/// The first range wins; without one, the first single reference is used.
pub fn parse_argument(arg: &str) -> Option<Reference> {
    let tokens = scan_references(arg);
    tokens
        .iter()
        .find(|t| matches!(t.reference.target, Target::Range(_)))
        .or_else(|| tokens.first())
        .map(|t| t.reference.clone())
}

/// Every CellKey a formula reads, qualified with `current_sheet` where the
/// reference is bare. Ranges are expanded row-major; duplicates are dropped
/// and first-seen order is kept. Ranges over [`MAX_RANGE_CELLS`] are left out.
pub fn dependencies(formula: &str, current_sheet: &str) -> Vec<String> {
    let Some(body) = formula.trim().strip_prefix('=') else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut deps = Vec::new();
    for token in scan_references(body) {
        let Some(keys) = token.reference.cell_keys(current_sheet) else {
            continue;
        };
        for key in keys {
            if seen.insert(key.clone()) {
                deps.push(key);
            }
        }
    }
    deps
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn skip_whitespace(chars: &[(usize, char)], mut i: usize) -> usize {
    while chars.get(i).is_some_and(|(_, c)| c.is_whitespace()) {
        i += 1;
    }
    i
}

/// Try to read a (possibly sheet-qualified) cell or range starting at `i`.
/// Returns the reference and the index just past it.
fn read_reference(chars: &[(usize, char)], i: usize) -> Option<(Reference, usize)> {
    let prev = i.checked_sub(1).map(|p| chars[p].1);

    let (sheet, coord_start) = match read_sheet_prefix(chars, i, prev) {
        Some((name, after)) => (Some(name), after),
        None => {
            if prev.is_some_and(|c| c.is_ascii_alphanumeric()) {
                return None;
            }
            (None, i)
        }
    };

    let (first, after_first) = read_coordinate(chars, coord_start)?;

    let colon = skip_whitespace(chars, after_first);
    if chars.get(colon).is_some_and(|(_, c)| *c == ':') {
        let second_start = skip_whitespace(chars, colon + 1);
        if let Some((second, after_second)) = read_coordinate(chars, second_start) {
            let reference = Reference {
                sheet,
                target: Target::Range(Range::new(first, second)),
            };
            return Some((reference, after_second));
        }
    }

    Some((
        Reference {
            sheet,
            target: Target::Cell(first),
        },
        after_first,
    ))
}

/// `'Quoted Name'!` or `Plain_Name!`. Returns the unquoted name and the index
/// after the `!`.
fn read_sheet_prefix(
    chars: &[(usize, char)],
    i: usize,
    prev: Option<char>,
) -> Option<(String, usize)> {
    let (_, first) = *chars.get(i)?;

    if first == '\'' {
        let mut name = String::new();
        let mut j = i + 1;
        loop {
            let (_, c) = *chars.get(j)?;
            if c == '\'' {
                if chars.get(j + 1).is_some_and(|(_, n)| *n == '\'') {
                    name.push('\'');
                    j += 2;
                    continue;
                }
                break;
            }
            name.push(c);
            j += 1;
        }
        // j is on the closing quote
        if name.is_empty() || !chars.get(j + 1).is_some_and(|(_, c)| *c == '!') {
            return None;
        }
        return Some((name, j + 2));
    }

    if prev.is_some_and(is_word_char) || !is_word_char(first) {
        return None;
    }
    let mut j = i;
    let mut name = String::new();
    while let Some((_, c)) = chars.get(j) {
        if is_word_char(*c) || *c == '.' {
            name.push(*c);
            j += 1;
        } else {
            break;
        }
    }
    if chars.get(j).is_some_and(|(_, c)| *c == '!') {
        Some((name, j + 1))
    } else {
        None
    }
}

/// Column letters, then a row without leading zero, then a word boundary.
fn read_coordinate(chars: &[(usize, char)], i: usize) -> Option<(Coordinate, usize)> {
    let mut j = i;
    let mut letters = String::new();
    while let Some((_, c)) = chars.get(j) {
        if c.is_ascii_alphabetic() {
            letters.push(*c);
            j += 1;
        } else {
            break;
        }
    }

    let mut digits = String::new();
    while let Some((_, c)) = chars.get(j) {
        if c.is_ascii_digit() {
            digits.push(*c);
            j += 1;
        } else {
            break;
        }
    }

    if letters.is_empty() || digits.is_empty() || digits.starts_with('0') {
        return None;
    }
    if chars.get(j).is_some_and(|(_, c)| is_word_char(*c)) {
        return None;
    }

    let column = column_to_number(&letters)?;
    let row: u32 = digits.parse().ok()?;
    Some((Coordinate::new(column, row), j))
}
