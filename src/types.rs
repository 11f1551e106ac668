use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::core::reference::{column_to_number, number_to_column};

//==============================================================================
// Addressing
//==============================================================================

/// A cell address: column letters plus a 1-based row (`B12`).
///
/// Field order makes the derived `Ord` row-major (A1, B1, ..., A2, B2, ...),
/// which is the order the calculator visits formula cells in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinate {
    pub row: u32,
    pub column: u32,
}

impl Coordinate {
    pub fn new(column: u32, row: u32) -> Self {
        Self { row, column }
    }

    /// Parse the canonical `"<Letters><Digits>"` form (case-insensitive letters).
    pub fn parse(text: &str) -> Option<Self> {
        let split = text.find(|c: char| !c.is_ascii_alphabetic())?;
        let (letters, digits) = text.split_at(split);
        if letters.is_empty() || digits.is_empty() || digits.starts_with('0') {
            return None;
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let column = column_to_number(letters)?;
        let row = digits.parse().ok()?;
        Some(Self::new(column, row))
    }

    pub fn column_label(&self) -> String {
        number_to_column(self.column)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_label(), self.row)
    }
}

/// Build a CellKey: `Sheet!A1`, or bare `A1` when there is no sheet name.
pub fn qualify(sheet: &str, coordinate: &Coordinate) -> String {
    if sheet.is_empty() {
        coordinate.to_string()
    } else {
        format!("{}!{}", sheet, coordinate)
    }
}

//==============================================================================
// Values
//==============================================================================

/// A stored constant as it appears in the export.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Empty,
}

/// A computed cell value. Serializes as a JSON number, string or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Null,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view used by references and aggregates.
    /// Text counts only if it parses as a number (`,` or `.` decimal separator).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => parse_decimal(s),
            CellValue::Null => None,
        }
    }

    /// Human-readable form for the CLI.
    pub fn display(&self) -> String {
        match self {
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Null => "null".to_string(),
        }
    }
}

/// Parse a decimal number accepting `,` as well as `.` as the separator.
/// Non-finite spellings (`inf`, `NaN`) are not numbers here.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let normalized = text.trim().replace(',', ".");
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Flat result of a run: CellKey -> value.
pub type ResultMap = BTreeMap<String, CellValue>;

/// Caller-supplied what-if inputs: CellKey -> number.
pub type Overrides = BTreeMap<String, f64>;

//==============================================================================
// Workbook model
//==============================================================================

/// A stored cell. Formula text always starts with `=`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Constant(RawValue),
    Formula(String),
}

impl Cell {
    /// Build a formula cell, or `None` if the text is not a formula.
    pub fn formula(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim_start().starts_with('=') {
            Some(Cell::Formula(text.trim().to_string()))
        } else {
            None
        }
    }

    pub fn number(value: f64) -> Self {
        Cell::Constant(RawValue::Number(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Cell::Constant(RawValue::Text(value.into()))
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, Cell::Formula(_))
    }

    pub fn formula_text(&self) -> Option<&str> {
        match self {
            Cell::Formula(f) => Some(f),
            Cell::Constant(_) => None,
        }
    }
}

/// Manifest entry for one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default = "default_visibility")]
    pub visibility: String,
}

pub(crate) fn default_visibility() -> String {
    "visible".to_string()
}

/// A named grid of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub visibility: String,
    pub dimensions: String,
    pub cells: BTreeMap<Coordinate, Cell>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: default_visibility(),
            dimensions: String::new(),
            cells: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, coordinate: Coordinate, cell: Cell) {
        self.cells.insert(coordinate, cell);
    }

    pub fn formula_count(&self) -> usize {
        self.cells.values().filter(|c| c.is_formula()).count()
    }
}

/// The whole exported document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    /// Sheets in manifest order, including ones whose file failed to load.
    pub sheets: Vec<SheetInfo>,
    pub active_sheet: String,
    /// Loaded sheet contents by name.
    pub contents: HashMap<String, Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sheet to the manifest and store its contents.
    pub fn add_sheet(&mut self, sheet: Sheet) {
        self.sheets.push(SheetInfo {
            name: sheet.name.clone(),
            file: String::new(),
            visibility: sheet.visibility.clone(),
        });
        if self.active_sheet.is_empty() {
            self.active_sheet = sheet.name.clone();
        }
        self.contents.insert(sheet.name.clone(), sheet);
    }

    pub fn has_model(&self) -> bool {
        !self.contents.is_empty()
    }

    /// Loaded sheets in manifest order.
    pub fn ordered_sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets
            .iter()
            .filter_map(|info| self.contents.get(&info.name))
    }

    /// The sheet whose cells are also reachable by bare coordinate:
    /// the first loaded sheet in manifest order.
    pub fn default_sheet(&self) -> Option<&str> {
        self.ordered_sheets().next().map(|s| s.name.as_str())
    }

    /// Resolve a CellKey to the sheet name and coordinate it names.
    /// Bare keys refer to the default sheet.
    pub fn locate(&self, key: &str) -> Option<(String, Coordinate)> {
        let (sheet, coord) = match key.rsplit_once('!') {
            Some((sheet, coord)) => (unquote_sheet(sheet), coord),
            None => (self.default_sheet()?.to_string(), key),
        };
        let coordinate = Coordinate::parse(coord.trim())?;
        self.contents.contains_key(&sheet).then_some((sheet, coordinate))
    }

    pub fn cell(&self, key: &str) -> Option<(&str, Coordinate, &Cell)> {
        let (sheet, coordinate) = self.locate(key)?;
        let sheet = self.contents.get(&sheet)?;
        let cell = sheet.cells.get(&coordinate)?;
        Some((sheet.name.as_str(), coordinate, cell))
    }
}

/// Strip surrounding quotes from a sheet name (`'My Sheet'` -> `My Sheet`).
pub fn unquote_sheet(name: &str) -> String {
    let name = name.trim();
    match name
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        Some(inner) => inner.replace("''", "'"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_parse_and_display() {
        let c = Coordinate::parse("B12").unwrap();
        assert_eq!(c, Coordinate::new(2, 12));
        assert_eq!(c.to_string(), "B12");
        assert_eq!(Coordinate::parse("aa3").unwrap().to_string(), "AA3");
    }

    #[test]
    fn test_coordinate_parse_rejects_bad_input() {
        assert!(Coordinate::parse("").is_none());
        assert!(Coordinate::parse("12").is_none());
        assert!(Coordinate::parse("A").is_none());
        assert!(Coordinate::parse("A0").is_none());
        assert!(Coordinate::parse("A01").is_none());
        assert!(Coordinate::parse("A1B").is_none());
    }

    #[test]
    fn test_coordinate_order_is_row_major() {
        let mut coords = vec![
            Coordinate::parse("B2").unwrap(),
            Coordinate::parse("A2").unwrap(),
            Coordinate::parse("B1").unwrap(),
            Coordinate::parse("A1").unwrap(),
        ];
        coords.sort();
        let labels: Vec<String> = coords.iter().map(|c| c.to_string()).collect();
        assert_eq!(labels, vec!["A1", "B1", "A2", "B2"]);
    }

    #[test]
    fn test_parse_decimal_accepts_comma() {
        assert_eq!(parse_decimal("12,5"), Some(12.5));
        assert_eq!(parse_decimal(" 3.25 "), Some(3.25));
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("inf"), None);
        assert_eq!(parse_decimal("NaN"), None);
    }

    #[test]
    fn test_cell_value_serializes_untagged() {
        let values = vec![
            CellValue::Number(1.5),
            CellValue::Text("x".to_string()),
            CellValue::Null,
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[1.5,"x",null]"#);
    }

    #[test]
    fn test_cell_formula_requires_marker() {
        assert_eq!(
            Cell::formula("=A1*2"),
            Some(Cell::Formula("=A1*2".to_string()))
        );
        assert!(Cell::formula("A1*2").is_none());
    }

    #[test]
    fn test_workbook_locate() {
        let mut wb = Workbook::new();
        wb.add_sheet(Sheet::new("Main"));
        wb.add_sheet(Sheet::new("My Data"));

        assert_eq!(
            wb.locate("A1"),
            Some(("Main".to_string(), Coordinate::new(1, 1)))
        );
        assert_eq!(
            wb.locate("'My Data'!C3"),
            Some(("My Data".to_string(), Coordinate::new(3, 3)))
        );
        assert_eq!(
            wb.locate("My Data!C3"),
            Some(("My Data".to_string(), Coordinate::new(3, 3)))
        );
        assert!(wb.locate("Missing!A1").is_none());
        assert!(wb.locate("not a key").is_none());
    }

    #[test]
    fn test_default_sheet_skips_unloaded() {
        let mut wb = Workbook::new();
        wb.sheets.push(SheetInfo {
            name: "Gone".to_string(),
            file: "gone.json".to_string(),
            visibility: "visible".to_string(),
        });
        wb.add_sheet(Sheet::new("Present"));
        assert_eq!(wb.default_sheet(), Some("Present"));
    }
}
