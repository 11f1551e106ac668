//! Export artifact loading
//!
//! An export is a directory holding a manifest (`_workbook.json`) and one
//! JSON file per sheet:
//!
//! ```text
//! _workbook.json   { "sheets": [{ "name", "file", "visibility" }], "active_sheet" }
//! <sheet>.json     { "name", "visibility", "dimensions",
//!                    "cells": { "A1": { "value", "formula", "data_type" } } }
//! ```
//!
//! Loading never fails. A missing directory gives an empty workbook; a sheet
//! whose file is missing or unreadable is left out, and so is a single cell
//! whose record is malformed.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::CalcResult;
use crate::types::{Cell, Coordinate, RawValue, Sheet, SheetInfo, Workbook};

/// Manifest file name inside an export directory
pub const MANIFEST_FILE: &str = "_workbook.json";

/// `data_type` code of formula cells
pub const FORMULA_DATA_TYPE: &str = "f";

#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub sheets: Vec<SheetInfo>,
    #[serde(default)]
    pub active_sheet: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SheetFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub dimensions: Option<String>,
    /// Raw per-cell records. Each is converted on its own so one bad
    /// record only loses that cell.
    #[serde(default)]
    pub cells: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CellRecord {
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
}

impl CellRecord {
    /// Formula cells need `data_type = "f"` and formula text starting with
    /// `=`; everything else is a constant.
    pub fn to_cell(&self) -> Cell {
        if self.data_type.as_deref() == Some(FORMULA_DATA_TYPE) {
            if let Some(formula) = self.formula.as_deref().filter(|f| !f.trim().is_empty()) {
                return Cell::formula(formula)
                    .unwrap_or_else(|| Cell::Constant(RawValue::Text(formula.to_string())));
            }
        }
        Cell::Constant(raw_value(&self.value))
    }
}

fn raw_value(value: &serde_json::Value) -> RawValue {
    use serde_json::Value;
    match value {
        Value::Null => RawValue::Empty,
        Value::Bool(b) => RawValue::Number(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n
            .as_f64()
            .map(RawValue::Number)
            .unwrap_or_else(|| RawValue::Text(n.to_string())),
        Value::String(s) => RawValue::Text(s.clone()),
        other => RawValue::Text(other.to_string()),
    }
}

/// Load an export directory. Never fails; see the module docs.
pub fn load_workbook(export_dir: &Path) -> Workbook {
    if !export_dir.is_dir() {
        debug!(dir = %export_dir.display(), "export directory not found, empty workbook");
        return Workbook::new();
    }

    let manifest = match read_manifest(&export_dir.join(MANIFEST_FILE)) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!(dir = %export_dir.display(), error = %e, "unreadable manifest, empty workbook");
            return Workbook::new();
        }
    };

    let mut workbook = Workbook {
        sheets: manifest.sheets,
        active_sheet: manifest.active_sheet,
        ..Workbook::default()
    };

    for info in &workbook.sheets {
        if info.file.is_empty() {
            debug!(sheet = %info.name, "manifest entry has no file, skipped");
            continue;
        }
        let path = export_dir.join(&info.file);
        match read_sheet(&path, info) {
            Ok(sheet) => {
                workbook.contents.insert(info.name.clone(), sheet);
            }
            Err(e) => {
                debug!(sheet = %info.name, file = %path.display(), error = %e, "sheet omitted");
            }
        }
    }

    workbook
}

pub fn read_manifest(path: &Path) -> CalcResult<Manifest> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Read one sheet file. The manifest entry supplies the sheet name and the
/// fallback visibility.
pub fn read_sheet(path: &Path, info: &SheetInfo) -> CalcResult<Sheet> {
    let content = std::fs::read_to_string(path)?;
    let file: SheetFile = serde_json::from_str(&content)?;
    Ok(build_sheet(file, info))
}

fn build_sheet(file: SheetFile, info: &SheetInfo) -> Sheet {
    let mut sheet = Sheet::new(info.name.clone());
    sheet.visibility = file.visibility.unwrap_or_else(|| info.visibility.clone());
    sheet.dimensions = file.dimensions.unwrap_or_default();

    for (key, raw) in file.cells {
        let Some(coordinate) = Coordinate::parse(key.trim()) else {
            debug!(sheet = %info.name, key = %key, "not a cell coordinate, skipped");
            continue;
        };
        if !raw.is_object() {
            debug!(sheet = %info.name, key = %key, "cell record is not an object, skipped");
            continue;
        }
        match serde_json::from_value::<CellRecord>(raw) {
            Ok(record) => sheet.set(coordinate, record.to_cell()),
            Err(e) => debug!(sheet = %info.name, key = %key, error = %e, "malformed cell record, skipped"),
        }
    }

    sheet
}
