//! What-if runs: load, apply overrides, calculate, round

use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::core::{Calculator, SheetReport};
use crate::error::CalcResult;
use crate::loader::load_workbook;
use crate::metadata::ModelMetadata;
use crate::types::{Cell, CellValue, Overrides, ResultMap, Workbook};

/// Decimal places kept in numeric results
pub const RESULT_PRECISION: i32 = 6;

/// Result of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunOutput {
    pub cells: ResultMap,
    pub metadata: ModelMetadata,
}

/// Load the export at `export_dir` and evaluate it under `overrides`.
///
/// Every call loads its own copy of the workbook, so concurrent runs share
/// nothing.
pub fn run_calculation(overrides: &Overrides, export_dir: &Path) -> CalcResult<RunOutput> {
    run_workbook(load_workbook(export_dir), overrides)
}

/// Evaluate an already-loaded workbook under `overrides`.
pub fn run_workbook(workbook: Workbook, overrides: &Overrides) -> CalcResult<RunOutput> {
    run_with_reports(workbook, overrides).map(|(output, _)| output)
}

/// Like [`run_workbook`], also returning the per-sheet convergence reports.
pub fn run_with_reports(
    mut workbook: Workbook,
    overrides: &Overrides,
) -> CalcResult<(RunOutput, Vec<SheetReport>)> {
    let metadata = ModelMetadata::from_workbook(&workbook);
    if !workbook.has_model() {
        let output = RunOutput {
            cells: ResultMap::new(),
            metadata,
        };
        return Ok((output, Vec::new()));
    }

    let applied = apply_overrides(&mut workbook, overrides);
    debug!(requested = overrides.len(), applied, "overrides applied");

    let (mut cells, reports) = Calculator::new(workbook)?.calculate_with_reports();
    round_results(&mut cells);

    Ok((RunOutput { cells, metadata }, reports))
}

/// Replace each matched cell with a numeric constant. Returns how many
/// overrides matched a stored cell.
///
/// Qualified keys are applied before bare ones, so when `A1` and
/// `Main!A1` name the same default-sheet cell the bare key wins.
pub fn apply_overrides(workbook: &mut Workbook, overrides: &Overrides) -> usize {
    let (bare, qualified): (Vec<_>, Vec<_>) =
        overrides.iter().partition(|(key, _)| !key.contains('!'));

    let mut applied = 0;
    for (key, value) in qualified.into_iter().chain(bare) {
        let Some((sheet_name, coordinate)) = workbook.locate(key) else {
            debug!(key = %key, "override names no known sheet, ignored");
            continue;
        };
        let Some(sheet) = workbook.contents.get_mut(&sheet_name) else {
            continue;
        };
        match sheet.cells.get_mut(&coordinate) {
            Some(cell) => {
                *cell = Cell::number(*value);
                applied += 1;
            }
            None => debug!(key = %key, "override names no stored cell, ignored"),
        }
    }
    applied
}

pub fn round_results(cells: &mut ResultMap) {
    for value in cells.values_mut() {
        if let CellValue::Number(n) = value {
            *n = round_value(*n);
        }
    }
}

/// Round to [`RESULT_PRECISION`] places. Values that cannot be scaled
/// without overflowing are returned unchanged.
pub fn round_value(value: f64) -> f64 {
    let factor = 10f64.powi(RESULT_PRECISION);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coordinate, Sheet};
    use pretty_assertions::assert_eq;

    fn doubling_workbook() -> Workbook {
        let mut sheet = Sheet::new("Sheet1");
        sheet.set(Coordinate::new(1, 1), Cell::number(10.0));
        sheet.set(Coordinate::new(1, 2), Cell::formula("=A1*2").unwrap());
        let mut wb = Workbook::new();
        wb.add_sheet(sheet);
        wb
    }

    fn overrides(pairs: &[(&str, f64)]) -> Overrides {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_run_without_overrides() {
        let out = run_workbook(doubling_workbook(), &Overrides::new()).unwrap();
        assert_eq!(out.cells.get("A1"), Some(&CellValue::Number(10.0)));
        assert_eq!(out.cells.get("A2"), Some(&CellValue::Number(20.0)));
        assert!(out.metadata.has_model);
    }

    #[test]
    fn test_override_constant() {
        let out = run_workbook(doubling_workbook(), &overrides(&[("A1", 5.0)])).unwrap();
        assert_eq!(out.cells.get("A1"), Some(&CellValue::Number(5.0)));
        assert_eq!(out.cells.get("Sheet1!A2"), Some(&CellValue::Number(10.0)));
    }

    #[test]
    fn test_override_replaces_formula() {
        let mut wb = doubling_workbook();
        let applied = apply_overrides(&mut wb, &overrides(&[("Sheet1!A2", 3.0)]));
        assert_eq!(applied, 1);
        let (_, _, cell) = wb.cell("A2").unwrap();
        assert_eq!(cell, &Cell::number(3.0));
    }

    #[test]
    fn test_bare_override_wins_over_qualified() {
        for (bare, qualified) in [(5.0, 2.0), (2.0, 5.0)] {
            let inputs = overrides(&[("A1", bare), ("Sheet1!A1", qualified)]);
            let out = run_workbook(doubling_workbook(), &inputs).unwrap();
            assert_eq!(out.cells.get("A1"), Some(&CellValue::Number(bare)));
            assert_eq!(out.cells.get("A2"), Some(&CellValue::Number(bare * 2.0)));
        }
    }

    #[test]
    fn test_unmatched_overrides_are_ignored() {
        let mut wb = doubling_workbook();
        let applied = apply_overrides(
            &mut wb,
            &overrides(&[("Z99", 1.0), ("Nope!A1", 1.0), ("garbage", 1.0)]),
        );
        assert_eq!(applied, 0);
        assert_eq!(wb, doubling_workbook());
    }

    #[test]
    fn test_empty_workbook_run() {
        let out = run_workbook(Workbook::new(), &overrides(&[("A1", 1.0)])).unwrap();
        assert!(out.cells.is_empty());
        assert!(!out.metadata.has_model);
        assert!(out.metadata.sheets.is_empty());
    }

    #[test]
    fn test_reports_follow_manifest_order() {
        let mut wb = doubling_workbook();
        wb.add_sheet(Sheet::new("Second"));
        let (out, reports) = run_with_reports(wb, &Overrides::new()).unwrap();
        let names: Vec<&str> = reports.iter().map(|r| r.sheet.as_str()).collect();
        assert_eq!(names, vec!["Sheet1", "Second"]);
        assert!(reports.iter().all(|r| r.converged()));
        assert_eq!(out.cells.len(), 4);
    }

    #[test]
    fn test_round_value() {
        assert_eq!(round_value(1.0 / 3.0), 0.333333);
        assert_eq!(round_value(2.0000004), 2.0);
        assert_eq!(round_value(-2.5000004), -2.5);
        assert_eq!(round_value(f64::MAX), f64::MAX);
    }

    #[test]
    fn test_results_are_rounded() {
        let mut sheet = Sheet::new("S");
        sheet.set(Coordinate::new(1, 1), Cell::formula("=10/3").unwrap());
        sheet.set(Coordinate::new(1, 2), Cell::text("note"));
        let mut wb = Workbook::new();
        wb.add_sheet(sheet);

        let out = run_workbook(wb, &Overrides::new()).unwrap();
        assert_eq!(out.cells.get("A1"), Some(&CellValue::Number(3.333333)));
        assert_eq!(out.cells.get("A2"), Some(&CellValue::Text("note".to_string())));
    }
}
