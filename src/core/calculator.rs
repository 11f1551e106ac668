//! Sheet and workbook evaluation
//!
//! Each sheet is evaluated in two phases:
//!
//! - **seed**: constants are parsed and written to the result map.
//! - **iterate**: pending formulas are retried, in row-major order, for at
//!   most `2 x formula count` passes. A formula that yields a value is
//!   resolved and written immediately, so later cells in the same pass can
//!   read it. A pass that resolves nothing ends the loop early.
//!
//! Whatever is still pending afterwards is written as `Null`.
//!
//! Sheets run strictly in manifest order. A reference to a sheet that comes
//! later in that order finds no value (0 inside an aggregate, `Null` when
//! used directly); forward and circular cross-sheet references are not
//! reordered.

use tracing::debug;

use crate::core::formula::{parse_literal, FormulaEngine};
use crate::error::CalcResult;
use crate::types::{qualify, Cell, CellValue, Coordinate, RawValue, ResultMap, Sheet, Workbook};

/// Convergence summary for one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetReport {
    pub sheet: String,
    pub constants: usize,
    pub formulas: usize,
    pub resolved: usize,
    pub passes: usize,
    /// Formula cells that never produced a value.
    pub unresolved: Vec<Coordinate>,
}

impl SheetReport {
    pub fn converged(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Workbook calculator with bounded fixed-point iteration
pub struct Calculator {
    workbook: Workbook,
    engine: FormulaEngine,
}

impl Calculator {
    pub fn new(workbook: Workbook) -> CalcResult<Self> {
        Ok(Self {
            workbook,
            engine: FormulaEngine::new()?,
        })
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// Evaluate every sheet and return the flat result map.
    pub fn calculate_all(&self) -> ResultMap {
        self.calculate_with_reports().0
    }

    /// Evaluate every sheet, also returning a convergence report per sheet.
    pub fn calculate_with_reports(&self) -> (ResultMap, Vec<SheetReport>) {
        let mut results = ResultMap::new();
        let mut reports = Vec::new();
        let default_sheet = self.workbook.default_sheet();

        for sheet in self.workbook.ordered_sheets() {
            let is_default = default_sheet == Some(sheet.name.as_str());
            reports.push(self.calculate_sheet(sheet, is_default, &mut results));
        }

        (results, reports)
    }

    /// Evaluate one sheet into `results`, which may already hold values from
    /// sheets evaluated earlier.
    pub fn calculate_sheet(
        &self,
        sheet: &Sheet,
        is_default: bool,
        results: &mut ResultMap,
    ) -> SheetReport {
        let mut constants = 0;
        let mut pending: Vec<(Coordinate, &str)> = Vec::new();

        // Seed
        for (coordinate, cell) in &sheet.cells {
            match cell {
                Cell::Constant(raw) => {
                    write_value(results, &sheet.name, coordinate, is_default, seed_value(raw));
                    constants += 1;
                }
                Cell::Formula(formula) => pending.push((*coordinate, formula.as_str())),
            }
        }

        // Iterate
        let formulas = pending.len();
        let max_passes = (2 * formulas).max(1);
        let mut passes = 0;

        while !pending.is_empty() && passes < max_passes {
            passes += 1;
            let before = pending.len();
            let mut still_pending = Vec::with_capacity(before);

            for (coordinate, formula) in pending {
                let value = {
                    let snapshot = &*results;
                    let lookup = |key: &str| snapshot.get(key).cloned();
                    self.engine.evaluate(formula, &lookup, &sheet.name)
                };
                if value.is_null() {
                    still_pending.push((coordinate, formula));
                } else {
                    write_value(results, &sheet.name, &coordinate, is_default, value);
                }
            }

            let progressed = still_pending.len() < before;
            pending = still_pending;
            if !progressed {
                break;
            }
        }

        let unresolved: Vec<Coordinate> = pending.iter().map(|(c, _)| *c).collect();
        for coordinate in &unresolved {
            write_value(results, &sheet.name, coordinate, is_default, CellValue::Null);
        }

        let report = SheetReport {
            sheet: sheet.name.clone(),
            constants,
            formulas,
            resolved: formulas - unresolved.len(),
            passes,
            unresolved,
        };
        debug!(
            sheet = %report.sheet,
            passes = report.passes,
            resolved = report.resolved,
            pending = report.unresolved.len(),
            "sheet evaluated"
        );
        report
    }
}

/// Constants go through the literal path; empty cells are `Null`.
fn seed_value(raw: &RawValue) -> CellValue {
    match raw {
        RawValue::Number(n) => CellValue::Number(*n),
        RawValue::Text(s) => parse_literal(s),
        RawValue::Empty => CellValue::Null,
    }
}

/// Store under `Sheet!A1`, and also `A1` for the default sheet.
fn write_value(
    results: &mut ResultMap,
    sheet: &str,
    coordinate: &Coordinate,
    is_default: bool,
    value: CellValue,
) {
    if is_default {
        results.insert(coordinate.to_string(), value.clone());
    }
    results.insert(qualify(sheet, coordinate), value);
}
