//! Calc Model - what-if recalculation of exported spreadsheet models
//!
//! A spreadsheet is exported once into a directory of JSON files (a
//! manifest plus one file per sheet). This library reloads that export and
//! recalculates every formula under caller-supplied input overrides, without
//! the spreadsheet application.
//!
//! # Features
//!
//! - Arithmetic with `+ - * /` and parentheses, evaluated by a small
//!   whitelisted interpreter (formula text is never executed as code)
//! - `SUM` and `AVERAGE` over single cells or ranges
//! - Sheet-qualified references (`Sheet2!B1`, `'My Sheet'!A1:C3`)
//! - Bounded fixed-point evaluation: at most `2 x formulas` passes per sheet
//! - Input overrides that replace a cell's value or formula for one run
//!
//! # Example
//!
//! ```no_run
//! use calc_model::runner::run_calculation;
//! use calc_model::types::Overrides;
//! use std::path::Path;
//!
//! let mut inputs = Overrides::new();
//! inputs.insert("A1".to_string(), 5.0);
//!
//! let output = run_calculation(&inputs, Path::new("exported"))?;
//! println!("Sheets: {}", output.metadata.sheets.len());
//! println!("A2 = {:?}", output.cells.get("A2"));
//! # Ok::<(), calc_model::error::CalcError>(())
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod error;
pub mod loader;
pub mod metadata;
pub mod runner;
pub mod types;

// Re-export commonly used types
pub use error::{CalcError, CalcResult, FormulaError};
pub use loader::load_workbook;
pub use metadata::{get_model_metadata, ModelMetadata};
pub use runner::{run_calculation, RunOutput};
pub use types::{Cell, CellValue, Coordinate, Overrides, ResultMap, Sheet, Workbook};
