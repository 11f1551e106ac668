//! Calculation engine: reference resolution, formula evaluation and the
//! fixed-point workbook calculator

pub mod calculator;
pub mod formula;
pub mod reference;

pub use calculator::{Calculator, SheetReport};
pub use formula::FormulaEngine;
