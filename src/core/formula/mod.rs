//! Formula evaluation
//!
//! A formula is evaluated in named phases, each a plain text transformation:
//!
//! 1. **resolve aggregates** - every `SUM(...)` / `AVERAGE(...)` call is
//!    replaced by the number it computes.
//! 2. **substitute references** - every remaining cell reference is replaced
//!    by its looked-up value.
//! 3. **normalize decimals** - `,` becomes `.`.
//! 4. **whitelist** - only digits, whitespace and `+ - * / ( ) .` may remain.
//! 5. **arithmetic** - the text is tokenized, parsed and evaluated by the
//!    small arithmetic interpreter in this module. Nothing else ever
//!    interprets formula text.
//!
//! Text that does not start with `=` is a literal: a number if it parses as
//! one (either decimal separator), otherwise the text itself.

pub mod evaluator;
pub mod parser;
pub mod tokenizer;

use regex::Regex;
use tracing::trace;

use crate::core::reference::{parse_argument, scan_references, Target};
use crate::error::{CalcError, CalcResult, FormulaError};
use crate::types::{parse_decimal, qualify, CellValue};

/// Source of already-computed values, keyed by CellKey (`Sheet!A1` or `A1`).
///
/// `None` means the cell has no value yet: it is missing, still pending, or
/// lives on a sheet that has not been evaluated.
pub trait CellLookup {
    fn lookup(&self, key: &str) -> Option<CellValue>;
}

impl<F> CellLookup for F
where
    F: Fn(&str) -> Option<CellValue>,
{
    fn lookup(&self, key: &str) -> Option<CellValue> {
        self(key)
    }
}

/// Supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Average,
}

impl Aggregate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Some(Aggregate::Sum),
            "AVERAGE" => Some(Aggregate::Average),
            _ => None,
        }
    }

    /// Empty input yields 0 for both functions.
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let sum: f64 = values.iter().sum();
        match self {
            Aggregate::Sum => sum,
            Aggregate::Average => sum / values.len() as f64,
        }
    }
}

/// Evaluates single formulas against a [`CellLookup`].
pub struct FormulaEngine {
    aggregate_call: Regex,
}

impl FormulaEngine {
    pub fn new() -> CalcResult<Self> {
        let aggregate_call = Regex::new(r"(?i)(SUM|AVERAGE)\s*\(\s*([^)]+)\)")
            .map_err(|e| CalcError::Engine(format!("Regex error: {}", e)))?;
        Ok(Self { aggregate_call })
    }

    /// Evaluate a formula or literal. Any failure yields `CellValue::Null`.
    pub fn evaluate<L>(&self, formula: &str, lookup: &L, current_sheet: &str) -> CellValue
    where
        L: CellLookup + ?Sized,
    {
        match self.try_evaluate(formula, lookup, current_sheet) {
            Ok(value) => value,
            Err(e) => {
                trace!(sheet = current_sheet, formula, error = %e, "formula produced no value");
                CellValue::Null
            }
        }
    }

    /// Like [`evaluate`](Self::evaluate) but reports why a formula failed.
    pub fn try_evaluate<L>(
        &self,
        formula: &str,
        lookup: &L,
        current_sheet: &str,
    ) -> Result<CellValue, FormulaError>
    where
        L: CellLookup + ?Sized,
    {
        let Some(body) = formula_body(formula) else {
            return Ok(parse_literal(formula));
        };

        let text = self.resolve_aggregates(body, lookup, current_sheet)?;
        let text = substitute_references(&text, lookup, current_sheet)?;
        let text = normalize_decimals(&text);
        check_whitelist(&text)?;
        evaluate_arithmetic(&text).map(CellValue::Number)
    }

    /// Phase 1: replace each aggregate call with its computed value.
    pub fn resolve_aggregates<L>(
        &self,
        body: &str,
        lookup: &L,
        current_sheet: &str,
    ) -> Result<String, FormulaError>
    where
        L: CellLookup + ?Sized,
    {
        let mut out = String::with_capacity(body.len());
        let mut last = 0;

        for caps in self.aggregate_call.captures_iter(body) {
            let (Some(call), Some(name), Some(arg)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            // SUM inside a longer name (e.g. XSUM) is not a call
            if body[..call.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric())
            {
                continue;
            }
            let Some(function) = Aggregate::from_name(name.as_str()) else {
                continue;
            };

            let values = gather_numbers(arg.as_str().trim(), lookup, current_sheet)?;
            out.push_str(&body[last..call.start()]);
            out.push_str(&format_number(function.apply(&values)));
            last = call.end();
        }

        out.push_str(&body[last..]);
        Ok(out)
    }
}

/// The text after `=`, or `None` for a literal.
pub fn formula_body(formula: &str) -> Option<&str> {
    formula.trim().strip_prefix('=').map(str::trim)
}

/// Literal path: a number if the text parses as one, else the text unchanged.
pub fn parse_literal(text: &str) -> CellValue {
    match parse_decimal(text) {
        Some(n) => CellValue::Number(n),
        None => CellValue::Text(text.to_string()),
    }
}

/// Numeric values of the cells an aggregate argument covers.
/// Missing, `Null` and non-numeric cells are skipped. A range too large to
/// enumerate is an error.
pub fn gather_numbers<L>(
    arg: &str,
    lookup: &L,
    current_sheet: &str,
) -> Result<Vec<f64>, FormulaError>
where
    L: CellLookup + ?Sized,
{
    let Some(reference) = parse_argument(arg) else {
        return Ok(Vec::new());
    };
    let keys = reference
        .cell_keys(current_sheet)
        .ok_or_else(|| FormulaError::RangeTooLarge(arg.to_string()))?;
    Ok(keys
        .iter()
        .filter_map(|key| lookup.lookup(key).and_then(|v| v.as_number()))
        .collect())
}

/// Phase 2: replace every cell reference with its numeric value.
///
/// A reference with no value (missing, pending or `Null`) fails the formula
/// so the calculator can retry it on a later pass. Text that is not a number
/// substitutes as `0`. Bare ranges have no arithmetic meaning and fail.
pub fn substitute_references<L>(
    text: &str,
    lookup: &L,
    current_sheet: &str,
) -> Result<String, FormulaError>
where
    L: CellLookup + ?Sized,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for token in scan_references(text) {
        let coordinate = match token.reference.target {
            Target::Cell(c) => c,
            Target::Range(_) => return Err(FormulaError::UnsafeCharacter(':')),
        };
        let key = qualify(token.reference.sheet_or(current_sheet), &coordinate);
        let value = match lookup.lookup(&key) {
            None | Some(CellValue::Null) => return Err(FormulaError::UnresolvedReference(key)),
            Some(v) => v.as_number().unwrap_or(0.0),
        };

        out.push_str(&text[last..token.start]);
        out.push_str(&format_number(value));
        last = token.end;
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Phase 3
pub fn normalize_decimals(text: &str) -> String {
    text.replace(',', ".")
}

/// Phase 4: reject anything outside digits, whitespace and `+ - * / ( ) .`
pub fn check_whitelist(text: &str) -> Result<(), FormulaError> {
    match text.chars().find(|c| !is_arithmetic_char(*c)) {
        Some(c) => Err(FormulaError::UnsafeCharacter(c)),
        None => Ok(()),
    }
}

fn is_arithmetic_char(c: char) -> bool {
    c.is_ascii_digit() || c.is_whitespace() || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '.')
}

/// Phase 5
pub fn evaluate_arithmetic(text: &str) -> Result<f64, FormulaError> {
    let tokens = tokenizer::tokenize(text).map_err(parser::ParseError::from)?;
    let expr = parser::parse(tokens)?;
    Ok(evaluator::evaluate(&expr)?)
}

/// Render a number for re-insertion into formula text. Finite values never
/// use exponent notation; non-finite ones render as letters and are later
/// rejected by the whitelist.
fn format_number(n: f64) -> String {
    format!("{}", n)
}
