//! Error handling tests

use calc_model::core::formula::evaluator::EvalError;
use calc_model::core::formula::FormulaEngine;
use calc_model::error::{CalcError, FormulaError};
use calc_model::types::CellValue;

#[test]
fn test_calc_error_display() {
    assert_eq!(
        CalcError::Parse("bad input".to_string()).to_string(),
        "Parse error: bad input"
    );
    assert_eq!(
        CalcError::Validation("Scenario 'x' not found".to_string()).to_string(),
        "Validation error: Scenario 'x' not found"
    );
}

#[test]
fn test_calc_error_from_io() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: CalcError = io.into();
    assert!(matches!(err, CalcError::Io(_)));
    assert!(err.to_string().contains("gone"));
}

#[test]
fn test_calc_error_from_json() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: CalcError = json_err.into();
    assert!(matches!(err, CalcError::Json(_)));
}

#[test]
fn test_formula_error_display() {
    assert_eq!(
        FormulaError::UnresolvedReference("Sheet1!B2".to_string()).to_string(),
        "reference Sheet1!B2 has no value yet"
    );
    assert_eq!(
        FormulaError::UnsafeCharacter('^').to_string(),
        "character '^' is not allowed in arithmetic"
    );
    assert_eq!(
        FormulaError::RangeTooLarge("A:XFD".to_string()).to_string(),
        "range A:XFD covers too many cells"
    );
    let arithmetic: FormulaError = EvalError::new("Division by zero").into();
    assert_eq!(arithmetic.to_string(), "Eval error: Division by zero");
}

#[test]
fn test_formula_errors_never_escape_evaluate() {
    let engine = FormulaEngine::new().unwrap();
    let lookup = |_: &str| -> Option<CellValue> { None };

    for formula in ["=1/0", "=(1", "=A1", "=__import__('os')", "=2**3", "="] {
        assert_eq!(engine.evaluate(formula, &lookup, "S"), CellValue::Null, "{formula}");
        assert!(engine.try_evaluate(formula, &lookup, "S").is_err(), "{formula}");
    }
}
