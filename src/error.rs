use thiserror::Error;

use crate::core::formula::evaluator::EvalError;
use crate::core::formula::parser::ParseError;

pub type CalcResult<T> = Result<T, CalcError>;

#[derive(Error, Debug)]
pub enum CalcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Formula engine error: {0}")]
    Engine(String),
}

/// Why a single formula produced no value.
///
/// None of these abort a run: the calculator records the cell as `Null`
/// (or keeps it pending for another pass) and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("reference {0} has no value yet")]
    UnresolvedReference(String),

    #[error("range {0} covers too many cells")]
    RangeTooLarge(String),

    #[error("character '{0}' is not allowed in arithmetic")]
    UnsafeCharacter(char),

    #[error("{0}")]
    Syntax(#[from] ParseError),

    #[error("{0}")]
    Arithmetic(#[from] EvalError),
}
