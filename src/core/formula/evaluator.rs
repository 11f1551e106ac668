//! Arithmetic evaluator
//!
//! Walks a parsed expression tree. Faults such as division by zero are
//! reported as errors, never panics.

use super::parser::Expr;

/// Error during evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Eval error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Evaluate an expression tree to a number. Every intermediate value must
/// be finite.
pub fn evaluate(expr: &Expr) -> Result<f64, EvalError> {
    finite(evaluate_node(expr)?)
}

fn evaluate_node(expr: &Expr) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(n) => finite(*n),

        Expr::UnaryOp { op, operand } => {
            let value = evaluate(operand)?;
            match op {
                '-' => Ok(-value),
                '+' => Ok(value),
                _ => Err(EvalError::new(format!("Unknown unary operator: {}", op))),
            }
        }

        Expr::BinaryOp { op, left, right } => {
            let l = evaluate(left)?;
            let r = evaluate(right)?;
            match op {
                '+' => Ok(l + r),
                '-' => Ok(l - r),
                '*' => Ok(l * r),
                '/' => {
                    if r == 0.0 {
                        Err(EvalError::new("Division by zero"))
                    } else {
                        Ok(l / r)
                    }
                }
                _ => Err(EvalError::new(format!("Unknown operator: {}", op))),
            }
        }
    }
}

fn finite(value: f64) -> Result<f64, EvalError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::new(format!("Result out of range: {}", value)))
    }
}
