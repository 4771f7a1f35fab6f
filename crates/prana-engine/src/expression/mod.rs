//! The expression and template language (spec §4.4): a small Jinja-flavored
//! grammar (`{{ expr }}`, `{% if %}`/`{% for %}`, pipe filters) evaluated
//! against the per-node context the scheduler builds (`$input`, `$nodes`,
//! `$variables`, `$execution`). Grounded on the teacher's `expression` module
//! (lexer/parser/evaluator split, `ExpressionError` shape), with the grammar,
//! variable set and filter stdlib replaced to match the spec exactly.

pub mod evaluator;
pub mod filters;
pub mod parser;

pub use evaluator::{render_params, render_value, EvalContext};
pub use parser::{parse_expr, parse_template, Expr, TemplateNode};

use prana_workflow::ErrorKind;
use thiserror::Error;

/// Failures from parsing or evaluating an expression/template (spec §7
/// `template_error`, `template_limit`).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("unknown filter: {0}")]
    UnknownFilter(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

impl ExpressionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExpressionError::LimitExceeded(_) => ErrorKind::TemplateLimit,
            _ => ErrorKind::TemplateError,
        }
    }
}
