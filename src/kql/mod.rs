//! KQL syntax checking used by the validation agent's tool

pub mod checker;
pub mod diagnostic;
pub mod lexer;

pub use checker::validate;
pub use diagnostic::{Diagnostic, INVALID_HEADER, Position, VALID_MESSAGE, ValidationReport};
