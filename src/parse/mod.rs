mod error;
mod lexer;
pub mod modifier;
mod parser;

pub use error::{FormulaError, FormulaErrorKind};
pub use modifier::{parse_modifiers, Modifier, ModifierError, Target};
pub use parser::{check_terms, simplify_terms};

use crate::roll::tree::RollTerm;

/// Splits a formula into its top-level term sequence. Data references are
/// kept as string terms; substitute them first to resolve them.
pub fn parse(formula: &str) -> Result<Vec<RollTerm>, FormulaError> {
    parser::Parser::new(formula).parse()
}

pub fn validate(formula: &str) -> bool {
    parse(formula).is_ok()
}
