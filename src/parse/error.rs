use std::fmt;
use std::ops::Range;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("error at position {} ({slice:?}): {kind}", .span.start)]
pub struct FormulaError {
    pub kind: FormulaErrorKind,
    pub span: Range<usize>,
    pub slice: String,
}

impl FormulaError {
    pub(crate) fn new(kind: FormulaErrorKind, span: Range<usize>, source: &str) -> Self {
        let slice = source.get(span.clone()).unwrap_or_default().to_string();
        Self { kind, span, slice }
    }

    /// An error about a term sequence that has no source text, such as one
    /// built by hand or read back from a stored record.
    pub(crate) fn detached(kind: FormulaErrorKind, slice: impl Into<String>) -> Self {
        Self {
            kind,
            span: 0..0,
            slice: slice.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormulaErrorKind {
    UnexpectedToken { expected: Vec<&'static str> },
    UnexpectedCharacter,
    Unbalanced(char),
    EmptyFlavor,
    DanglingFlavor,
    MissingOperand,
    MissingOperator,
    UnknownFunction(String),
    FunctionArity { expected: String, found: usize },
    InvalidModifier(String),
    InvalidDie,
}

impl fmt::Display for FormulaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToken { expected } => {
                write!(f, "unexpected token, expected ")?;
                fmt_expected(expected, f)
            }
            Self::UnexpectedCharacter => write!(f, "unexpected character"),
            Self::Unbalanced(c) => write!(f, "unbalanced '{}'", c),
            Self::EmptyFlavor => write!(f, "flavor text cannot be empty"),
            Self::DanglingFlavor => write!(f, "flavor text must follow a term"),
            Self::MissingOperand => write!(f, "operator is missing an operand"),
            Self::MissingOperator => write!(f, "terms must be separated by an operator"),
            Self::UnknownFunction(name) => write!(f, "unknown math function {:?}", name),
            Self::FunctionArity { expected, found } => {
                write!(f, "expected {} arguments, found {}", expected, found)
            }
            Self::InvalidModifier(m) => write!(f, "invalid modifier {:?}", m),
            Self::InvalidDie => write!(f, "invalid dice notation"),
        }
    }
}

fn fmt_expected(expected: &[&str], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match expected {
        [] => Ok(()),
        [a] => f.write_str(a),
        [a, b] => write!(f, "{} or {}", a, b),
        [init @ .., last] => write!(f, "{}, or {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FormulaError::new(FormulaErrorKind::Unbalanced('('), 0..1, "(1 + 2");
        assert_eq!(err.to_string(), "error at position 0 (\"(\"): unbalanced '('");

        let err = FormulaError::new(
            FormulaErrorKind::UnexpectedToken {
                expected: vec!["')'", "','", "<term>"],
            },
            4..5,
            "max(1 2)",
        );
        assert_eq!(
            err.to_string(),
            "error at position 4 (\"1\"): unexpected token, expected ')', ',', or <term>"
        );
    }
}
