use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::str::FromStr;

pub use vec1::vec1;

pub type Int = i64;
pub type UInt = u32;
pub type Float = f64;
pub type NonZeroUInt = std::num::NonZeroU32;

pub type NonEmpty<T> = vec1::Vec1<T>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UnaryOperator {
    Pos,
    Neg,
}

impl UnaryOperator {
    pub const fn symbol(self) -> char {
        match self {
            Self::Pos => '+',
            Self::Neg => '-',
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char(self.symbol())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter.
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div | Self::Rem => 2,
        }
    }

    pub const fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Rem => '%',
        }
    }

    pub const fn as_unary(self) -> Option<UnaryOperator> {
        match self {
            Self::Add => Some(UnaryOperator::Pos),
            Self::Sub => Some(UnaryOperator::Neg),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char(self.symbol())
    }
}

/// Either flavor of arithmetic operator that can appear in a term sequence.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Operator {
    Unary(UnaryOperator),
    Binary(BinaryOperator),
}

impl Operator {
    pub fn from_symbol(symbol: &str, unary: bool) -> Option<Self> {
        let op = match symbol {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Sub,
            "*" => BinaryOperator::Mul,
            "/" => BinaryOperator::Div,
            "%" => BinaryOperator::Rem,
            _ => return None,
        };
        if unary {
            op.as_unary().map(Self::Unary)
        } else {
            Some(Self::Binary(op))
        }
    }

    pub const fn symbol(self) -> char {
        match self {
            Self::Unary(op) => op.symbol(),
            Self::Binary(op) => op.symbol(),
        }
    }

    pub const fn is_unary(self) -> bool {
        matches!(self, Self::Unary(_))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unary(op) => write!(f, "{}", op),
            Self::Binary(op) => write!(f, " {} ", op),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    pub fn test<T: PartialOrd>(self, value: T, target: T) -> bool {
        match self {
            Self::Eq => value == target,
            Self::Lt => value < target,
            Self::Le => value <= target,
            Self::Gt => value > target,
            Self::Ge => value >= target,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "=" => Self::Eq,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_symbols() {
        assert_eq!(
            Operator::from_symbol("-", true),
            Some(Operator::Unary(UnaryOperator::Neg))
        );
        assert_eq!(Operator::from_symbol("*", true), None);
        assert_eq!(
            Operator::from_symbol("%", false),
            Some(Operator::Binary(BinaryOperator::Rem))
        );
        assert_eq!(Operator::Binary(BinaryOperator::Add).to_string(), " + ");
        assert_eq!(Operator::Unary(UnaryOperator::Neg).to_string(), "-");
    }

    #[test]
    fn test_comparison() {
        assert!(Comparison::Ge.test(5, 5));
        assert!(!Comparison::Gt.test(5, 5));
        assert!(Comparison::Lt.test(1, 2));
        assert_eq!("<=".parse(), Ok(Comparison::Le));
        assert!("=>".parse::<Comparison>().is_err());
    }
}
