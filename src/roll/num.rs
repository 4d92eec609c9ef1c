use crate::common::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(Int),
    Float(Float),
}

impl Number {
    pub const ZERO: Self = Self::Int(0);

    // Largest integer an f64 represents exactly.
    const MAX_EXACT: Float = 9_007_199_254_740_992.0;

    pub fn as_int(self) -> Int {
        match self {
            Self::Int(x) => x,
            Self::Float(x) => x as Int,
        }
    }

    pub fn as_float(self) -> Float {
        match self {
            Self::Int(x) => x as Float,
            Self::Float(x) => x,
        }
    }

    pub fn is_finite(self) -> bool {
        match self {
            Self::Int(_) => true,
            Self::Float(x) => x.is_finite(),
        }
    }

    /// Collapses an integral float back into an integer.
    pub fn normalize(self) -> Self {
        match self {
            Self::Float(x) if x.fract() == 0.0 && x.abs() < Self::MAX_EXACT => Self::Int(x as Int),
            _ => self,
        }
    }

    pub(crate) fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs == Self::ZERO {
            return None;
        }
        Some(match (self, rhs) {
            (Self::Int(x), Self::Int(y)) if x.checked_rem(y) == Some(0) => Self::Int(x / y),
            (x, y) => Self::Float(x.as_float() / y.as_float()),
        })
    }

    pub(crate) fn checked_rem(self, rhs: Self) -> Option<Self> {
        if rhs == Self::ZERO {
            return None;
        }
        Some(match (self, rhs) {
            (Self::Int(x), Self::Int(y)) => x
                .checked_rem(y)
                .map_or_else(|| Self::Float(x as Float % y as Float), Self::Int),
            (x, y) => Self::Float(x.as_float() % y.as_float()),
        })
    }
}

impl std::ops::Neg for Number {
    type Output = Self;

    fn neg(self) -> Self::Output {
        match self {
            Self::Int(x) => x.checked_neg().map_or(Self::Float(-(x as Float)), Self::Int),
            Self::Float(x) => Self::Float(-x),
        }
    }
}

macro_rules! num_impl_bin_op {
    ($Name:ident, $fn_name:ident, $checked:ident) => {
        impl std::ops::$Name for Number {
            type Output = Self;

            fn $fn_name(self, rhs: Self) -> Self::Output {
                match (self, rhs) {
                    (Self::Int(x), Self::Int(y)) => x
                        .$checked(y)
                        .map_or_else(
                            || Self::Float(std::ops::$Name::$fn_name(x as Float, y as Float)),
                            Self::Int,
                        ),
                    (x, y) => Self::Float(std::ops::$Name::$fn_name(x.as_float(), y.as_float())),
                }
            }
        }
    };
}

num_impl_bin_op!(Add, add, checked_add);
num_impl_bin_op!(Sub, sub, checked_sub);
num_impl_bin_op!(Mul, mul, checked_mul);

impl std::iter::Sum for Number {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |a, b| a + b)
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(x), Self::Int(y)) => x == y,
            (x, y) => x.as_float().eq(&y.as_float()),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Int(x), Self::Int(y)) => x.partial_cmp(y),
            (x, y) => x.as_float().partial_cmp(&y.as_float()),
        }
    }
}

impl From<Int> for Number {
    fn from(x: Int) -> Self {
        Self::Int(x)
    }
}

impl From<Float> for Number {
    fn from(x: Float) -> Self {
        Self::Float(x)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(x) => fmt::Display::fmt(x, f),
            Self::Float(x) => fmt::Display::fmt(x, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_stays_integral_when_exact() {
        assert_eq!(Number::Int(6).checked_div(Number::Int(3)), Some(Number::Int(2)));
        assert!(matches!(
            Number::Int(7).checked_div(Number::Int(2)),
            Some(Number::Float(x)) if x == 3.5
        ));
        assert_eq!(Number::Int(1).checked_div(Number::ZERO), None);
        assert_eq!(Number::Int(1).checked_rem(Number::Float(0.0)), None);
    }

    #[test]
    fn test_overflow_promotes_to_float() {
        let big = Number::Int(Int::MAX);
        assert!(matches!(big + Number::Int(1), Number::Float(_)));
        assert!(matches!(-Number::Int(Int::MIN), Number::Float(_)));
    }

    #[test]
    fn test_normalize() {
        assert!(matches!(Number::Float(4.0).normalize(), Number::Int(4)));
        assert!(matches!(Number::Float(4.5).normalize(), Number::Float(_)));
        assert_eq!(Number::Float(2.5).to_string(), "2.5");
    }
}
