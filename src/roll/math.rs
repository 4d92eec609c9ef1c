use super::ctx::reduce;
use super::num::Number;
use super::tree::{FunctionTerm, RollTerm};
use super::{RResult, RollError};
use crate::common::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathFunction {
    Abs,
    Ceil,
    Floor,
    Round,
    Trunc,
    Sign,
    Sqrt,
    Cbrt,
    Exp,
    Log,
    Log2,
    Log10,
    Min,
    Max,
    Pow,
    Clamp,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Self::Exactly(x) => n == x,
            Self::AtLeast(x) => n >= x,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "{}", n),
            Self::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

impl MathFunction {
    pub const ALL: &'static [Self] = &[
        Self::Abs,
        Self::Ceil,
        Self::Floor,
        Self::Round,
        Self::Trunc,
        Self::Sign,
        Self::Sqrt,
        Self::Cbrt,
        Self::Exp,
        Self::Log,
        Self::Log2,
        Self::Log10,
        Self::Min,
        Self::Max,
        Self::Pow,
        Self::Clamp,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Ceil => "ceil",
            Self::Floor => "floor",
            Self::Round => "round",
            Self::Trunc => "trunc",
            Self::Sign => "sign",
            Self::Sqrt => "sqrt",
            Self::Cbrt => "cbrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Log2 => "log2",
            Self::Log10 => "log10",
            Self::Min => "min",
            Self::Max => "max",
            Self::Pow => "pow",
            Self::Clamp => "clamp",
        }
    }

    pub const fn arity(self) -> Arity {
        match self {
            Self::Min | Self::Max => Arity::AtLeast(1),
            Self::Pow => Arity::Exactly(2),
            Self::Clamp => Arity::Exactly(3),
            _ => Arity::Exactly(1),
        }
    }

    fn apply(self, args: &[Float]) -> Float {
        let x = args.first().copied().unwrap_or(Float::NAN);
        match self {
            Self::Abs => x.abs(),
            Self::Ceil => x.ceil(),
            Self::Floor => x.floor(),
            // halves round up, including negative ones
            Self::Round => (x + 0.5).floor(),
            Self::Trunc => x.trunc(),
            Self::Sign if x == 0.0 => 0.0,
            Self::Sign => x.signum(),
            Self::Sqrt => x.sqrt(),
            Self::Cbrt => x.cbrt(),
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Log2 => x.log2(),
            Self::Log10 => x.log10(),
            Self::Min => args.iter().copied().fold(Float::INFINITY, Float::min),
            Self::Max => args.iter().copied().fold(Float::NEG_INFINITY, Float::max),
            Self::Pow => x.powf(args[1]),
            Self::Clamp => x.max(args[1]).min(args[2]),
        }
    }
}

impl fmt::Display for MathFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MathFunction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or(())
    }
}

/// The whitelist of math functions a formula may call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathProxy {
    allowed: HashSet<MathFunction>,
}

impl Default for MathProxy {
    fn default() -> Self {
        Self::restricted(MathFunction::ALL.iter().copied())
    }
}

impl MathProxy {
    pub fn restricted(allowed: impl IntoIterator<Item = MathFunction>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn allows(&self, function: MathFunction) -> bool {
        self.allowed.contains(&function)
    }

    pub fn call(&self, function: MathFunction, args: &[Number]) -> RResult<Number> {
        if !self.allows(function) {
            return Err(RollError::ForbiddenFunction(function.to_string()));
        }
        if !function.arity().accepts(args.len()) {
            return Err(RollError::FunctionArity {
                function: function.to_string(),
                expected: function.arity().to_string(),
                found: args.len(),
            });
        }

        let args: Vec<Float> = args.iter().map(|x| x.as_float()).collect();
        let result = Number::Float(function.apply(&args)).normalize();
        trace!(%function, ?args, %result, "called math function");
        Ok(result)
    }

    /// Evaluates an arithmetic expression that may call whitelisted
    /// functions. Dice, pools and unresolved strings are refused.
    pub fn safe_eval(&self, expression: &str) -> RResult<Number> {
        let mut terms = crate::parse::parse(expression)?;
        if !is_static(&terms) {
            return Err(RollError::UnsafeExpression(expression.to_string()));
        }
        let total = self.eval_static(&mut terms)?;
        if total.is_finite() {
            Ok(total)
        } else {
            Err(RollError::InvalidTotal(total.to_string()))
        }
    }

    fn eval_static(&self, terms: &mut [RollTerm]) -> RResult<Number> {
        for term in terms.iter_mut() {
            match term {
                RollTerm::Parenthetical(p) => p.total = Some(self.eval_static(&mut p.terms)?),
                RollTerm::Function(f) => self.eval_function(f)?,
                _ => {}
            }
        }
        reduce(terms)
    }

    fn eval_function(&self, f: &mut FunctionTerm) -> RResult<()> {
        let args = f
            .args
            .iter_mut()
            .map(|arg| self.eval_static(arg))
            .collect::<RResult<Vec<_>>>()?;
        f.result = Some(self.call(f.function, &args)?);
        Ok(())
    }
}

fn is_static(terms: &[RollTerm]) -> bool {
    terms.iter().all(|term| match term {
        RollTerm::Numeric(_) | RollTerm::Operator(_) => true,
        RollTerm::Parenthetical(p) => is_static(&p.terms),
        RollTerm::Function(f) => f.args.iter().all(|arg| is_static(arg)),
        RollTerm::Die(_) | RollTerm::Pool(_) | RollTerm::String(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: MathFunction, args: &[Number]) -> Number {
        MathProxy::default().call(f, args).unwrap()
    }

    #[test]
    fn test_functions() {
        use MathFunction::*;
        assert_eq!(call(Floor, &[Number::Float(2.7)]), Number::Int(2));
        assert_eq!(call(Round, &[Number::Float(-2.5)]), Number::Int(-2));
        assert_eq!(call(Round, &[Number::Float(2.5)]), Number::Int(3));
        assert_eq!(call(Sign, &[Number::Int(0)]), Number::Int(0));
        assert_eq!(call(Sign, &[Number::Int(-4)]), Number::Int(-1));
        assert_eq!(call(Max, &[Number::Int(1), Number::Int(7), Number::Int(3)]), Number::Int(7));
        assert_eq!(call(Pow, &[Number::Int(2), Number::Int(10)]), Number::Int(1024));
        assert_eq!(call(Clamp, &[Number::Int(12), Number::Int(1), Number::Int(10)]), Number::Int(10));
    }

    #[test]
    fn test_whitelist_and_arity() {
        let proxy = MathProxy::restricted([MathFunction::Abs]);
        assert!(matches!(
            proxy.call(MathFunction::Sqrt, &[Number::Int(4)]),
            Err(RollError::ForbiddenFunction(_))
        ));
        assert!(matches!(
            proxy.call(MathFunction::Abs, &[]),
            Err(RollError::FunctionArity { found: 0, .. })
        ));
        assert_eq!("log10".parse(), Ok(MathFunction::Log10));
        assert!("eval".parse::<MathFunction>().is_err());
    }

    #[test]
    fn test_safe_eval() {
        let proxy = MathProxy::default();
        assert_eq!(proxy.safe_eval("floor(7 / 2) + 1").unwrap(), Number::Int(4));
        assert_eq!(proxy.safe_eval("max(1, 2 * (3 + 1))").unwrap(), Number::Int(8));
        assert!(matches!(
            proxy.safe_eval("1d6 + 1"),
            Err(RollError::UnsafeExpression(_))
        ));
        assert!(matches!(
            proxy.safe_eval("process"),
            Err(RollError::UnsafeExpression(_))
        ));
        assert!(matches!(proxy.safe_eval("sqrt(-1)"), Err(RollError::InvalidTotal(_))));
        assert!(matches!(proxy.safe_eval("1 +"), Err(RollError::Formula(_))));
    }
}
