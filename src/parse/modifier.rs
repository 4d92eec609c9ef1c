use crate::common::*;
use crate::roll::Number;
use logos::{Lexer as LogosLexer, Logos};
use logos_iter::{LogosIter, PeekableLexer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

type Lexer<'a> = PeekableLexer<'a, LogosLexer<'a, ModifierToken>, ModifierToken>;

fn lexer(s: &str) -> Lexer<'_> {
    ModifierToken::lexer(s).peekable_lexer()
}

#[derive(Logos, Debug, Copy, Clone, Eq, PartialEq)]
enum ModifierToken {
    #[token("r")]
    Reroll,
    #[token("rr")]
    RerollRecursive,
    #[token("x")]
    Explode,
    #[token("xo")]
    ExplodeOnce,
    #[token("k")]
    Keep,
    #[token("kh")]
    KeepHighest,
    #[token("kl")]
    KeepLowest,
    #[token("d")]
    Drop,
    #[token("dh")]
    DropHighest,
    #[token("dl")]
    DropLowest,
    #[token("min")]
    Minimum,
    #[token("max")]
    Maximum,
    #[token("cs")]
    CountSuccesses,
    #[token("cf")]
    CountFailures,
    #[token("df")]
    DeductFailures,
    #[token("sf")]
    SubtractFailures,
    #[token("ms")]
    MarginOfSuccess,
    #[token("even")]
    Even,
    #[token("odd")]
    Odd,

    #[regex(r"[0-9]+")]
    Integer,

    #[token("=")]
    Equal,
    #[token("<")]
    LessThan,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterEqual,

    #[error]
    Error,
}

impl ModifierToken {
    const COMPARISONS: &'static [Self] = &[
        Self::Equal,
        Self::LessThan,
        Self::LessEqual,
        Self::GreaterThan,
        Self::GreaterEqual,
    ];
}

/// A comparison against a fixed value, e.g. the `>=5` in `cs>=5`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Target {
    pub comparison: Comparison,
    pub value: Int,
}

impl Target {
    pub const fn new(comparison: Comparison, value: Int) -> Self {
        Self { comparison, value }
    }

    pub fn test(&self, value: Number) -> bool {
        self.comparison.test(value, Number::Int(self.value))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.comparison {
            Comparison::Eq => write!(f, "{}", self.value),
            c => write!(f, "{}{}", c, self.value),
        }
    }
}

/// A die or pool modifier. Targets left as `None` take a default that
/// depends on the denomination they are applied to.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Modifier {
    Reroll {
        recursive: bool,
        max: Option<UInt>,
        target: Option<Target>,
    },
    Explode {
        recursive: bool,
        max: Option<UInt>,
        target: Option<Target>,
    },
    Keep {
        highest: bool,
        count: UInt,
    },
    Drop {
        highest: bool,
        count: UInt,
    },
    Minimum(Int),
    Maximum(Int),
    CountSuccesses(Option<Target>),
    CountFailures(Option<Target>),
    DeductFailures(Option<Target>),
    SubtractFailures(Option<Target>),
    MarginOfSuccess(Target),
    Even,
    Odd,
}

impl Modifier {
    /// Whether the modifier makes sense on a `{...}` pool.
    pub const fn applies_to_pool(&self) -> bool {
        matches!(
            self,
            Self::Keep { .. }
                | Self::Drop { .. }
                | Self::CountSuccesses(_)
                | Self::CountFailures(_)
        )
    }
}

fn fmt_repeat(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    max: Option<UInt>,
    target: Option<Target>,
) -> fmt::Result {
    f.write_str(name)?;
    match (max, target) {
        (Some(max), Some(t)) => write!(f, "{}{}{}", max, t.comparison, t.value),
        (_, Some(t)) => write!(f, "{}", t),
        _ => Ok(()),
    }
}

fn fmt_target(f: &mut fmt::Formatter<'_>, name: &str, target: Option<Target>) -> fmt::Result {
    f.write_str(name)?;
    match target {
        Some(t) => write!(f, "{}", t),
        None => Ok(()),
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Reroll {
                recursive,
                max,
                target,
            } => fmt_repeat(f, if recursive { "rr" } else { "r" }, max, target),
            Self::Explode {
                recursive,
                max,
                target,
            } => fmt_repeat(f, if recursive { "x" } else { "xo" }, max, target),
            Self::Keep { highest, count } => {
                write!(f, "k{}{}", if highest { 'h' } else { 'l' }, count)
            }
            Self::Drop { highest, count } => {
                write!(f, "d{}{}", if highest { 'h' } else { 'l' }, count)
            }
            Self::Minimum(x) => write!(f, "min{}", x),
            Self::Maximum(x) => write!(f, "max{}", x),
            Self::CountSuccesses(t) => fmt_target(f, "cs", t),
            Self::CountFailures(t) => fmt_target(f, "cf", t),
            Self::DeductFailures(t) => fmt_target(f, "df", t),
            Self::SubtractFailures(t) => fmt_target(f, "sf", t),
            Self::MarginOfSuccess(t) => write!(f, "ms{}{}", t.comparison, t.value),
            Self::Even => f.write_str("even"),
            Self::Odd => f.write_str("odd"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("invalid modifier {0:?}")]
pub struct ModifierError(pub String);

impl FromStr for Modifier {
    type Err = ModifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mods = parse_modifiers(s)?;
        match (mods.pop(), mods.is_empty()) {
            (Some(m), true) => Ok(m),
            _ => Err(ModifierError(s.to_string())),
        }
    }
}

impl From<Modifier> for String {
    fn from(m: Modifier) -> Self {
        m.to_string()
    }
}

impl TryFrom<String> for Modifier {
    type Error = ModifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Parses a run of modifiers such as `kh3` or `r<3x`, case-insensitively.
pub fn parse_modifiers(s: &str) -> Result<Vec<Modifier>, ModifierError> {
    let lower = s.to_ascii_lowercase();
    ModifierParser::new(&lower)
        .parse()
        .map_err(|()| ModifierError(s.to_string()))
}

type MResult<T> = Result<T, ()>;

struct ModifierParser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> ModifierParser<'a> {
    fn new(s: &'a str) -> Self {
        Self { lexer: lexer(s) }
    }

    fn parse(mut self) -> MResult<Vec<Modifier>> {
        let mut mods = Vec::new();
        while let Some(token) = self.lexer.next() {
            mods.push(self.parse_modifier(token)?);
        }
        Ok(mods)
    }

    fn matches(&mut self, kind: ModifierToken) -> bool {
        self.lexer.peek().map_or(false, |&peeked| peeked == kind)
    }

    fn matches_any(&mut self, options: &[ModifierToken]) -> bool {
        self.lexer
            .peek()
            .map_or(false, |peeked| options.contains(peeked))
    }

    fn parse_modifier(&mut self, token: ModifierToken) -> MResult<Modifier> {
        use ModifierToken::*;

        Ok(match token {
            Reroll | RerollRecursive => {
                let (max, target) = self.parse_repeat()?;
                Modifier::Reroll {
                    recursive: token == RerollRecursive,
                    max,
                    target,
                }
            }
            Explode | ExplodeOnce => {
                let (max, target) = self.parse_repeat()?;
                Modifier::Explode {
                    recursive: token == Explode,
                    max,
                    target,
                }
            }
            Keep | KeepHighest | KeepLowest => Modifier::Keep {
                highest: token != KeepLowest,
                count: self.parse_count()?,
            },
            Drop | DropLowest | DropHighest => Modifier::Drop {
                highest: token == DropHighest,
                count: self.parse_count()?,
            },
            Minimum => Modifier::Minimum(self.parse_integer()?),
            Maximum => Modifier::Maximum(self.parse_integer()?),
            CountSuccesses => Modifier::CountSuccesses(self.parse_target()?),
            CountFailures => Modifier::CountFailures(self.parse_target()?),
            DeductFailures => Modifier::DeductFailures(self.parse_target()?),
            SubtractFailures => Modifier::SubtractFailures(self.parse_target()?),
            MarginOfSuccess => Modifier::MarginOfSuccess(self.parse_target()?.ok_or(())?),
            Even => Modifier::Even,
            Odd => Modifier::Odd,
            Integer | Equal | LessThan | LessEqual | GreaterThan | GreaterEqual | Error => {
                return Err(())
            }
        })
    }

    fn parse_integer<T: FromStr>(&mut self) -> MResult<T> {
        match self.lexer.next() {
            Some(ModifierToken::Integer) => self.lexer.slice().parse().map_err(|_| ()),
            _ => Err(()),
        }
    }

    fn parse_count(&mut self) -> MResult<UInt> {
        if self.matches(ModifierToken::Integer) {
            self.parse_integer()
        } else {
            Ok(1)
        }
    }

    fn parse_comparison(&mut self) -> MResult<Option<Comparison>> {
        if self.matches_any(ModifierToken::COMPARISONS) {
            self.lexer.next();
            self.lexer.slice().parse().map(Some)
        } else {
            Ok(None)
        }
    }

    fn parse_target(&mut self) -> MResult<Option<Target>> {
        let comparison = self.parse_comparison()?;
        if self.matches(ModifierToken::Integer) {
            let value = self.parse_integer()?;
            Ok(Some(Target::new(comparison.unwrap_or(Comparison::Eq), value)))
        } else if comparison.is_some() {
            Err(())
        } else {
            Ok(None)
        }
    }

    // `[max][comparison][target]`; a lone number is the target, not the max.
    fn parse_repeat(&mut self) -> MResult<(Option<UInt>, Option<Target>)> {
        let first = if self.matches(ModifierToken::Integer) {
            Some(self.parse_integer::<Int>()?)
        } else {
            None
        };
        let comparison = self.parse_comparison()?;
        let second = if self.matches(ModifierToken::Integer) {
            Some(self.parse_integer::<Int>()?)
        } else {
            None
        };

        match (first, comparison, second) {
            (None, None, None) => Ok((None, None)),
            (Some(value), None, None) => Ok((None, Some(Target::new(Comparison::Eq, value)))),
            (max, Some(comparison), Some(value)) => {
                let max = max.map(UInt::try_from).transpose().map_err(|_| ())?;
                Ok((max, Some(Target::new(comparison, value))))
            }
            _ => Err(()),
        }
    }
}
