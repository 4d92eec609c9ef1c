use super::ctx::{Mode, RollContext};
use super::num::Number;
use super::options::EvaluationOptions;
use super::roller::Roller;
use super::tree::{ParentheticalTerm, Term, TermOptions};
use super::{RResult, RollError};
use crate::common::*;
use crate::parse::modifier::{parse_modifiers, Modifier, Target};
use crate::parse::FormulaErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

/// Checks made by a single reroll or explode modifier before giving up.
const MAX_CHECKS: usize = 1000;

/// The kind of die: `dN`, fate `dF` (-1, 0 or 1) or coin `dc` (0 or 1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "FacesRecord", try_from = "FacesRecord")]
pub enum Denomination {
    Standard(NonZeroUInt),
    Fate,
    Coin,
}

impl Denomination {
    /// A standard die; zero faces are clamped to one.
    pub fn standard(faces: UInt) -> Self {
        Self::Standard(NonZeroUInt::new(faces).unwrap_or(NonZeroUInt::MIN))
    }

    /// Number of distinct faces.
    pub fn faces(self) -> NonZeroUInt {
        match self {
            Self::Standard(n) => n,
            Self::Fate => NonZeroUInt::MIN.saturating_add(2),
            Self::Coin => NonZeroUInt::MIN.saturating_add(1),
        }
    }

    pub fn min(self) -> Int {
        match self {
            Self::Standard(_) => 1,
            Self::Fate => -1,
            Self::Coin => 0,
        }
    }

    pub fn max(self) -> Int {
        self.min() + self.faces().get() as Int - 1
    }

    pub fn contains(self, value: Int) -> bool {
        (self.min()..=self.max()).contains(&value)
    }

    /// Maps a `1..=faces` roll onto this denomination's values.
    pub fn from_roll(self, roll: UInt) -> Int {
        roll as Int + self.min() - 1
    }

    /// The label used to route external fulfillment, e.g. `d6` or `dF`.
    pub fn label(self) -> String {
        format!("d{}", self)
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(n) => write!(f, "{}", n),
            Self::Fate => f.write_str("F"),
            Self::Coin => f.write_str("c"),
        }
    }
}

impl FromStr for Denomination {
    type Err = FormulaErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix(&['d', 'D'][..]).unwrap_or(s);
        match s {
            "F" | "f" => Ok(Self::Fate),
            "c" | "C" => Ok(Self::Coin),
            _ => s
                .parse()
                .ok()
                .and_then(NonZeroUInt::new)
                .map(Self::Standard)
                .ok_or(FormulaErrorKind::InvalidDie),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FacesRecord {
    Number(UInt),
    Letter(String),
}

impl From<Denomination> for FacesRecord {
    fn from(d: Denomination) -> Self {
        match d {
            Denomination::Standard(n) => Self::Number(n.get()),
            other => Self::Letter(other.to_string()),
        }
    }
}

impl TryFrom<FacesRecord> for Denomination {
    type Error = String;

    fn try_from(record: FacesRecord) -> Result<Self, Self::Error> {
        match record {
            FacesRecord::Number(n) => NonZeroUInt::new(n)
                .map(Self::Standard)
                .ok_or_else(|| "a die needs at least one face".to_string()),
            FacesRecord::Letter(s) => s.parse().map_err(|e: FormulaErrorKind| e.to_string()),
        }
    }
}

fn default_active() -> bool {
    true
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One result of a die term, or one member total of a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceResult {
    pub result: Number,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub discarded: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub rerolled: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub exploded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Int>,
}

impl DiceResult {
    pub fn new(result: impl Into<Number>) -> Self {
        Self {
            result: result.into(),
            active: true,
            discarded: false,
            rerolled: false,
            exploded: false,
            success: None,
            failure: None,
            count: None,
        }
    }

    /// What the result contributes to its term total when active.
    pub fn value(&self) -> Number {
        self.count.map_or(self.result, Number::Int)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CountFlag {
    Success,
    Failure,
}

/// Keep, drop and counting operations shared by dice and pools.
pub trait ResultSet {
    fn results(&self) -> &[DiceResult];

    fn results_mut(&mut self) -> &mut Vec<DiceResult>;

    fn sum_active(&self) -> Number {
        self.results()
            .iter()
            .filter(|r| r.active)
            .map(DiceResult::value)
            .sum()
    }

    /// Discards active results until `count` are kept (or dropped). Ties are
    /// discarded in order of appearance.
    fn keep_or_drop(&mut self, count: UInt, keep: bool, highest: bool) {
        let ascending = keep == highest;
        let results = self.results();
        let mut active: Vec<usize> = (0..results.len()).filter(|&i| results[i].active).collect();
        active.sort_by(|&a, &b| {
            let ord = results[a]
                .result
                .partial_cmp(&results[b].result)
                .unwrap_or(std::cmp::Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });

        let count = count as usize;
        let discard = if keep {
            active.len().saturating_sub(count)
        } else {
            count.min(active.len())
        };

        let results = self.results_mut();
        for &i in &active[..discard] {
            results[i].active = false;
            results[i].discarded = true;
        }
    }

    fn count_matches(&mut self, target: Target, flag: CountFlag) {
        for r in self.results_mut() {
            let matched = target.test(r.result);
            match flag {
                CountFlag::Success => {
                    r.success = Some(matched);
                    if matched {
                        r.failure = None;
                    }
                }
                CountFlag::Failure => {
                    r.failure = Some(matched);
                    if matched {
                        r.success = None;
                    }
                }
            }
            r.count = Some(matched as Int);
        }
    }

    /// Flags failures (by `target`, or the non-successes of an earlier count)
    /// and makes each count as -1, or as minus its result when `subtract`.
    fn deduct_failures(&mut self, target: Option<Target>, subtract: bool) {
        for r in self.results_mut() {
            let failed = match target {
                Some(t) => t.test(r.result),
                None => r.success == Some(false),
            };
            if failed {
                r.failure = Some(true);
                r.success = None;
            }
            if r.failure == Some(true) {
                r.count = Some(if subtract { -r.result.as_int() } else { -1 });
            }
        }
    }
}

/// How many dice a term rolls: a literal, or a parenthetical evaluated first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DieCount {
    Fixed(UInt),
    Intermediate(Box<ParentheticalTerm>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DieTerm {
    pub number: DieCount,
    pub faces: Denomination,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub results: Vec<DiceResult>,
    #[serde(default)]
    pub evaluated: bool,
    #[serde(default)]
    pub options: TermOptions,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Repeat {
    Reroll,
    Explode,
}

impl DieTerm {
    pub fn new(count: UInt, faces: Denomination, modifiers: Vec<Modifier>) -> Self {
        Self::with_count(DieCount::Fixed(count), faces, modifiers)
    }

    pub fn with_count(number: DieCount, faces: Denomination, modifiers: Vec<Modifier>) -> Self {
        Self {
            number,
            faces,
            modifiers,
            results: Vec::new(),
            evaluated: false,
            options: TermOptions::default(),
        }
    }

    /// Parses `[N]d<faces>[modifiers]`. Letter faces other than `F` and `c`
    /// are not dice at all, and yield `None`.
    pub fn from_notation(s: &str) -> Result<Option<Self>, FormulaErrorKind> {
        let d = match s.find(&['d', 'D'][..]) {
            Some(d) => d,
            None => return Ok(None),
        };
        let (count, rest) = (&s[..d], &s[d + 1..]);
        if !count.chars().all(|c| c.is_ascii_digit()) {
            return Ok(None);
        }
        let count = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| FormulaErrorKind::InvalidDie)?
        };

        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (faces, modifiers) = if digits > 0 {
            let faces = rest[..digits].parse::<Denomination>()?;
            let modifiers = parse_modifiers(&rest[digits..])
                .map_err(|e| FormulaErrorKind::InvalidModifier(e.0))?;
            (faces, modifiers)
        } else {
            let letter = match rest.chars().next() {
                Some(c) => c,
                None => return Ok(None),
            };
            let faces = match letter.to_string().parse::<Denomination>() {
                Ok(faces) => faces,
                Err(_) => return Ok(None),
            };
            // `dfoo` is a word, not a fate die with a bad modifier
            match parse_modifiers(&rest[letter.len_utf8()..]) {
                Ok(modifiers) => (faces, modifiers),
                Err(_) => return Ok(None),
            }
        };

        Ok(Some(Self::new(count, faces, modifiers)))
    }

    /// The number of dice, once known.
    pub fn count(&self) -> Option<UInt> {
        match &self.number {
            DieCount::Fixed(n) => Some(*n),
            DieCount::Intermediate(p) => p.total.and_then(|t| resolve_count(t).ok()),
        }
    }

    pub fn denomination(&self) -> String {
        self.faces.label()
    }

    /// Scales the dice count, e.g. doubling dice on a critical hit.
    pub fn alter(&mut self, multiply: Float, add: Int) {
        if let DieCount::Fixed(n) = &mut self.number {
            let scaled = ((*n as Float * multiply).round() as Int).saturating_add(add);
            *n = scaled.clamp(0, UInt::MAX as Int) as UInt;
        }
    }

    fn margin(&self, total: Number) -> Number {
        self.modifiers.iter().fold(total, |total, m| match m {
            Modifier::MarginOfSuccess(t) => match t.comparison {
                Comparison::Lt | Comparison::Le => Number::Int(t.value) - total,
                _ => total - Number::Int(t.value),
            },
            _ => total,
        })
    }

    pub(crate) async fn evaluate<R: Roller>(
        &mut self,
        ctx: &mut RollContext<R>,
        options: &EvaluationOptions,
        mode: Mode,
    ) -> RResult<()> {
        let count = match &mut self.number {
            DieCount::Fixed(n) => *n,
            DieCount::Intermediate(inner) => {
                let total = ctx.evaluate_parenthetical(inner, options, mode).await?;
                resolve_count(total)?
            }
        };

        if mode == Mode::Sync && ctx.requires_fulfillment(self.faces, options) {
            if options.strict {
                return Err(RollError::NonDeterministicTerm(self.expression()));
            }
            debug!(term = %self.expression(), "skipping externally fulfilled dice");
            self.evaluated = true;
            return Ok(());
        }

        trace!(count, denomination = %self.faces.label(), "rolling dice");
        for _ in 0..count {
            let value = ctx.roll_die(self.faces, options, mode).await?;
            self.results.push(DiceResult::new(value));
        }
        for modifier in self.modifiers.clone() {
            self.apply_modifier(&modifier, ctx, options, mode).await?;
        }
        self.evaluated = true;
        Ok(())
    }

    async fn apply_modifier<R: Roller>(
        &mut self,
        modifier: &Modifier,
        ctx: &mut RollContext<R>,
        options: &EvaluationOptions,
        mode: Mode,
    ) -> RResult<()> {
        let (min, max) = (self.faces.min(), self.faces.max());
        match *modifier {
            Modifier::Reroll {
                recursive,
                max: limit,
                target,
            } => {
                let target = target.unwrap_or(Target::new(Comparison::Eq, min));
                self.repeat(Repeat::Reroll, recursive, limit, target, ctx, options, mode)
                    .await?;
            }
            Modifier::Explode {
                recursive,
                max: limit,
                target,
            } => {
                let target = target.unwrap_or(Target::new(Comparison::Eq, max));
                self.repeat(Repeat::Explode, recursive, limit, target, ctx, options, mode)
                    .await?;
            }
            Modifier::Keep { highest, count } => self.keep_or_drop(count, true, highest),
            Modifier::Drop { highest, count } => self.keep_or_drop(count, false, highest),
            Modifier::Minimum(n) => {
                for r in self.results.iter_mut().filter(|r| r.result < Number::Int(n)) {
                    r.result = Number::Int(n);
                }
            }
            Modifier::Maximum(n) => {
                for r in self.results.iter_mut().filter(|r| r.result > Number::Int(n)) {
                    r.result = Number::Int(n);
                }
            }
            Modifier::CountSuccesses(target) => self.count_matches(
                target.unwrap_or(Target::new(Comparison::Eq, max)),
                CountFlag::Success,
            ),
            Modifier::CountFailures(target) => self.count_matches(
                target.unwrap_or(Target::new(Comparison::Eq, min)),
                CountFlag::Failure,
            ),
            Modifier::DeductFailures(target) => self.deduct_failures(target, false),
            Modifier::SubtractFailures(target) => self.deduct_failures(target, true),
            // applied to the total
            Modifier::MarginOfSuccess(_) => {}
            Modifier::Even | Modifier::Odd => {
                let want_even = *modifier == Modifier::Even;
                for r in &mut self.results {
                    let even = r.result.as_int() % 2 == 0;
                    r.success = Some(even == want_even);
                    r.count = Some((even == want_even) as Int);
                }
            }
        }
        Ok(())
    }

    // Walks the results as they grow. A non-recursive pass stops after the
    // dice present when it started.
    #[allow(clippy::too_many_arguments)]
    async fn repeat<R: Roller>(
        &mut self,
        kind: Repeat,
        recursive: bool,
        limit: Option<UInt>,
        target: Target,
        ctx: &mut RollContext<R>,
        options: &EvaluationOptions,
        mode: Mode,
    ) -> RResult<()> {
        let recursive = recursive && !options.minimize && !options.maximize;
        let initial = self.results.len();
        let mut remaining = limit;
        let mut checked = 0;

        while checked < self.results.len() {
            let result = &mut self.results[checked];
            checked += 1;
            if !result.active {
                continue;
            }
            if remaining == Some(0) {
                break;
            }

            if target.test(result.result) {
                match kind {
                    Repeat::Reroll => {
                        result.rerolled = true;
                        result.active = false;
                    }
                    Repeat::Explode => result.exploded = true,
                }
                let value = ctx.roll_die(self.faces, options, mode).await?;
                self.results.push(DiceResult::new(value));
                remaining = remaining.map(|n| n - 1);
            }

            if !recursive && checked >= initial {
                break;
            }
            if checked > MAX_CHECKS {
                return Err(RollError::RecursionLimit(self.expression()));
            }
        }
        Ok(())
    }
}

pub(crate) fn resolve_count(total: Number) -> RResult<UInt> {
    let count = total.as_float().round();
    if !count.is_finite() || count < 0.0 {
        return Err(RollError::InvalidTotal(total.to_string()));
    }
    if count > UInt::MAX as Float {
        return Err(RollError::TooManyRolls);
    }
    Ok(count as UInt)
}

impl ResultSet for DieTerm {
    fn results(&self) -> &[DiceResult] {
        &self.results
    }

    fn results_mut(&mut self) -> &mut Vec<DiceResult> {
        &mut self.results
    }
}

impl Term for DieTerm {
    fn expression(&self) -> String {
        let count = match &self.number {
            DieCount::Fixed(n) => n.to_string(),
            DieCount::Intermediate(p) => p.expression(),
        };
        let modifiers: String = self.modifiers.iter().map(ToString::to_string).collect();
        format!("{}d{}{}", count, self.faces, modifiers)
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }

    fn total(&self) -> Option<Number> {
        self.evaluated.then(|| self.margin(self.sum_active()))
    }

    fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    fn is_deterministic(&self) -> bool {
        false
    }

    fn reset(&mut self) {
        self.results.clear();
        self.evaluated = false;
        if let DieCount::Intermediate(p) = &mut self.number {
            p.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn die(s: &str) -> DieTerm {
        DieTerm::from_notation(s).unwrap().unwrap()
    }

    fn with_results(values: &[Int]) -> DieTerm {
        let mut term = DieTerm::new(values.len() as UInt, Denomination::standard(6), vec![]);
        term.results = values.iter().copied().map(DiceResult::new).collect();
        term.evaluated = true;
        term
    }

    fn active(term: &DieTerm) -> Vec<bool> {
        term.results.iter().map(|r| r.active).collect()
    }

    #[test]
    fn test_from_notation() {
        let d = die("2d6");
        assert_eq!(d.number, DieCount::Fixed(2));
        assert_eq!(d.faces, Denomination::standard(6));
        assert!(d.modifiers.is_empty());

        let d = die("d20kh");
        assert_eq!(d.number, DieCount::Fixed(1));
        assert_eq!(d.modifiers, vec![Modifier::Keep { highest: true, count: 1 }]);

        assert_eq!(die("4dF").faces, Denomination::Fate);
        assert_eq!(die("3DC").faces, Denomination::Coin);
        assert_eq!(die("0d6").number, DieCount::Fixed(0));
    }

    #[test]
    fn test_from_notation_rejects() {
        assert_eq!(DieTerm::from_notation("dex"), Ok(None));
        assert_eq!(DieTerm::from_notation("dfoo"), Ok(None));
        assert_eq!(DieTerm::from_notation("1d0"), Err(FormulaErrorKind::InvalidDie));
        assert_eq!(
            DieTerm::from_notation("1d6q"),
            Err(FormulaErrorKind::InvalidModifier("q".into()))
        );
    }

    #[test]
    fn test_expression_is_canonical() {
        assert_eq!(die("d20KH").expression(), "1d20kh1");
        assert_eq!(die("4dF").expression(), "4dF");
        assert_eq!(die("8d6cs>=5").expression(), "8d6cs>=5");
    }

    #[test]
    fn test_denomination_ranges() {
        assert_eq!((Denomination::Fate.min(), Denomination::Fate.max()), (-1, 1));
        assert_eq!((Denomination::Coin.min(), Denomination::Coin.max()), (0, 1));
        assert_eq!(Denomination::standard(6).max(), 6);
        assert_eq!(Denomination::Fate.from_roll(1), -1);
        assert_eq!(Denomination::Coin.from_roll(2), 1);
        assert!(!Denomination::standard(6).contains(7));
        assert_eq!(Denomination::Fate.label(), "dF");
        assert_eq!("d8".parse(), Ok(Denomination::standard(8)));
    }

    #[test]
    fn test_keep_highest_discards_ties_in_order() {
        let mut term = with_results(&[3, 5, 3, 1]);
        term.keep_or_drop(2, true, true);
        assert_eq!(active(&term), vec![false, true, true, false]);
        assert_eq!(term.total(), Some(Number::Int(8)));
    }

    #[test]
    fn test_drop_lowest_and_highest() {
        let mut term = with_results(&[4, 2, 6, 2]);
        term.keep_or_drop(1, false, false);
        assert_eq!(active(&term), vec![true, false, true, true]);

        let mut term = with_results(&[4, 2, 6, 2]);
        term.keep_or_drop(5, false, true);
        assert_eq!(term.total(), Some(Number::ZERO));
    }

    #[test]
    fn test_counting() {
        let mut term = with_results(&[6, 5, 1, 3]);
        term.count_matches(Target::new(Comparison::Ge, 5), CountFlag::Success);
        assert_eq!(term.total(), Some(Number::Int(2)));

        term.deduct_failures(Some(Target::new(Comparison::Eq, 1)), false);
        assert_eq!(term.total(), Some(Number::Int(1)));

        let mut term = with_results(&[6, 2]);
        term.count_matches(Target::new(Comparison::Eq, 6), CountFlag::Success);
        term.deduct_failures(None, true);
        assert_eq!(term.total(), Some(Number::Int(1 - 2)));
    }

    #[test]
    fn test_margin_of_success() {
        let mut term = with_results(&[15]);
        term.modifiers = vec![Modifier::MarginOfSuccess(Target::new(Comparison::Ge, 10))];
        assert_eq!(term.total(), Some(Number::Int(5)));
        term.modifiers = vec![Modifier::MarginOfSuccess(Target::new(Comparison::Le, 10))];
        assert_eq!(term.total(), Some(Number::Int(-5)));
    }

    #[test]
    fn test_alter() {
        let mut term = die("2d6");
        term.alter(2.0, 1);
        assert_eq!(term.count(), Some(5));
        term.alter(0.0, -3);
        assert_eq!(term.count(), Some(0));
        term.alter(1.0, Int::MAX);
        assert_eq!(term.count(), Some(UInt::MAX));
        term.alter(1e300, Int::MIN);
        assert_eq!(term.count(), Some(0));
    }

    #[test]
    fn test_faces_serialization() {
        let json = serde_json::to_value(die("2d6")).unwrap();
        assert_eq!(json["faces"], serde_json::json!(6));
        assert_eq!(json["number"], serde_json::json!(2));
        let json = serde_json::to_value(die("4dF")).unwrap();
        assert_eq!(json["faces"], serde_json::json!("F"));
        let back: DieTerm = serde_json::from_value(json).unwrap();
        assert_eq!(back.faces, Denomination::Fate);
    }
}
