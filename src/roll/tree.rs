use super::dice::{DiceResult, DieCount, DieTerm, ResultSet};
use super::math::MathFunction;
use super::num::Number;
use crate::common::*;
use crate::parse::modifier::Modifier;
use serde::{Deserialize, Serialize};

/// Per-term options that survive serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
}

impl TermOptions {
    pub fn flavored(flavor: impl Into<String>) -> Self {
        Self {
            flavor: Some(flavor.into()),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TermKind {
    Die,
    Numeric,
    Operator,
    Parenthetical,
    Pool,
    Function,
    String,
}

#[enum_dispatch::enum_dispatch]
pub trait Term {
    /// Notation of the term without its flavor text.
    fn expression(&self) -> String;

    fn options(&self) -> &TermOptions;

    fn options_mut(&mut self) -> &mut TermOptions;

    /// `None` until the term has been evaluated, and always `None` for
    /// operators and strings.
    fn total(&self) -> Option<Number>;

    fn is_evaluated(&self) -> bool;

    fn is_deterministic(&self) -> bool {
        true
    }

    /// Forgets any evaluation results.
    fn reset(&mut self) {}

    fn flavor(&self) -> Option<&str> {
        self.options().flavor.as_deref()
    }

    fn formula(&self) -> String {
        match self.flavor() {
            Some(flavor) => format!("{}[{}]", self.expression(), flavor),
            None => self.expression(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
#[enum_dispatch::enum_dispatch(Term, AcceptTerm)]
pub enum RollTerm {
    Die(DieTerm),
    #[serde(rename = "NumericTerm")]
    Numeric(NumericTerm),
    #[serde(rename = "OperatorTerm")]
    Operator(OperatorTerm),
    #[serde(rename = "ParentheticalTerm")]
    Parenthetical(ParentheticalTerm),
    #[serde(rename = "PoolTerm")]
    Pool(PoolTerm),
    #[serde(rename = "FunctionTerm")]
    Function(FunctionTerm),
    #[serde(rename = "StringTerm")]
    String(StringTerm),
}

impl RollTerm {
    pub fn kind(&self) -> TermKind {
        match self {
            Self::Die(_) => TermKind::Die,
            Self::Numeric(_) => TermKind::Numeric,
            Self::Operator(_) => TermKind::Operator,
            Self::Parenthetical(_) => TermKind::Parenthetical,
            Self::Pool(_) => TermKind::Pool,
            Self::Function(_) => TermKind::Function,
            Self::String(_) => TermKind::String,
        }
    }

    pub fn is_operator(&self) -> bool {
        self.kind() == TermKind::Operator
    }

    pub fn as_die(&self) -> Option<&DieTerm> {
        match self {
            Self::Die(die) => Some(die),
            _ => None,
        }
    }
}

/// Reconstructs a formula from a term sequence.
pub fn get_formula(terms: &[RollTerm]) -> String {
    let mut out = String::new();
    let mut after_string = false;
    for term in terms {
        let formula = term.formula();
        // `foo(` would read as a function call
        if after_string && formula.starts_with('(') {
            out.push(' ');
        }
        after_string = matches!(term, RollTerm::String(_));
        out.push_str(&formula);
    }
    out
}

/// The evaluated expression, e.g. `7 + 4` for `2d6 + 4`.
pub(crate) fn result_string(terms: &[RollTerm]) -> String {
    terms
        .iter()
        .map(|term| match term {
            RollTerm::Operator(op) => op.expression(),
            RollTerm::String(s) => s.term.clone(),
            other => other
                .total()
                .map_or_else(|| other.expression(), |total| total.to_string()),
        })
        .collect()
}

/// Every die term in the tree, in formula order. Dice that supply another
/// die's count come before that die.
pub(crate) fn collect_dice<'a>(terms: &'a [RollTerm], out: &mut Vec<&'a DieTerm>) {
    for term in terms {
        match term {
            RollTerm::Die(die) => {
                if let DieCount::Intermediate(count) = &die.number {
                    collect_dice(&count.terms, out);
                }
                out.push(die);
            }
            RollTerm::Parenthetical(p) => collect_dice(&p.terms, out),
            RollTerm::Pool(pool) => pool.terms.iter().for_each(|t| collect_dice(t, out)),
            RollTerm::Function(f) => f.args.iter().for_each(|t| collect_dice(t, out)),
            RollTerm::Numeric(_) | RollTerm::Operator(_) | RollTerm::String(_) => {}
        }
    }
}

fn all_deterministic(terms: &[RollTerm]) -> bool {
    terms.iter().all(Term::is_deterministic)
}

fn reset_all(terms: &mut [RollTerm]) {
    terms.iter_mut().for_each(Term::reset);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericTerm {
    pub number: Number,
    #[serde(default)]
    pub options: TermOptions,
}

impl NumericTerm {
    pub fn new(number: impl Into<Number>) -> Self {
        Self {
            number: number.into(),
            options: TermOptions::default(),
        }
    }
}

impl Term for NumericTerm {
    fn expression(&self) -> String {
        self.number.to_string()
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }

    fn total(&self) -> Option<Number> {
        Some(self.number)
    }

    fn is_evaluated(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "OperatorRecord", try_from = "OperatorRecord")]
pub struct OperatorTerm {
    pub operator: Operator,
    pub options: TermOptions,
}

impl OperatorTerm {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            options: TermOptions::default(),
        }
    }

    pub fn binary(op: BinaryOperator) -> Self {
        Self::new(Operator::Binary(op))
    }

    pub fn unary(op: UnaryOperator) -> Self {
        Self::new(Operator::Unary(op))
    }
}

impl Term for OperatorTerm {
    fn expression(&self) -> String {
        self.operator.to_string()
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }

    fn total(&self) -> Option<Number> {
        None
    }

    fn is_evaluated(&self) -> bool {
        true
    }

    // Operators never carry flavor in a formula.
    fn formula(&self) -> String {
        self.expression()
    }
}

#[derive(Serialize, Deserialize)]
struct OperatorRecord {
    operator: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    unary: bool,
    #[serde(default)]
    options: TermOptions,
}

impl From<OperatorTerm> for OperatorRecord {
    fn from(term: OperatorTerm) -> Self {
        Self {
            operator: term.operator.symbol().to_string(),
            unary: term.operator.is_unary(),
            options: term.options,
        }
    }
}

impl TryFrom<OperatorRecord> for OperatorTerm {
    type Error = String;

    fn try_from(record: OperatorRecord) -> Result<Self, Self::Error> {
        let operator = Operator::from_symbol(&record.operator, record.unary)
            .ok_or_else(|| format!("invalid operator {:?}", record.operator))?;
        Ok(Self {
            operator,
            options: record.options,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentheticalTerm {
    pub terms: Vec<RollTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Number>,
    #[serde(default)]
    pub options: TermOptions,
}

impl ParentheticalTerm {
    pub fn new(terms: Vec<RollTerm>) -> Self {
        Self {
            terms,
            total: None,
            options: TermOptions::default(),
        }
    }
}

impl Term for ParentheticalTerm {
    fn expression(&self) -> String {
        format!("({})", get_formula(&self.terms))
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }

    fn total(&self) -> Option<Number> {
        self.total
    }

    fn is_evaluated(&self) -> bool {
        self.total.is_some()
    }

    fn is_deterministic(&self) -> bool {
        all_deterministic(&self.terms)
    }

    fn reset(&mut self) {
        self.total = None;
        reset_all(&mut self.terms);
    }
}

/// A `{a, b, ...}` group whose members are aggregated like the results of a
/// single die term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolTerm {
    pub terms: NonEmpty<Vec<RollTerm>>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub results: Vec<DiceResult>,
    #[serde(default)]
    pub evaluated: bool,
    #[serde(default)]
    pub options: TermOptions,
}

impl PoolTerm {
    pub fn new(terms: NonEmpty<Vec<RollTerm>>, modifiers: Vec<Modifier>) -> Self {
        Self {
            terms,
            modifiers,
            results: Vec::new(),
            evaluated: false,
            options: TermOptions::default(),
        }
    }
}

impl ResultSet for PoolTerm {
    fn results(&self) -> &[DiceResult] {
        &self.results
    }

    fn results_mut(&mut self) -> &mut Vec<DiceResult> {
        &mut self.results
    }
}

impl Term for PoolTerm {
    fn expression(&self) -> String {
        let members: Vec<_> = self.terms.iter().map(|t| get_formula(t)).collect();
        let modifiers: String = self.modifiers.iter().map(ToString::to_string).collect();
        format!("{{{}}}{}", members.join(", "), modifiers)
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }

    fn total(&self) -> Option<Number> {
        self.evaluated.then(|| self.sum_active())
    }

    fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    fn is_deterministic(&self) -> bool {
        self.terms.iter().all(|t| all_deterministic(t))
    }

    fn reset(&mut self) {
        self.results.clear();
        self.evaluated = false;
        self.terms.iter_mut().for_each(|t| reset_all(t));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTerm {
    pub function: MathFunction,
    pub args: Vec<Vec<RollTerm>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Number>,
    #[serde(default)]
    pub options: TermOptions,
}

impl FunctionTerm {
    pub fn new(function: MathFunction, args: Vec<Vec<RollTerm>>) -> Self {
        Self {
            function,
            args,
            result: None,
            options: TermOptions::default(),
        }
    }
}

impl Term for FunctionTerm {
    fn expression(&self) -> String {
        let args: Vec<_> = self.args.iter().map(|t| get_formula(t)).collect();
        format!("{}({})", self.function, args.join(", "))
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }

    fn total(&self) -> Option<Number> {
        self.result
    }

    fn is_evaluated(&self) -> bool {
        self.result.is_some()
    }

    fn is_deterministic(&self) -> bool {
        self.args.iter().all(|t| all_deterministic(t))
    }

    fn reset(&mut self) {
        self.result = None;
        self.args.iter_mut().for_each(|t| reset_all(t));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringTerm {
    pub term: String,
    #[serde(default)]
    pub options: TermOptions,
}

impl StringTerm {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            options: TermOptions::default(),
        }
    }
}

impl Term for StringTerm {
    fn expression(&self) -> String {
        self.term.clone()
    }

    fn options(&self) -> &TermOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut TermOptions {
        &mut self.options
    }

    fn total(&self) -> Option<Number> {
        None
    }

    fn is_evaluated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll::dice::Denomination;

    fn d6(count: UInt) -> RollTerm {
        DieTerm::new(count, Denomination::standard(6), vec![]).into()
    }

    #[test]
    fn test_get_formula() {
        let mut flavored = NumericTerm::new(4);
        flavored.options = TermOptions::flavored("bonus");
        let terms: Vec<RollTerm> = vec![
            OperatorTerm::unary(UnaryOperator::Neg).into(),
            d6(2),
            OperatorTerm::binary(BinaryOperator::Add).into(),
            flavored.into(),
            OperatorTerm::binary(BinaryOperator::Mul).into(),
            ParentheticalTerm::new(vec![
                NumericTerm::new(1).into(),
                OperatorTerm::binary(BinaryOperator::Sub).into(),
                NumericTerm::new(-2).into(),
            ])
            .into(),
        ];
        assert_eq!(get_formula(&terms), "-2d6 + 4[bonus] * (1 - -2)");
    }

    #[test]
    fn test_pool_and_function_formula() {
        let pool = PoolTerm::new(
            vec1![vec![d6(1)], vec![NumericTerm::new(3).into()]],
            vec![Modifier::Keep {
                highest: true,
                count: 1,
            }],
        );
        assert_eq!(pool.formula(), "{1d6, 3}kh1");

        let func = FunctionTerm::new(
            MathFunction::Max,
            vec![vec![NumericTerm::new(1).into()], vec![d6(1)]],
        );
        assert_eq!(func.formula(), "max(1, 1d6)");
    }

    #[test]
    fn test_kind_and_determinism() {
        let terms: Vec<RollTerm> = vec![
            d6(1),
            NumericTerm::new(1).into(),
            ParentheticalTerm::new(vec![d6(1)]).into(),
            StringTerm::new("foo").into(),
        ];
        let kinds: Vec<_> = terms.iter().map(RollTerm::kind).collect();
        assert_eq!(
            kinds,
            vec![TermKind::Die, TermKind::Numeric, TermKind::Parenthetical, TermKind::String]
        );
        assert!(!terms[0].is_deterministic());
        assert!(terms[1].is_deterministic());
        assert!(!terms[2].is_deterministic());
    }

    #[test]
    fn test_operator_record() {
        let json = serde_json::to_value(RollTerm::from(OperatorTerm::unary(UnaryOperator::Neg))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"class": "OperatorTerm", "operator": "-", "unary": true, "options": {}})
        );
        let back: RollTerm = serde_json::from_value(json).unwrap();
        assert_eq!(back, RollTerm::from(OperatorTerm::unary(UnaryOperator::Neg)));
        assert!(serde_json::from_value::<RollTerm>(
            serde_json::json!({"class": "OperatorTerm", "operator": "^"})
        )
        .is_err());
    }
}
