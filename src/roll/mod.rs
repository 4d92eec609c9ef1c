mod ctx;
pub mod dice;
mod error;
pub mod fulfill;
pub mod math;
mod num;
mod options;
mod record;
mod roller;
mod stringify;
pub mod tree;
mod visit;

use crate::data::{self, SubstitutionOptions};
use crate::parse::{self, FormulaError};
use futures::future::{AbortRegistration, Abortable};
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub(crate) type RResult<T> = Result<T, RollError>;

pub use ctx::{DefaultRoller, RollContext};
pub(crate) use ctx::{reduce, Mode};
pub use dice::{Denomination, DiceResult, DieCount, DieTerm};
pub use error::RollError;
pub use fulfill::{FulfillmentConfig, FulfillmentMethod, ResultRegistry};
pub use math::{MathFunction, MathProxy};
pub use num::Number;
pub use options::{EvaluationOptions, RollOptions};
pub use record::RollData;
pub use roller::Roller;
pub use stringify::{MarkdownStringifier, SimpleStringifier, Stringify};
pub use tree::{
    FunctionTerm, NumericTerm, OperatorTerm, ParentheticalTerm, PoolTerm, RollTerm, StringTerm,
    Term, TermKind, TermOptions,
};
pub use visit::{AcceptTerm, VisitTerm};

use tree::{collect_dice, get_formula, result_string};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RollState {
    Unevaluated,
    /// An evaluation has started and not finished. A roll whose evaluation
    /// future was dropped stays here for good.
    Evaluating,
    Evaluated,
    Failed,
}

/// A parsed formula and, once evaluated, its results.
#[derive(Debug, Clone)]
pub struct Roll {
    formula: String,
    data: Arc<Value>,
    terms: Vec<RollTerm>,
    options: RollOptions,
    state: RollState,
    result: Option<String>,
    total: Option<Number>,
}

impl Roll {
    pub fn new(formula: &str, data: impl Into<Arc<Value>>) -> RResult<Self> {
        Self::with_options(formula, data, RollOptions::default())
    }

    pub fn with_options(
        formula: &str,
        data: impl Into<Arc<Value>>,
        options: RollOptions,
    ) -> RResult<Self> {
        Self::with_substitution(formula, data, options, &SubstitutionOptions::default())
    }

    /// Like [`Roll::with_options`], with control over unresolved `@data`
    /// references.
    pub fn with_substitution(
        formula: &str,
        data: impl Into<Arc<Value>>,
        options: RollOptions,
        substitution: &SubstitutionOptions,
    ) -> RResult<Self> {
        let data = data.into();
        let terms = Self::parse_with(formula, &data, substitution)?;
        Ok(Self::build(terms, data, options))
    }

    fn build(terms: Vec<RollTerm>, data: Arc<Value>, options: RollOptions) -> Self {
        Self {
            formula: get_formula(&terms),
            data,
            terms,
            options,
            state: RollState::Unevaluated,
            result: None,
            total: None,
        }
    }

    /// Substitutes `data` into `formula` and parses the result.
    pub fn parse(formula: &str, data: &Value) -> RResult<Vec<RollTerm>> {
        Self::parse_with(formula, data, &SubstitutionOptions::default())
    }

    pub fn parse_with(
        formula: &str,
        data: &Value,
        substitution: &SubstitutionOptions,
    ) -> RResult<Vec<RollTerm>> {
        let formula = data::replace_formula_data(formula, data, substitution)?;
        Ok(parse::parse(&formula)?)
    }

    pub fn validate(formula: &str) -> bool {
        parse::validate(formula)
    }

    pub fn replace_formula_data(
        formula: &str,
        data: &Value,
        options: &SubstitutionOptions,
    ) -> RResult<String> {
        data::replace_formula_data(formula, data, options)
    }

    pub fn simplify_terms(terms: Vec<RollTerm>) -> Result<Vec<RollTerm>, FormulaError> {
        parse::simplify_terms(terms)
    }

    pub fn get_formula(terms: &[RollTerm]) -> String {
        get_formula(terms)
    }

    pub fn safe_eval(expression: &str) -> RResult<Number> {
        MathProxy::default().safe_eval(expression)
    }

    /// Builds a roll around existing terms. If every term already carries
    /// its results the roll is evaluated.
    pub fn from_terms(terms: Vec<RollTerm>, options: RollOptions) -> RResult<Self> {
        parse::check_terms(&terms)?;
        let evaluated = !terms.is_empty() && terms.iter().all(Term::is_evaluated);
        let mut roll = Self::build(terms, Arc::new(Value::Object(Default::default())), options);
        if evaluated {
            let total = reduce(&roll.terms)?;
            roll.finish(Ok(total))?;
        }
        Ok(roll)
    }

    pub fn formula(&self) -> &str {
        &self.formula
    }

    pub fn terms(&self) -> &[RollTerm] {
        &self.terms
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn options(&self) -> &RollOptions {
        &self.options
    }

    pub fn flavor(&self) -> Option<&str> {
        self.options.flavor.as_deref()
    }

    pub fn state(&self) -> RollState {
        self.state
    }

    pub fn is_evaluated(&self) -> bool {
        self.state == RollState::Evaluated
    }

    /// The total, once evaluated.
    pub fn total(&self) -> Option<Number> {
        self.total
    }

    /// The evaluated expression, e.g. `7 + 4` for `2d6 + 4`.
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Every die term in the roll, nested ones included.
    pub fn dice(&self) -> Vec<&DieTerm> {
        let mut dice = Vec::new();
        collect_dice(&self.terms, &mut dice);
        dice
    }

    pub fn is_deterministic(&self) -> bool {
        self.terms.iter().all(Term::is_deterministic)
    }

    fn begin(&mut self, options: EvaluationOptions) -> RResult<()> {
        match self.state {
            RollState::Unevaluated => {
                self.state = RollState::Evaluating;
                self.options.evaluation = options;
                Ok(())
            }
            RollState::Evaluating => Err(RollError::EvaluationInFlight),
            RollState::Evaluated => Err(RollError::AlreadyEvaluated),
            RollState::Failed => Err(RollError::Unusable),
        }
    }

    fn finish(&mut self, result: RResult<Number>) -> RResult<Number> {
        match result {
            Ok(total) => {
                self.total = Some(total);
                self.result = Some(result_string(&self.terms));
                self.state = RollState::Evaluated;
                Ok(total)
            }
            Err(e) => {
                debug!(formula = %self.formula, error = %e, "evaluation failed");
                self.state = RollState::Failed;
                Err(e)
            }
        }
    }

    /// Evaluates without ever suspending, using the thread's PRNG.
    pub fn evaluate_sync(&mut self, options: EvaluationOptions) -> RResult<Number> {
        self.evaluate_sync_with(&mut RollContext::default(), options)
    }

    pub fn evaluate_sync_with<R: Roller>(
        &mut self,
        ctx: &mut RollContext<R>,
        options: EvaluationOptions,
    ) -> RResult<Number> {
        self.begin(options)?;
        let result = ctx
            .evaluate_roll(&mut self.terms, &options, Mode::Sync)
            .now_or_never()
            .unwrap_or_else(|| Err(RollError::NonDeterministicTerm(self.formula.clone())));
        self.finish(result)
    }

    pub async fn evaluate(&mut self, options: EvaluationOptions) -> RResult<Number> {
        self.evaluate_with(&mut RollContext::default(), options, None)
            .await
    }

    /// Evaluates, awaiting any dice configured for external fulfillment.
    /// Aborting through `abort` fails the roll with `Cancelled`.
    pub async fn evaluate_with<R: Roller>(
        &mut self,
        ctx: &mut RollContext<R>,
        options: EvaluationOptions,
        abort: Option<AbortRegistration>,
    ) -> RResult<Number> {
        self.begin(options)?;
        let evaluation = ctx.evaluate_roll(&mut self.terms, &options, Mode::Async);
        let result = match abort {
            Some(registration) => Abortable::new(evaluation, registration)
                .await
                .unwrap_or_else(|_| Err(RollError::Cancelled)),
            None => evaluation.await,
        };
        self.finish(result)
    }

    /// A copy of this roll with every result discarded.
    pub fn to_unevaluated(&self) -> Self {
        let mut terms = self.terms.clone();
        terms.iter_mut().for_each(Term::reset);
        Self::build(terms, Arc::clone(&self.data), self.options.clone())
    }

    /// Evaluates a fresh copy of this roll with the same options.
    pub async fn reroll(&self) -> RResult<Self> {
        let mut roll = self.to_unevaluated();
        roll.evaluate(self.options.evaluation).await?;
        Ok(roll)
    }

    pub fn reroll_sync(&self) -> RResult<Self> {
        let mut roll = self.to_unevaluated();
        roll.evaluate_sync(self.options.evaluation)?;
        Ok(roll)
    }

    /// Scales the number of dice, and numeric terms if `multiply_numeric`
    /// is set. Only unevaluated rolls can be altered.
    pub fn alter(&mut self, multiply: f64, add: i64, multiply_numeric: bool) -> RResult<&mut Self> {
        if self.state != RollState::Unevaluated {
            return Err(RollError::AlreadyEvaluated);
        }
        for term in &mut self.terms {
            match term {
                RollTerm::Die(die) => die.alter(multiply, add),
                RollTerm::Numeric(n) if multiply_numeric => {
                    n.number = (n.number * Number::Float(multiply)).normalize();
                }
                _ => {}
            }
        }
        self.formula = get_formula(&self.terms);
        Ok(self)
    }
}
