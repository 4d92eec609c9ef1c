use super::dice::{CountFlag, Denomination, DiceResult, ResultSet};
use super::fulfill::{FulfillmentConfig, FulfillmentMethod, ResultRegistry};
use super::math::MathProxy;
use super::num::Number;
use super::options::EvaluationOptions;
use super::roller::Roller;
use super::tree::*;
use super::{RResult, RollError};
use crate::common::*;
use crate::parse::modifier::Modifier;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::iter::Peekable;
use tracing::{debug, trace, warn};

pub type DefaultRoller = rand::rngs::ThreadRng;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Mode {
    /// Never suspends.
    Sync,
    /// May await externally fulfilled dice.
    Async,
}

/// Everything an evaluation needs besides the terms themselves.
pub struct RollContext<R = DefaultRoller> {
    max_rolls: Option<usize>,
    rolls: usize,
    roller: R,
    math: MathProxy,
    fulfillment: FulfillmentConfig,
    registry: ResultRegistry,
}

impl<R: Roller> RollContext<R> {
    pub fn new(max_rolls: Option<usize>, roller: R) -> Self {
        Self {
            max_rolls,
            rolls: 0,
            roller,
            math: MathProxy::default(),
            fulfillment: FulfillmentConfig::default(),
            registry: ResultRegistry::default(),
        }
    }

    pub fn new_bounded(max_rolls: usize, roller: R) -> Self {
        Self::new(Some(max_rolls), roller)
    }

    pub fn new_unbounded(roller: R) -> Self {
        Self::new(None, roller)
    }

    pub fn with_math(mut self, math: MathProxy) -> Self {
        self.math = math;
        self
    }

    pub fn with_fulfillment(mut self, fulfillment: FulfillmentConfig) -> Self {
        self.fulfillment = fulfillment;
        self
    }

    pub fn with_registry(mut self, registry: ResultRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// A handle for supplying results to dice awaiting external fulfillment.
    pub fn registry(&self) -> &ResultRegistry {
        &self.registry
    }

    pub fn math(&self) -> &MathProxy {
        &self.math
    }

    fn count_rolls(&mut self, n: usize) -> RResult<()> {
        self.rolls += n;
        if self.max_rolls.map_or(false, |max| self.rolls > max) {
            Err(RollError::TooManyRolls)
        } else {
            Ok(())
        }
    }

    pub(crate) fn requires_fulfillment(
        &self,
        denomination: Denomination,
        options: &EvaluationOptions,
    ) -> bool {
        options.allow_interactive
            && !options.minimize
            && !options.maximize
            && self.fulfillment.method_for(denomination).is_external()
    }

    /// Rolls one die of the given denomination.
    pub(crate) async fn roll_die(
        &mut self,
        denomination: Denomination,
        options: &EvaluationOptions,
        mode: Mode,
    ) -> RResult<Int> {
        self.count_rolls(1)?;
        if options.minimize {
            return Ok(denomination.min());
        }
        if options.maximize {
            return Ok(denomination.max());
        }

        if mode == Mode::Async && self.requires_fulfillment(denomination, options) {
            let method = self.fulfillment.method_for(denomination).clone();
            if let Some(value) = self.fulfill(method, denomination).await? {
                return Ok(value);
            }
        }

        let value = denomination.from_roll(self.roller.roll(denomination.faces()));
        trace!(denomination = %denomination.label(), value, "rolled die");
        Ok(value)
    }

    // `None` when the wait timed out.
    async fn fulfill(
        &mut self,
        method: FulfillmentMethod,
        denomination: Denomination,
    ) -> RResult<Option<Int>> {
        let receiver = self.registry.request(method.clone(), denomination);
        let timeout = match self.fulfillment.timeout() {
            Some(timeout) if tokio::runtime::Handle::try_current().is_err() => {
                warn!(
                    %method,
                    denomination = %denomination.label(),
                    "no tokio runtime to time out on, waiting without a timeout"
                );
                None
            }
            timeout => timeout,
        };
        match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, receiver).await {
                Ok(result) => result.map(Some).map_err(|_| RollError::Cancelled),
                Err(_) => {
                    warn!(
                        %method,
                        denomination = %denomination.label(),
                        ?timeout,
                        "no result registered in time, rolling instead"
                    );
                    Ok(None)
                }
            },
            None => receiver.await.map(Some).map_err(|_| RollError::Cancelled),
        }
    }

    /// Evaluates every term of a roll and reduces them to its total.
    pub(crate) async fn evaluate_roll(
        &mut self,
        terms: &mut [RollTerm],
        options: &EvaluationOptions,
        mode: Mode,
    ) -> RResult<Number> {
        if options.minimize && options.maximize {
            return Err(RollError::ConflictingOptions);
        }
        self.rolls = 0;

        let total = self.evaluate_terms(terms, options, mode).await?;
        if !total.is_finite() {
            return Err(RollError::InvalidTotal(total.to_string()));
        }
        debug!(formula = %get_formula(terms), %total, rolls = self.rolls, "evaluated roll");
        Ok(total)
    }

    pub(crate) fn evaluate_terms<'a>(
        &'a mut self,
        terms: &'a mut [RollTerm],
        options: &'a EvaluationOptions,
        mode: Mode,
    ) -> LocalBoxFuture<'a, RResult<Number>>
    where
        R: 'a,
    {
        async move {
            for term in terms.iter_mut() {
                self.evaluate_term(term, options, mode).await?;
            }
            reduce(terms)
        }
        .boxed_local()
    }

    async fn evaluate_term(
        &mut self,
        term: &mut RollTerm,
        options: &EvaluationOptions,
        mode: Mode,
    ) -> RResult<()> {
        match term {
            RollTerm::Die(die) => die.evaluate(self, options, mode).await,
            RollTerm::Parenthetical(p) => {
                self.evaluate_parenthetical(p, options, mode).await?;
                Ok(())
            }
            RollTerm::Pool(pool) => self.evaluate_pool(pool, options, mode).await,
            RollTerm::Function(f) => {
                let mut args = Vec::with_capacity(f.args.len());
                for arg in &mut f.args {
                    args.push(self.evaluate_terms(arg, options, mode).await?);
                }
                f.result = Some(self.math.call(f.function, &args)?);
                Ok(())
            }
            RollTerm::String(s) if !options.allow_strings => {
                Err(RollError::UnresolvedString(s.term.clone()))
            }
            RollTerm::String(_) | RollTerm::Numeric(_) | RollTerm::Operator(_) => Ok(()),
        }
    }

    pub(crate) async fn evaluate_parenthetical(
        &mut self,
        p: &mut ParentheticalTerm,
        options: &EvaluationOptions,
        mode: Mode,
    ) -> RResult<Number> {
        let total = self.evaluate_terms(&mut p.terms, options, mode).await?;
        p.total = Some(total);
        Ok(total)
    }

    async fn evaluate_pool(
        &mut self,
        pool: &mut PoolTerm,
        options: &EvaluationOptions,
        mode: Mode,
    ) -> RResult<()> {
        for member in pool.terms.iter_mut() {
            let total = self.evaluate_terms(member, options, mode).await?;
            pool.results.push(DiceResult::new(total));
        }

        for modifier in pool.modifiers.clone() {
            match modifier {
                Modifier::Keep { highest, count } => pool.keep_or_drop(count, true, highest),
                Modifier::Drop { highest, count } => pool.keep_or_drop(count, false, highest),
                Modifier::CountSuccesses(Some(target)) => {
                    pool.count_matches(target, CountFlag::Success)
                }
                Modifier::CountFailures(Some(target)) => {
                    pool.count_matches(target, CountFlag::Failure)
                }
                other => {
                    return Err(RollError::MalformedTerms(format!(
                        "modifier {} cannot be applied to a pool",
                        other
                    )))
                }
            }
        }
        pool.evaluated = true;
        Ok(())
    }
}

impl Default for RollContext {
    fn default() -> Self {
        Self::new(Some(1000), rand::thread_rng())
    }
}

#[derive(Debug, Copy, Clone)]
enum Item {
    Value(Number),
    Op(Operator),
}

/// Reduces evaluated terms with the usual precedence: unary signs, then
/// `* / %`, then `+ -`, all left associative. String terms drop out along
/// with the operator joining them to the rest.
pub(crate) fn reduce(terms: &[RollTerm]) -> RResult<Number> {
    let mut items = Vec::with_capacity(terms.len());
    let mut skip_operator = false;
    for term in terms {
        match term {
            RollTerm::String(_) => {
                while let Some(Item::Op(Operator::Unary(_))) = items.last() {
                    items.pop();
                }
                if let Some(Item::Op(_)) = items.last() {
                    items.pop();
                } else {
                    skip_operator = true;
                }
            }
            RollTerm::Operator(op) => match op.operator {
                Operator::Binary(_) if skip_operator => skip_operator = false,
                operator => items.push(Item::Op(operator)),
            },
            other => {
                let total = other.total().ok_or_else(|| {
                    RollError::MalformedTerms(format!("{} has not been evaluated", other.formula()))
                })?;
                items.push(Item::Value(total));
            }
        }
    }

    if items.is_empty() {
        return Ok(Number::ZERO);
    }
    let mut reducer = Reducer {
        items: items.into_iter().peekable(),
    };
    let total = reducer.expression(1)?;
    match reducer.items.next() {
        None => Ok(total),
        Some(_) => Err(RollError::MalformedTerms(get_formula(terms))),
    }
}

struct Reducer<I: Iterator<Item = Item>> {
    items: Peekable<I>,
}

impl<I: Iterator<Item = Item>> Reducer<I> {
    fn expression(&mut self, min_precedence: u8) -> RResult<Number> {
        let mut lhs = self.operand()?;
        while let Some(&Item::Op(Operator::Binary(op))) = self.items.peek() {
            if op.precedence() < min_precedence {
                break;
            }
            self.items.next();
            let rhs = self.expression(op.precedence() + 1)?;
            lhs = apply(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn operand(&mut self) -> RResult<Number> {
        match self.items.next() {
            Some(Item::Value(x)) => Ok(x),
            Some(Item::Op(Operator::Unary(op))) => {
                let value = self.operand()?;
                Ok(match op {
                    UnaryOperator::Pos => value,
                    UnaryOperator::Neg => -value,
                })
            }
            _ => Err(RollError::MalformedTerms(
                "an operator is missing an operand".into(),
            )),
        }
    }
}

fn apply(op: BinaryOperator, lhs: Number, rhs: Number) -> RResult<Number> {
    use BinaryOperator::*;

    match op {
        Add => Ok(lhs + rhs),
        Sub => Ok(lhs - rhs),
        Mul => Ok(lhs * rhs),
        Div => lhs.checked_div(rhs).ok_or(RollError::ZeroDivision),
        Rem => lhs.checked_rem(rhs).ok_or(RollError::ZeroModulo),
    }
}
