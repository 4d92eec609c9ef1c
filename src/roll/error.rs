use crate::parse::FormulaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RollError {
    #[error("invalid formula: {0}")]
    Formula(#[from] FormulaError),
    #[error("the roll has already been evaluated and is now immutable")]
    AlreadyEvaluated,
    #[error("the roll is already being evaluated or its evaluation was abandoned")]
    EvaluationInFlight,
    #[error("a previous evaluation of this roll failed; construct a new roll")]
    Unusable,
    #[error("the roll has not been evaluated yet")]
    NotEvaluated,
    #[error("{0} requires external fulfillment and cannot be evaluated synchronously")]
    NonDeterministicTerm(String),
    #[error("unresolved formula data reference @{0}")]
    UnresolvedData(String),
    #[error("unresolved string term {0:?} requested for evaluation")]
    UnresolvedString(String),
    #[error("minimize and maximize cannot both be requested")]
    ConflictingOptions,
    #[error("too many dice rolled")]
    TooManyRolls,
    #[error("maximum recursion depth exceeded while modifying {0}")]
    RecursionLimit(String),
    #[error("cannot divide by zero")]
    ZeroDivision,
    #[error("cannot take modulus by zero")]
    ZeroModulo,
    #[error("roll total {0} is not a finite number")]
    InvalidTotal(String),
    #[error("term sequence is malformed: {0}")]
    MalformedTerms(String),
    #[error("math function {0} is not permitted")]
    ForbiddenFunction(String),
    #[error("{function} expects {expected} arguments, got {found}")]
    FunctionArity {
        function: String,
        expected: String,
        found: usize,
    },
    #[error("expression {0:?} may only contain numbers, operators and math functions")]
    UnsafeExpression(String),
    #[error("{result} is not a valid result for {denomination}")]
    InvalidResult { denomination: String, result: i64 },
    #[error("evaluation was cancelled")]
    Cancelled,
    #[error("unknown roll class {0:?}")]
    UnknownClass(String),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}
