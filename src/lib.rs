//! Dice formulas in the style of virtual tabletops: `@data` substitution,
//! dice with modifiers, pools, math functions and flavor text, evaluated
//! synchronously or while awaiting dice rolled outside the program.

pub mod common;
pub mod data;
pub mod message;
pub mod parse;
pub mod roll;

pub use data::SubstitutionOptions;
pub use message::{ChatMessageData, MessageCreator, MessageData, RollMode};
pub use parse::{FormulaError, FormulaErrorKind};
pub use roll::{
    EvaluationOptions, MarkdownStringifier, Number, Roll, RollContext, RollError, RollOptions,
    RollState, SimpleStringifier,
};

/// Parses and evaluates `formula` with no data and default options.
pub fn roll(formula: &str) -> Result<Roll, RollError> {
    let mut roll = Roll::new(formula, serde_json::Value::Null)?;
    roll.evaluate_sync(EvaluationOptions::default())?;
    Ok(roll)
}
