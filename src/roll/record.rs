use super::dice::DieTerm;
use super::tree::{result_string, RollTerm};
use super::{reduce, Number, RResult, Roll, RollError, RollOptions, RollState};
use crate::parse::check_terms;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// The stored form of a roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollData {
    pub class: String,
    #[serde(default)]
    pub options: RollOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Derived from `terms`; ignored when reading a record back.
    #[serde(default, skip_deserializing)]
    pub dice: Vec<DieTerm>,
    pub formula: String,
    pub terms: Vec<RollTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Number>,
    #[serde(default)]
    pub evaluated: bool,
}

impl RollData {
    pub const CLASS: &'static str = "Roll";
}

fn is_empty(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

impl Roll {
    pub fn to_data(&self) -> RollData {
        RollData {
            class: RollData::CLASS.to_string(),
            options: self.options.clone(),
            data: (!is_empty(&self.data)).then(|| (*self.data).clone()),
            dice: self.dice().into_iter().cloned().collect(),
            formula: self.formula.clone(),
            terms: self.terms.clone(),
            total: self.total,
            evaluated: self.is_evaluated(),
        }
    }

    pub fn to_json(&self) -> RResult<Value> {
        Ok(serde_json::to_value(self.to_data())?)
    }

    pub fn to_json_string(&self) -> RResult<String> {
        Ok(serde_json::to_string(&self.to_data())?)
    }

    /// Rebuilds a roll from its stored form, results included.
    pub fn from_data(record: RollData) -> RResult<Self> {
        if record.class != RollData::CLASS {
            return Err(RollError::UnknownClass(record.class));
        }
        check_terms(&record.terms)?;

        let total = match record.total {
            Some(total) => Some(total),
            None if record.evaluated => Some(reduce(&record.terms)?),
            None => None,
        };
        let (state, result) = if record.evaluated {
            (RollState::Evaluated, Some(result_string(&record.terms)))
        } else {
            (RollState::Unevaluated, None)
        };

        Ok(Self {
            formula: record.formula,
            data: Arc::new(record.data.unwrap_or_else(|| Value::Object(Default::default()))),
            terms: record.terms,
            options: record.options,
            state,
            result,
            total: total.filter(|_| record.evaluated),
        })
    }

    pub fn from_json(json: &str) -> RResult<Self> {
        Self::from_data(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> RResult<Self> {
        Self::from_data(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll::{EvaluationOptions, Term};
    use serde_json::json;

    #[test]
    fn test_round_trip() {
        let mut roll = Roll::with_options(
            "4d6kh3 + {1d4, 2}kl + 2[fire] + 1dF",
            json!({}),
            RollOptions::flavored("Strength"),
        )
        .unwrap();
        roll.evaluate_sync(EvaluationOptions::default()).unwrap();

        let json = roll.to_json_string().unwrap();
        let back = Roll::from_json(&json).unwrap();
        assert!(back.is_evaluated());
        assert_eq!(back.formula(), roll.formula());
        assert_eq!(back.total(), roll.total());
        assert_eq!(back.terms(), roll.terms());
        assert_eq!(back.result(), roll.result());
        assert_eq!(back.flavor(), Some("Strength"));
    }

    #[test]
    fn test_record_shape() {
        let mut roll = Roll::new("1d20 + @mod", json!({"mod": 2})).unwrap();
        roll.evaluate_sync(EvaluationOptions::maximized()).unwrap();
        let json = roll.to_json().unwrap();

        assert_eq!(json["class"], "Roll");
        assert_eq!(json["formula"], "1d20 + 2");
        assert_eq!(json["total"], 22);
        assert_eq!(json["evaluated"], true);
        assert_eq!(json["data"], json!({"mod": 2}));
        assert_eq!(json["terms"][0]["class"], "Die");
        assert_eq!(json["terms"][0]["faces"], 20);
        assert_eq!(json["terms"][0]["results"][0]["result"], 20);
        assert_eq!(json["dice"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_fate_record() {
        let mut roll = Roll::new("2dF", json!({})).unwrap();
        roll.evaluate_sync(EvaluationOptions::minimized()).unwrap();
        let json = roll.to_json().unwrap();
        assert_eq!(json["terms"][0]["faces"], "F");
        let back = Roll::from_value(json).unwrap();
        assert_eq!(back.total(), Some(Number::Int(-2)));
        assert_eq!(back.terms()[0].expression(), "2dF");
    }

    #[test]
    fn test_unevaluated_record() {
        let roll = Roll::new("1d6 + 1", json!(null)).unwrap();
        let back = Roll::from_json(&roll.to_json_string().unwrap()).unwrap();
        assert!(!back.is_evaluated());
        assert_eq!(back.total(), None);
    }

    #[test]
    fn test_rejects_bad_records() {
        let err = Roll::from_value(json!({"class": "Sound", "formula": "", "terms": []})).unwrap_err();
        assert!(matches!(err, RollError::UnknownClass(class) if class == "Sound"));

        let malformed = json!({
            "class": "Roll",
            "formula": "1 2",
            "terms": [
                {"class": "NumericTerm", "number": 1},
                {"class": "NumericTerm", "number": 2}
            ]
        });
        assert!(matches!(Roll::from_value(malformed), Err(RollError::Formula(_))));
        assert!(matches!(Roll::from_json("{"), Err(RollError::Json(_))));
    }
}
