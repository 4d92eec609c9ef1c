use crate::roll::{RResult, RollError};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

fn data_ref() -> &'static Regex {
    static DATA_REF: OnceLock<Regex> = OnceLock::new();
    DATA_REF.get_or_init(|| Regex::new(r"@([a-zA-Z0-9_.]+)").expect("valid data reference pattern"))
}

/// How references that resolve to nothing are handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstitutionOptions {
    /// Replacement text for an unresolved reference. When unset the
    /// reference is left in place and later becomes a string term.
    pub missing: Option<String>,
    pub warn: bool,
    /// Fail instead of substituting.
    pub strict: bool,
}

impl Default for SubstitutionOptions {
    fn default() -> Self {
        Self {
            missing: None,
            warn: true,
            strict: false,
        }
    }
}

impl SubstitutionOptions {
    pub fn missing(replacement: impl Into<String>) -> Self {
        Self {
            missing: Some(replacement.into()),
            ..Self::default()
        }
    }
}

/// Looks up a dot separated path such as `abilities.str.mod`.
pub fn get_property<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn to_formula_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
    }
}

/// Replaces every `@path` reference in `formula` with the value found at
/// that path in `data`.
pub fn replace_formula_data(
    formula: &str,
    data: &Value,
    options: &SubstitutionOptions,
) -> RResult<String> {
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;

    for caps in data_ref().captures_iter(formula) {
        let (whole, path) = match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(path)) => (whole, path.as_str()),
            _ => continue,
        };
        out.push_str(&formula[last..whole.start()]);
        last = whole.end();

        match get_property(data, path).and_then(to_formula_text) {
            Some(text) => out.push_str(&text),
            None => out.push_str(&unresolved(&caps, path, options)?),
        }
    }

    out.push_str(&formula[last..]);
    Ok(out)
}

fn unresolved(caps: &Captures<'_>, path: &str, options: &SubstitutionOptions) -> RResult<String> {
    if options.strict {
        return Err(RollError::UnresolvedData(path.to_string()));
    }
    if options.warn {
        warn!(reference = path, "formula references data that does not exist");
    }
    Ok(match &options.missing {
        Some(replacement) => replacement.clone(),
        None => caps[0].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn replace(formula: &str, data: &Value) -> String {
        replace_formula_data(formula, data, &SubstitutionOptions::default()).unwrap()
    }

    #[test]
    fn test_replace_values() {
        let data = json!({"prof": 3, "abilities": {"str": {"mod": -1}}, "die": "d8", "flag": true});
        assert_eq!(replace("@prof + 2", &data), "3 + 2");
        assert_eq!(replace("1d20 + @abilities.str.mod", &data), "1d20 + -1");
        assert_eq!(replace("2@die", &data), "2d8");
        assert_eq!(replace("@flag", &data), "true");
        assert_eq!(replace("1d6", &data), "1d6");
    }

    #[test]
    fn test_missing_references() {
        let data = json!({"abilities": {"str": 2}});
        assert_eq!(replace("@missing + 1", &data), "@missing + 1");
        assert_eq!(replace("@abilities + 1", &data), "@abilities + 1");

        let opts = SubstitutionOptions::missing("0");
        assert_eq!(replace_formula_data("@x + @abilities.str", &data, &opts).unwrap(), "0 + 2");

        let opts = SubstitutionOptions {
            strict: true,
            ..SubstitutionOptions::default()
        };
        assert!(matches!(
            replace_formula_data("1 + @x.y", &data, &opts),
            Err(RollError::UnresolvedData(path)) if path == "x.y"
        ));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged(options: &SubstitutionOptions) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            replace_formula_data("@nothing + 1", &json!({}), options).unwrap()
        });
        let bytes = out.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_missing_references_warn_by_default() {
        let log = logged(&SubstitutionOptions::default());
        assert!(log.contains("WARN"));
        assert!(log.contains("nothing"));

        let quiet = SubstitutionOptions {
            warn: false,
            ..SubstitutionOptions::default()
        };
        assert!(logged(&quiet).is_empty());
    }

    #[test]
    fn test_get_property() {
        let data = json!({"a": {"b": [10, 20]}});
        assert_eq!(get_property(&data, "a.b.1"), Some(&json!(20)));
        assert_eq!(get_property(&data, "a.c"), None);
    }
}
