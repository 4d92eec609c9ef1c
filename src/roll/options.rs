use serde::{Deserialize, Serialize};

/// Options for a single evaluation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluationOptions {
    /// Every die rolls its lowest face.
    pub minimize: bool,
    /// Every die rolls its highest face.
    pub maximize: bool,
    /// Unresolved string terms are left out of the total instead of failing.
    pub allow_strings: bool,
    /// Dice configured for external fulfillment may ask for it.
    pub allow_interactive: bool,
    /// Synchronous evaluation fails on dice that need external fulfillment,
    /// rather than skipping them.
    pub strict: bool,
}

impl EvaluationOptions {
    pub fn minimized() -> Self {
        Self {
            minimize: true,
            ..Self::default()
        }
    }

    pub fn maximized() -> Self {
        Self {
            maximize: true,
            ..Self::default()
        }
    }
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            minimize: false,
            maximize: false,
            allow_strings: false,
            allow_interactive: true,
            strict: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    #[serde(flatten)]
    pub evaluation: EvaluationOptions,
}

impl RollOptions {
    pub fn flavored(flavor: impl Into<String>) -> Self {
        Self {
            flavor: Some(flavor.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults_from_json() {
        let opts: EvaluationOptions = serde_json::from_str(r#"{"maximize": true}"#).unwrap();
        assert!(opts.maximize && opts.strict && opts.allow_interactive);
        assert!(!opts.allow_strings);

        let opts: RollOptions =
            serde_json::from_str(r#"{"flavor": "Attack", "allowStrings": true}"#).unwrap();
        assert_eq!(opts.flavor.as_deref(), Some("Attack"));
        assert!(opts.evaluation.allow_strings);
    }
}
