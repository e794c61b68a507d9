//! Declarative column schema.
//!
//! A [`ColumnSpec`] describes one expected column: the canonical name it is
//! addressed by, the header aliases that resolve to it, the key its value is
//! written under in the output, and at most one [`FieldRule`].

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Cleaned row handed to the upload transport, keyed by `api_name`.
pub type OutputRow = serde_json::Map<String, Value>;

/// One row after alias resolution, keyed by canonical `input_name`.
///
/// Headers that match no column are kept under their original name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRow {
    values: BTreeMap<String, String>,
}

impl NormalizedRow {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NormalizedRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Result of a transform-and-validate step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub valid: bool,
    pub value: Value,
}

impl Transformed {
    pub fn valid(value: impl Into<Value>) -> Self {
        Self {
            valid: true,
            value: value.into(),
        }
    }

    pub fn invalid() -> Self {
        Self {
            valid: false,
            value: Value::Null,
        }
    }
}

/// Raised by a transform to abort the whole parse pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError(pub String);

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FieldError {}

impl From<&str> for FieldError {
    fn from(s: &str) -> Self {
        FieldError(s.to_string())
    }
}

impl From<String> for FieldError {
    fn from(s: String) -> Self {
        FieldError(s)
    }
}

/// Blocking check: returning false for any row prevents the whole upload.
pub trait RowValidator: Send + Sync {
    fn validate(&self, value: &str, row: &NormalizedRow) -> bool;
}

impl<F> RowValidator for F
where
    F: Fn(&str, &NormalizedRow) -> bool + Send + Sync,
{
    fn validate(&self, value: &str, row: &NormalizedRow) -> bool {
        self(value, row)
    }
}

/// Row filter: `valid: false` drops only this row; `Err` aborts the pass.
pub trait RowTransformer: Send + Sync {
    fn transform(&self, value: &str, row: &NormalizedRow) -> Result<Transformed, FieldError>;
}

impl<F> RowTransformer for F
where
    F: Fn(&str, &NormalizedRow) -> Result<Transformed, FieldError> + Send + Sync,
{
    fn transform(&self, value: &str, row: &NormalizedRow) -> Result<Transformed, FieldError> {
        self(value, row)
    }
}

#[derive(Clone, Default)]
pub enum FieldRule {
    #[default]
    PassThrough,
    Validate(Arc<dyn RowValidator>),
    TransformAndValidate(Arc<dyn RowTransformer>),
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRule::PassThrough => f.write_str("PassThrough"),
            FieldRule::Validate(_) => f.write_str("Validate(..)"),
            FieldRule::TransformAndValidate(_) => f.write_str("TransformAndValidate(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub input_name: String,
    pub aliases: Vec<String>,
    pub api_name: String,
    pub required: bool,
    pub description: String,
    pub rule: FieldRule,
}

impl ColumnSpec {
    /// A pass-through, optional column whose `api_name` equals `input_name`.
    pub fn new(input_name: impl Into<String>) -> Self {
        let input_name = input_name.into();
        Self {
            api_name: input_name.clone(),
            input_name,
            aliases: Vec::new(),
            required: false,
            description: String::new(),
            rule: FieldRule::PassThrough,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn api_name(mut self, api_name: impl Into<String>) -> Self {
        self.api_name = api_name.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replaces any previous rule.
    pub fn validate<V: RowValidator + 'static>(mut self, validator: V) -> Self {
        self.rule = FieldRule::Validate(Arc::new(validator));
        self
    }

    /// Replaces any previous rule.
    pub fn transform_and_validate<T: RowTransformer + 'static>(mut self, transformer: T) -> Self {
        self.rule = FieldRule::TransformAndValidate(Arc::new(transformer));
        self
    }

    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rule = rule;
        self
    }

    /// Name used in messages shown to the user.
    pub fn label(&self) -> &str {
        if self.description.is_empty() {
            &self.input_name
        } else {
            &self.description
        }
    }

    /// Case-insensitive match on `input_name` only.
    pub fn matches_name(&self, header: &str) -> bool {
        self.input_name.trim().eq_ignore_ascii_case(header.trim())
    }

    /// Case-insensitive match on any alias.
    pub fn matches_alias(&self, header: &str) -> bool {
        let header = header.trim();
        self.aliases
            .iter()
            .any(|a| a.trim().eq_ignore_ascii_case(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_a_single_rule() {
        let spec = ColumnSpec::new("email")
            .validate(|v: &str, _: &NormalizedRow| v.contains('@'))
            .transform_and_validate(|v: &str, _: &NormalizedRow| {
                Ok::<_, FieldError>(Transformed::valid(v.to_lowercase()))
            });
        assert!(matches!(spec.rule, FieldRule::TransformAndValidate(_)));
    }

    #[test]
    fn matching_ignores_case_and_padding() {
        let spec = ColumnSpec::new("email").aliases(["E-mail Address"]);
        assert!(spec.matches_name(" EMAIL "));
        assert!(spec.matches_alias("e-mail address"));
        assert!(!spec.matches_alias("email"));
        assert_eq!(spec.label(), "email");
        assert_eq!(spec.description("Email address").label(), "Email address");
    }
}
