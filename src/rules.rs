//! Built-in field rules that can be declared in a schema file.

use crate::schema::{FieldError, FieldRule, NormalizedRow, Transformed};
use crate::CsvResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::sync::Arc;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Blocking checks. A failing value on any row prevents the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidateRule {
    NonEmpty,
    Email,
    Regex {
        pattern: String,
    },
    OneOf {
        values: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
    MaxLength {
        max: usize,
    },
}

/// Transforms. A value that cannot be converted drops its row.
///
/// Empty cells convert to `null` for the typed transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformRule {
    Trim,
    Lowercase,
    Uppercase,
    Integer,
    Number,
    Boolean,
}

impl ValidateRule {
    pub fn build(&self) -> CsvResult<FieldRule> {
        let rule = match self {
            ValidateRule::NonEmpty => {
                FieldRule::Validate(Arc::new(|v: &str, _: &NormalizedRow| !v.trim().is_empty()))
            }
            ValidateRule::Email => regex_rule(EMAIL_PATTERN)?,
            ValidateRule::Regex { pattern } => regex_rule(pattern)?,
            ValidateRule::OneOf {
                values,
                case_sensitive,
            } => {
                let values = values.clone();
                let case_sensitive = *case_sensitive;
                FieldRule::Validate(Arc::new(move |v: &str, _: &NormalizedRow| {
                    let v = v.trim();
                    values.iter().any(|allowed| {
                        if case_sensitive {
                            allowed == v
                        } else {
                            allowed.eq_ignore_ascii_case(v)
                        }
                    })
                }))
            }
            ValidateRule::MaxLength { max } => {
                let max = *max;
                FieldRule::Validate(Arc::new(move |v: &str, _: &NormalizedRow| {
                    v.chars().count() <= max
                }))
            }
        };
        Ok(rule)
    }
}

fn regex_rule(pattern: &str) -> CsvResult<FieldRule> {
    let re = Regex::new(pattern)?;
    Ok(FieldRule::Validate(Arc::new(
        move |v: &str, _: &NormalizedRow| re.is_match(v.trim()),
    )))
}

impl TransformRule {
    pub fn build(self) -> FieldRule {
        FieldRule::TransformAndValidate(Arc::new(move |v: &str, _: &NormalizedRow| {
            Ok::<_, FieldError>(self.apply(v))
        }))
    }

    pub fn apply(self, value: &str) -> Transformed {
        let v = value.trim();
        match self {
            TransformRule::Trim => Transformed::valid(v),
            TransformRule::Lowercase => Transformed::valid(v.to_lowercase()),
            TransformRule::Uppercase => Transformed::valid(v.to_uppercase()),
            _ if v.is_empty() => Transformed::valid(Value::Null),
            TransformRule::Integer => match v.replace('_', "").parse::<i64>() {
                Ok(n) => Transformed::valid(n),
                Err(_) => Transformed::invalid(),
            },
            TransformRule::Number => match v.parse::<f64>().ok().and_then(Number::from_f64) {
                Some(n) => Transformed::valid(Value::Number(n)),
                None => Transformed::invalid(),
            },
            TransformRule::Boolean => match v.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Transformed::valid(true),
                "false" | "no" | "n" | "0" => Transformed::valid(false),
                _ => Transformed::invalid(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(rule: &ValidateRule, value: &str) -> bool {
        match rule.build().unwrap() {
            FieldRule::Validate(v) => v.validate(value, &NormalizedRow::default()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validators() {
        assert!(check(&ValidateRule::Email, " a@example.com "));
        assert!(!check(&ValidateRule::Email, "not-an-email"));
        assert!(!check(&ValidateRule::NonEmpty, "   "));
        assert!(check(&ValidateRule::MaxLength { max: 3 }, "abc"));
        assert!(!check(&ValidateRule::MaxLength { max: 3 }, "abcd"));

        let one_of = ValidateRule::OneOf {
            values: vec!["admin".into(), "member".into()],
            case_sensitive: false,
        };
        assert!(check(&one_of, "Admin"));
        assert!(!check(&one_of, "guest"));
    }

    #[test]
    fn bad_regex_is_reported() {
        let rule = ValidateRule::Regex {
            pattern: "(".into(),
        };
        assert!(matches!(rule.build(), Err(crate::CsvUploadError::Regex(_))));
    }

    #[test]
    fn transforms() {
        assert_eq!(TransformRule::Integer.apply(" 42 "), Transformed::valid(42));
        assert_eq!(TransformRule::Integer.apply("4.2"), Transformed::invalid());
        assert_eq!(TransformRule::Integer.apply(""), Transformed::valid(Value::Null));
        assert_eq!(TransformRule::Number.apply("4.5"), Transformed::valid(4.5));
        assert_eq!(TransformRule::Boolean.apply("Yes"), Transformed::valid(true));
        assert_eq!(TransformRule::Boolean.apply("maybe"), Transformed::invalid());
        assert_eq!(
            TransformRule::Lowercase.apply(" A@B.COM"),
            Transformed::valid("a@b.com")
        );
    }

    #[test]
    fn rules_deserialize_from_tagged_tables() {
        let rule: ValidateRule = toml::from_str("kind = \"regex\"\npattern = \"^x\"").unwrap();
        assert_eq!(
            rule,
            ValidateRule::Regex {
                pattern: "^x".into()
            }
        );
        let t: TransformRule = toml::from_str("kind = \"integer\"").unwrap();
        assert_eq!(t, TransformRule::Integer);
    }
}
