use crate::normalize::HeaderMap;
use crate::parser::RawRow;
use crate::schema::{ColumnSpec, FieldRule, NormalizedRow, OutputRow};
use crate::{CsvResult, CsvUploadError};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RowOutcome {
    Accepted(OutputRow),
    /// A transform reported `valid: false`: the row is dropped
    Rejected,
    /// A validator returned false: the whole upload is blocked
    Blocked,
}

#[derive(Debug)]
pub(crate) struct RowReport {
    pub outcome: RowOutcome,
    pub normalized: NormalizedRow,
    pub errors: Vec<String>,
}

/// Applies the column rules to one row at a time.
pub(crate) struct Engine<'a> {
    columns: &'a [ColumnSpec],
    headers: &'a HeaderMap,
    keep_unknown_columns: bool,
}

impl<'a> Engine<'a> {
    pub fn new(
        columns: &'a [ColumnSpec],
        headers: &'a HeaderMap,
        keep_unknown_columns: bool,
    ) -> Self {
        Self {
            columns,
            headers,
            keep_unknown_columns,
        }
    }

    /// Required columns whose canonical name is absent from the header.
    pub fn missing_required(&self) -> Vec<&'a ColumnSpec> {
        self.columns
            .iter()
            .filter(|c| c.required && !self.headers.is_present(&c.input_name))
            .collect()
    }

    /// Evaluate every column of a row in declared order.
    ///
    /// All columns are checked so every message for the row is collected.
    /// `row_number` is 1-based and only used in messages. Columns absent
    /// from the header are skipped.
    pub fn evaluate(&self, row_number: usize, raw: &RawRow) -> CsvResult<RowReport> {
        let normalized = self.headers.normalize(raw);
        let mut output = OutputRow::new();
        let mut errors = Vec::new();
        let mut blocked = false;
        let mut rejected = false;

        for column in self.columns {
            if !self.headers.is_present(&column.input_name) {
                continue;
            }
            let value = normalized.get(&column.input_name).unwrap_or_default();

            match &column.rule {
                FieldRule::PassThrough => {
                    output.insert(column.api_name.clone(), Value::String(value.to_string()));
                }
                FieldRule::Validate(validator) => {
                    if validator.validate(value, &normalized) {
                        output.insert(column.api_name.clone(), Value::String(value.to_string()));
                    } else {
                        blocked = true;
                        errors.push(format!(
                            "Row {row_number}: invalid {} \"{value}\"",
                            column.label()
                        ));
                    }
                }
                FieldRule::TransformAndValidate(transformer) => {
                    let transformed = transformer.transform(value, &normalized).map_err(|e| {
                        CsvUploadError::Transform {
                            row: row_number,
                            column: column.input_name.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    if transformed.valid {
                        output.insert(column.api_name.clone(), transformed.value);
                    } else {
                        rejected = true;
                        errors.push(format!(
                            "Row {row_number}: {} \"{value}\" is not valid; row skipped",
                            column.label()
                        ));
                    }
                }
            }
        }

        if self.keep_unknown_columns {
            for key in self.headers.extra_fields() {
                if !output.contains_key(key) {
                    let value = normalized.get(key).unwrap_or_default();
                    output.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
        }

        let outcome = if blocked {
            RowOutcome::Blocked
        } else if rejected {
            RowOutcome::Rejected
        } else {
            RowOutcome::Accepted(output)
        };
        Ok(RowReport {
            outcome,
            normalized,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldError, Transformed};

    fn raw(values: &[&str]) -> RawRow {
        RawRow {
            line: 2,
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("email")
                .alias("Email")
                .required(true)
                .validate(|v: &str, _: &NormalizedRow| v.contains('@')),
            ColumnSpec::new("age").transform_and_validate(|v: &str, _: &NormalizedRow| {
                Ok::<_, FieldError>(match v.parse::<u32>() {
                    Ok(n) => Transformed::valid(n),
                    Err(_) => Transformed::invalid(),
                })
            }),
            ColumnSpec::new("name").alias("Full Name").api_name("fullName"),
        ]
    }

    #[test]
    fn accepts_row_and_maps_api_names() {
        let cols = columns();
        let map = HeaderMap::resolve(&cols, &headers(&["Email", "age", "Full Name"]));
        let engine = Engine::new(&cols, &map, false);

        let report = engine.evaluate(1, &raw(&["a@example.com", "31", "Jane"])).unwrap();
        let RowOutcome::Accepted(out) = report.outcome else {
            panic!("expected accepted row");
        };
        assert_eq!(out["email"], "a@example.com");
        assert_eq!(out["age"], 31);
        assert_eq!(out["fullName"], "Jane");
        assert!(report.errors.is_empty());
    }

    #[test]
    fn collects_every_error_of_a_row() {
        let cols = columns();
        let map = HeaderMap::resolve(&cols, &headers(&["Email", "age", "Full Name"]));
        let engine = Engine::new(&cols, &map, false);

        let report = engine.evaluate(4, &raw(&["nope", "old", "Jane"])).unwrap();
        assert_eq!(report.outcome, RowOutcome::Blocked);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("Row 4: invalid email"));
    }

    #[test]
    fn transform_failure_only_rejects_the_row() {
        let cols = columns();
        let map = HeaderMap::resolve(&cols, &headers(&["Email", "age"]));
        let engine = Engine::new(&cols, &map, false);

        let report = engine.evaluate(1, &raw(&["a@example.com", "x"])).unwrap();
        assert_eq!(report.outcome, RowOutcome::Rejected);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn raised_transform_error_aborts() {
        let cols = vec![ColumnSpec::new("id").transform_and_validate(
            |_: &str, _: &NormalizedRow| -> Result<Transformed, FieldError> {
                Err("lookup table unavailable".into())
            },
        )];
        let map = HeaderMap::resolve(&cols, &headers(&["id"]));
        let engine = Engine::new(&cols, &map, false);

        let err = engine.evaluate(7, &raw(&["1"])).unwrap_err();
        assert_eq!(err.to_string(), "Row 7: id: lookup table unavailable");
    }

    #[test]
    fn validators_see_the_normalized_row() {
        let cols = vec![
            ColumnSpec::new("password"),
            ColumnSpec::new("confirm").validate(|v: &str, row: &NormalizedRow| {
                row.get("password") == Some(v)
            }),
        ];
        let map = HeaderMap::resolve(&cols, &headers(&["Password", "Confirm"]));
        let engine = Engine::new(&cols, &map, false);

        let ok = engine.evaluate(1, &raw(&["s3cret", "s3cret"])).unwrap();
        assert!(matches!(ok.outcome, RowOutcome::Accepted(_)));
        let bad = engine.evaluate(2, &raw(&["s3cret", "secret"])).unwrap();
        assert_eq!(bad.outcome, RowOutcome::Blocked);
    }

    #[test]
    fn unknown_columns_are_optional_output() {
        let cols = columns();
        let map = HeaderMap::resolve(&cols, &headers(&["Email", "Notes"]));

        let report = Engine::new(&cols, &map, true)
            .evaluate(1, &raw(&["a@example.com", "vip"]))
            .unwrap();
        let RowOutcome::Accepted(out) = report.outcome else {
            panic!("expected accepted row");
        };
        assert_eq!(out["Notes"], "vip");
        assert!(!out.contains_key("age"));

        let report = Engine::new(&cols, &map, false)
            .evaluate(1, &raw(&["a@example.com", "vip"]))
            .unwrap();
        let RowOutcome::Accepted(out) = report.outcome else {
            panic!("expected accepted row");
        };
        assert!(!out.contains_key("Notes"));
    }

    #[test]
    fn reports_missing_required_columns() {
        let cols = columns();
        let map = HeaderMap::resolve(&cols, &headers(&["age", "name"]));
        let missing = Engine::new(&cols, &map, false).missing_required();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].input_name, "email");
    }
}
