//! One parse pass: read, parse, normalize, validate, dedup, count.

use crate::dedup::DedupFilter;
use crate::engine::{Engine, RowOutcome};
use crate::io::{read_upload, UploadFile};
use crate::normalize::HeaderMap;
use crate::parser::parse_csv;
use crate::schema::{ColumnSpec, OutputRow};
use crate::stats::{ErrorSummary, StatsAggregator, ValidationStats};
use crate::{CsvResult, CsvUploadError};
use crc32fast::Hasher as Crc32;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub columns: Vec<ColumnSpec>,
    pub max_rows: Option<usize>,
    pub dedupe_on: Option<String>,
    pub keep_unknown_columns: bool,
    /// MIME types or `.ext` entries accepted at the input boundary
    pub accept: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            max_rows: None,
            dedupe_on: None,
            keep_unknown_columns: false,
            accept: vec![
                "text/csv".into(),
                "application/vnd.ms-excel".into(),
                ".csv".into(),
            ],
        }
    }
}

impl UploadConfig {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    pub fn dedupe_on(mut self, input_name: impl Into<String>) -> Self {
        self.dedupe_on = Some(input_name.into());
        self
    }

    pub fn keep_unknown_columns(mut self, keep: bool) -> Self {
        self.keep_unknown_columns = keep;
        self
    }

    pub fn accept<I, S>(mut self, accept: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accept = accept.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> CsvResult<()> {
        if self.max_rows == Some(0) {
            return Err(CsvUploadError::Config(
                "max_rows must be a positive integer".into(),
            ));
        }

        let mut input_names = HashSet::new();
        let mut api_names = HashSet::new();
        for column in &self.columns {
            if column.input_name.trim().is_empty() || column.api_name.trim().is_empty() {
                return Err(CsvUploadError::Config(
                    "column input_name and api_name cannot be empty".into(),
                ));
            }
            if !input_names.insert(column.input_name.to_ascii_lowercase()) {
                return Err(CsvUploadError::Config(format!(
                    "duplicate column input_name: {}",
                    column.input_name
                )));
            }
            if !api_names.insert(column.api_name.as_str()) {
                return Err(CsvUploadError::Config(format!(
                    "duplicate column api_name: {}",
                    column.api_name
                )));
            }
        }

        if let Some(key) = &self.dedupe_on {
            if !self.columns.iter().any(|c| &c.input_name == key) {
                return Err(CsvUploadError::Config(format!(
                    "dedupe_on \"{key}\" does not name a column"
                )));
            }
        }
        Ok(())
    }
}

/// Presence of one configured column in the uploaded header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnPresence {
    pub input_name: String,
    pub description: String,
    pub required: bool,
    pub present: bool,
}

/// Outcome of one parse pass, owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub data: Vec<OutputRow>,
    /// Normalized keys seen in the header (canonical names and extras)
    pub fields: BTreeSet<String>,
    pub validation_stats: ValidationStats,
    pub file_name: String,
    pub errors: Vec<String>,
    /// Non-fatal observations: truncation, ragged rows, header collisions
    pub notes: Vec<String>,
    pub missing_required: Vec<String>,
    /// A blocking check failed or a required column is missing
    pub blocking: bool,
    pub truncated: bool,
}

impl ParseResult {
    pub fn can_upload(&self) -> bool {
        !self.blocking && !self.data.is_empty()
    }

    pub fn error_summary(&self) -> ErrorSummary {
        ErrorSummary::from_errors(&self.errors)
    }

    pub fn column_presence(&self, columns: &[ColumnSpec]) -> Vec<ColumnPresence> {
        columns
            .iter()
            .map(|c| ColumnPresence {
                input_name: c.input_name.clone(),
                description: c.description.clone(),
                required: c.required,
                present: self.fields.contains(&c.input_name),
            })
            .collect()
    }

    /// CRC32 over the cleaned dataset, stable for identical input and config.
    pub fn checksum(&self) -> u32 {
        let mut crc = Crc32::new();
        for row in &self.data {
            for (key, value) in row {
                crc.update(key.as_bytes());
                crc.update(&[0x1f]);
                crc.update(value.to_string().as_bytes());
                crc.update(&[0x1f]);
            }
            crc.update(&[0x1e]);
        }
        crc.finalize()
    }
}

/// Read one upload and run the pipeline on it.
pub async fn parse_upload(file: &UploadFile, config: &UploadConfig) -> CsvResult<ParseResult> {
    let bytes = read_upload(file).await?;
    process_bytes(&bytes, &file.name, config).await
}

/// Run the pipeline on UTF-8 CSV bytes.
pub async fn process_bytes(
    data: &[u8],
    file_name: &str,
    config: &UploadConfig,
) -> CsvResult<ParseResult> {
    config.validate()?;
    let parsed = parse_csv(data, config.max_rows).await?;

    let headers = HeaderMap::resolve(&config.columns, &parsed.headers);
    let engine = Engine::new(&config.columns, &headers, config.keep_unknown_columns);
    let mut agg = StatsAggregator::default();

    let missing_required: Vec<String> = engine
        .missing_required()
        .into_iter()
        .map(|c| {
            agg.error(format!("Missing required column: {}", c.label()));
            c.input_name.clone()
        })
        .collect();
    let mut blocking = !missing_required.is_empty();

    let mut dedup = DedupFilter::new(config.dedupe_on.as_deref());
    let mut data = Vec::new();
    for (idx, raw) in parsed.rows.iter().enumerate() {
        let report = engine.evaluate(idx + 1, raw)?;
        agg.errors(report.errors);
        match report.outcome {
            RowOutcome::Accepted(row) => {
                if dedup.is_duplicate(&report.normalized) {
                    agg.duplicate();
                } else {
                    agg.valid();
                    data.push(row);
                }
            }
            RowOutcome::Rejected => agg.invalid(false),
            RowOutcome::Blocked => {
                blocking = true;
                agg.invalid(true);
            }
        }
    }

    if data.is_empty() {
        agg.error(format!("No valid rows found in {file_name}"));
    }

    let (validation_stats, errors) = agg.finish();
    let mut notes = parsed.notes;
    notes.extend(headers.notes().iter().cloned());

    tracing::info!(
        file = %file_name,
        total = validation_stats.total_rows,
        valid = validation_stats.valid_rows,
        invalid = validation_stats.invalid_rows,
        duplicates = dedup.removed(),
        blocking,
        "csv validated"
    );

    Ok(ParseResult {
        data,
        fields: headers.fields(),
        validation_stats,
        file_name: file_name.to_string(),
        errors,
        notes,
        missing_required,
        blocking,
        truncated: parsed.truncated,
    })
}
