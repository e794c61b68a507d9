//! CSV upload pipeline with a declarative column schema.
//!
//! - Input boundary: exactly one accepted file, optionally gzip/zstd and non-UTF-8.
//! - Parse: header + rows via `csv_async`, optional `max_rows` truncation.
//! - Normalize: headers resolved to canonical column names through aliases.
//! - Validate: per-column `validate` (blocking) or `transform_and_validate` (row filter).
//! - Dedup: first occurrence wins on the configured key.
//!
//! Data shape:
//! - `ParseResult { data, fields, validation_stats, file_name, errors, .. }`
//! - `OutputRow`: `serde_json::Map` keyed by each column's `api_name`
//!
//! The [`session::UploadSession`] wraps the pipeline in an explicit
//! idle/parsing/parsed/uploading state machine and hands cleaned data to a
//! caller-supplied [`session::UploadTransport`].
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
pub mod config;
mod dedup;
mod engine;
mod io;
mod normalize;
mod parser;
pub mod pipeline;
pub mod rules;
pub mod schema;
pub mod session;
mod stats;

pub use crate::config::SchemaFile;
pub use crate::io::{read_upload, select_single, UploadFile};
pub use crate::normalize::HeaderMap;
pub use crate::parser::{parse_csv, ParsedCsv, RawRow};
pub use crate::pipeline::{parse_upload, process_bytes, ColumnPresence, ParseResult, UploadConfig};
pub use crate::schema::{
    ColumnSpec, FieldError, FieldRule, NormalizedRow, OutputRow, RowTransformer, RowValidator,
    Transformed,
};
pub use crate::session::{
    ProgressHandle, SessionError, SessionState, SessionView, UploadRequest, UploadSession,
    UploadTransport,
};
pub use crate::stats::{ErrorSummary, ValidationStats, MAX_DISPLAYED_ERRORS};

use thiserror::Error;

/// Error type for a single parse pass.
///
/// Row-level problems are reported as data on [`ParseResult`]; only the
/// variants below abort a pass.
#[derive(Debug, Error)]
pub enum CsvUploadError {
    #[error("{0}")]
    InputSelection(String),
    #[error("Unable to parse CSV: {message}")]
    Parse { message: String },
    #[error("Unable to parse CSV: unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },
    #[error("Row {row}: {column}: {message}")]
    Transform {
        row: usize,
        column: String,
        message: String,
    },
    #[error("Invalid upload configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl CsvUploadError {
    /// True for errors that fail the whole parse attempt because the file
    /// itself could not be read as CSV.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            CsvUploadError::Parse { .. }
                | CsvUploadError::UnterminatedQuote { .. }
                | CsvUploadError::Csv(_)
                | CsvUploadError::Io(_)
        )
    }
}

pub type CsvResult<T> = std::result::Result<T, CsvUploadError>;
