//! TOML schema files.
//!
//! ```toml
//! max_rows = 5000
//! dedupe_on = "email"
//!
//! [[columns]]
//! input_name = "email"
//! aliases = ["Email", "E-mail Address"]
//! required = true
//! description = "Email address"
//! validate = { kind = "email" }
//!
//! [[columns]]
//! input_name = "age"
//! transform = { kind = "integer" }
//! ```

use crate::pipeline::UploadConfig;
use crate::rules::{TransformRule, ValidateRule};
use crate::schema::{ColumnSpec, FieldRule};
use crate::{CsvResult, CsvUploadError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFile {
    pub max_rows: Option<usize>,
    pub dedupe_on: Option<String>,
    #[serde(default)]
    pub keep_unknown_columns: bool,
    pub accept: Option<Vec<String>>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub input_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Defaults to `input_name`
    pub api_name: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    pub validate: Option<ValidateRule>,
    pub transform: Option<TransformRule>,
}

impl ColumnConfig {
    fn build(&self) -> CsvResult<ColumnSpec> {
        let rule = match (&self.validate, self.transform) {
            (Some(_), Some(_)) => {
                return Err(CsvUploadError::Config(format!(
                    "column {} declares both validate and transform",
                    self.input_name
                )))
            }
            (Some(v), None) => v.build()?,
            (None, Some(t)) => t.build(),
            (None, None) => FieldRule::PassThrough,
        };

        Ok(ColumnSpec::new(&self.input_name)
            .aliases(self.aliases.iter().cloned())
            .api_name(self.api_name.as_deref().unwrap_or(&self.input_name))
            .required(self.required)
            .description(&self.description)
            .with_rule(rule))
    }
}

impl SchemaFile {
    pub fn parse(content: &str) -> CsvResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CsvResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "loaded schema file");
        Self::parse(&content)
    }

    /// Build a validated [`UploadConfig`].
    pub fn into_config(self) -> CsvResult<UploadConfig> {
        let columns = self
            .columns
            .iter()
            .map(ColumnConfig::build)
            .collect::<CsvResult<Vec<_>>>()?;

        let mut config = UploadConfig::new(columns).keep_unknown_columns(self.keep_unknown_columns);
        config.max_rows = self.max_rows;
        config.dedupe_on = self.dedupe_on;
        if let Some(accept) = self.accept {
            config.accept = accept;
        }
        config.validate()?;
        Ok(config)
    }
}
