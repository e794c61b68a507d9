use serde::Serialize;

/// How many error messages a renderer shows before summarizing the rest.
pub const MAX_DISPLAYED_ERRORS: usize = 9;

/// Row counters for one parse pass.
///
/// `total_rows == valid_rows + invalid_rows + duplicate_rows` always holds.
/// `blocked_rows` is the part of `invalid_rows` that failed a blocking check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub duplicate_rows: usize,
    pub blocked_rows: usize,
}

impl ValidationStats {
    pub fn is_balanced(&self) -> bool {
        self.total_rows == self.valid_rows + self.invalid_rows + self.duplicate_rows
            && self.blocked_rows <= self.invalid_rows
    }
}

/// Accumulates counters and messages while rows flow through the pipeline.
#[derive(Debug, Default)]
pub(crate) struct StatsAggregator {
    stats: ValidationStats,
    errors: Vec<String>,
}

impl StatsAggregator {
    pub fn valid(&mut self) {
        self.stats.total_rows += 1;
        self.stats.valid_rows += 1;
    }

    pub fn invalid(&mut self, blocked: bool) {
        self.stats.total_rows += 1;
        self.stats.invalid_rows += 1;
        if blocked {
            self.stats.blocked_rows += 1;
        }
    }

    pub fn duplicate(&mut self) {
        self.stats.total_rows += 1;
        self.stats.duplicate_rows += 1;
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn errors(&mut self, messages: impl IntoIterator<Item = String>) {
        self.errors.extend(messages);
    }

    pub fn finish(self) -> (ValidationStats, Vec<String>) {
        debug_assert!(self.stats.is_balanced());
        (self.stats, self.errors)
    }
}

/// First [`MAX_DISPLAYED_ERRORS`] messages plus a count of the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub shown: Vec<String>,
    pub overflow: usize,
}

impl ErrorSummary {
    pub fn from_errors(errors: &[String]) -> Self {
        let shown: Vec<String> = errors.iter().take(MAX_DISPLAYED_ERRORS).cloned().collect();
        Self {
            overflow: errors.len() - shown.len(),
            shown,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }

    /// e.g. "...and 3 more errors"
    pub fn overflow_message(&self) -> Option<String> {
        match self.overflow {
            0 => None,
            1 => Some("...and 1 more error".to_string()),
            n => Some(format!("...and {n} more errors")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_stay_balanced() {
        let mut agg = StatsAggregator::default();
        agg.valid();
        agg.valid();
        agg.invalid(false);
        agg.invalid(true);
        agg.duplicate();
        let (stats, _) = agg.finish();
        assert_eq!(stats.total_rows, 5);
        assert_eq!(stats.invalid_rows, 2);
        assert_eq!(stats.blocked_rows, 1);
        assert!(stats.is_balanced());
    }

    #[test]
    fn summary_caps_displayed_errors() {
        let errors: Vec<String> = (1..=12).map(|i| format!("Row {i}: bad")).collect();
        let summary = ErrorSummary::from_errors(&errors);
        assert_eq!(summary.shown.len(), MAX_DISPLAYED_ERRORS);
        assert_eq!(summary.shown[0], "Row 1: bad");
        assert_eq!(summary.overflow, 3);
        assert_eq!(summary.overflow_message().as_deref(), Some("...and 3 more errors"));

        let few = ErrorSummary::from_errors(&errors[..2]);
        assert_eq!(few.overflow, 0);
        assert_eq!(few.overflow_message(), None);
    }

    #[test]
    fn stats_serialize_camel_case() {
        let json = serde_json::to_value(ValidationStats::default()).unwrap();
        assert_eq!(json["totalRows"], 0);
        assert_eq!(json["duplicateRows"], 0);
    }
}
