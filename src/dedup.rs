use crate::schema::NormalizedRow;
use std::collections::HashSet;

/// Keeps the first row seen for each value of a canonical key column.
#[derive(Debug, Default)]
pub(crate) struct DedupFilter {
    key: Option<String>,
    seen: HashSet<String>,
    removed: usize,
}

impl DedupFilter {
    pub fn new(key: Option<&str>) -> Self {
        Self {
            key: key.map(str::to_string),
            ..Default::default()
        }
    }

    /// Returns true when the row repeats an earlier key value.
    ///
    /// Rows without the key, or with an empty value, are never duplicates.
    pub fn is_duplicate(&mut self, row: &NormalizedRow) -> bool {
        let Some(key) = &self.key else {
            return false;
        };
        let value = match row.get(key) {
            Some(v) if !v.is_empty() => v,
            _ => return false,
        };
        if self.seen.insert(value.to_string()) {
            false
        } else {
            self.removed += 1;
            true
        }
    }

    pub fn removed(&self) -> usize {
        self.removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(email: &str) -> NormalizedRow {
        [("email", email)].into_iter().collect()
    }

    #[test]
    fn keeps_first_occurrence() {
        let mut filter = DedupFilter::new(Some("email"));
        assert!(!filter.is_duplicate(&row("a@example.com")));
        assert!(!filter.is_duplicate(&row("b@example.com")));
        assert!(filter.is_duplicate(&row("a@example.com")));
        assert_eq!(filter.removed(), 1);
    }

    #[test]
    fn empty_values_and_no_key_are_never_duplicates() {
        let mut filter = DedupFilter::new(Some("email"));
        assert!(!filter.is_duplicate(&row("")));
        assert!(!filter.is_duplicate(&row("")));

        let mut noop = DedupFilter::new(None);
        assert!(!noop.is_duplicate(&row("a@example.com")));
        assert!(!noop.is_duplicate(&row("a@example.com")));
        assert_eq!(noop.removed(), 0);
    }
}
