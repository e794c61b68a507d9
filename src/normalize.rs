use crate::parser::RawRow;
use crate::schema::{ColumnSpec, NormalizedRow};
use std::collections::BTreeSet;

/// Where one header's values land in a [`NormalizedRow`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Resolved to a column's canonical `input_name`
    Column(String),
    /// Unknown (or shadowed) header, kept under this key
    Extra(String),
}

impl Target {
    fn key(&self) -> &str {
        match self {
            Target::Column(k) | Target::Extra(k) => k,
        }
    }
}

/// Resolution of every observed header to its key in a normalized row.
///
/// Two headers resolving to the same column: the first one in header order
/// owns the canonical name, the later one is kept as an extra column under
/// its own name and a note is recorded.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    targets: Vec<Target>,
    present: BTreeSet<String>,
    notes: Vec<String>,
}

fn find_column<'a>(columns: &'a [ColumnSpec], header: &str) -> Option<&'a ColumnSpec> {
    columns
        .iter()
        .find(|c| c.matches_name(header))
        .or_else(|| columns.iter().find(|c| c.matches_alias(header)))
}

impl HeaderMap {
    pub fn resolve(columns: &[ColumnSpec], headers: &[String]) -> Self {
        let mut map = HeaderMap::default();
        let mut taken: BTreeSet<String> = BTreeSet::new();

        // Claim canonical names first so an extra header never takes one.
        let mut claimed: Vec<Option<String>> = Vec::with_capacity(headers.len());
        for (idx, header) in headers.iter().enumerate() {
            match find_column(columns, header) {
                Some(col) if !map.present.contains(&col.input_name) => {
                    map.present.insert(col.input_name.clone());
                    taken.insert(col.input_name.clone());
                    claimed.push(Some(col.input_name.clone()));
                }
                Some(col) => {
                    map.notes.push(format!(
                        "Column \"{header}\" (column {}) also matches \"{}\"; first match kept.",
                        idx + 1,
                        col.input_name
                    ));
                    tracing::warn!(header = %header, column = %col.input_name, "header collision");
                    claimed.push(None);
                }
                None => claimed.push(None),
            }
        }

        for (idx, (header, claim)) in headers.iter().zip(claimed).enumerate() {
            let target = match claim {
                Some(name) => Target::Column(name),
                None => {
                    let mut key = header.clone();
                    if taken.contains(&key) {
                        key = format!("{header} (column {})", idx + 1);
                    }
                    taken.insert(key.clone());
                    Target::Extra(key)
                }
            };
            map.targets.push(target);
        }

        tracing::debug!(
            headers = headers.len(),
            resolved = map.present.len(),
            "resolved headers"
        );
        map
    }

    /// Whether a column's canonical name was found in the header.
    pub fn is_present(&self, input_name: &str) -> bool {
        self.present.contains(input_name)
    }

    /// Every key a normalized row carries: canonical names plus extras.
    pub fn fields(&self) -> BTreeSet<String> {
        self.targets.iter().map(|t| t.key().to_string()).collect()
    }

    /// Keys of headers that matched no column (or lost a collision).
    pub fn extra_fields(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().filter_map(|t| match t {
            Target::Extra(k) => Some(k.as_str()),
            Target::Column(_) => None,
        })
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn normalize(&self, raw: &RawRow) -> NormalizedRow {
        self.targets
            .iter()
            .enumerate()
            .map(|(idx, target)| (target.key(), raw.get(idx).unwrap_or_default()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(values: &[&str]) -> RawRow {
        RawRow {
            line: 2,
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("email").aliases(["E-mail", "Email Address"]),
            ColumnSpec::new("name").alias("Full Name"),
        ]
    }

    #[test]
    fn resolves_names_and_aliases_case_insensitively() {
        let observed = headers(&["EMAIL ADDRESS", "full name", "Notes"]);
        let map = HeaderMap::resolve(&columns(), &observed);
        assert!(map.is_present("email"));
        assert!(map.is_present("name"));

        let normalized = map.normalize(&row(&["a@example.com", "Jane", "vip"]));
        assert_eq!(normalized.get("email"), Some("a@example.com"));
        assert_eq!(normalized.get("name"), Some("Jane"));
        assert_eq!(normalized.get("Notes"), Some("vip"));
        assert_eq!(map.extra_fields().collect::<Vec<_>>(), vec!["Notes"]);
    }

    #[test]
    fn first_colliding_header_wins() {
        let map = HeaderMap::resolve(&columns(), &headers(&["E-mail", "email"]));
        let normalized = map.normalize(&row(&["first@example.com", "second@example.com"]));
        assert_eq!(normalized.get("email"), Some("first@example.com"));
        assert_eq!(
            normalized.get("email (column 2)"),
            Some("second@example.com")
        );
        assert_eq!(map.notes().len(), 1);
    }

    #[test]
    fn alias_after_primary_name_is_kept_as_extra() {
        let map = HeaderMap::resolve(&columns(), &headers(&["email", "E-mail"]));
        let normalized = map.normalize(&row(&["first@example.com", "second@example.com"]));
        assert_eq!(normalized.get("email"), Some("first@example.com"));
        assert_eq!(normalized.get("E-mail"), Some("second@example.com"));
        assert_eq!(map.fields().len(), 2);
    }

    #[test]
    fn primary_name_is_preferred_over_another_columns_alias() {
        let columns = vec![
            ColumnSpec::new("phone").alias("mobile"),
            ColumnSpec::new("mobile"),
        ];
        let map = HeaderMap::resolve(&columns, &headers(&["Mobile"]));
        assert!(map.is_present("mobile"));
        assert!(!map.is_present("phone"));
    }
}
