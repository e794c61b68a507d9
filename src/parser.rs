use crate::{CsvResult, CsvUploadError};
use csv_async::{AsyncReaderBuilder, StringRecord};
use futures::StreamExt;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// One data line, values aligned with [`ParsedCsv::headers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line in the file where the record starts
    pub line: u64,
    pub values: Vec<String>,
}

impl RawRow {
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Set when `max_rows` cut the file short
    pub truncated: bool,
    /// Non-fatal observations (ragged rows, truncation)
    pub notes: Vec<String>,
}

fn parse_error(err: csv_async::Error) -> CsvUploadError {
    CsvUploadError::Parse {
        message: err.to_string(),
    }
}

/// Find a quoted field that is never closed. Returns the line it opens on.
///
/// A quote only opens a field at field start; `""` inside a quoted field is
/// an escaped quote.
fn find_unterminated_quote(data: &[u8]) -> Option<usize> {
    let mut line = 1usize;
    let mut at_field_start = true;
    let mut open_on: Option<usize> = None;
    let mut i = 0usize;

    while i < data.len() {
        let b = data[i];
        if open_on.is_some() {
            match b {
                b'"' if data.get(i + 1) == Some(&b'"') => i += 1,
                b'"' => {
                    open_on = None;
                    at_field_start = false;
                }
                b'\n' => line += 1,
                _ => {}
            }
        } else {
            match b {
                b'"' if at_field_start => open_on = Some(line),
                b',' | b'\r' => at_field_start = true,
                b'\n' => {
                    line += 1;
                    at_field_start = true;
                }
                _ => at_field_start = false,
            }
        }
        i += 1;
    }
    open_on
}

/// Maps record byte offsets to 1-based line numbers, independent of the
/// line terminator in use.
struct LineCounter<'a> {
    data: &'a [u8],
    offset: usize,
    line: u64,
}

impl<'a> LineCounter<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            line: 1,
        }
    }

    /// Offsets must be non-decreasing.
    fn line_at(&mut self, byte: u64) -> u64 {
        let mut target = (byte as usize).min(self.data.len());
        // a record offset may point at skipped empty lines before it
        while matches!(self.data.get(target), Some(b'\r' | b'\n')) {
            target += 1;
        }
        if target > self.offset {
            let newlines = self.data[self.offset..target]
                .iter()
                .filter(|&&b| b == b'\n')
                .count();
            self.line += newlines as u64;
            self.offset = target;
        }
        self.line
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

/// Parse UTF-8 CSV bytes into a header and rows.
///
/// Empty input (zero bytes or header only) yields no rows and is not an
/// error. With `max_rows`, reading stops after that many data rows.
pub async fn parse_csv(data: &[u8], max_rows: Option<usize>) -> CsvResult<ParsedCsv> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(ParsedCsv::default());
    }
    if let Some(line) = find_unterminated_quote(data) {
        return Err(CsvUploadError::UnterminatedQuote { line });
    }

    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .create_reader(data);

    let headers: Vec<String> = rdr
        .headers()
        .await
        .map_err(parse_error)?
        .iter()
        .map(str::to_string)
        .collect();
    let width = headers.len();

    let mut parsed = ParsedCsv {
        headers,
        ..Default::default()
    };
    let mut lines = LineCounter::new(data);
    let mut records = rdr.records();

    while let Some(record) = records.next().await {
        let record = record.map_err(parse_error)?;
        let line = record
            .position()
            .map(|p| lines.line_at(p.byte()))
            .unwrap_or_default();
        if is_blank(&record) {
            parsed.notes.push(format!("Line {line}: blank row skipped."));
            continue;
        }
        if let Some(max) = max_rows {
            if parsed.rows.len() >= max {
                parsed.truncated = true;
                parsed
                    .notes
                    .push(format!("Only the first {max} rows were read."));
                tracing::warn!(max_rows = max, "csv truncated");
                break;
            }
        }

        let mut values: Vec<String> = record.iter().map(str::to_string).collect();
        if values.len() < width {
            parsed.notes.push(format!(
                "Line {line}: {} fields, expected {width}; missing values left empty.",
                values.len()
            ));
            values.resize(width, String::new());
        } else if values.len() > width {
            parsed.notes.push(format!(
                "Line {line}: {} fields, expected {width}; extra values ignored.",
                values.len()
            ));
            values.truncate(width);
        }
        parsed.rows.push(RawRow { line, values });
    }

    tracing::debug!(
        columns = parsed.headers.len(),
        rows = parsed.rows.len(),
        truncated = parsed.truncated,
        "parsed csv"
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_header_and_rows() {
        let body = b"Email,Full Name\na@example.com,Jane\nb@example.com,\"Doe, John\"\n";
        let parsed = parse_csv(body, None).await.unwrap();
        assert_eq!(parsed.headers, vec!["Email", "Full Name"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1].get(1), Some("Doe, John"));
        assert_eq!(parsed.rows[1].line, 3);
        assert!(parsed.notes.is_empty());
    }

    #[tokio::test]
    async fn empty_and_header_only_inputs_have_no_rows() {
        let empty = parse_csv(b"", None).await.unwrap();
        assert!(empty.headers.is_empty() && empty.rows.is_empty());

        let header_only = parse_csv(b"\xef\xbb\xbfemail,name\n", None).await.unwrap();
        assert_eq!(header_only.headers, vec!["email", "name"]);
        assert!(header_only.rows.is_empty());
    }

    #[tokio::test]
    async fn max_rows_truncates_with_note() {
        let parsed = parse_csv(b"a\n1\n2\n3\n", Some(1)).await.unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].get(0), Some("1"));
        assert!(parsed.truncated);
        assert_eq!(parsed.notes.len(), 1);

        let exact = parse_csv(b"a\n1\n2\n", Some(2)).await.unwrap();
        assert!(!exact.truncated);
    }

    #[tokio::test]
    async fn ragged_rows_are_padded_or_cut() {
        let parsed = parse_csv(b"a,b,c\n1\n1,2,3,4\n", None).await.unwrap();
        assert_eq!(parsed.rows[0].values, vec!["1", "", ""]);
        assert_eq!(parsed.rows[1].values, vec!["1", "2", "3"]);
        assert_eq!(parsed.notes.len(), 2);
    }

    #[tokio::test]
    async fn crlf_rows_report_file_lines() {
        let parsed = parse_csv(b"a,b\r\n1,2\r\n1\r\n1,2,3\r\n", None).await.unwrap();
        let lines: Vec<u64> = parsed.rows.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 4]);
        assert!(parsed.notes[0].starts_with("Line 3: 1 fields"));
        assert!(parsed.notes[1].starts_with("Line 4: 3 fields"));

        let multiline = parse_csv(b"a,b\r\n\"x\r\ny\",1\r\n2,3\r\n", None).await.unwrap();
        assert_eq!(multiline.rows[1].line, 4);
    }

    #[tokio::test]
    async fn blank_rows_are_skipped() {
        let parsed = parse_csv(b"a,b\n1,2\n\n  ,\n3,4\n", None).await.unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.notes, vec!["Line 4: blank row skipped."]);
    }

    #[tokio::test]
    async fn unterminated_quote_fails() {
        let err = parse_csv(b"a,b\n1,2\n\"open,3\n4,5\n", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CsvUploadError::UnterminatedQuote { line: 3 }));
    }

    #[tokio::test]
    async fn invalid_utf8_fails() {
        let err = parse_csv(b"a,b\n\xff,2\n", None).await.unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn quote_scan_handles_escapes_and_multiline_fields() {
        assert_eq!(find_unterminated_quote(b"a\n\"x \"\"y\"\"\"\n"), None);
        assert_eq!(find_unterminated_quote(b"a\n\"multi\nline\",2\n"), None);
        assert_eq!(find_unterminated_quote(b"a\n5\"\n"), None);
        assert_eq!(find_unterminated_quote(b"a\nx,\"y\n"), Some(2));
    }
}
