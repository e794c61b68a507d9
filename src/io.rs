use crate::{CsvResult, CsvUploadError};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use bytes::Bytes;
use std::io::Cursor;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

use crate::codec::Transcoder;

/// One file handed to the uploader, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// File name as picked by the user, e.g. "contacts.csv"
    pub name: String,
    /// e.g. "text/csv" or "application/gzip"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
    pub content: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: String::new(),
            content_encoding: String::new(),
            charset: encoding_rs::UTF_8,
            content: content.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_content_encoding(mut self, content_encoding: impl Into<String>) -> Self {
        self.content_encoding = content_encoding.into();
        self
    }

    pub fn with_charset(mut self, charset: &'static encoding_rs::Encoding) -> Self {
        self.charset = charset;
        self
    }

    /// Load a local file, guessing content type/encoding from its extension.
    pub async fn from_path(path: &Path) -> CsvResult<Self> {
        let content = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let (content_type, content_encoding) = match ext.as_str() {
            "gz" => ("application/gzip", "gzip"),
            "zst" => ("application/zstd", "zstd"),
            "csv" => ("text/csv", ""),
            "txt" => ("text/plain", ""),
            _ => ("", ""),
        };

        Ok(Self::new(name, content)
            .with_content_type(content_type)
            .with_content_encoding(content_encoding))
    }

    fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        let ct = self.content_type.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || self.name.to_ascii_lowercase().ends_with(".gz")
    }

    fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.content_type.eq_ignore_ascii_case("application/zstd")
            || self.name.to_ascii_lowercase().ends_with(".zst")
    }

    /// Name with any compression suffix removed, e.g. "a.csv.gz" -> "a.csv".
    fn inner_name(&self) -> &str {
        let lower = self.name.to_ascii_lowercase();
        for suffix in [".gz", ".zst"] {
            if lower.ends_with(suffix) {
                return &self.name[..self.name.len() - suffix.len()];
            }
        }
        &self.name
    }

    /// Whether this file matches any entry of an accept list.
    ///
    /// Entries starting with `.` are extensions, everything else a MIME type.
    pub fn is_accepted(&self, accept: &[String]) -> bool {
        if accept.is_empty() {
            return true;
        }
        let mime = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let name = self.name.to_ascii_lowercase();
        let inner = self.inner_name().to_ascii_lowercase();

        accept.iter().any(|entry| {
            let entry = entry.trim().to_ascii_lowercase();
            if entry.starts_with('.') {
                name.ends_with(&entry) || inner.ends_with(&entry)
            } else {
                !mime.is_empty() && mime == entry
            }
        })
    }
}

/// Input boundary: exactly one accepted file, or a single readable message.
pub fn select_single(mut files: Vec<UploadFile>, accept: &[String]) -> CsvResult<UploadFile> {
    match files.len() {
        0 => Err(CsvUploadError::InputSelection(
            "No file selected. Please choose a CSV file.".into(),
        )),
        1 => {
            let file = files.remove(0);
            if file.is_accepted(accept) {
                Ok(file)
            } else {
                Err(CsvUploadError::InputSelection(format!(
                    "{} is not a supported file type. Accepted: {}",
                    file.name,
                    accept.join(", ")
                )))
            }
        }
        n => Err(CsvUploadError::InputSelection(format!(
            "{n} files selected. Please choose a single CSV file."
        ))),
    }
}

/// Wrap the file content with optional decompression and UTF-8 transcoding.
fn build_reader(file: &UploadFile) -> Box<dyn AsyncRead + Unpin + Send> {
    let buf = BufReader::new(Cursor::new(file.content.clone()));
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = if file.is_gzip() {
        Box::new(GzipDecoder::new(buf))
    } else if file.is_zstd() {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };

    if file.charset == encoding_rs::UTF_8 {
        // UTF-8 is validated by the CSV reader itself
        decompressed
    } else {
        let framed = FramedRead::new(decompressed, Transcoder::new(file.charset));
        Box::new(StreamReader::new(framed))
    }
}

/// Read the whole upload into memory as UTF-8 bytes.
///
/// This is the only suspension point of a parse pass.
pub async fn read_upload(file: &UploadFile) -> CsvResult<Vec<u8>> {
    let mut reader = build_reader(file);
    let mut out = Vec::with_capacity(file.content.len());
    reader.read_to_end(&mut out).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            CsvUploadError::Parse {
                message: format!("{}: {e}", file.name),
            }
        } else {
            CsvUploadError::Io(e)
        }
    })?;
    tracing::debug!(file = %file.name, bytes = out.len(), "read upload");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept() -> Vec<String> {
        vec!["text/csv".into(), ".csv".into()]
    }

    #[test]
    fn rejects_zero_and_multiple_files() {
        let err = select_single(vec![], &accept()).unwrap_err();
        assert!(matches!(err, CsvUploadError::InputSelection(_)));

        let files = vec![UploadFile::new("a.csv", ""), UploadFile::new("b.csv", "")];
        let err = select_single(files, &accept()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "2 files selected. Please choose a single CSV file."
        );
    }

    #[test]
    fn rejects_wrong_type() {
        let file = UploadFile::new("photo.png", "").with_content_type("image/png");
        let err = select_single(vec![file], &accept()).unwrap_err();
        assert!(err.to_string().starts_with("photo.png is not a supported file type"));
    }

    #[test]
    fn accepts_by_mime_or_extension() {
        let by_mime = UploadFile::new("export", "").with_content_type("text/csv; charset=utf-8");
        assert!(by_mime.is_accepted(&accept()));

        let compressed = UploadFile::new("Export.CSV.gz", "");
        assert!(compressed.is_accepted(&accept()));
        assert!(compressed.is_gzip());
    }

    #[tokio::test]
    async fn reads_latin1_upload() {
        let file = UploadFile::new("a.csv", &b"name\nJos\xe9\n"[..])
            .with_charset(encoding_rs::WINDOWS_1252);
        let bytes = read_upload(&file).await.unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "name\nJosé\n");
    }

    #[tokio::test]
    async fn encoding_failure_is_a_parse_error() {
        // dangling half of a UTF-16 code unit
        let file = UploadFile::new("a.csv", &b"n\x00a\x00m"[..])
            .with_charset(encoding_rs::UTF_16LE);
        let err = read_upload(&file).await.unwrap_err();
        assert!(err.is_parse_error(), "{err:?}");
    }
}
