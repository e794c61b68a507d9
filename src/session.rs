//! Upload session: the state a UI renders around one CSV uploader.
//!
//! States move `Idle -> Parsing -> Parsed -> Uploading`. Every transition that
//! starts or abandons asynchronous work bumps a generation counter; parse
//! results and progress events carrying an older generation are dropped.

use crate::io::{select_single, UploadFile};
use crate::pipeline::{parse_upload, ColumnPresence, ParseResult, UploadConfig};
use crate::schema::OutputRow;
use crate::stats::{ErrorSummary, ValidationStats};
use crate::{CsvResult, CsvUploadError};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Parsing,
    Parsed,
    Uploading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SelectFile,
    ParseSucceeded,
    ParseFailed,
    StartUpload,
    UploadSucceeded,
    UploadFailed,
    Reset,
}

impl SessionState {
    /// Transition table. `None` means the event is not allowed in this state.
    pub fn next(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;
        match (self, event) {
            (_, Reset) => Some(Idle),
            (Idle | Parsing | Parsed, SelectFile) => Some(Parsing),
            (Parsing, ParseSucceeded) => Some(Parsed),
            (Parsing, ParseFailed) => Some(Idle),
            (Parsed, StartUpload) => Some(Uploading),
            (Uploading, UploadSucceeded) => Some(Idle),
            (Uploading, UploadFailed) => Some(Parsed),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Parsing => "parsing",
            SessionState::Parsed => "parsed",
            SessionState::Uploading => "uploading",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {event:?} while {from}")]
    InvalidTransition {
        from: SessionState,
        event: SessionEvent,
    },
    #[error("upload blocked: fix the reported errors and select the file again")]
    Blocked,
    #[error("result discarded: the session has moved on")]
    Stale,
    #[error(transparent)]
    Pipeline(#[from] CsvUploadError),
    /// Message of the transport error, shown verbatim
    #[error("{0}")]
    Transport(String),
}

/// What the upload transport receives.
#[derive(Debug)]
pub struct UploadRequest {
    pub data: Vec<OutputRow>,
    pub file_name: String,
    pub on_progress: ProgressHandle,
}

/// Performs the actual network upload.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> anyhow::Result<()>;
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    generation: u64,
    result: Option<ParseResult>,
    message: Option<String>,
    progress: f64,
}

impl Inner {
    fn apply(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        let next = self.state.next(event).ok_or(SessionError::InvalidTransition {
            from: self.state,
            event,
        })?;
        tracing::debug!(from = %self.state, to = %next, ?event, "session transition");
        self.state = next;
        Ok(())
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Progress callback handed to the transport.
///
/// Reports are ignored once the upload that created this handle is no longer
/// the session's current one.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    inner: Weak<Mutex<Inner>>,
    generation: u64,
}

impl ProgressHandle {
    /// Record a completed fraction in `[0, 1]`. Returns false if dropped.
    pub fn report(&self, fraction: f64) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut inner = lock(&inner);
        if inner.generation != self.generation
            || inner.state != SessionState::Uploading
            || fraction.is_nan()
        {
            tracing::debug!(generation = self.generation, "stale progress event dropped");
            return false;
        }
        inner.progress = fraction.clamp(0.0, 1.0);
        true
    }
}

/// A file accepted at the input boundary, waiting to be parsed.
#[derive(Debug)]
pub struct ParseTicket {
    pub generation: u64,
    pub file: UploadFile,
}

/// Read-only snapshot for renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub state: SessionState,
    pub file_name: Option<String>,
    pub errors: ErrorSummary,
    pub columns: Vec<ColumnPresence>,
    pub stats: Option<ValidationStats>,
    pub progress: f64,
    pub message: Option<String>,
    pub can_upload: bool,
}

/// One uploader's state. Cloning shares the same session.
#[derive(Debug, Clone)]
pub struct UploadSession {
    config: Arc<UploadConfig>,
    inner: Arc<Mutex<Inner>>,
}

impl UploadSession {
    pub fn new(config: UploadConfig) -> CsvResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                generation: 0,
                result: None,
                message: None,
                progress: 0.0,
            })),
        })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner).state
    }

    pub fn result(&self) -> Option<ParseResult> {
        lock(&self.inner).result.clone()
    }

    /// Accept a file selection and enter `Parsing`.
    ///
    /// An invalid selection leaves the state unchanged and sets the message.
    pub fn begin_parse(&self, files: Vec<UploadFile>) -> Result<ParseTicket, SessionError> {
        let mut inner = lock(&self.inner);
        if inner.state.next(SessionEvent::SelectFile).is_none() {
            return Err(SessionError::InvalidTransition {
                from: inner.state,
                event: SessionEvent::SelectFile,
            });
        }
        let file = match select_single(files, &self.config.accept) {
            Ok(file) => file,
            Err(e) => {
                inner.message = Some(e.to_string());
                return Err(e.into());
            }
        };

        inner.apply(SessionEvent::SelectFile)?;
        inner.generation += 1;
        inner.result = None;
        inner.message = None;
        inner.progress = 0.0;
        Ok(ParseTicket {
            generation: inner.generation,
            file,
        })
    }

    /// Apply a finished parse, unless a newer selection or reset superseded it.
    pub fn complete_parse(
        &self,
        generation: u64,
        outcome: CsvResult<ParseResult>,
    ) -> Result<(), SessionError> {
        let mut inner = lock(&self.inner);
        if inner.generation != generation || inner.state != SessionState::Parsing {
            tracing::warn!(
                generation,
                current = inner.generation,
                "stale parse result dropped"
            );
            return Err(SessionError::Stale);
        }
        match outcome {
            Ok(result) => {
                inner.apply(SessionEvent::ParseSucceeded)?;
                inner.result = Some(result);
                Ok(())
            }
            Err(e) => {
                inner.apply(SessionEvent::ParseFailed)?;
                inner.message = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Select a file and parse it.
    pub async fn select_file(&self, files: Vec<UploadFile>) -> Result<(), SessionError> {
        let ticket = self.begin_parse(files)?;
        let outcome = parse_upload(&ticket.file, &self.config).await;
        self.complete_parse(ticket.generation, outcome)
    }

    /// Hand the cleaned dataset to the transport.
    ///
    /// On transport failure the session returns to `Parsed` with its data
    /// intact so the upload can be retried.
    pub async fn upload<T>(&self, transport: &T) -> Result<(), SessionError>
    where
        T: UploadTransport + ?Sized,
    {
        let (generation, request) = {
            let mut inner = lock(&self.inner);
            if inner.state.next(SessionEvent::StartUpload).is_none() {
                return Err(SessionError::InvalidTransition {
                    from: inner.state,
                    event: SessionEvent::StartUpload,
                });
            }
            let (data, file_name) = match &inner.result {
                Some(result) if result.can_upload() => {
                    (result.data.clone(), result.file_name.clone())
                }
                _ => return Err(SessionError::Blocked),
            };
            inner.apply(SessionEvent::StartUpload)?;
            inner.generation += 1;
            inner.progress = 0.0;
            inner.message = None;

            let on_progress = ProgressHandle {
                inner: Arc::downgrade(&self.inner),
                generation: inner.generation,
            };
            (
                inner.generation,
                UploadRequest {
                    data,
                    file_name,
                    on_progress,
                },
            )
        };

        let rows = request.data.len();
        let outcome = transport.upload(request).await;

        let mut inner = lock(&self.inner);
        if inner.generation != generation || inner.state != SessionState::Uploading {
            tracing::warn!(generation, "upload finished after the session moved on");
            return Err(SessionError::Stale);
        }
        match outcome {
            Ok(()) => {
                inner.apply(SessionEvent::UploadSucceeded)?;
                inner.result = None;
                inner.progress = 0.0;
                tracing::info!(rows, "upload complete");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                inner.apply(SessionEvent::UploadFailed)?;
                inner.message = Some(message.clone());
                tracing::warn!(error = %message, "upload failed");
                Err(SessionError::Transport(message))
            }
        }
    }

    /// Back to `Idle`, abandoning any in-flight parse or upload.
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        tracing::debug!(from = %inner.state, to = %SessionState::Idle, "session reset");
        inner.state = SessionState::Idle;
        inner.generation += 1;
        inner.result = None;
        inner.message = None;
        inner.progress = 0.0;
    }

    pub fn view(&self) -> SessionView {
        let inner = lock(&self.inner);
        let result = inner.result.as_ref();
        let columns = match result {
            Some(r) => r.column_presence(&self.config.columns),
            None => self
                .config
                .columns
                .iter()
                .map(|c| ColumnPresence {
                    input_name: c.input_name.clone(),
                    description: c.description.clone(),
                    required: c.required,
                    present: false,
                })
                .collect(),
        };

        SessionView {
            state: inner.state,
            file_name: result.map(|r| r.file_name.clone()),
            errors: result.map(ParseResult::error_summary).unwrap_or_default(),
            columns,
            stats: result.map(|r| r.validation_stats),
            progress: inner.progress,
            message: inner.message.clone(),
            can_upload: inner.state == SessionState::Parsed
                && result.is_some_and(ParseResult::can_upload),
        }
    }
}
