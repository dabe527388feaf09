//! Crate-wide error type and the public error taxonomy.
//!
//! Errors are classified at the push/pull boundary (see `push`), not at the public
//! surface: only [`Error::InvalidArgument`], [`Error::NotFound`] (on `find_by_id`),
//! and [`Error::PendingSync`] (on `pull`) are meant to reach a caller directly.
//! Everything else is either absorbed into a [`crate::push::PushOutcome`] or
//! propagated as a hard sync failure.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found")]
    NotFound,

    #[error("insufficient credentials")]
    InsufficientCredentials,

    #[error("must push {0} pending entries before this read")]
    PendingSync(usize),

    #[error("count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("operation timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serde error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Retry classification for errors surfaced out of push/pull. The crate never
/// retries internally — a caller-driven scheduler (see [`crate::scheduler`]) can use
/// this to decide whether to back off or try again soon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying later (network blip, timeout, transient transport failure).
    Retryable,
    /// Retrying would not help without caller intervention (bad auth, bad argument).
    Terminal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout | Error::Transport(_) => ErrorKind::Retryable,
            Error::InvalidArgument(_)
            | Error::NotFound
            | Error::InsufficientCredentials
            | Error::PendingSync(_)
            | Error::CountMismatch { .. }
            | Error::Json(_) => ErrorKind::Terminal,
        }
    }
}

/// Wraps `fut` in [`tokio::time::timeout`] when `timeout` is set, mapping an
/// elapsed deadline to [`Error::Timeout`]. With `None` this just awaits `fut`
/// directly, so every Cache Store operation threads `SyncOptions::timeout`
/// through here instead of building `tokio::time::timeout` ad hoc at each call
/// site.
pub(crate) async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, fut).await.unwrap_or(Err(Error::Timeout)),
        None => fut.await,
    }
}
