//! Error types and error handling strategy for Covent.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Failures raised inside a task body are captured, never thrown across a
//!   suspension point, and re-raised when the task result is observed
//! - [`Error`] is cheap to clone so a captured failure can be re-raised on
//!   every access without losing its source chain
//! - Misuse of the task state machine (double start, resume before start) is a
//!   programmer error and panics instead of producing an [`Error`]
//!
//! # Error Categories
//!
//! - **Task**: broken task handles, panicked or failed bodies
//! - **Kernel**: negative completion results and ring failures
//! - **Loop**: missing active loop, stalled loops, invalid awaiter states
//! - **Configuration**: invalid builder or environment values

use core::fmt;
use std::any::Any;
use std::io;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Task ===
    /// A result was requested from a task that owns no frame.
    BrokenTask,
    /// The task body panicked.
    Panicked,
    /// User-provided error returned by a task body.
    User,

    // === Kernel ===
    /// A kernel operation or the completion ring failed.
    Io,

    // === Loop ===
    /// No event loop is active, or the loop a task was bound to is gone.
    NoEventLoop,
    /// The awaited task cannot make progress: nothing is submitted or woken.
    Stalled,
    /// An awaiter or frame was driven from an invalid state.
    InvalidState,

    // === Configuration ===
    /// Invalid runtime configuration.
    Config,
}

impl ErrorKind {
    /// Returns true if this kind originates from a task body.
    #[must_use]
    pub const fn is_body_failure(&self) -> bool {
        matches!(self, Self::Panicked | Self::User)
    }
}

/// The main error type for Covent operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns true if the source of `self` and `other` is the same allocation.
    ///
    /// A captured failure keeps its identity across re-raises, so this holds
    /// for every error observed from the same task.
    #[must_use]
    pub fn same_source(&self, other: &Self) -> bool {
        match (&self.source, &other.source) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Returns true if this is the broken-task condition.
    #[must_use]
    pub const fn is_broken_task(&self) -> bool {
        matches!(self.kind, ErrorKind::BrokenTask)
    }

    /// Returns true if the task body panicked.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self.kind, ErrorKind::Panicked)
    }

    /// Creates the broken-task error.
    #[must_use]
    pub fn broken_task() -> Self {
        Self::new(ErrorKind::BrokenTask).with_message("task owns no frame")
    }

    /// Creates a user error with a message.
    #[must_use]
    pub fn user(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(msg)
    }

    /// Wraps an arbitrary error as a user failure, keeping it as the source.
    #[must_use]
    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        let msg = source.to_string();
        Self::new(ErrorKind::User)
            .with_message(msg)
            .with_source(source)
    }

    /// Converts a panic payload into an error.
    #[must_use]
    pub fn panicked(payload: &(dyn Any + Send)) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(ErrorKind::Panicked).with_message(msg)
    }

    /// Interprets a negative kernel result code (`-errno`).
    #[must_use]
    pub fn from_errno(result: i32) -> Self {
        let err = io::Error::from_raw_os_error(result.saturating_neg());
        Self::new(ErrorKind::Io)
            .with_message(err.to_string())
            .with_source(err)
    }

    /// Creates an invalid-state error.
    #[must_use]
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState).with_message(detail)
    }

    /// Creates the error returned when no loop is available.
    #[must_use]
    pub fn no_event_loop() -> Self {
        Self::new(ErrorKind::NoEventLoop).with_message("event loop is not running")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::Io)
            .with_message(err.to_string())
            .with_source(err)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for Covent operations.
pub type Result<T> = core::result::Result<T, Error>;
