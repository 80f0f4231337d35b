//! Error types for the phpt-difftest harness
//!
//! Everything here is a *tooling* failure: the harness could not form a
//! judgment about a test. Misbehavior of the compiler under test is never an
//! `Error`; it surfaces as a [`Verdict::Fail`](crate::matcher::Verdict::Fail).

use crate::directive::DirectiveError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Tooling-level failure raised by the harness
#[derive(Debug, Error)]
pub enum Error {
    /// The directive block of a test file was rejected
    #[error("directive error: {0}")]
    Directive(#[from] DirectiveError),

    /// An engine executable could not be started
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Filesystem or pipe failure with a short description of what was attempted
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The compile step exited 0 but left no artifact to execute
    #[error("compiler reported success but produced no artifact at {0}")]
    MissingArtifact(PathBuf),

    /// The suite was interrupted while this work was pending
    #[error("cancelled")]
    Cancelled,

    /// The suite root does not exist
    #[error("test root {0} does not exist")]
    RootNotFound(PathBuf),

    /// Discovery succeeded but matched nothing
    #[error("no test files found under {0}")]
    NoTestsDiscovered(PathBuf),

    /// Directory traversal failed during discovery
    #[error("test discovery failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// Configuration file or flag could not be used
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an I/O error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error was caused by suite cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, Error>;
