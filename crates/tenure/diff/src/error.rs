use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Outcome of applying a diff: the complete new text, or nothing.
pub type PatchResult = Result<String, PatchError>;

/// Why a diff did not apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A line in hunk position is not a parseable `@@ -a,b +c,d @@` header.
    InvalidHunkHeader,
    /// A hunk starts before text already consumed by an earlier hunk.
    InvalidHunkOrder,
    /// A hunk starts past the end of the base text.
    HunkOutOfRange,
    /// A context line differs from the base.
    ContextMismatch,
    /// A removal line differs from the base.
    RemovalMismatch,
    /// Consumed or produced lines disagree with the hunk header.
    HunkCountMismatch,
    /// A hunk body line is empty or carries an unknown prefix.
    MalformedLine,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidHunkHeader => "invalid_hunk_header",
            Self::InvalidHunkOrder => "invalid_hunk_order",
            Self::HunkOutOfRange => "hunk_out_of_range",
            Self::ContextMismatch => "context_mismatch",
            Self::RemovalMismatch => "removal_mismatch",
            Self::HunkCountMismatch => "hunk_count_mismatch",
            Self::MalformedLine => "malformed_line",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed application, pinned to the diff line that broke it.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} at diff line {diff_line}: {message}")]
pub struct PatchError {
    pub kind: ErrorKind,
    /// 1-based line number within the diff text.
    pub diff_line: usize,
    pub message: String,
}

impl PatchError {
    pub(crate) fn new(kind: ErrorKind, diff_line: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            diff_line,
            message: message.into(),
        }
    }
}
