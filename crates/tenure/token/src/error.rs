use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type TokenResult<T> = Result<T, TokenError>;

/// Why a presented token was refused.
///
/// Checks run in declaration order; the first failing check is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRejection {
    /// Empty, or not two non-empty parts around a `.`.
    Malformed,
    BadBase64,
    BadSignature,
    /// Signed, but not a JSON payload of the expected shape.
    BadPayload,
    BadVersion,
    WrongOp,
    WrongUnlock,
    WrongFilename,
    WrongBase,
    WrongDiff,
    Expired,
    /// Seen before while single-use enforcement is on.
    Replayed,
}

impl TokenRejection {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::BadBase64 => "bad_base64",
            Self::BadSignature => "bad_signature",
            Self::BadPayload => "bad_payload",
            Self::BadVersion => "bad_version",
            Self::WrongOp => "wrong_op",
            Self::WrongUnlock => "wrong_unlock",
            Self::WrongFilename => "wrong_filename",
            Self::WrongBase => "wrong_base",
            Self::WrongDiff => "wrong_diff",
            Self::Expired => "expired",
            Self::Replayed => "replayed",
        }
    }
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("write token rejected: {0}")]
    Rejected(TokenRejection),

    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),

    #[error("payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("lock error")]
    LockError,
}

impl TokenError {
    /// The rejection reason, when this is a refusal rather than a fault.
    pub fn rejection(&self) -> Option<TokenRejection> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<TokenRejection> for TokenError {
    fn from(reason: TokenRejection) -> Self {
        Self::Rejected(reason)
    }
}
