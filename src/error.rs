//! Error taxonomy shared by every layer of the server chain.
//!
//! | Kind | Type | Typical origin |
//! |---|---|---|
//! | Parameter | [`ParamError`] | missing key, wrong type, out-of-range value, bad source |
//! | Image | [`ImageError`] | decode/encode failure, binary truncation, subprocess failure or timeout |
//! | Cache miss | [`CacheMiss`] | a cache tier that does not hold the key |
//! | Internal | [`Error::Internal`], [`Error::Io`] | backend unavailability, unexpected I/O |
//!
//! Parameter errors carry a dotted path (`"resize.width"`) so that a nested
//! descriptor can be reported precisely; a scope is added with
//! [`ParamError::with_prefix`] by whoever descended into the nested
//! descriptor.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Miss(#[from] CacheMiss),
    #[error("operation cancelled")]
    Cancelled,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the distinguished cache-miss condition.
    pub fn is_miss(&self) -> bool {
        matches!(self, Error::Miss(_))
    }

    /// Rewrite a parameter error so its path is relative to `prefix`.
    /// Other kinds pass through untouched.
    pub fn with_param_prefix(self, prefix: &str) -> Self {
        match self {
            Error::Param(e) => Error::Param(e.with_prefix(prefix)),
            other => other,
        }
    }
}

/// What went wrong with a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamErrorKind {
    NotSet,
    WrongType {
        actual: &'static str,
        expected: &'static str,
    },
    Invalid(String),
}

/// A validation failure addressed by a dotted parameter path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid param \"{param}\": {kind}")]
pub struct ParamError {
    pub param: String,
    pub kind: ParamErrorKind,
}

impl fmt::Display for ParamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamErrorKind::NotSet => write!(f, "not set"),
            ParamErrorKind::WrongType { actual, expected } => {
                write!(f, "wrong type: {actual} (expected {expected})")
            }
            ParamErrorKind::Invalid(message) => write!(f, "{message}"),
        }
    }
}

impl ParamError {
    pub fn not_set(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            kind: ParamErrorKind::NotSet,
        }
    }

    pub fn wrong_type(
        param: impl Into<String>,
        actual: &'static str,
        expected: &'static str,
    ) -> Self {
        Self {
            param: param.into(),
            kind: ParamErrorKind::WrongType { actual, expected },
        }
    }

    pub fn invalid(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            kind: ParamErrorKind::Invalid(message.into()),
        }
    }

    /// `"quality"` with prefix `"resize"` becomes `"resize.quality"`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.param = format!("{}.{}", prefix, self.param);
        self
    }
}

/// A malformed or unprocessable image payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("format length {0} exceeds the maximum")]
    FormatTooLong(usize),
    #[error("data length {0} exceeds the maximum")]
    DataTooLong(usize),
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("unknown format \"{0}\"")]
    UnknownFormat(String),
    #[error("decode failed ({format}): {message}")]
    Decode { format: String, message: String },
    #[error("encode failed ({format}): {message}")]
    Encode { format: String, message: String },
    #[error("processing failed: {0}")]
    Process(String),
    #[error("external command failed: {0}")]
    Exec(String),
    #[error("external command timed out after {0:?}")]
    Timeout(Duration),
}

/// The distinguished "not in this cache" condition.
///
/// `cache` names the tier (or composite) that was queried, for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cache miss for key \"{key}\" in {cache}")]
pub struct CacheMiss {
    pub key: String,
    pub cache: String,
}

impl CacheMiss {
    pub fn new(key: impl Into<String>, cache: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cache: cache.into(),
        }
    }
}
