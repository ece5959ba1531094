//! Error types shared by the catalog, the value deriver and the classifier.

use thiserror::Error;

/// Errors raised by catalog construction, lookups and value derivation.
///
/// Most of these are local and recoverable: the catalog logs them and keeps
/// going. Only [`AtlasError::Metadata`] and [`AtlasError::Manifest`] stop
/// start-up, because no catalog can be built without those inputs.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// A manifest path or composite key could not be parsed.
    #[error("cannot parse '{input}': {reason}")]
    Parse { input: String, reason: String },

    /// The table parameter feed is malformed.
    #[error("malformed table parameters: {0}")]
    Metadata(String),

    /// The catalog manifest is malformed or unreadable.
    #[error("malformed manifest: {0}")]
    Manifest(String),

    /// A dataset refers to a table id with no parameters.
    #[error("no table parameters for table '{0}'")]
    MissingMetadata(String),

    /// A derived value could not be computed for a row.
    #[error("missing value: {0}")]
    MissingValue(String),

    /// A composite key has no matching record.
    #[error("no record for key '{0}'")]
    LookupMiss(String),

    /// A payload fetch or parse failed; the record stays unloaded.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Configuration could not be loaded or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AtlasError {
    pub fn parse(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_value(detail: impl Into<String>) -> Self {
        Self::MissingValue(detail.into())
    }
}

/// Failure of one payload load.
///
/// Cloneable so that every caller attached to the same in-flight load
/// receives the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load '{path}': {message}")]
pub struct PayloadError {
    pub path: String,
    pub message: String,
}

impl PayloadError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Reasons the natural-breaks classifier declines to produce breaks.
///
/// Every variant is answered with uniform breaks by
/// [`crate::classify::classify_or_uniform`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// Fewer distinct values than requested classes.
    #[error("{distinct} distinct values cannot fill {classes} classes")]
    InsufficientData { distinct: usize, classes: usize },

    #[error("class count must be at least 1")]
    ZeroClasses,

    /// The input or an intermediate sum is NaN or infinite.
    #[error("non-finite value in classification input")]
    NonFinite,
}

pub type Result<T> = std::result::Result<T, AtlasError>;
