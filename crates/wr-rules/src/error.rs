//! Errors raised while parsing and loading rule sources.

use wr_core::RuleSetError;

/// Why a single rule line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("Unknown option '{0}'")]
    UnknownOption(String),
    #[error("Options exclude every resource type")]
    EmptyTypeMask,
    #[error("Options exclude every party")]
    EmptyPartyMask,
    #[error(transparent)]
    Pattern(#[from] RuleSetError),
}

/// Why a whole rule source was skipped.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read rule source '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Rule source '{0}' is not valid UTF-8")]
    NotUtf8(String),
    #[error("Rule source '{name}': {rejected} of {total} rule lines rejected")]
    TooManyRejected {
        name: String,
        rejected: usize,
        total: usize,
    },
    #[error(transparent)]
    RuleSet(#[from] RuleSetError),
}
