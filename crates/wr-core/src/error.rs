//! Error types shared across the engine.

/// Error type for building rule sets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleSetError {
    #[error("Empty pattern")]
    EmptyPattern,
    #[error("Pattern matches every URL: {0}")]
    MatchesEverything(String),
    #[error("Rule set '{0}' contains no rules")]
    NoRules(String),
}

/// Error type for permission updates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("Setting {0:?} cannot be stored as an origin override")]
    UnsupportedSetting(crate::types::ContentSetting),
    #[error("Invalid origin: '{0}'")]
    InvalidOrigin(String),
}
