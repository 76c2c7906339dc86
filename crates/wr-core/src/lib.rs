//! WebRefiner Core Library
//!
//! This crate provides the per-request content-filtering decision engine
//! used by the browser's loading layer and settings screens.
//!
//! # Architecture
//!
//! Rule sets are parsed once at startup (see the `wr-rules` crate) and
//! handed to a [`FilterEngine`]. For every sub-resource request the engine
//! resolves whether filtering is enabled for the page's origin, matches the
//! URL against the loaded rule sets and records the decision on the page's
//! session, which the UI polls for badges and reports.
//!
//! # Modules
//!
//! - `types`: Shared type definitions
//! - `url`: URL and origin parsing without a URL library
//! - `site`: Registrable-domain and third-party checks
//! - `ruleset`: Compiled patterns and immutable rule sets
//! - `matcher`: Priority matching across rule sets
//! - `permissions`: Per-origin overrides with an incognito layer
//! - `session`: Per-page decision bookkeeping
//! - `report`: Page report breakdowns and badge text
//! - `defender`: Tracker protection status
//! - `settings`: Setting kinds and their defaults
//! - `engine`: The orchestrating `FilterEngine`

pub mod defender;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod permissions;
pub mod report;
pub mod ruleset;
pub mod session;
pub mod settings;
pub mod site;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use defender::{ProtectionStatus, ProtectiveAction, TrackerDomain, TrackingMethods};
pub use engine::{FilterEngine, InitStatus, Verdict};
pub use error::{PermissionError, RuleSetError};
pub use matcher::{RuleMatch, RuleMatcher, TieBreak};
pub use permissions::{EffectiveSetting, PermissionResolver, SettingSource};
pub use report::PageReport;
pub use ruleset::{AnchorType, Pattern, Rule, RuleSet};
pub use session::{MatchedUrlInfo, PageFilterSession, PageInfo, PageState, RecordOutcome};
pub use settings::{GlobalPreferences, SettingKind};
pub use types::{
    Action, Category, ContentSetting, FilterFeature, FilterRequest, PageId, PartyMask,
    ResourceMask, ResourceType, RuleAction,
};
