//! Core type definitions for WebRefiner
//!
//! These types are shared by the rule loader, the matcher and the
//! per-page report.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Rule Categories
// =============================================================================

/// Category a rule set is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    Ads = 1,
    Trackers = 2,
    #[serde(alias = "malware")]
    MalwareDomains = 3,
}

impl Category {
    /// All categories, in report order.
    pub const ALL: [Category; 3] = [Self::Ads, Self::Trackers, Self::MalwareDomains];

    /// Parse from a config or CLI name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ads" | "ad" => Some(Self::Ads),
            "trackers" | "tracker" => Some(Self::Trackers),
            "malware" | "malware_domains" | "malware-domains" => Some(Self::MalwareDomains),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Category {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ads),
            2 => Ok(Self::Trackers),
            3 => Ok(Self::MalwareDomains),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ads => "ads",
            Self::Trackers => "trackers",
            Self::MalwareDomains => "malware",
        })
    }
}

// =============================================================================
// Rule Actions
// =============================================================================

/// What a rule set does when one of its patterns matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Cancel the request
    #[default]
    Block,
    /// Exception rule (@@...) - explicitly allows the request
    Allow,
}

// =============================================================================
// Resource Types
// =============================================================================

/// Type of sub-resource being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceType {
    Image = 0,
    Script = 1,
    Stylesheet = 2,
    SubFrame = 3,
    Other = 4,
}

impl ResourceType {
    /// All resource types, in report order.
    pub const ALL: [ResourceType; 5] = [
        Self::Image,
        Self::Script,
        Self::Stylesheet,
        Self::SubFrame,
        Self::Other,
    ];

    /// Parse from a network-layer request type string.
    pub fn from_str(s: &str) -> Self {
        match s {
            "image" | "Image" => Self::Image,
            "script" | "Script" => Self::Script,
            "stylesheet" | "Stylesheet" => Self::Stylesheet,
            "sub_frame" | "subdocument" | "SubFrame" => Self::SubFrame,
            _ => Self::Other,
        }
    }

    /// The single-bit mask for this type.
    #[inline]
    pub fn mask(self) -> ResourceMask {
        match self {
            Self::Image => ResourceMask::IMAGE,
            Self::Script => ResourceMask::SCRIPT,
            Self::Stylesheet => ResourceMask::STYLESHEET,
            Self::SubFrame => ResourceMask::SUBFRAME,
            Self::Other => ResourceMask::OTHER,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "Image",
            Self::Script => "Script",
            Self::Stylesheet => "Stylesheet",
            Self::SubFrame => "SubFrame",
            Self::Other => "Other",
        })
    }
}

bitflags::bitflags! {
    /// Resource type mask used by `$type` rule options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceMask: u8 {
        const IMAGE = 1 << 0;
        const SCRIPT = 1 << 1;
        const STYLESHEET = 1 << 2;
        const SUBFRAME = 1 << 3;
        const OTHER = 1 << 4;

        /// All resource types
        const ALL = 0x1F;
    }
}

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// Action taken for an evaluated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Allowed,
    Blocked,
    /// An allow rule outranked every matching block rule
    Whitelisted,
}

/// Per-origin content setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSetting {
    Allow,
    Block,
    Ask,
    UseDefault,
}

impl ContentSetting {
    /// Map a feature-enabled flag to its setting.
    #[inline]
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Allow
        } else {
            Self::Block
        }
    }
}

/// Filter features that carry their own per-origin permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterFeature {
    /// Rule-set based request blocking
    WebRefiner,
    /// Tracker protection
    WebDefender,
}

impl FilterFeature {
    pub const ALL: [FilterFeature; 2] = [Self::WebRefiner, Self::WebDefender];
}

/// Identity of a page (tab) for per-page bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// A sub-resource request handed to the engine by the loading layer.
#[derive(Debug, Clone)]
pub struct FilterRequest<'a> {
    /// Page (tab) the request belongs to
    pub page: PageId,
    /// Origin of the top-level document
    pub origin: &'a str,
    /// Full request URL
    pub url: &'a str,
    /// Request type
    pub resource_type: ResourceType,
    /// Request was issued from an incognito page
    pub incognito: bool,
    /// Navigation generation the loader observed, when it tracks one
    pub generation: Option<u64>,
}
