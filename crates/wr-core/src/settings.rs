//! Setting kinds and their global defaults
//!
//! Each kind maps to an accessor on `GlobalPreferences` and to the content
//! setting it defaults to when the global switch is on or off.

use serde::{Deserialize, Serialize};

use crate::types::{ContentSetting, FilterFeature};

/// Site setting kinds exposed on the per-site screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Camera,
    Cookies,
    Fullscreen,
    JavaScript,
    Location,
    Microphone,
    Popups,
    ProtectedMedia,
    PushNotifications,
    WebRefiner,
    WebDefender,
}

impl From<FilterFeature> for SettingKind {
    fn from(feature: FilterFeature) -> Self {
        match feature {
            FilterFeature::WebRefiner => Self::WebRefiner,
            FilterFeature::WebDefender => Self::WebDefender,
        }
    }
}

/// Global on/off switches for every setting kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalPreferences {
    pub camera: bool,
    pub accept_cookies: bool,
    pub fullscreen: bool,
    pub javascript: bool,
    pub location: bool,
    pub microphone: bool,
    pub popups: bool,
    pub protected_media: bool,
    pub push_notifications: bool,
    pub web_refiner: bool,
    pub web_defender: bool,
}

impl Default for GlobalPreferences {
    fn default() -> Self {
        Self {
            camera: true,
            accept_cookies: true,
            fullscreen: true,
            javascript: true,
            location: true,
            microphone: true,
            popups: false,
            protected_media: true,
            push_notifications: true,
            web_refiner: true,
            web_defender: true,
        }
    }
}

struct KindEntry {
    kind: SettingKind,
    enabled: fn(&GlobalPreferences) -> bool,
    when_enabled: ContentSetting,
    when_disabled: ContentSetting,
}

const KIND_TABLE: &[KindEntry] = &[
    KindEntry { kind: SettingKind::Camera, enabled: |p| p.camera, when_enabled: ContentSetting::Ask, when_disabled: ContentSetting::Block },
    KindEntry { kind: SettingKind::Cookies, enabled: |p| p.accept_cookies, when_enabled: ContentSetting::Allow, when_disabled: ContentSetting::Block },
    KindEntry { kind: SettingKind::Fullscreen, enabled: |p| p.fullscreen, when_enabled: ContentSetting::Allow, when_disabled: ContentSetting::Ask },
    KindEntry { kind: SettingKind::JavaScript, enabled: |p| p.javascript, when_enabled: ContentSetting::Allow, when_disabled: ContentSetting::Block },
    KindEntry { kind: SettingKind::Location, enabled: |p| p.location, when_enabled: ContentSetting::Ask, when_disabled: ContentSetting::Block },
    KindEntry { kind: SettingKind::Microphone, enabled: |p| p.microphone, when_enabled: ContentSetting::Ask, when_disabled: ContentSetting::Block },
    KindEntry { kind: SettingKind::Popups, enabled: |p| p.popups, when_enabled: ContentSetting::Allow, when_disabled: ContentSetting::Block },
    KindEntry { kind: SettingKind::ProtectedMedia, enabled: |p| p.protected_media, when_enabled: ContentSetting::Ask, when_disabled: ContentSetting::Block },
    KindEntry { kind: SettingKind::PushNotifications, enabled: |p| p.push_notifications, when_enabled: ContentSetting::Ask, when_disabled: ContentSetting::Block },
    KindEntry { kind: SettingKind::WebRefiner, enabled: |p| p.web_refiner, when_enabled: ContentSetting::Allow, when_disabled: ContentSetting::Block },
    KindEntry { kind: SettingKind::WebDefender, enabled: |p| p.web_defender, when_enabled: ContentSetting::Allow, when_disabled: ContentSetting::Block },
];

impl SettingKind {
    pub const ALL: [SettingKind; 11] = [
        Self::Camera,
        Self::Cookies,
        Self::Fullscreen,
        Self::JavaScript,
        Self::Location,
        Self::Microphone,
        Self::Popups,
        Self::ProtectedMedia,
        Self::PushNotifications,
        Self::WebRefiner,
        Self::WebDefender,
    ];

    fn entry(self) -> &'static KindEntry {
        // Table order matches declaration order
        &KIND_TABLE[self as usize]
    }

    /// Whether the global switch for this kind is on.
    pub fn is_enabled(self, prefs: &GlobalPreferences) -> bool {
        (self.entry().enabled)(prefs)
    }

    /// Default content setting for this kind under `prefs`.
    pub fn default_value(self, prefs: &GlobalPreferences) -> ContentSetting {
        let entry = self.entry();
        if (entry.enabled)(prefs) {
            entry.when_enabled
        } else {
            entry.when_disabled
        }
    }

    /// The filter feature behind this kind, if any.
    pub fn filter_feature(self) -> Option<FilterFeature> {
        match self {
            Self::WebRefiner => Some(FilterFeature::WebRefiner),
            Self::WebDefender => Some(FilterFeature::WebDefender),
            _ => None,
        }
    }
}
